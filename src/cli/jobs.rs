// CLI job commands: add, remove, list, trigger

use std::io::{self, BufRead, Write};

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;

use super::{base_url, handle_request_error};
use crate::models::NewJob;

/// Format a relative time string like "2 minutes ago".
fn format_relative_time(dt: &DateTime<Utc>) -> String {
    let secs = Utc::now().signed_duration_since(*dt).num_seconds().max(0);
    if secs < 60 {
        format!("{} seconds ago", secs)
    } else if secs < 3600 {
        format!("{} minutes ago", secs / 60)
    } else if secs < 86400 {
        format!("{} hours ago", secs / 3600)
    } else {
        format!("{} days ago", secs / 86400)
    }
}

fn format_period(minutes: u64) -> String {
    if minutes == 0 {
        "manual".to_string()
    } else if minutes % 1440 == 0 {
        format!("{}d", minutes / 1440)
    } else if minutes % 60 == 0 {
        format!("{}h", minutes / 60)
    } else {
        format!("{}m", minutes)
    }
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() > width {
        let head: String = value.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        value.to_string()
    }
}

/// Read a JSON body and turn a non-success status into an error carrying the
/// daemon's message.
async fn read_body(response: reqwest::Response) -> anyhow::Result<Value> {
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to parse response: {}", e))?;

    if !status.is_success() {
        let message = body["message"].as_str().unwrap_or("Unknown error");
        anyhow::bail!("{}", message);
    }
    Ok(body)
}

/// fetchd add
pub async fn cmd_add(
    host: &str,
    port: u16,
    url: &str,
    local_path: &str,
    public_path: &str,
    period: u64,
) -> anyhow::Result<()> {
    let new_job = NewJob {
        remote_source: url.to_string(),
        local_path: local_path.to_string(),
        public_path: public_path.to_string(),
        period_minutes: period,
    };

    let client = Client::new();
    let response = client
        .post(format!("{}/api/jobs", base_url(host, port)))
        .json(&new_job)
        .send()
        .await
        .map_err(|e| handle_request_error(e, host, port))?;
    let body = read_body(response).await?;

    println!("Job created.");
    println!("  ID:      {}", body["id"].as_str().unwrap_or("unknown"));
    println!("  Source:  {}", url);
    println!("  Serves:  /files/{}", public_path.trim_start_matches('/'));
    println!("  Period:  {}", format_period(period));

    Ok(())
}

/// fetchd remove
pub async fn cmd_remove(host: &str, port: u16, job: &str, yes: bool) -> anyhow::Result<()> {
    if !yes {
        print!("Are you sure you want to remove job '{}'? [y/N] ", job);
        io::stdout().flush()?;
        let stdin = io::stdin();
        let mut line = String::new();
        stdin.lock().read_line(&mut line)?;
        let answer = line.trim().to_lowercase();
        if answer != "y" && answer != "yes" {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let client = Client::new();
    let response = client
        .delete(format!("{}/api/jobs/{}", base_url(host, port), job))
        .send()
        .await
        .map_err(|e| handle_request_error(e, host, port))?;
    read_body(response).await?;

    println!("Job '{}' removed.", job);
    Ok(())
}

/// fetchd list
pub async fn cmd_list(host: &str, port: u16, json: bool) -> anyhow::Result<()> {
    let client = Client::new();
    let response = client
        .get(format!("{}/api/jobs", base_url(host, port)))
        .send()
        .await
        .map_err(|e| handle_request_error(e, host, port))?;
    let body = read_body(response).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let Some(jobs) = body.as_object().filter(|jobs| !jobs.is_empty()) else {
        println!("No jobs found.");
        return Ok(());
    };

    println!(
        "{:<38}{:<28}{:<10}{:<18}{:<10}",
        "ID", "SERVES", "PERIOD", "LAST RUN", "STATUS"
    );

    for (id, job) in jobs {
        let public_path = job["public_path"].as_str().unwrap_or("?");
        let period = job["period_minutes"].as_u64().unwrap_or(0);
        let last_run = job["last_run_at"]
            .as_str()
            .and_then(|ts| ts.parse::<DateTime<Utc>>().ok())
            .map(|dt| format_relative_time(&dt))
            .unwrap_or_else(|| "-".to_string());
        let status = job["last_status"].as_str().unwrap_or("none");

        println!(
            "{:<38}{:<28}{:<10}{:<18}{:<10}",
            id,
            truncate(public_path, 27),
            format_period(period),
            last_run,
            status
        );
    }

    Ok(())
}

/// fetchd trigger
pub async fn cmd_trigger(host: &str, port: u16, job: &str) -> anyhow::Result<()> {
    let client = Client::new();
    let response = client
        .post(format!("{}/api/jobs/{}/trigger", base_url(host, port), job))
        .send()
        .await
        .map_err(|e| handle_request_error(e, host, port))?;
    let body = read_body(response).await?;

    let message = body["message"].as_str().unwrap_or("");
    if body["ok"].as_bool().unwrap_or(false) {
        println!("Fetch succeeded: {}", message);
        Ok(())
    } else {
        anyhow::bail!("Fetch failed: {}", message)
    }
}
