// CLI daemon commands: start, stop, status

use std::path::Path;

use reqwest::Client;
use serde_json::Value;

use super::{base_url, handle_request_error};

/// fetchd start
///
/// Runs the daemon in this process until it is stopped.
pub async fn cmd_start(
    host: &str,
    config: Option<&str>,
    port_override: Option<u16>,
    data_dir: Option<&str>,
    storage_root: Option<&str>,
    verbose: bool,
) -> anyhow::Result<()> {
    // Only override the configured host when the global flag was changed
    let host_override = if host != "127.0.0.1" {
        Some(host)
    } else {
        None
    };

    crate::daemon::start_daemon(
        config.map(Path::new),
        data_dir.map(Path::new),
        storage_root.map(Path::new),
        host_override,
        port_override,
        verbose,
    )
    .await
}

/// fetchd stop
pub async fn cmd_stop(host: &str, port: u16) -> anyhow::Result<()> {
    let client = Client::new();
    let url = format!("{}/api/shutdown", base_url(host, port));

    let response = client
        .post(&url)
        .send()
        .await
        .map_err(|e| handle_request_error(e, host, port))?;

    let status = response.status();
    if status.is_success() {
        println!("Daemon is shutting down...");
        Ok(())
    } else {
        let body: Value = response
            .json()
            .await
            .unwrap_or_else(|_| serde_json::json!({"message": "Unknown error"}));
        let message = body["message"].as_str().unwrap_or("Unknown error");
        anyhow::bail!("{}", message)
    }
}

/// fetchd status
pub async fn cmd_status(host: &str, port: u16, verbose: bool) -> anyhow::Result<()> {
    let client = Client::new();
    let url = format!("{}/health", base_url(host, port));

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| handle_request_error(e, host, port))?;

    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to parse response: {}", e))?;

    if !status.is_success() {
        let message = body["message"]
            .as_str()
            .unwrap_or("Daemon returned an error");
        anyhow::bail!("{}", message);
    }

    let daemon_status = body["status"].as_str().unwrap_or("unknown");
    let version = body["version"].as_str().unwrap_or("unknown");
    let uptime = body["uptime_seconds"].as_u64().unwrap_or(0);
    let scheduled_jobs = body["scheduled_jobs"].as_u64().unwrap_or(0);
    let total_jobs = body["total_jobs"].as_u64().unwrap_or(0);
    let data_dir = body["data_dir"].as_str().unwrap_or("unknown");
    let storage_root = body["storage_root"].as_str().unwrap_or("unknown");

    println!("Daemon Status: {}", daemon_status);
    println!("  Data Dir:     {}", data_dir);
    println!("  Storage Root: {}", storage_root);
    println!("  Files:        http://{}:{}/files/", host, port);
    println!(
        "  Jobs:         {} scheduled / {} total",
        scheduled_jobs, total_jobs
    );
    println!("  Uptime:       {}", format_uptime(uptime));
    println!("  Version:      {}", version);

    if verbose {
        println!("\nRaw response:");
        println!("{}", serde_json::to_string_pretty(&body)?);
    }

    Ok(())
}

/// Format uptime seconds into a human-readable string.
fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if days > 0 {
        format!("{}d {}h {}m {}s", days, hours, mins, secs)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
