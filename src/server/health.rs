use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use super::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub scheduled_jobs: usize,
    pub total_jobs: usize,
    pub version: String,
    pub data_dir: Option<String>,
    pub storage_root: String,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Health check");

    let total_jobs = state
        .manager
        .list_jobs()
        .await
        .map(|jobs| jobs.len())
        .unwrap_or(0);

    let response = HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        scheduled_jobs: state.manager.scheduler().scheduled_count(),
        total_jobs,
        version: env!("CARGO_PKG_VERSION").to_string(),
        data_dir: state
            .config
            .data_dir
            .as_ref()
            .map(|d| d.display().to_string()),
        storage_root: state.manager.storage_root().display().to_string(),
    };

    (StatusCode::OK, Json(response))
}
