use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Serialize, Serializer};
use uuid::Uuid;

use super::AppState;
use crate::errors::FetchdError;
use crate::models::{Job, NewJob};

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub(crate) fn error_response(status: StatusCode, error: &str, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// Map an error from the job manager onto a status code and error body.
pub(crate) fn api_error(err: anyhow::Error) -> Response {
    match err.downcast_ref::<FetchdError>() {
        Some(FetchdError::Validation(msg)) => {
            error_response(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        Some(FetchdError::NotFound(msg)) => error_response(StatusCode::NOT_FOUND, "not_found", msg),
        Some(FetchdError::Storage(msg)) => {
            tracing::error!("Storage failure: {}", msg);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
        }
        _ => {
            tracing::error!("Request failed: {:#}", err);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                &format!("{:#}", err),
            )
        }
    }
}

/// An unparseable id cannot name any job, so it is reported as not found.
fn parse_id(id: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(id).map_err(|e| {
        tracing::warn!("Job not found: '{}'", id);
        api_error(FetchdError::from(e).into())
    })
}

fn parse_body(payload: Result<Json<NewJob>, JsonRejection>) -> Result<NewJob, Response> {
    payload.map(|Json(new)| new).map_err(|rejection| {
        tracing::warn!("Rejected job body: {}", rejection.body_text());
        error_response(
            StatusCode::BAD_REQUEST,
            "validation_error",
            &rejection.body_text(),
        )
    })
}

/// Jobs serialized as a JSON object keyed by id, in store order.
pub struct JobMap<'a>(pub &'a [Job]);

impl Serialize for JobMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|job| (job.id, job)))
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/jobs
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Response {
    match state.manager.list_jobs().await {
        Ok(jobs) => (StatusCode::OK, Json(JobMap(&jobs))).into_response(),
        Err(e) => api_error(e),
    }
}

/// POST /api/jobs
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewJob>, JsonRejection>,
) -> Response {
    let new_job = match parse_body(payload) {
        Ok(new) => new,
        Err(resp) => return resp,
    };

    match state.manager.create_job(new_job).await {
        Ok(job) => (StatusCode::CREATED, Json(job)).into_response(),
        Err(e) => {
            tracing::warn!("Job creation failed: {}", e);
            api_error(e)
        }
    }
}

/// GET /api/jobs/{id}
pub async fn get_job(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.manager.get_job(id).await {
        Ok(job) => (StatusCode::OK, Json(job)).into_response(),
        Err(e) => api_error(e),
    }
}

/// PUT /api/jobs/{id}
pub async fn replace_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<NewJob>, JsonRejection>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let new_job = match parse_body(payload) {
        Ok(new) => new,
        Err(resp) => return resp,
    };

    match state.manager.replace_job(id, new_job).await {
        Ok(job) => (StatusCode::OK, Json(job)).into_response(),
        Err(e) => {
            tracing::warn!("Job replacement failed for {}: {}", id, e);
            api_error(e)
        }
    }
}

/// DELETE /api/jobs/{id}
pub async fn delete_job(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.manager.delete_job(id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "Job deleted",
                "id": id,
            })),
        )
            .into_response(),
        Err(e) => api_error(e),
    }
}

/// POST /api/jobs/{id}/trigger
///
/// Fetches inline; the response carries the outcome. A failed fetch is
/// still a 200 with `ok: false`.
pub async fn trigger_job(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    tracing::info!("Job {} triggered manually", id);
    match state.manager.trigger(id).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => api_error(e),
    }
}

/// POST /api/shutdown
pub async fn shutdown(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::info!("Shutdown requested");

    if let Some(ref tx) = state.shutdown_tx {
        let _ = tx.send(());
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "message": "Shutdown initiated",
        })),
    )
}
