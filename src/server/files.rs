use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio_util::io::ReaderStream;

use super::routes::{api_error, error_response};
use super::AppState;

/// GET /files/{*path}
///
/// Streams the file of the first job whose public path matches.
pub async fn serve_file(State(state): State<Arc<AppState>>, Path(path): Path<String>) -> Response {
    let local = match state.manager.resolve_public_path(&path).await {
        Ok(local) => local,
        Err(e) => {
            tracing::debug!("Serve '{}' failed: {}", path, e);
            return api_error(e);
        }
    };

    // The file can vanish between resolution and open.
    let file = match tokio::fs::File::open(&local).await {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!("Failed to open {}: {}", local.display(), e);
            return error_response(
                StatusCode::NOT_FOUND,
                "not_found",
                &format!("File not found for '{}'", path),
            );
        }
    };

    let mime_type = mime_guess::from_path(&local)
        .first_or_octet_stream()
        .to_string();
    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    if let Ok(value) = mime_type.parse() {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    response
}
