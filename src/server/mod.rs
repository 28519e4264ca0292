pub mod files;
pub mod health;
pub mod routes;
pub mod sse;

use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::daemon::manager::JobManager;
use crate::models::DaemonConfig;

/// Shared application state for the Axum server.
pub struct AppState {
    pub manager: Arc<JobManager>,
    pub config: Arc<DaemonConfig>,
    pub start_time: Instant,
    pub shutdown_tx: Option<tokio::sync::watch::Sender<()>>,
}

/// Create the Axum router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/jobs", get(routes::list_jobs).post(routes::create_job))
        .route(
            "/api/jobs/{id}",
            get(routes::get_job)
                .put(routes::replace_job)
                .delete(routes::delete_job),
        )
        .route("/api/jobs/{id}/trigger", post(routes::trigger_job))
        .route("/api/events", get(sse::sse_handler))
        .route("/api/shutdown", post(routes::shutdown))
        .route("/files/{*path}", get(files::serve_file))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::events::JobEvent;
    use crate::daemon::scheduler::SystemClock;
    use crate::fetcher::{Fetcher, MockFetchConfig, MockFetcher};
    use crate::models::Job;
    use crate::storage::memory::InMemoryJobStore;
    use crate::storage::JobStore;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tokio::sync::broadcast;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        state: Arc<AppState>,
        fetcher: Arc<MockFetcher>,
        _tmp: TempDir,
    }

    fn setup(body: &[u8]) -> TestApp {
        let tmp = TempDir::new().expect("tmp");
        let storage_root = tmp.path().join("files");
        let fetcher = Arc::new(MockFetcher::with_body(storage_root.clone(), body));
        let (event_tx, _) = broadcast::channel::<JobEvent>(64);
        let manager = Arc::new(JobManager::new(
            Arc::new(InMemoryJobStore::new()) as Arc<dyn JobStore>,
            Arc::clone(&fetcher) as Arc<dyn Fetcher>,
            Arc::new(SystemClock),
            event_tx,
            storage_root,
        ));
        let state = Arc::new(AppState {
            manager,
            config: Arc::new(DaemonConfig::default()),
            start_time: Instant::now(),
            shutdown_tx: None,
        });
        TestApp {
            router: create_router(Arc::clone(&state)),
            state,
            fetcher,
            _tmp: tmp,
        }
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let resp = router.clone().oneshot(req).await.expect("oneshot");
        let status = resp.status();
        let bytes = resp
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes()
            .to_vec();
        (status, bytes)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    async fn create(app: &TestApp, body: serde_json::Value) -> Job {
        let (status, bytes) = send(&app.router, json_request("POST", "/api/jobs", body)).await;
        assert_eq!(status, StatusCode::CREATED, "{}", String::from_utf8_lossy(&bytes));
        serde_json::from_slice(&bytes).expect("job json")
    }

    fn report_job(period: u64) -> serde_json::Value {
        serde_json::json!({
            "remote_source": "https://example.com/report.csv",
            "local_path": "reports/report.csv",
            "public_path": "/reports/latest.csv",
            "period_minutes": period,
        })
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = setup(b"x");
        let (status, bytes) = send(&app.router, empty_request("GET", "/health")).await;
        assert_eq!(status, StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body["status"], "ok");
        assert_eq!(body["total_jobs"], 0);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_list_jobs_empty_object() {
        let app = setup(b"x");
        let (status, bytes) = send(&app.router, empty_request("GET", "/api/jobs")).await;
        assert_eq!(status, StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_create_then_list_keyed_by_id_in_creation_order() {
        let app = setup(b"x");
        let first = create(&app, report_job(0)).await;
        let second = create(
            &app,
            serde_json::json!({
                "url": "https://example.com/b.txt",
                "local_path": "b.txt",
                "serve_url": "b.txt",
            }),
        )
        .await;
        assert_eq!(second.remote_source, "https://example.com/b.txt");
        assert_eq!(second.period_minutes, 0);

        let (status, bytes) = send(&app.router, empty_request("GET", "/api/jobs")).await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(bytes).expect("utf8");
        let first_pos = text.find(&first.id.to_string()).expect("first id");
        let second_pos = text.find(&second.id.to_string()).expect("second id");
        assert!(first_pos < second_pos);

        let body: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(
            body[first.id.to_string()]["public_path"],
            "/reports/latest.csv"
        );
        assert_eq!(body[first.id.to_string()]["last_status"], "none");
    }

    #[tokio::test]
    async fn test_create_recurring_installs_timer() {
        let app = setup(b"x");
        let job = create(&app, report_job(30)).await;
        assert!(app.state.manager.scheduler().is_scheduled(job.id));
    }

    #[tokio::test]
    async fn test_create_missing_field_is_400() {
        let app = setup(b"x");
        let (status, bytes) = send(
            &app.router,
            json_request(
                "POST",
                "/api/jobs",
                serde_json::json!({"remote_source": "https://example.com/a", "local_path": "a"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body["error"], "validation_error");
        assert!(body["message"]
            .as_str()
            .unwrap_or_default()
            .contains("public_path"));
    }

    #[tokio::test]
    async fn test_create_malformed_json_is_400() {
        let app = setup(b"x");
        let req = Request::builder()
            .method("POST")
            .uri("/api/jobs")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .expect("request");
        let (status, bytes) = send(&app.router, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn test_create_rejects_escaping_local_path() {
        let app = setup(b"x");
        let mut body = report_job(0);
        body["local_path"] = serde_json::json!("../outside.txt");
        let (status, _) = send(&app.router, json_request("POST", "/api/jobs", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_job_and_unknown_ids() {
        let app = setup(b"x");
        let job = create(&app, report_job(0)).await;

        let (status, bytes) = send(
            &app.router,
            empty_request("GET", &format!("/api/jobs/{}", job.id)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let fetched: Job = serde_json::from_slice(&bytes).expect("job");
        assert_eq!(fetched, job);

        let (status, _) = send(
            &app.router,
            empty_request("GET", &format!("/api/jobs/{}", uuid::Uuid::now_v7())),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, bytes) = send(&app.router, empty_request("GET", "/api/jobs/not-a-uuid")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body["error"], "not_found");
        assert!(body["message"]
            .as_str()
            .unwrap_or_default()
            .starts_with("Invalid job id"));
    }

    #[tokio::test]
    async fn test_replace_job_reschedules() {
        let app = setup(b"x");
        let job = create(&app, report_job(0)).await;
        assert!(!app.state.manager.scheduler().is_scheduled(job.id));

        let (status, bytes) = send(
            &app.router,
            json_request("PUT", &format!("/api/jobs/{}", job.id), report_job(15)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let replaced: Job = serde_json::from_slice(&bytes).expect("job");
        assert_eq!(replaced.id, job.id);
        assert_eq!(replaced.period_minutes, 15);
        assert!(app.state.manager.scheduler().is_scheduled(job.id));

        let (status, _) = send(
            &app.router,
            json_request("PUT", &format!("/api/jobs/{}", job.id), report_job(0)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(!app.state.manager.scheduler().is_scheduled(job.id));
    }

    #[tokio::test]
    async fn test_replace_unknown_job_is_404() {
        let app = setup(b"x");
        let (status, _) = send(
            &app.router,
            json_request(
                "PUT",
                &format!("/api/jobs/{}", uuid::Uuid::now_v7()),
                report_job(5),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_job_unschedules() {
        let app = setup(b"x");
        let job = create(&app, report_job(10)).await;
        assert!(app.state.manager.scheduler().is_scheduled(job.id));

        let (status, bytes) = send(
            &app.router,
            empty_request("DELETE", &format!("/api/jobs/{}", job.id)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body["message"], "Job deleted");
        assert!(!app.state.manager.scheduler().is_scheduled(job.id));

        let (status, _) = send(
            &app.router,
            empty_request("DELETE", &format!("/api/jobs/{}", job.id)),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_trigger_then_serve_file() {
        let app = setup(b"id,total\n1,42\n");
        let job = create(&app, report_job(0)).await;

        let (status, bytes) = send(
            &app.router,
            empty_request("POST", &format!("/api/jobs/{}/trigger", job.id)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let outcome: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(outcome["ok"], true);

        let stored = app.state.manager.get_job(job.id).await.expect("job");
        assert_eq!(stored.last_status, crate::models::JobStatus::Success);
        assert!(stored.last_run_at.is_some());

        let resp = app
            .router
            .clone()
            .oneshot(empty_request("GET", "/files/reports/latest.csv"))
            .await
            .expect("oneshot");
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).expect("content type"),
            "text/csv"
        );
        let bytes = resp.into_body().collect().await.expect("body").to_bytes();
        assert_eq!(&bytes[..], b"id,total\n1,42\n");
    }

    #[tokio::test]
    async fn test_trigger_failure_is_200_with_ok_false() {
        let app = setup(b"x");
        app.fetcher.set_config(MockFetchConfig {
            error: Some("connection refused".to_string()),
            ..Default::default()
        });
        let job = create(&app, report_job(0)).await;

        let (status, bytes) = send(
            &app.router,
            empty_request("POST", &format!("/api/jobs/{}/trigger", job.id)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let outcome: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(outcome["ok"], false);
        assert!(outcome["message"]
            .as_str()
            .unwrap_or_default()
            .contains("connection refused"));

        let stored = app.state.manager.get_job(job.id).await.expect("job");
        assert_eq!(stored.last_status, crate::models::JobStatus::Error);
    }

    #[tokio::test]
    async fn test_trigger_unknown_job_is_404() {
        let app = setup(b"x");
        let (status, _) = send(
            &app.router,
            empty_request("POST", &format!("/api/jobs/{}/trigger", uuid::Uuid::now_v7())),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(app.fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_serve_before_first_fetch_is_404() {
        let app = setup(b"x");
        create(&app, report_job(0)).await;
        let (status, bytes) =
            send(&app.router, empty_request("GET", "/files/reports/latest.csv")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert!(body["message"]
            .as_str()
            .unwrap_or_default()
            .contains("File not found"));
    }

    #[tokio::test]
    async fn test_serve_unconfigured_path_is_404() {
        let app = setup(b"x");
        let (status, bytes) = send(&app.router, empty_request("GET", "/files/nothing/here")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert!(body["message"]
            .as_str()
            .unwrap_or_default()
            .contains("not configured"));
    }

    #[tokio::test]
    async fn test_shutdown_sends_signal() {
        let tmp = TempDir::new().expect("tmp");
        let (event_tx, _) = broadcast::channel::<JobEvent>(8);
        let manager = Arc::new(JobManager::new(
            Arc::new(InMemoryJobStore::new()) as Arc<dyn JobStore>,
            Arc::new(MockFetcher::with_body(tmp.path().to_path_buf(), b"x")) as Arc<dyn Fetcher>,
            Arc::new(SystemClock),
            event_tx,
            tmp.path().to_path_buf(),
        ));
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(());
        let router = create_router(Arc::new(AppState {
            manager,
            config: Arc::new(DaemonConfig::default()),
            start_time: Instant::now(),
            shutdown_tx: Some(shutdown_tx),
        }));

        let (status, _) = send(&router, empty_request("POST", "/api/shutdown")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(shutdown_rx.has_changed().expect("sender alive"));
    }
}
