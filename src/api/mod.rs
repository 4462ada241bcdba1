use crate::runner::ReportRunner;
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;

pub mod handlers;
pub mod responses;

pub fn router(runner: Arc<ReportRunner>) -> Router {
    Router::new()
        .route("/", get(handlers::get_root))
        .route("/health", get(handlers::get_health))
        .route("/trigger_report", post(handlers::trigger_report))
        .route("/get_report", get(handlers::get_report))
        .with_state(runner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{DEFAULT_BATCH_SIZE, ReportSettings};
    use crate::state::AppState;
    use crate::store::memory::MemoryStore;
    use crate::store::{Observation, ObservationStatus, OpenHoursWindow, StoreTimezone};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use serde_json::Value;
    use std::path::Path;
    use std::sync::RwLock;
    use time::OffsetDateTime;
    use time::macros::{datetime, time};
    use tower::ServiceExt;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn seeded_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        for (minutes, status) in [(5, ObservationStatus::Active), (50, ObservationStatus::Inactive)] {
            store.add_observation(Observation {
                store_id: "s1".to_string(),
                status,
                timestamp_utc: datetime!(2023-01-25 18:00 UTC) - time::Duration::minutes(minutes),
            });
        }
        store.add_open_hours(OpenHoursWindow {
            store_id: "s1".to_string(),
            day_of_week: 2,
            open_local: time!(9:00),
            close_local: time!(21:00),
        });
        store.set_timezone(StoreTimezone {
            store_id: "s1".to_string(),
            timezone: "America/Chicago".to_string(),
        });
        store
    }

    fn test_runner(store: MemoryStore, dir: &Path) -> Arc<ReportRunner> {
        Arc::new(ReportRunner::new(
            Arc::new(RwLock::new(AppState::new())),
            Arc::new(store),
            ReportSettings {
                output_dir: dir.join("reports"),
                batch_size: DEFAULT_BATCH_SIZE,
                default_timezone: "America/Chicago".to_string(),
            },
            1,
        ))
    }

    type Sent = (StatusCode, Vec<u8>, Option<String>);

    async fn send(
        runner: &Arc<ReportRunner>,
        request: Request<Body>,
    ) -> Result<Sent, Box<dyn std::error::Error>> {
        let response = router(runner.clone()).oneshot(request).await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, body.to_vec(), content_type))
    }

    fn get(uri: &str) -> Result<Request<Body>, axum::http::Error> {
        Request::builder().uri(uri).body(Body::empty())
    }

    fn post(uri: &str) -> Result<Request<Body>, axum::http::Error> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
    }

    async fn trigger(runner: &Arc<ReportRunner>) -> Result<String, Box<dyn std::error::Error>> {
        let (status, body, _) = send(runner, post("/trigger_report")?).await?;
        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_slice(&body)?;
        assert_eq!(value["status"], "Running");
        let report_id = value["report_id"].as_str().ok_or("report_id missing")?;
        Ok(report_id.to_string())
    }

    #[tokio::test]
    async fn root_returns_banner() -> TestResult {
        let dir = tempfile::tempdir()?;
        let runner = test_runner(MemoryStore::new(), dir.path());

        let (status, body, _) = send(&runner, get("/")?).await?;

        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_slice(&body)?;
        assert_eq!(value["status"], "healthy");
        assert!(value["timestamp"].as_str().is_some());
        Ok(())
    }

    #[tokio::test]
    async fn trigger_then_download_report() -> TestResult {
        let dir = tempfile::tempdir()?;
        let runner = test_runner(seeded_store(), dir.path());

        let report_id = trigger(&runner).await?;
        runner.wait(&report_id).await?;
        let (status, body, content_type) =
            send(&runner, get(&format!("/get_report?report_id={report_id}"))?).await?;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("text/csv"));
        let csv = String::from_utf8(body)?;
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("store_id,uptime_last_hour(in minutes)"));
        assert_eq!(lines[1], "s1,30.0,12.0,84.0,30.0,12.0,84.0");
        Ok(())
    }

    #[tokio::test]
    async fn unknown_report_is_not_found() -> TestResult {
        let dir = tempfile::tempdir()?;
        let runner = test_runner(MemoryStore::new(), dir.path());

        let (status, body, _) = send(&runner, get("/get_report?report_id=nope")?).await?;

        assert_eq!(status, StatusCode::NOT_FOUND);
        let value: Value = serde_json::from_slice(&body)?;
        assert_eq!(value["error_code"], "NOT_FOUND");
        Ok(())
    }

    #[tokio::test]
    async fn running_report_reports_status() -> TestResult {
        let dir = tempfile::tempdir()?;
        let runner = test_runner(MemoryStore::new(), dir.path());
        let record = match runner.state().write() {
            Ok(mut state) => state.admit_run(OffsetDateTime::now_utc(), 1).record().clone(),
            Err(_) => return Err("lock poisoned".into()),
        };

        let (status, body, _) =
            send(&runner, get(&format!("/get_report?report_id={}", record.run_id))?).await?;

        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_slice(&body)?;
        assert_eq!(value["status"], "Running");
        assert_eq!(value["report_id"], record.run_id.as_str());
        Ok(())
    }

    #[tokio::test]
    async fn failed_run_degrades_health() -> TestResult {
        let dir = tempfile::tempdir()?;
        let mut store = seeded_store();
        store.failures_mut().list_fails = true;
        let runner = test_runner(store, dir.path());

        let report_id = trigger(&runner).await?;
        runner.wait(&report_id).await?;

        let (_, body, _) = send(&runner, get(&format!("/get_report?report_id={report_id}"))?).await?;
        let value: Value = serde_json::from_slice(&body)?;
        assert_eq!(value["status"], "Error");
        assert_eq!(value["message"], "Report generation failed");

        let (status, body, _) = send(&runner, get("/health")?).await?;
        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_slice(&body)?;
        assert_eq!(value["status"], "degraded");
        assert_eq!(value["running_reports"], 0);
        Ok(())
    }

    #[tokio::test]
    async fn missing_artifact_is_reported() -> TestResult {
        let dir = tempfile::tempdir()?;
        let runner = test_runner(MemoryStore::new(), dir.path());
        let run_id = match runner.state().write() {
            Ok(mut state) => {
                let now = OffsetDateTime::now_utc();
                let run_id = state.admit_run(now, 1).record().run_id.clone();
                state.complete_run(&run_id, dir.path().join("gone.csv"), now)?;
                run_id
            }
            Err(_) => return Err("lock poisoned".into()),
        };

        let (status, body, _) = send(&runner, get(&format!("/get_report?report_id={run_id}"))?).await?;

        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_slice(&body)?;
        assert_eq!(value["status"], "Error");
        assert_eq!(value["message"], "Report completed but file not found");
        Ok(())
    }

    #[tokio::test]
    async fn health_is_ok_without_failures() -> TestResult {
        let dir = tempfile::tempdir()?;
        let runner = test_runner(MemoryStore::new(), dir.path());

        let (status, body, _) = send(&runner, get("/health")?).await?;

        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_slice(&body)?;
        assert_eq!(value["status"], "ok");
        assert_eq!(value["running_reports"], 0);
        Ok(())
    }
}
