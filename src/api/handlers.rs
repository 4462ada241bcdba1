use crate::api::responses::{
    BannerResponse, ErrorCode, ErrorResponse, HealthStatus, HealthSuccessResponse,
    ReportStatusResponse, TriggerSuccessResponse,
};
use crate::runner::ReportRunner;
use crate::state::{Admission, RunRecord, RunStatus};
use axum::Json;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::fmt;
use std::io;
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{error, warn};

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
const FALLBACK_TIMESTAMP: &str = "1970-01-01T00:00:00Z";
const FILE_MISSING_MESSAGE: &str = "Report completed but file not found";

#[derive(Debug)]
enum TimestampError {
    Format(time::error::Format),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::Format(err) => write!(f, "timestamp format error: {err}"),
        }
    }
}

fn format_timestamp(timestamp: OffsetDateTime) -> Result<String, TimestampError> {
    timestamp.format(&Rfc3339).map_err(TimestampError::Format)
}

fn now_timestamp() -> String {
    format_timestamp(OffsetDateTime::now_utc()).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format response timestamp");
        FALLBACK_TIMESTAMP.to_string()
    })
}

fn error_body(error_code: ErrorCode, error_message: &str) -> ErrorResponse {
    ErrorResponse {
        error_code,
        error_message: error_message.to_string(),
        timestamp: now_timestamp(),
    }
}

fn internal_error_body(route: &str, message: &str) -> ErrorResponse {
    error!(message = message, route, "Internal error while handling request");
    error_body(ErrorCode::InternalError, INTERNAL_ERROR_MESSAGE)
}

pub async fn get_root() -> impl IntoResponse {
    Json(BannerResponse {
        message: "Store monitoring API is running".to_string(),
        status: "healthy".to_string(),
        timestamp: now_timestamp(),
    })
}

pub enum HealthResponse {
    Success(HealthSuccessResponse),
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        match self {
            HealthResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            HealthResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_health(State(runner): State<Arc<ReportRunner>>) -> impl IntoResponse {
    build_health_response(&runner)
}

fn build_health_response(runner: &ReportRunner) -> HealthResponse {
    let guard = match runner.state().read() {
        Ok(guard) => guard,
        Err(_) => {
            return HealthResponse::Error {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: internal_error_body("/health", "state lock poisoned while reading runs"),
            };
        }
    };
    let running_reports = guard.running_count();
    let status = match guard.last_finished().map(|record| record.status) {
        Some(RunStatus::Error) => HealthStatus::Degraded,
        _ => HealthStatus::Ok,
    };
    drop(guard);

    HealthResponse::Success(HealthSuccessResponse {
        status,
        running_reports,
        timestamp: now_timestamp(),
    })
}

pub enum TriggerResponse {
    Success(TriggerSuccessResponse),
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl IntoResponse for TriggerResponse {
    fn into_response(self) -> Response {
        match self {
            TriggerResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            TriggerResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn trigger_report(State(runner): State<Arc<ReportRunner>>) -> impl IntoResponse {
    match runner.trigger().await {
        Ok(admission) => {
            let message = match &admission {
                Admission::Started(_) => "Report generation started",
                Admission::Coalesced(_) => "Report generation already in progress, reusing it",
            };
            let record = admission.record();
            TriggerResponse::Success(TriggerSuccessResponse {
                report_id: record.run_id.clone(),
                status: record.status,
                message: message.to_string(),
            })
        }
        Err(err) => TriggerResponse::Error {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: internal_error_body("/trigger_report", &err.to_string()),
        },
    }
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub report_id: String,
}

pub enum ReportResponse {
    Status(ReportStatusResponse),
    Csv { report_id: String, body: Vec<u8> },
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl IntoResponse for ReportResponse {
    fn into_response(self) -> Response {
        match self {
            ReportResponse::Status(body) => (StatusCode::OK, Json(body)).into_response(),
            ReportResponse::Csv { report_id, body } => (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"store_report_{report_id}.csv\""),
                    ),
                ],
                body,
            )
                .into_response(),
            ReportResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_report(
    State(runner): State<Arc<ReportRunner>>,
    Query(query): Query<ReportQuery>,
) -> impl IntoResponse {
    let record = match runner.state().read() {
        Ok(guard) => guard.run(&query.report_id).cloned(),
        Err(_) => {
            return ReportResponse::Error {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: internal_error_body("/get_report", "state lock poisoned while reading runs"),
            };
        }
    };

    match record {
        Some(record) => build_report_response(record).await,
        None => ReportResponse::Error {
            status: StatusCode::NOT_FOUND,
            body: error_body(ErrorCode::NotFound, "Report not found"),
        },
    }
}

async fn build_report_response(record: RunRecord) -> ReportResponse {
    match record.status {
        RunStatus::Running => status_response(record, "Report generation in progress"),
        RunStatus::Error => status_response(record, "Report generation failed"),
        RunStatus::Complete => {
            let Some(path) = record.artifact_path.clone() else {
                return status_response_with(record, RunStatus::Error, FILE_MISSING_MESSAGE);
            };
            match tokio::fs::read(&path).await {
                Ok(body) => ReportResponse::Csv {
                    report_id: record.run_id,
                    body,
                },
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    warn!(run_id = %record.run_id, path = %path.display(), "Report artifact missing");
                    status_response_with(record, RunStatus::Error, FILE_MISSING_MESSAGE)
                }
                Err(err) => ReportResponse::Error {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: internal_error_body(
                        "/get_report",
                        &format!("failed to read {}: {err}", path.display()),
                    ),
                },
            }
        }
    }
}

fn status_response(record: RunRecord, message: &str) -> ReportResponse {
    let status = record.status;
    status_response_with(record, status, message)
}

fn status_response_with(record: RunRecord, status: RunStatus, message: &str) -> ReportResponse {
    ReportResponse::Status(ReportStatusResponse {
        report_id: record.run_id,
        status,
        message: message.to_string(),
    })
}
