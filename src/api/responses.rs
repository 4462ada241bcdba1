use crate::state::RunStatus;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct BannerResponse {
    pub message: String,
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthSuccessResponse {
    pub status: HealthStatus,
    pub running_reports: usize,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct TriggerSuccessResponse {
    pub report_id: String,
    pub status: RunStatus,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ReportStatusResponse {
    pub report_id: String,
    pub status: RunStatus,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ErrorResponse {
    pub error_code: ErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    InternalError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn health_response_serializes_lowercase_status() {
        let response = HealthSuccessResponse {
            status: HealthStatus::Degraded,
            running_reports: 2,
            timestamp: "2026-01-11T12:33:00Z".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize health response");
        assert_eq!(
            value,
            json!({
                "status": "degraded",
                "running_reports": 2,
                "timestamp": "2026-01-11T12:33:00Z"
            })
        );
    }

    #[test]
    fn report_status_uses_run_status_names() {
        let response = ReportStatusResponse {
            report_id: "abc".to_string(),
            status: RunStatus::Running,
            message: "Report generation in progress".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize report status");
        assert_eq!(
            value,
            json!({
                "report_id": "abc",
                "status": "Running",
                "message": "Report generation in progress"
            })
        );
    }

    #[test]
    fn error_response_uses_screaming_snake_case_code() {
        let response = ErrorResponse {
            error_code: ErrorCode::NotFound,
            error_message: "Report not found".to_string(),
            timestamp: "2026-01-11T12:34:00Z".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize error response");
        assert_eq!(
            value,
            json!({
                "error_code": "NOT_FOUND",
                "error_message": "Report not found",
                "timestamp": "2026-01-11T12:34:00Z"
            })
        );
    }
}
