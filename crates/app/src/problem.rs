use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use payroll_storage::{CatalogError, EmployeeError, ReportStoreError};

#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    detail: String,
}

#[derive(Debug)]
pub struct ProblemResponse {
    status: StatusCode,
    body: ProblemDetails,
}

impl ProblemResponse {
    pub fn new<S: Into<String>>(status: StatusCode, problem_type: &'static str, detail: S) -> Self {
        Self {
            status,
            body: ProblemDetails {
                problem_type,
                title: status.canonical_reason().unwrap_or("error"),
                detail: detail.into(),
            },
        }
    }

    pub fn not_found<S: Into<String>>(problem_type: &'static str, detail: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, problem_type, detail)
    }

    pub fn bad_request<S: Into<String>>(problem_type: &'static str, detail: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, problem_type, detail)
    }

    /// Logs the underlying failure and hides its details from the client.
    pub fn internal(problem_type: &'static str, err: &dyn std::error::Error) -> Self {
        error!(stage = "http", problem = problem_type, error = %err, "request failed");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            problem_type,
            "internal error, see server logs",
        )
    }

    #[cfg(test)]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ProblemResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

impl From<EmployeeError> for ProblemResponse {
    fn from(err: EmployeeError) -> Self {
        match err {
            EmployeeError::NotFound => Self::not_found("employee_not_found", err.to_string()),
            EmployeeError::MissingReference => {
                Self::not_found("reference_not_found", err.to_string())
            }
            EmployeeError::Database(_) => Self::internal("database_error", &err),
        }
    }
}

impl From<CatalogError> for ProblemResponse {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(_) => {
                Self::not_found("catalog_entry_not_found", err.to_string())
            }
            CatalogError::Duplicate(_) => {
                Self::new(StatusCode::CONFLICT, "catalog_entry_exists", err.to_string())
            }
            CatalogError::Database(_) => Self::internal("database_error", &err),
        }
    }
}

impl From<ReportStoreError> for ProblemResponse {
    fn from(err: ReportStoreError) -> Self {
        match err {
            ReportStoreError::NotFound => Self::not_found("report_not_found", err.to_string()),
            ReportStoreError::Database(_) => Self::internal("database_error", &err),
        }
    }
}
