use std::{
    path::{Path as FsPath, PathBuf},
    sync::Arc,
};

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Local, Utc};
use metrics::counter;
use thiserror::Error;
use tracing::{debug, error, info};

use payroll_core::report::{render_report, report_file_name};
use payroll_core::types::NewReport;
use payroll_storage::{Database, EmployeeError, ReportStoreError};

use crate::problem::ProblemResponse;
use crate::router::AppState;

/// Aggregates per-department salary statistics and stores them as a report.
#[derive(Clone)]
pub struct ReportBuilder {
    database: Database,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl ReportBuilder {
    pub fn new(database: Database, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        Self { database, clock }
    }

    /// Generates a department report and returns the identifier of the stored record.
    ///
    /// The JSON document is rendered in memory and stored as the report content;
    /// the file artifact is produced later by [`ReportExporter::write_to_disk`].
    /// `created_at` is stored in UTC while the file name uses the server's local time.
    pub async fn generate(&self) -> Result<i64, ReportServiceError> {
        info!(stage = "report", "generating department report");
        let rows = self.database.employees().department_report().await?;
        debug!(stage = "report", departments = rows.len(), "department aggregates loaded");

        let content = render_report(&rows)?;
        let created_at = (self.clock)();
        let file_name = report_file_name(created_at.with_timezone(&Local));

        let id = self
            .database
            .reports()
            .insert(&NewReport {
                file_name: file_name.clone(),
                content,
                created_at,
            })
            .await?;

        counter!("reports_generated_total").increment(1);
        info!(stage = "report", report_id = id, %file_name, "report stored");
        Ok(id)
    }
}

/// Reads stored reports back out, either onto disk or as a download payload.
#[derive(Clone)]
pub struct ReportExporter {
    database: Database,
    report_dir: Arc<PathBuf>,
}

impl ReportExporter {
    pub fn new(database: Database, report_dir: Arc<PathBuf>) -> Self {
        Self {
            database,
            report_dir,
        }
    }

    /// Writes the report content to `<report_dir>/<file_name>` and returns the path.
    ///
    /// An existing file with the same name is overwritten.
    pub async fn write_to_disk(&self, id: i64) -> Result<PathBuf, ReportServiceError> {
        info!(stage = "report", report_id = id, "writing report file");
        let report = self.database.reports().find_by_id(id).await?;
        debug!(stage = "report", report_id = id, file_name = %report.file_name, "report loaded");

        let path = self.report_path(&report.file_name)?;
        let result: std::io::Result<()> = async {
            tokio::fs::create_dir_all(self.report_dir.as_path()).await?;
            tokio::fs::write(&path, report.content.as_bytes()).await
        }
        .await;

        if let Err(source) = result {
            error!(stage = "report", report_id = id, path = %path.display(), error = %source, "failed to write report file");
            counter!("report_exports_total", "kind" => "file", "result" => "error").increment(1);
            return Err(ReportServiceError::Io { path, source });
        }

        counter!("report_exports_total", "kind" => "file", "result" => "ok").increment(1);
        info!(stage = "report", report_id = id, path = %path.display(), "report file written");
        Ok(path)
    }

    /// Loads a report as a downloadable payload, or `None` when the id is unknown.
    pub async fn download(&self, id: i64) -> Result<Option<ReportDownload>, ReportServiceError> {
        info!(stage = "report", report_id = id, "loading report for download");
        match self.database.reports().find_by_id(id).await {
            Ok(report) => {
                debug!(stage = "report", report_id = id, file_name = %report.file_name, "report loaded");
                counter!("report_exports_total", "kind" => "download", "result" => "ok")
                    .increment(1);
                Ok(Some(ReportDownload {
                    file_name: report.file_name,
                    body: report.content.into_bytes(),
                }))
            }
            Err(ReportStoreError::NotFound) => {
                counter!("report_exports_total", "kind" => "download", "result" => "not_found")
                    .increment(1);
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn report_path(&self, file_name: &str) -> Result<PathBuf, ReportServiceError> {
        // Only the final component is used so a stored name cannot escape the report directory.
        let base = FsPath::new(file_name)
            .file_name()
            .ok_or_else(|| ReportServiceError::InvalidFileName(file_name.to_string()))?;
        Ok(self.report_dir.join(base))
    }
}

/// Report content ready to be sent as an attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDownload {
    pub file_name: String,
    pub body: Vec<u8>,
}

impl ReportDownload {
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename={}", self.file_name)
    }
}

impl IntoResponse for ReportDownload {
    fn into_response(self) -> Response {
        let disposition = match HeaderValue::from_str(&self.content_disposition()) {
            Ok(value) => value,
            Err(_) => {
                return ProblemResponse::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "invalid_file_name",
                    "stored report file name cannot be used as a header value",
                )
                .into_response()
            }
        };

        let length = self.body.len();
        let mut response = Response::new(Body::from(self.body));
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_DISPOSITION, disposition);
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        response
    }
}

/// Errors raised by report generation and export.
#[derive(Debug, Error)]
pub enum ReportServiceError {
    #[error("report not found")]
    NotFound,
    #[error("report file name '{0}' is not usable")]
    InvalidFileName(String),
    #[error("failed to render report: {0}")]
    Render(#[from] serde_json::Error),
    #[error("failed to write report file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to aggregate employees: {0}")]
    Employee(#[from] EmployeeError),
    #[error("failed to access reports: {0}")]
    Store(ReportStoreError),
}

impl From<ReportStoreError> for ReportServiceError {
    fn from(err: ReportStoreError) -> Self {
        match err {
            ReportStoreError::NotFound => Self::NotFound,
            other => Self::Store(other),
        }
    }
}

impl From<ReportServiceError> for ProblemResponse {
    fn from(err: ReportServiceError) -> Self {
        match err {
            ReportServiceError::NotFound => {
                ProblemResponse::not_found("report_not_found", err.to_string())
            }
            ReportServiceError::InvalidFileName(_) => {
                ProblemResponse::internal("invalid_file_name", &err)
            }
            ReportServiceError::Render(_) => {
                ProblemResponse::internal("report_render_failed", &err)
            }
            ReportServiceError::Io { .. } => ProblemResponse::internal("report_io_failed", &err),
            ReportServiceError::Employee(inner) => inner.into(),
            ReportServiceError::Store(inner) => inner.into(),
        }
    }
}

pub async fn generate(State(state): State<AppState>) -> Result<String, ProblemResponse> {
    let id = state.report_builder().generate().await?;
    Ok(format!("saved report id: {id}"))
}

pub async fn download(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ProblemResponse> {
    match state.report_exporter().download(id).await? {
        Some(download) => Ok(download.into_response()),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

pub async fn write_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<String, ProblemResponse> {
    let path = state.report_exporter().write_to_disk(id).await?;
    Ok(format!("report written to {}", path.display()))
}
