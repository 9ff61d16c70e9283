use chrono::{DateTime, Utc};
use payroll_core::types::{NewReport, Report};
use sqlx::{Row, SqlitePool};
use thiserror::Error;

use crate::to_rfc3339;

/// Repository for generated reports. Reports are immutable once stored.
#[derive(Clone)]
pub struct ReportRepository {
    pool: SqlitePool,
}

impl ReportRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Stores a report and returns its identifier.
    pub async fn insert(&self, report: &NewReport) -> Result<i64, ReportStoreError> {
        let row = sqlx::query(
            "INSERT INTO reports (file_name, content, created_at) \
             VALUES (?, ?, ?) \
             RETURNING id",
        )
        .bind(&report.file_name)
        .bind(&report.content)
        .bind(to_rfc3339(report.created_at))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Report, ReportStoreError> {
        let row = sqlx::query_as::<_, ReportRecord>(
            "SELECT id, file_name, content, created_at FROM reports WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ReportStoreError::NotFound)?;

        Ok(Report {
            id: row.id,
            file_name: row.file_name,
            content: row.content,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReportRecord {
    id: i64,
    file_name: String,
    content: String,
    created_at: DateTime<Utc>,
}

/// Errors that can occur while storing or loading reports.
#[derive(Debug, Error)]
pub enum ReportStoreError {
    #[error("report not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
