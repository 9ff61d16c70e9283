use payroll_core::types::{Department, Position};
use sqlx::{Row, SqlitePool};
use thiserror::Error;

use crate::{is_constraint, SQLITE_CONSTRAINT_UNIQUE};

/// Repository for the position catalog. Positions are looked up by their unique name.
#[derive(Clone)]
pub struct PositionRepository {
    pool: SqlitePool,
}

impl PositionRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, name: &str) -> Result<Position, CatalogError> {
        let id = insert_named(&self.pool, "positions", name).await?;
        Ok(Position {
            id,
            name: name.to_string(),
        })
    }

    /// Resolves a position by name, failing with [`CatalogError::NotFound`] when absent.
    pub async fn find_by_name(&self, name: &str) -> Result<Position, CatalogError> {
        let (id, name) = find_named(&self.pool, "positions", name).await?;
        Ok(Position { id, name })
    }

    pub async fn list_all(&self) -> Result<Vec<Position>, CatalogError> {
        let rows = list_named(&self.pool, "positions").await?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| Position { id, name })
            .collect())
    }
}

/// Repository for the department catalog. Departments are looked up by their unique name.
#[derive(Clone)]
pub struct DepartmentRepository {
    pool: SqlitePool,
}

impl DepartmentRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, name: &str) -> Result<Department, CatalogError> {
        let id = insert_named(&self.pool, "departments", name).await?;
        Ok(Department {
            id,
            name: name.to_string(),
        })
    }

    /// Resolves a department by name, failing with [`CatalogError::NotFound`] when absent.
    pub async fn find_by_name(&self, name: &str) -> Result<Department, CatalogError> {
        let (id, name) = find_named(&self.pool, "departments", name).await?;
        Ok(Department { id, name })
    }

    pub async fn list_all(&self) -> Result<Vec<Department>, CatalogError> {
        let rows = list_named(&self.pool, "departments").await?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| Department { id, name })
            .collect())
    }
}

// `table` is always one of the static catalog table names above.
async fn insert_named(
    pool: &SqlitePool,
    table: &'static str,
    name: &str,
) -> Result<i64, CatalogError> {
    let sql = format!("INSERT INTO {table} (name) VALUES (?) RETURNING id");
    let row = sqlx::query(&sql)
        .bind(name)
        .fetch_one(pool)
        .await
        .map_err(|err| {
            if is_constraint(&err, SQLITE_CONSTRAINT_UNIQUE) {
                CatalogError::Duplicate(name.to_string())
            } else {
                CatalogError::Database(err)
            }
        })?;
    Ok(row.get("id"))
}

async fn find_named(
    pool: &SqlitePool,
    table: &'static str,
    name: &str,
) -> Result<(i64, String), CatalogError> {
    let sql = format!("SELECT id, name FROM {table} WHERE name = ?");
    sqlx::query_as::<_, (i64, String)>(&sql)
        .bind(name)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CatalogError::NotFound(name.to_string()))
}

async fn list_named(
    pool: &SqlitePool,
    table: &'static str,
) -> Result<Vec<(i64, String)>, CatalogError> {
    let sql = format!("SELECT id, name FROM {table} ORDER BY id");
    let rows = sqlx::query_as::<_, (i64, String)>(&sql)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Errors raised by the position and department catalogs.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("no entry named '{0}'")]
    NotFound(String),
    #[error("an entry named '{0}' already exists")]
    Duplicate(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
