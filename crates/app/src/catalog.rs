use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use tracing::{debug, info};

use payroll_core::types::{DepartmentDto, PositionDto};

use crate::problem::ProblemResponse;
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub struct NewCatalogEntry {
    name: String,
}

impl NewCatalogEntry {
    fn validated_name(&self) -> Result<&str, ProblemResponse> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ProblemResponse::bad_request(
                "invalid_name",
                "name must not be empty",
            ));
        }
        Ok(name)
    }
}

pub async fn list_positions(
    State(state): State<AppState>,
) -> Result<Json<Vec<PositionDto>>, ProblemResponse> {
    info!(stage = "catalog", "listing positions");
    let positions = state.storage().positions().list_all().await?;
    debug!(stage = "catalog", count = positions.len(), "positions loaded");
    Ok(Json(
        positions
            .into_iter()
            .map(|position| PositionDto {
                position_name: position.name,
            })
            .collect(),
    ))
}

pub async fn create_position(
    State(state): State<AppState>,
    Json(entry): Json<NewCatalogEntry>,
) -> Result<(StatusCode, Json<PositionDto>), ProblemResponse> {
    let name = entry.validated_name()?;
    info!(stage = "catalog", %name, "creating position");
    let position = state.storage().positions().insert(name).await?;
    debug!(stage = "catalog", position_id = position.id, "position stored");
    Ok((
        StatusCode::CREATED,
        Json(PositionDto {
            position_name: position.name,
        }),
    ))
}

pub async fn list_departments(
    State(state): State<AppState>,
) -> Result<Json<Vec<DepartmentDto>>, ProblemResponse> {
    info!(stage = "catalog", "listing departments");
    let departments = state.storage().departments().list_all().await?;
    debug!(stage = "catalog", count = departments.len(), "departments loaded");
    Ok(Json(
        departments
            .into_iter()
            .map(|department| DepartmentDto {
                department_name: department.name,
            })
            .collect(),
    ))
}

pub async fn create_department(
    State(state): State<AppState>,
    Json(entry): Json<NewCatalogEntry>,
) -> Result<(StatusCode, Json<DepartmentDto>), ProblemResponse> {
    let name = entry.validated_name()?;
    info!(stage = "catalog", %name, "creating department");
    let department = state.storage().departments().insert(name).await?;
    debug!(stage = "catalog", department_id = department.id, "department stored");
    Ok((
        StatusCode::CREATED,
        Json(DepartmentDto {
            department_name: department.name,
        }),
    ))
}
