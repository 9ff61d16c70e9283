use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use metrics::counter;
use serde::Deserialize;
use tracing::{debug, info};

use payroll_core::types::{Employee, EmployeeDto, EmployeePage};

use crate::problem::ProblemResponse;
use crate::router::AppState;

pub const PAGE_SIZE: u32 = 5;
pub const ACK: &str = "command completed successfully";
const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Deserialize)]
pub struct PositionQuery {
    #[serde(default)]
    position: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SalaryQuery {
    #[serde(rename = "compareSalary")]
    compare_salary: i64,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    page: u32,
}

fn to_dtos(employees: Vec<Employee>) -> Json<Vec<EmployeeDto>> {
    Json(employees.iter().map(Employee::to_dto).collect())
}

pub async fn list_all(
    State(state): State<AppState>,
) -> Result<Json<Vec<EmployeeDto>>, ProblemResponse> {
    info!(stage = "employees", "listing all employees");
    let employees = state.storage().employees().list_all().await?;
    debug!(stage = "employees", count = employees.len(), "employees loaded");
    Ok(to_dtos(employees))
}

/// Lists employees holding the given position, or everyone when no position is given.
pub async fn by_position(
    State(state): State<AppState>,
    Query(query): Query<PositionQuery>,
) -> Result<Json<Vec<EmployeeDto>>, ProblemResponse> {
    info!(stage = "employees", position = ?query.position, "listing employees by position");
    let repo = state.storage().employees();
    let employees = match query.position.as_deref() {
        Some(position) => repo.list_by_position_name(position).await?,
        None => repo.list_all().await?,
    };
    debug!(stage = "employees", count = employees.len(), "employees loaded");
    Ok(to_dtos(employees))
}

pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<EmployeeDto>, ProblemResponse> {
    info!(stage = "employees", employee_id = id, "loading employee");
    let employee = state.storage().employees().find_by_id(id).await?;
    debug!(stage = "employees", employee_id = id, "employee loaded");
    Ok(Json(employee.to_dto()))
}

/// Same payload as [`get_by_id`]; position and department are always resolved.
pub async fn full_info(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<EmployeeDto>, ProblemResponse> {
    info!(stage = "employees", employee_id = id, "loading employee full info");
    let employee = state.storage().employees().find_by_id(id).await?;
    debug!(
        stage = "employees",
        employee_id = id,
        position = %employee.position.name,
        department = %employee.department.name,
        "employee loaded with references"
    );
    Ok(Json(employee.to_dto()))
}

pub async fn create(
    State(state): State<AppState>,
    Json(dtos): Json<Vec<EmployeeDto>>,
) -> Result<&'static str, ProblemResponse> {
    add_employees(&state, dtos).await?;
    Ok(ACK)
}

pub async fn edit(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(dto): Json<EmployeeDto>,
) -> Result<Json<EmployeeDto>, ProblemResponse> {
    let updated = state.mapper().edit(id, &dto).await?;
    counter!("employees_written_total", "op" => "update").increment(1);
    Ok(Json(updated))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<&'static str, ProblemResponse> {
    info!(stage = "employees", employee_id = id, "deleting employee");
    state.storage().employees().delete(id).await?;
    counter!("employees_written_total", "op" => "delete").increment(1);
    debug!(stage = "employees", employee_id = id, "employee deleted");
    Ok(ACK)
}

pub async fn salary_higher_than(
    State(state): State<AppState>,
    Query(query): Query<SalaryQuery>,
) -> Result<Json<Vec<EmployeeDto>>, ProblemResponse> {
    info!(stage = "employees", threshold = query.compare_salary, "listing employees above salary");
    let employees = state
        .storage()
        .employees()
        .list_with_salary_greater_than(query.compare_salary)
        .await?;
    debug!(stage = "employees", count = employees.len(), "employees loaded");
    Ok(to_dtos(employees))
}

pub async fn highest_salary(
    State(state): State<AppState>,
) -> Result<Json<Vec<EmployeeDto>>, ProblemResponse> {
    info!(stage = "employees", "listing employees with the highest salary");
    let employees = state.storage().employees().list_with_highest_salary().await?;
    debug!(stage = "employees", count = employees.len(), "employees loaded");
    Ok(to_dtos(employees))
}

pub async fn page(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<EmployeePage>, ProblemResponse> {
    info!(stage = "employees", page = query.page, "loading employee page");
    let repo = state.storage().employees();
    let employees = repo.list_page(query.page, PAGE_SIZE).await?;
    let total = repo.count().await?;
    debug!(stage = "employees", count = employees.len(), total, "employee page loaded");

    let content = employees.iter().map(Employee::to_dto).collect();
    Ok(Json(EmployeePage::new(content, query.page, PAGE_SIZE, total)))
}

/// Accepts a multipart `file` field holding a JSON array of employees and stores them.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<&'static str, ProblemResponse> {
    let mut payload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ProblemResponse::bad_request("invalid_multipart", err.to_string()))?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|err| ProblemResponse::bad_request("invalid_multipart", err.to_string()))?;
            payload = Some(bytes);
            break;
        }
    }

    let bytes = payload.ok_or_else(|| {
        ProblemResponse::bad_request("missing_file", "multipart field 'file' is required")
    })?;
    info!(stage = "employees", bytes = bytes.len(), "loading employees from uploaded file");
    let dtos = parse_employee_file(&bytes)?;
    add_employees(&state, dtos).await?;
    Ok(ACK)
}

fn parse_employee_file(bytes: &[u8]) -> Result<Vec<EmployeeDto>, ProblemResponse> {
    serde_json::from_slice(bytes).map_err(|err| {
        ProblemResponse::bad_request("invalid_json", format!("failed to parse employees: {err}"))
    })
}

/// Resolves every DTO before writing anything, then stores the batch.
async fn add_employees(state: &AppState, dtos: Vec<EmployeeDto>) -> Result<(), ProblemResponse> {
    info!(stage = "employees", count = dtos.len(), "adding employees");
    let mapper = state.mapper();
    let mut employees = Vec::with_capacity(dtos.len());
    for dto in &dtos {
        employees.push(mapper.to_entity(dto).await?);
    }

    let inserted = state.storage().employees().insert_all(&employees).await?;
    counter!("employees_written_total", "op" => "create").increment(inserted.len() as u64);
    debug!(stage = "employees", count = inserted.len(), "employees stored");
    Ok(())
}
