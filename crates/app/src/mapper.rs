use thiserror::Error;
use tracing::{debug, info};

use payroll_core::types::{Department, EmployeeDto, NewEmployee, Position};
use payroll_storage::{CatalogError, Database, EmployeeError};

use crate::problem::ProblemResponse;

/// Converts between wire DTOs and persisted employees, resolving references by name.
#[derive(Clone)]
pub struct EmployeeMapper {
    database: Database,
}

impl EmployeeMapper {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Builds an unsaved employee from a DTO.
    ///
    /// Both the position and the department must already exist; an absent or
    /// empty name never resolves.
    pub async fn to_entity(&self, dto: &EmployeeDto) -> Result<NewEmployee, MapperError> {
        info!(stage = "mapper", ?dto, "mapping employee");
        let position = self
            .resolve_position(dto.position_name().unwrap_or_default())
            .await?;
        let department = self
            .resolve_department(dto.department_name().unwrap_or_default())
            .await?;

        Ok(NewEmployee {
            name: dto.name.clone(),
            salary: dto.salary,
            position,
            department,
        })
    }

    /// Applies a DTO to an existing employee and returns the stored result.
    ///
    /// Name and salary are always overwritten. Position and department change
    /// only when the DTO carries a non-empty name for them.
    pub async fn edit(&self, id: i64, dto: &EmployeeDto) -> Result<EmployeeDto, MapperError> {
        info!(stage = "mapper", employee_id = id, ?dto, "editing employee");
        let repo = self.database.employees();
        let mut employee = repo.find_by_id(id).await.map_err(MapperError::from)?;

        employee.name = dto.name.clone();
        employee.salary = dto.salary;
        if let Some(name) = dto.position_name() {
            employee.position = self.resolve_position(name).await?;
        }
        if let Some(name) = dto.department_name() {
            employee.department = self.resolve_department(name).await?;
        }

        let updated = repo.update(&employee).await.map_err(MapperError::from)?;
        debug!(stage = "mapper", employee_id = id, "employee updated");
        Ok(updated.to_dto())
    }

    async fn resolve_position(&self, name: &str) -> Result<Position, MapperError> {
        let position = self
            .database
            .positions()
            .find_by_name(name)
            .await
            .map_err(|err| match err {
                CatalogError::NotFound(name) => MapperError::PositionNotFound(name),
                other => MapperError::Catalog(other),
            })?;
        debug!(stage = "mapper", position_id = position.id, name = %position.name, "position resolved");
        Ok(position)
    }

    async fn resolve_department(&self, name: &str) -> Result<Department, MapperError> {
        let department = self
            .database
            .departments()
            .find_by_name(name)
            .await
            .map_err(|err| match err {
                CatalogError::NotFound(name) => MapperError::DepartmentNotFound(name),
                other => MapperError::Catalog(other),
            })?;
        debug!(stage = "mapper", department_id = department.id, name = %department.name, "department resolved");
        Ok(department)
    }
}

/// Errors raised while mapping DTOs onto stored employees.
#[derive(Debug, Error)]
pub enum MapperError {
    #[error("employee not found")]
    EmployeeNotFound,
    #[error("position '{0}' not found")]
    PositionNotFound(String),
    #[error("department '{0}' not found")]
    DepartmentNotFound(String),
    #[error("failed to access employees: {0}")]
    Employee(EmployeeError),
    #[error("failed to access catalog: {0}")]
    Catalog(CatalogError),
}

impl From<EmployeeError> for MapperError {
    fn from(err: EmployeeError) -> Self {
        match err {
            EmployeeError::NotFound => Self::EmployeeNotFound,
            other => Self::Employee(other),
        }
    }
}

impl From<MapperError> for ProblemResponse {
    fn from(err: MapperError) -> Self {
        match err {
            MapperError::EmployeeNotFound => {
                ProblemResponse::not_found("employee_not_found", err.to_string())
            }
            MapperError::PositionNotFound(_) => {
                ProblemResponse::not_found("position_not_found", err.to_string())
            }
            MapperError::DepartmentNotFound(_) => {
                ProblemResponse::not_found("department_not_found", err.to_string())
            }
            MapperError::Employee(inner) => inner.into(),
            MapperError::Catalog(inner) => inner.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payroll_core::types::Employee;

    struct Fixture {
        database: Database,
        mapper: EmployeeMapper,
        employee: Employee,
    }

    async fn setup() -> Fixture {
        let database = Database::connect("sqlite::memory:").await.expect("connect");
        database.run_migrations().await.expect("migrations");
        let manager = database.positions().insert("Manager").await.expect("position");
        database.positions().insert("Boss").await.expect("position");
        let sales = database.departments().insert("Sales").await.expect("department");
        database.departments().insert("Finance").await.expect("department");

        let employee = database
            .employees()
            .insert(&NewEmployee {
                name: "Vladimir".to_string(),
                salary: 4000,
                position: manager,
                department: sales,
            })
            .await
            .expect("employee");

        Fixture {
            mapper: EmployeeMapper::new(database.clone()),
            database,
            employee,
        }
    }

    #[tokio::test]
    async fn to_entity_of_to_dto_preserves_identity() {
        let fx = setup().await;

        let entity = fx
            .mapper
            .to_entity(&fx.employee.to_dto())
            .await
            .expect("to_entity");

        assert_eq!(entity.name, fx.employee.name);
        assert_eq!(entity.salary, fx.employee.salary);
        assert_eq!(entity.position, fx.employee.position);
        assert_eq!(entity.department, fx.employee.department);
    }

    #[tokio::test]
    async fn to_entity_fails_for_unknown_position() {
        let fx = setup().await;
        let dto = EmployeeDto::new("Anna", 5000, "Developer", "Sales");

        let err = fx.mapper.to_entity(&dto).await.unwrap_err();
        assert!(matches!(err, MapperError::PositionNotFound(name) if name == "Developer"));
    }

    #[tokio::test]
    async fn to_entity_fails_for_unknown_department() {
        let fx = setup().await;
        let dto = EmployeeDto::new("Anna", 5000, "Manager", "Legal");

        let err = fx.mapper.to_entity(&dto).await.unwrap_err();
        assert!(matches!(err, MapperError::DepartmentNotFound(name) if name == "Legal"));
    }

    #[tokio::test]
    async fn to_entity_requires_reference_names() {
        let fx = setup().await;
        let dto = EmployeeDto {
            name: "Anna".to_string(),
            salary: 5000,
            position_name: None,
            department_name: Some("Sales".to_string()),
        };

        let err = fx.mapper.to_entity(&dto).await.unwrap_err();
        assert!(matches!(err, MapperError::PositionNotFound(_)));
    }

    #[tokio::test]
    async fn edit_overwrites_everything_when_names_given() {
        let fx = setup().await;
        let dto = EmployeeDto::new("Andrey", 2000, "Boss", "Finance");

        let edited = fx.mapper.edit(fx.employee.id, &dto).await.expect("edit");
        assert_eq!(edited, dto);

        let stored = fx
            .database
            .employees()
            .find_by_id(fx.employee.id)
            .await
            .expect("find");
        assert_eq!(stored.to_dto(), dto);
    }

    #[tokio::test]
    async fn edit_with_empty_names_keeps_references() {
        let fx = setup().await;
        let dto = EmployeeDto {
            name: "Andrey".to_string(),
            salary: 2000,
            position_name: Some(String::new()),
            department_name: None,
        };

        let edited = fx.mapper.edit(fx.employee.id, &dto).await.expect("edit");
        assert_eq!(edited.name, "Andrey");
        assert_eq!(edited.salary, 2000);
        assert_eq!(edited.position_name.as_deref(), Some("Manager"));
        assert_eq!(edited.department_name.as_deref(), Some("Sales"));

        let stored = fx
            .database
            .employees()
            .find_by_id(fx.employee.id)
            .await
            .expect("find");
        assert_eq!(stored.position, fx.employee.position);
        assert_eq!(stored.department, fx.employee.department);
    }

    #[tokio::test]
    async fn edit_of_missing_employee_writes_nothing() {
        let fx = setup().await;
        let dto = EmployeeDto::new("Andrey", 2000, "Manager", "Sales");

        let err = fx.mapper.edit(999, &dto).await.unwrap_err();
        assert!(matches!(err, MapperError::EmployeeNotFound));

        let stored = fx
            .database
            .employees()
            .find_by_id(fx.employee.id)
            .await
            .expect("find");
        assert_eq!(stored, fx.employee);
    }

    #[tokio::test]
    async fn edit_with_unknown_position_leaves_employee_untouched() {
        let fx = setup().await;
        let dto = EmployeeDto::new("Andrey", 2000, "Astronaut", "");

        let err = fx.mapper.edit(fx.employee.id, &dto).await.unwrap_err();
        assert!(matches!(err, MapperError::PositionNotFound(_)));

        let stored = fx
            .database
            .employees()
            .find_by_id(fx.employee.id)
            .await
            .expect("find");
        assert_eq!(stored, fx.employee);
    }
}
