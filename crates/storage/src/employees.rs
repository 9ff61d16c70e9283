use payroll_core::types::{Department, Employee, NewEmployee, Position, ReportRow};
use sqlx::{Row, SqliteExecutor, SqlitePool};
use thiserror::Error;

use crate::{is_constraint, SQLITE_CONSTRAINT_FOREIGNKEY};

const SELECT_EMPLOYEE: &str = r#"
SELECT e.id,
       e.name,
       e.salary,
       p.id AS position_id,
       p.name AS position_name,
       d.id AS department_id,
       d.name AS department_name
  FROM employees AS e
  JOIN positions AS p ON p.id = e.position_id
  JOIN departments AS d ON d.id = e.department_id
"#;

/// Repository for employees and the queries derived from them.
#[derive(Clone)]
pub struct EmployeeRepository {
    pool: SqlitePool,
}

impl EmployeeRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a single employee and returns it with its assigned identifier.
    pub async fn insert(&self, employee: &NewEmployee) -> Result<Employee, EmployeeError> {
        insert_with(&self.pool, employee).await
    }

    /// Inserts every employee inside one transaction.
    pub async fn insert_all(
        &self,
        employees: &[NewEmployee],
    ) -> Result<Vec<Employee>, EmployeeError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(employees.len());
        for employee in employees {
            inserted.push(insert_with(&mut *tx, employee).await?);
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Overwrites every mutable column of an existing employee.
    pub async fn update(&self, employee: &Employee) -> Result<Employee, EmployeeError> {
        let result = sqlx::query(
            "UPDATE employees \
             SET name = ?, salary = ?, position_id = ?, department_id = ? \
             WHERE id = ?",
        )
        .bind(&employee.name)
        .bind(i64::from(employee.salary))
        .bind(employee.position.id)
        .bind(employee.department.id)
        .bind(employee.id)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        if result.rows_affected() == 0 {
            return Err(EmployeeError::NotFound);
        }
        Ok(employee.clone())
    }

    /// Deletes the employee with the given identifier.
    pub async fn delete(&self, id: i64) -> Result<(), EmployeeError> {
        let result = sqlx::query("DELETE FROM employees WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EmployeeError::NotFound);
        }
        Ok(())
    }

    /// Loads a single employee with its position and department.
    pub async fn find_by_id(&self, id: i64) -> Result<Employee, EmployeeError> {
        let sql = format!("{SELECT_EMPLOYEE} WHERE e.id = ?");
        let row = sqlx::query_as::<_, EmployeeRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(EmployeeError::NotFound)?;
        Ok(row.into_domain())
    }

    pub async fn list_all(&self) -> Result<Vec<Employee>, EmployeeError> {
        let sql = format!("{SELECT_EMPLOYEE} ORDER BY e.id");
        let rows = sqlx::query_as::<_, EmployeeRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(into_domain(rows))
    }

    pub async fn list_by_position_name(
        &self,
        position_name: &str,
    ) -> Result<Vec<Employee>, EmployeeError> {
        let sql = format!("{SELECT_EMPLOYEE} WHERE p.name = ? ORDER BY e.id");
        let rows = sqlx::query_as::<_, EmployeeRow>(&sql)
            .bind(position_name)
            .fetch_all(&self.pool)
            .await?;
        Ok(into_domain(rows))
    }

    /// Lists employees earning strictly more than `threshold`.
    pub async fn list_with_salary_greater_than(
        &self,
        threshold: i64,
    ) -> Result<Vec<Employee>, EmployeeError> {
        let sql = format!("{SELECT_EMPLOYEE} WHERE e.salary > ? ORDER BY e.id");
        let rows = sqlx::query_as::<_, EmployeeRow>(&sql)
            .bind(threshold)
            .fetch_all(&self.pool)
            .await?;
        Ok(into_domain(rows))
    }

    /// Lists every employee whose salary equals the company-wide maximum.
    pub async fn list_with_highest_salary(&self) -> Result<Vec<Employee>, EmployeeError> {
        let sql = format!(
            "{SELECT_EMPLOYEE} WHERE e.salary = (SELECT MAX(salary) FROM employees) ORDER BY e.id"
        );
        let rows = sqlx::query_as::<_, EmployeeRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(into_domain(rows))
    }

    /// Returns the zero-based `page` of employees ordered by identifier.
    pub async fn list_page(&self, page: u32, size: u32) -> Result<Vec<Employee>, EmployeeError> {
        let sql = format!("{SELECT_EMPLOYEE} ORDER BY e.id LIMIT ? OFFSET ?");
        let offset = i64::from(page) * i64::from(size);
        let rows = sqlx::query_as::<_, EmployeeRow>(&sql)
            .bind(i64::from(size))
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(into_domain(rows))
    }

    pub async fn count(&self) -> Result<u64, EmployeeError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM employees")
            .fetch_one(&self.pool)
            .await?;
        let total: i64 = row.get("total");
        Ok(total as u64)
    }

    /// Aggregates salary statistics per department that has at least one employee.
    pub async fn department_report(&self) -> Result<Vec<ReportRow>, EmployeeError> {
        let rows = sqlx::query_as::<_, DepartmentReportRow>(
            r#"
SELECT d.name AS department_name,
       COUNT(e.id) AS employee_count,
       MAX(e.salary) AS max_salary,
       MIN(e.salary) AS min_salary,
       AVG(e.salary) AS average_salary
  FROM employees AS e
  JOIN departments AS d ON d.id = e.department_id
 GROUP BY d.id, d.name
 ORDER BY d.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(DepartmentReportRow::into_domain).collect())
    }
}

async fn insert_with<'e, E>(
    executor: E,
    employee: &NewEmployee,
) -> Result<Employee, EmployeeError>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(
        "INSERT INTO employees (name, salary, position_id, department_id) \
         VALUES (?, ?, ?, ?) \
         RETURNING id",
    )
    .bind(&employee.name)
    .bind(i64::from(employee.salary))
    .bind(employee.position.id)
    .bind(employee.department.id)
    .fetch_one(executor)
    .await
    .map_err(map_write_error)?;

    Ok(Employee {
        id: row.get("id"),
        name: employee.name.clone(),
        salary: employee.salary,
        position: employee.position.clone(),
        department: employee.department.clone(),
    })
}

fn map_write_error(err: sqlx::Error) -> EmployeeError {
    if is_constraint(&err, SQLITE_CONSTRAINT_FOREIGNKEY) {
        EmployeeError::MissingReference
    } else {
        EmployeeError::Database(err)
    }
}

fn into_domain(rows: Vec<EmployeeRow>) -> Vec<Employee> {
    rows.into_iter().map(EmployeeRow::into_domain).collect()
}

/// Errors that can occur while reading or writing employees.
#[derive(Debug, Error)]
pub enum EmployeeError {
    #[error("employee not found")]
    NotFound,
    #[error("employee references a position or department that does not exist")]
    MissingReference,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Employee joined with its position and department.
#[derive(Debug, sqlx::FromRow)]
struct EmployeeRow {
    id: i64,
    name: String,
    salary: i64,
    position_id: i64,
    position_name: String,
    department_id: i64,
    department_name: String,
}

impl EmployeeRow {
    fn into_domain(self) -> Employee {
        Employee {
            id: self.id,
            name: self.name,
            salary: self.salary as u32,
            position: Position {
                id: self.position_id,
                name: self.position_name,
            },
            department: Department {
                id: self.department_id,
                name: self.department_name,
            },
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DepartmentReportRow {
    department_name: String,
    employee_count: i64,
    max_salary: i64,
    min_salary: i64,
    average_salary: f64,
}

impl DepartmentReportRow {
    fn into_domain(self) -> ReportRow {
        ReportRow {
            department_name: self.department_name,
            employee_count: self.employee_count as u64,
            max_salary: self.max_salary as u32,
            min_salary: self.min_salary as u32,
            average_salary: self.average_salary,
        }
    }
}
