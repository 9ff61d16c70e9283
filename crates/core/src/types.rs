use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Job position an employee holds. Names are unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub id: i64,
    pub name: String,
}

/// Department an employee belongs to. Names are unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Department {
    pub id: i64,
    pub name: String,
}

/// Persisted employee together with its resolved position and department.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Employee {
    pub id: i64,
    pub name: String,
    pub salary: u32,
    pub position: Position,
    pub department: Department,
}

impl Employee {
    /// Converts the employee into its wire representation.
    ///
    /// References are exposed by name, never by identifier.
    pub fn to_dto(&self) -> EmployeeDto {
        EmployeeDto {
            name: self.name.clone(),
            salary: self.salary,
            position_name: Some(self.position.name.clone()),
            department_name: Some(self.department.name.clone()),
        }
    }
}

/// Employee that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEmployee {
    pub name: String,
    pub salary: u32,
    pub position: Position,
    pub department: Department,
}

/// Wire representation of an employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeDto {
    pub name: String,
    pub salary: u32,
    #[serde(default)]
    pub position_name: Option<String>,
    #[serde(default)]
    pub department_name: Option<String>,
}

impl EmployeeDto {
    pub fn new(
        name: impl Into<String>,
        salary: u32,
        position_name: impl Into<String>,
        department_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            salary,
            position_name: Some(position_name.into()),
            department_name: Some(department_name.into()),
        }
    }

    /// Position name, treating an empty string the same as an absent field.
    pub fn position_name(&self) -> Option<&str> {
        non_empty(self.position_name.as_deref())
    }

    /// Department name, treating an empty string the same as an absent field.
    pub fn department_name(&self) -> Option<&str> {
        non_empty(self.department_name.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|name| !name.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionDto {
    pub position_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentDto {
    pub department_name: String,
}

/// One page of employees ordered by identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeePage {
    pub content: Vec<EmployeeDto>,
    #[serde(rename = "number")]
    pub page: u32,
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u64,
}

impl EmployeePage {
    pub fn new(content: Vec<EmployeeDto>, page: u32, size: u32, total_elements: u64) -> Self {
        let total_pages = if size == 0 {
            0
        } else {
            total_elements.div_ceil(u64::from(size))
        };
        Self {
            content,
            page,
            size,
            total_elements,
            total_pages,
        }
    }
}

/// Salary statistics for a single department.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub department_name: String,
    pub employee_count: u64,
    pub max_salary: u32,
    pub min_salary: u32,
    pub average_salary: f64,
}

/// Stored report snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub id: i64,
    pub file_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Report awaiting persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReport {
    pub file_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
