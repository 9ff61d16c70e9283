use std::fmt::Display;

use chrono::{DateTime, TimeZone};

use crate::types::ReportRow;

const FILE_NAME_PREFIX: &str = "report";
const FILE_NAME_TIMESTAMP: &str = "%d%m%Y_%H%M";

/// Builds the report file name from the wall-clock time of `at`, e.g. `report_05032024_0907`.
///
/// The name follows the timezone `at` carries. Minute granularity: two reports
/// generated within the same minute share a name.
pub fn report_file_name<Tz>(at: DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!("{FILE_NAME_PREFIX}_{}", at.format(FILE_NAME_TIMESTAMP))
}

/// Serializes report rows into the JSON document stored with a report.
pub fn render_report(rows: &[ReportRow]) -> Result<String, serde_json::Error> {
    serde_json::to_string(rows)
}
