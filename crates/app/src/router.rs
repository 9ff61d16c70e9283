use std::{path::PathBuf, sync::Arc};

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use payroll_storage::Database;

use crate::mapper::EmployeeMapper;
use crate::reports::{ReportBuilder, ReportExporter};
use crate::{catalog, employees, reports, telemetry};

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    report_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(metrics: PrometheusHandle, storage: Database, report_dir: PathBuf) -> Self {
        Self {
            metrics,
            storage,
            clock: Arc::new(Utc::now),
            report_dir: Arc::new(report_dir),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn mapper(&self) -> EmployeeMapper {
        EmployeeMapper::new(self.storage.clone())
    }

    pub fn report_builder(&self) -> ReportBuilder {
        ReportBuilder::new(self.storage.clone(), self.clock.clone())
    }

    pub fn report_exporter(&self) -> ReportExporter {
        ReportExporter::new(self.storage.clone(), self.report_dir.clone())
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/employees", post(employees::create))
        .route("/employees/all", get(employees::list_all))
        .route("/employees/position", get(employees::by_position))
        .route("/employees/page", get(employees::page))
        .route("/employees/upload", post(employees::upload))
        .route(
            "/employees/salary/higherThan",
            get(employees::salary_higher_than),
        )
        .route("/employees/salary/highest", get(employees::highest_salary))
        .route("/employees/positions", post(catalog::create_position))
        .route("/employees/positions/all", get(catalog::list_positions))
        .route("/employees/departments", post(catalog::create_department))
        .route("/employees/departments/all", get(catalog::list_departments))
        .route("/employees/report", post(reports::generate))
        .route("/employees/report/:id", get(reports::download))
        .route("/employees/report/:id/file", post(reports::write_file))
        .route(
            "/employees/:id",
            get(employees::get_by_id)
                .put(employees::edit)
                .delete(employees::delete),
        )
        .route("/employees/:id/fullInfo", get(employees::full_info))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> Response {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        Body::from(body),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, Request};
    use chrono::{Local, TimeZone};
    use payroll_core::report::report_file_name;
    use http_body_util::BodyExt;
    use payroll_core::types::{EmployeeDto, NewReport};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct TestContext {
        state: AppState,
        now: DateTime<Utc>,
        database: Database,
        _report_dir: tempfile::TempDir,
    }

    async fn setup_context() -> TestContext {
        let metrics = telemetry::init_metrics().expect("metrics init");
        let database = Database::connect("sqlite::memory:")
            .await
            .expect("connect");
        database.run_migrations().await.expect("migrations");
        let report_dir = tempfile::tempdir().expect("tempdir");

        let now = Utc.with_ymd_and_hms(2024, 3, 5, 9, 7, 0).unwrap();
        let state = AppState::new(metrics, database.clone(), report_dir.path().to_path_buf())
            .with_clock(Arc::new(move || now));

        TestContext {
            state,
            now,
            database,
            _report_dir: report_dir,
        }
    }

    async fn seed_catalog(database: &Database) {
        for name in ["Manager", "Boss"] {
            database.positions().insert(name).await.expect("position");
        }
        for name in ["Sales", "Finance"] {
            database.departments().insert(name).await.expect("department");
        }
    }

    async fn seed_employees(ctx: &TestContext, employees: &[EmployeeDto]) {
        let response = send(ctx, Method::POST, "/employees", Some(json!(employees))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    async fn send(ctx: &TestContext, method: Method, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(value) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(value.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        app_router(ctx.state.clone())
            .oneshot(request)
            .await
            .expect("handler should respond")
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .expect("body should read")
            .to_bytes()
            .to_vec()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).expect("json body")
    }

    async fn body_text(response: Response) -> String {
        String::from_utf8(body_bytes(response).await).expect("utf-8")
    }

    fn anna_and_vladimir() -> Vec<EmployeeDto> {
        vec![
            EmployeeDto::new("Anna", 5000, "Boss", "Finance"),
            EmployeeDto::new("Vladimir", 4000, "Manager", "Sales"),
        ]
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let ctx = setup_context().await;
        let response = send(&ctx, Method::GET, "/healthz", None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_exports_build_info() {
        let ctx = setup_context().await;
        let response = send(&ctx, Method::GET, "/metrics", None).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains("app_build_info"));
        assert!(body.contains("app_uptime_seconds"));
    }

    #[tokio::test]
    async fn add_employees_succeeds_with_known_references() {
        let ctx = setup_context().await;
        seed_catalog(&ctx.database).await;

        let response = send(
            &ctx,
            Method::POST,
            "/employees",
            Some(json!(anna_and_vladimir())),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, employees::ACK);
        assert_eq!(ctx.database.employees().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn add_employees_fails_without_catalog() {
        let ctx = setup_context().await;

        let response = send(
            &ctx,
            Method::POST,
            "/employees",
            Some(json!(anna_and_vladimir())),
        )
        .await;
        assert!(response.status().is_client_error());
        assert_eq!(ctx.database.employees().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn edit_employee_returns_updated_dto() {
        let ctx = setup_context().await;
        seed_catalog(&ctx.database).await;
        seed_employees(&ctx, &[EmployeeDto::new("Vladimir", 4000, "Manager", "Sales")]).await;

        let response = send(
            &ctx,
            Method::PUT,
            "/employees/1",
            Some(json!({
                "name": "Andrey",
                "salary": 2000,
                "positionName": "Boss",
                "departmentName": "Finance"
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(
            body,
            json!({
                "name": "Andrey",
                "salary": 2000,
                "positionName": "Boss",
                "departmentName": "Finance"
            })
        );
    }

    #[tokio::test]
    async fn edit_missing_employee_is_not_found() {
        let ctx = setup_context().await;
        seed_catalog(&ctx.database).await;

        let response = send(
            &ctx,
            Method::PUT,
            "/employees/999",
            Some(json!(EmployeeDto::new("Andrey", 2000, "Manager", "Sales"))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/problem+json"
        );
    }

    #[tokio::test]
    async fn delete_employee_by_id() {
        let ctx = setup_context().await;
        seed_catalog(&ctx.database).await;
        seed_employees(&ctx, &[EmployeeDto::new("Vladimir", 4000, "Manager", "Sales")]).await;

        let response = send(&ctx, Method::DELETE, "/employees/1", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, employees::ACK);

        let response = send(&ctx, Method::DELETE, "/employees/1", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn get_employee_and_full_info() {
        let ctx = setup_context().await;
        seed_catalog(&ctx.database).await;
        seed_employees(&ctx, &[EmployeeDto::new("Anna", 5000, "Manager", "Sales")]).await;
        let expected = json!({
            "name": "Anna",
            "salary": 5000,
            "positionName": "Manager",
            "departmentName": "Sales"
        });

        let response = send(&ctx, Method::GET, "/employees/1", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, expected);

        let response = send(&ctx, Method::GET, "/employees/1/fullInfo", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, expected);

        let response = send(&ctx, Method::GET, "/employees/999", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn salary_queries_filter_employees() {
        let ctx = setup_context().await;
        seed_catalog(&ctx.database).await;
        seed_employees(
            &ctx,
            &[
                EmployeeDto::new("Anna", 12000, "Manager", "Sales"),
                EmployeeDto::new("Vladimir", 12000, "Manager", "Sales"),
                EmployeeDto::new("Maria", 2000, "Boss", "Sales"),
            ],
        )
        .await;

        let response = send(
            &ctx,
            Method::GET,
            "/employees/salary/higherThan?compareSalary=10000",
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body.as_array().map(Vec::len), Some(2));
        assert_eq!(body[0]["name"], "Anna");
        assert_eq!(body[1]["name"], "Vladimir");

        let response = send(&ctx, Method::GET, "/employees/salary/highest", None).await;
        let body = body_json(response).await;
        assert_eq!(body.as_array().map(Vec::len), Some(2));

        let response = send(&ctx, Method::GET, "/employees/position?position=Boss", None).await;
        let body = body_json(response).await;
        assert_eq!(body, json!([EmployeeDto::new("Maria", 2000, "Boss", "Sales")]));

        let response = send(&ctx, Method::GET, "/employees/position", None).await;
        let body = body_json(response).await;
        assert_eq!(body.as_array().map(Vec::len), Some(3));

        let response = send(&ctx, Method::GET, "/employees/all", None).await;
        let body = body_json(response).await;
        assert_eq!(body.as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn page_returns_five_employees() {
        let ctx = setup_context().await;
        seed_catalog(&ctx.database).await;
        let batch: Vec<_> = ["Anna", "Vladimir", "Maria", "Petr", "Alexandr", "Olga"]
            .iter()
            .map(|name| EmployeeDto::new(*name, 1000, "Manager", "Sales"))
            .collect();
        seed_employees(&ctx, &batch).await;

        let response = send(&ctx, Method::GET, "/employees/page?page=0", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["content"].as_array().map(Vec::len), Some(5));
        assert_eq!(body["totalElements"], 6);
        assert_eq!(body["totalPages"], 2);

        let response = send(&ctx, Method::GET, "/employees/page?page=1", None).await;
        let body = body_json(response).await;
        assert_eq!(body["content"][0]["name"], "Olga");
        assert_eq!(body["number"], 1);
        assert!(body.get("page").is_none());
    }

    async fn send_multipart(ctx: &TestContext, field: &str, content: &str) -> Response {
        let boundary = "payroll-boundary";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"{field}\"; filename=\"employees.json\"\r\n\
             Content-Type: application/json\r\n\r\n\
             {content}\r\n\
             --{boundary}--\r\n"
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri("/employees/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .expect("request");

        app_router(ctx.state.clone())
            .oneshot(request)
            .await
            .expect("handler should respond")
    }

    fn valid_then_unknown_department() -> Value {
        json!([
            EmployeeDto::new("Anna", 5000, "Manager", "Sales"),
            EmployeeDto::new("Petr", 3000, "Manager", "Legal"),
        ])
    }

    #[tokio::test]
    async fn add_employees_writes_nothing_when_a_later_entry_fails() {
        let ctx = setup_context().await;
        seed_catalog(&ctx.database).await;

        let response = send(
            &ctx,
            Method::POST,
            "/employees",
            Some(valid_then_unknown_department()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["type"], "department_not_found");
        assert_eq!(ctx.database.employees().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upload_loads_employees_from_multipart_file() {
        let ctx = setup_context().await;
        seed_catalog(&ctx.database).await;
        let file = r#"[{"name":"John Doe","salary":5000,"positionName":"Manager","departmentName":"Sales"},{"name":"John Rick","salary":7000,"positionName":"Manager","departmentName":"Sales"}]"#;

        let response = send_multipart(&ctx, "file", file).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(ctx.database.employees().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn upload_writes_nothing_when_a_later_entry_fails() {
        let ctx = setup_context().await;
        seed_catalog(&ctx.database).await;

        let file = valid_then_unknown_department().to_string();
        let response = send_multipart(&ctx, "file", &file).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(ctx.database.employees().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upload_without_file_field_is_bad_request() {
        let ctx = setup_context().await;
        seed_catalog(&ctx.database).await;

        let response = send_multipart(&ctx, "attachment", "[]").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["type"], "missing_file");
    }

    #[tokio::test]
    async fn upload_with_malformed_json_is_bad_request() {
        let ctx = setup_context().await;

        let response = send_multipart(&ctx, "file", "{not json").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["type"], "invalid_json");
        assert_eq!(ctx.database.employees().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn report_generation_returns_id() {
        let ctx = setup_context().await;
        seed_catalog(&ctx.database).await;
        seed_employees(&ctx, &anna_and_vladimir()).await;

        let response = send(&ctx, Method::POST, "/employees/report", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "saved report id: 1");

        let report = ctx.database.reports().find_by_id(1).await.expect("report");
        assert_eq!(
            report.file_name,
            report_file_name(ctx.now.with_timezone(&Local))
        );
    }

    #[tokio::test]
    async fn report_download_sets_attachment_headers() {
        let ctx = setup_context().await;
        let id = ctx
            .database
            .reports()
            .insert(&NewReport {
                file_name: "fileName".to_string(),
                content: "content".to_string(),
                created_at: Utc::now(),
            })
            .await
            .expect("insert");

        let response = send(&ctx, Method::GET, &format!("/employees/report/{id}"), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=fileName"
        );
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(body_bytes(response).await, b"content");
    }

    #[tokio::test]
    async fn report_download_of_unknown_id_is_empty_not_found() {
        let ctx = setup_context().await;

        let response = send(&ctx, Method::GET, "/employees/report/42", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn report_file_export_writes_into_report_dir() {
        let ctx = setup_context().await;
        seed_catalog(&ctx.database).await;
        seed_employees(&ctx, &anna_and_vladimir()).await;
        send(&ctx, Method::POST, "/employees/report", None).await;

        let response = send(&ctx, Method::POST, "/employees/report/1/file", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let path = ctx
            .state
            .report_dir
            .join(report_file_name(ctx.now.with_timezone(&Local)));
        let written = std::fs::read_to_string(path).expect("report file");
        let rows: Value = serde_json::from_str(&written).expect("json");
        assert_eq!(rows.as_array().map(Vec::len), Some(2));

        let response = send(&ctx, Method::POST, "/employees/report/9/file", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn catalog_endpoints_create_and_list() {
        let ctx = setup_context().await;

        for name in ["Manager", "Boss", "Developer"] {
            let response = send(
                &ctx,
                Method::POST,
                "/employees/positions",
                Some(json!({ "name": name })),
            )
            .await;
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let response = send(&ctx, Method::GET, "/employees/positions/all", None).await;
        assert_eq!(
            body_json(response).await,
            json!([
                {"positionName": "Manager"},
                {"positionName": "Boss"},
                {"positionName": "Developer"}
            ])
        );

        let response = send(
            &ctx,
            Method::POST,
            "/employees/departments",
            Some(json!({ "name": "Sales" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let response = send(
            &ctx,
            Method::POST,
            "/employees/departments",
            Some(json!({ "name": "Sales" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = send(&ctx, Method::GET, "/employees/departments/all", None).await;
        assert_eq!(body_json(response).await, json!([{"departmentName": "Sales"}]));

        let response = send(
            &ctx,
            Method::POST,
            "/employees/positions",
            Some(json!({ "name": "  " })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
