use axum::{
    Extension, Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderValue, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::Local;
use log::{error, info, warn};
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::columns::ColumnSet;
use crate::config::ServerConfig;
use crate::error::ReportError;
use crate::login::{
    self, AuthProvider, handle_forgot_password, handle_login, handle_logout, handle_reset_password,
    handle_signup,
};
use crate::mailer::Mailer;
use crate::metrics::MetricsResult;
use crate::pipeline::{self, Dataset, PipelineContext, Selections};
use crate::session::{CurrentSession, SessionStore, Workspace, require_auth};
use crate::table::Cell;

/// Rows returned by the preview endpoint
pub const PREVIEW_LIMIT: usize = 10;

const DROPPED_SERIES_HEADER: &str = "x-dropped-series";

/// Shared server state
pub struct AppState {
    pub auth: Arc<dyn AuthProvider>,
    pub sessions: SessionStore,
    pub mailer: Option<Arc<Mailer>>,
    pub app_name: String,
    pub report_title: String,
}

impl AppState {
    fn context(&self, selections: Selections) -> PipelineContext {
        PipelineContext {
            app_name: self.app_name.clone(),
            report_title: self.report_title.clone(),
            selections,
        }
    }
}

/// Failures of the data endpoints
#[derive(Debug)]
pub enum ApiError {
    Report(ReportError),
    NoUpload,
    UploadChanged,
    BadRequest(String),
}

impl From<ReportError> for ApiError {
    fn from(e: ReportError) -> Self {
        ApiError::Report(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Report(e) => e.into_response(),
            ApiError::NoUpload => (
                StatusCode::CONFLICT,
                Json(json!({ "error": "no_upload", "message": "Upload a CSV or Excel file first." })),
            )
                .into_response(),
            ApiError::UploadChanged => (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": "upload_changed",
                    "message": "A new file was uploaded; choose the columns again."
                })),
            )
                .into_response(),
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "bad_request", "message": message })),
            )
                .into_response(),
        }
    }
}

impl IntoResponse for ReportError {
    fn into_response(self) -> Response {
        let status = if self.is_user_error() {
            StatusCode::UNPROCESSABLE_ENTITY
        } else {
            error!("report pipeline failed: {}", self);
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(json!({ "error": self.kind(), "message": self.to_string() }))).into_response()
    }
}

#[derive(Serialize)]
struct UploadSummary {
    source_name: String,
    row_count: usize,
    columns: ColumnSet,
    selections: Selections,
    metrics: MetricsResult,
}

#[derive(Serialize)]
struct SelectionsResponse {
    selections: Selections,
    metrics: MetricsResult,
}

#[derive(Serialize)]
struct PreviewResponse<'a> {
    columns: &'a [String],
    rows: Vec<Vec<&'a Cell>>,
    total_rows: usize,
}

/// Starts the server described by `config` and serves until it fails
///
/// # Arguments
/// * `config` - Listen address, auth backend, mail relay and limits
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - An error if startup or serving fails
pub async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let auth = login::provider_from_config(&config)?;

    let mailer = match config.smtp() {
        Some(settings) => Some(Arc::new(Mailer::new(&settings, &config.app_name)?)),
        None => {
            warn!("SMTP_HOST is not set, password recovery codes will not be mailed");
            None
        }
    };

    let state = Arc::new(AppState {
        auth,
        sessions: SessionStore::new(config.session_ttl()),
        mailer,
        app_name: config.app_name.clone(),
        report_title: config.report_title.clone(),
    });

    spawn_session_sweeper(state.clone());

    let app = router(state, &config.static_dir, config.upload_limit_bytes());

    let listener = TcpListener::bind(config.bind).await?;
    info!("Listening on http://{}", config.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

fn spawn_session_sweeper(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(10 * 60));
        loop {
            interval.tick().await;
            let purged = state.sessions.purge_expired();
            if purged > 0 {
                info!("purged {} expired session(s)", purged);
            }
        }
    });
}

/// Builds the HTTP routes over `state`.
pub fn router(state: Arc<AppState>, static_dir: &Path, upload_limit: usize) -> Router {
    let data = Router::new()
        .route("/upload", post(upload))
        .route("/preview", get(preview))
        .route("/selections", put(update_selections))
        .route("/metrics", get(current_metrics))
        .route("/chart", get(chart))
        .route("/report", post(report))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/api/login", post(handle_login))
        .route("/api/signup", post(handle_signup))
        .route("/api/logout", post(handle_logout))
        .route("/api/password/forgot", post(handle_forgot_password))
        .route("/api/password/reset", post(handle_reset_password))
        .nest("/api/data", data)
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(state)
}

// Runs a pipeline step on the blocking pool.
async fn run_pipeline<T: Send + 'static>(
    f: impl FnOnce() -> Result<T, ReportError> + Send + 'static,
) -> Result<T, ReportError> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ReportError::Unexpected(e.to_string()))?
}

fn workspace(state: &AppState, session: &CurrentSession) -> Result<Workspace, ApiError> {
    state.sessions.workspace(&session.id).ok_or(ApiError::NoUpload)
}

fn dropped_series_header(dropped: &[String]) -> Option<HeaderValue> {
    if dropped.is_empty() {
        return None;
    }
    let encoded: Vec<String> = dropped
        .iter()
        .map(|name| urlencoding::encode(name).into_owned())
        .collect();
    HeaderValue::from_str(&encoded.join(",")).ok()
}

/// Content-Disposition value for downloading `filename`.
pub fn attachment_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' && c != '\\' { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(filename)
    )
}

async fn upload(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<CurrentSession>,
    mut multipart: Multipart,
) -> Result<Json<UploadSummary>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("upload.csv").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            upload = Some((filename, bytes));
        }
    }
    let (filename, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest("multipart field 'file' is missing".to_string()))?;

    let name = filename.clone();
    let (dataset, selections, metrics) = run_pipeline(move || {
        let dataset = Dataset::from_upload(&bytes, &name)?;
        let selections = Selections::defaults(&dataset.columns)?;
        let metrics = crate::metrics::compute(&dataset.table, &selections.metrics_column)?;
        Ok((dataset, selections, metrics))
    })
    .await?;

    info!("{} uploaded {}", session.user.email, filename);

    let summary = UploadSummary {
        source_name: dataset.source_name.clone(),
        row_count: dataset.table.row_count(),
        columns: dataset.columns.clone(),
        selections: selections.clone(),
        metrics,
    };
    state.sessions.set_workspace(
        &session.id,
        Workspace {
            dataset: Arc::new(dataset),
            selections,
        },
    );

    Ok(Json(summary))
}

async fn preview(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<CurrentSession>,
) -> Result<Response, ApiError> {
    let workspace = workspace(&state, &session)?;
    let table = workspace
        .dataset
        .table
        .select(&workspace.selections.report_columns)?;

    let columns = table.column_names();
    let rows = (0..table.row_count().min(PREVIEW_LIMIT))
        .map(|r| table.row(r).collect())
        .collect();

    Ok(Json(PreviewResponse {
        columns: &columns,
        rows,
        total_rows: table.row_count(),
    })
    .into_response())
}

async fn update_selections(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<CurrentSession>,
    Json(selections): Json<Selections>,
) -> Result<Json<SelectionsResponse>, ApiError> {
    let current = workspace(&state, &session)?;
    let ctx = state.context(selections.clone());
    let metrics = pipeline::metrics(&current.dataset, &ctx)?;

    if !state
        .sessions
        .replace_selections(&session.id, &current.dataset, selections.clone())
    {
        return Err(ApiError::UploadChanged);
    }

    Ok(Json(SelectionsResponse {
        selections,
        metrics,
    }))
}

async fn current_metrics(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<CurrentSession>,
) -> Result<Json<MetricsResult>, ApiError> {
    let workspace = workspace(&state, &session)?;
    let ctx = state.context(workspace.selections);
    Ok(Json(pipeline::metrics(&workspace.dataset, &ctx)?))
}

async fn chart(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<CurrentSession>,
) -> Result<Response, ApiError> {
    let workspace = workspace(&state, &session)?;
    let ctx = state.context(workspace.selections);
    let dataset = workspace.dataset;

    let rendered = run_pipeline(move || pipeline::chart(&dataset, &ctx)).await?;

    let mut response = Response::new(Body::from(rendered.png));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    if let Some(value) = dropped_series_header(&rendered.dropped_series) {
        headers.insert(DROPPED_SERIES_HEADER, value);
    }
    Ok(response)
}

async fn report(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<CurrentSession>,
) -> Result<Response, ApiError> {
    let workspace = workspace(&state, &session)?;
    let ctx = state.context(workspace.selections);
    let dataset = workspace.dataset;
    let now = Local::now().naive_local();

    let report = run_pipeline(move || pipeline::generate(&dataset, &ctx, now)).await?;
    info!("{} downloaded {}", session.user.email, report.filename);

    let disposition = HeaderValue::from_str(&attachment_disposition(&report.filename))
        .map_err(|e| ReportError::Unexpected(e.to_string()))?;

    let mut response = Response::new(Body::from(report.pdf));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(report.mime));
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    if let Some(value) = dropped_series_header(&report.dropped_series) {
        headers.insert(DROPPED_SERIES_HEADER, value);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::login::LocalAuthProvider;
    use axum::body::to_bytes;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    const BOUNDARY: &str = "gridtodash-test-boundary";

    fn test_app(dir: &tempfile::TempDir) -> Router {
        let auth = LocalAuthProvider::open(dir.path().join("users.json")).unwrap();
        let state = Arc::new(AppState {
            auth: Arc::new(auth),
            sessions: SessionStore::new(Duration::from_secs(60)),
            mailer: None,
            app_name: "GridToDash".to_string(),
            report_title: "GridToDash Professional Report".to_string(),
        });
        router(state, dir.path(), 1024 * 1024)
    }

    fn json_request(method: &str, uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn upload_request(cookie: &str, filename: &str, content: &str) -> Request<Body> {
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: text/csv\r\n\r\n{c}\r\n--{b}--\r\n",
            b = BOUNDARY,
            f = filename,
            c = content
        );
        Request::builder()
            .method("POST")
            .uri("/api/data/upload")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
            .header(header::COOKIE, cookie)
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn signed_in(app: &Router) -> String {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/signup",
                None,
                json!({ "email": "ana@example.com", "password": "secret1", "confirm_password": "secret1" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn data_routes_require_session() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir);
        let response = app
            .oneshot(Request::builder().uri("/api/data/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn signup_rejects_mismatched_passwords() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir);
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/signup",
                None,
                json!({ "email": "ana@example.com", "password": "secret1", "confirm_password": "secret2" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn upload_then_metrics_and_selections() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir);
        let cookie = signed_in(&app).await;

        let response = app
            .clone()
            .oneshot(Request::builder()
                .uri("/api/data/metrics")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .clone()
            .oneshot(upload_request(&cookie, "sales.csv", "region,sales\nN,100\nS,300\nE,200\n"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let summary = body_json(response).await;
        assert_eq!(summary["row_count"], 3);
        assert_eq!(summary["metrics"]["total"], 600.0);
        assert_eq!(summary["metrics"]["average"], 200.0);
        assert_eq!(summary["selections"]["label_column"], "region");

        let response = app
            .clone()
            .oneshot(Request::builder()
                .uri("/api/data/preview")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap())
            .await
            .unwrap();
        let preview = body_json(response).await;
        assert_eq!(preview["columns"], json!(["region", "sales"]));
        assert_eq!(preview["rows"][1], json!(["S", 300.0]));

        let bad = json!({
            "metrics_column": "region",
            "label_column": "region",
            "value_column": "sales",
            "report_columns": ["region", "sales"]
        });
        let response = app
            .clone()
            .oneshot(json_request("PUT", "/api/data/selections", Some(&cookie), bad))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["error"], "invalid_selection");
    }

    #[tokio::test]
    async fn text_only_upload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir);
        let cookie = signed_in(&app).await;

        let response = app
            .oneshot(upload_request(&cookie, "people.csv", "id,name\na1,Ann\n"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["error"], "no_numeric_columns");
    }

    #[test]
    fn disposition_escapes_filename() {
        assert_eq!(
            attachment_disposition("GridToDash_Report_20240101_000000.pdf"),
            "attachment; filename=\"GridToDash_Report_20240101_000000.pdf\"; filename*=UTF-8''GridToDash_Report_20240101_000000.pdf"
        );
        assert!(attachment_disposition("Relatório 1.pdf").contains("filename*=UTF-8''Relat%C3%B3rio%201.pdf"));
    }

    #[test]
    fn errors_map_to_status() {
        let user = ReportError::EmptyInput.into_response();
        assert_eq!(user.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let internal = ReportError::Compose("boom".to_string()).into_response();
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
