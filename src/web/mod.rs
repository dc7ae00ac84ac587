//! HTTP surface: signed client dashboards, staff edits, admin routes and the
//! ClickUp webhook.
//!
//! Handlers stay async only at the edge. Store and tracker calls are blocking
//! and run under `spawn_blocking`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Form, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::io::clickup::TaskSource;
use crate::io::store::{Store, StoreError};
use crate::model::config::AppConfig;
use crate::ops::dashboard::{DashboardInput, DashboardView, build_dashboard};
use crate::ops::edit::{EditError, EditRequest, apply_edit};
use crate::ops::history::build_report;
use crate::ops::overview::build_overview;
use crate::ops::signing::{LinkSigner, constant_time_eq, encode_path_segment};
use crate::ops::status::{Clock, SystemClock};
use crate::ops::sync::{SyncError, Syncer, WebhookOutcome};
use crate::parse::history_import::{ImportError, parse_history};
use crate::util::dates::utc_now_rfc3339;

pub const ADMIN_KEY_HEADER: &str = "x-api-key";

/// Shared, immutable request context
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Store,
    pub source: Arc<dyn TaskSource + Send + Sync>,
    pub signer: LinkSigner,
}

impl AppState {
    fn syncer(&self) -> Syncer<'_, dyn TaskSource + Send + Sync> {
        Syncer::new(self.source.as_ref(), &self.store, &self.config)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("task tracker unavailable: {0}")]
    Upstream(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unauthorized => "unauthorized",
            ApiError::Forbidden => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Upstream(_) => "upstream_unavailable",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Upstream(msg) => tracing::warn!(error = %msg, "upstream failure"),
            ApiError::Internal(msg) => tracing::error!(error = %msg, "request failed"),
            _ => {}
        }
        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Upstream(e) => ApiError::Upstream(e.to_string()),
            SyncError::Store(e) => e.into(),
        }
    }
}

impl From<EditError> for ApiError {
    fn from(err: EditError) -> Self {
        match err {
            EditError::MissingKey | EditError::NotEditable(_) | EditError::InvalidDate(_) => {
                ApiError::BadRequest(err.to_string())
            }
            EditError::UnknownClient(_) => ApiError::NotFound(err.to_string()),
            EditError::Upstream(e) => ApiError::Upstream(e.to_string()),
            EditError::Store(e) => e.into(),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

/// Run blocking work off the async executor.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
}

// ---------------------------------------------------------------------------
// Access checks
// ---------------------------------------------------------------------------

/// Query parameters shared by the signed and admin routes
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccessQuery {
    pub sig: String,
    pub mode: String,
    pub key: String,
    pub refresh: String,
    pub token: String,
}

/// Admin access: open when no key is configured, else the `X-API-Key` header
/// or `key` query parameter must match.
pub fn admin_authorized(configured: &str, headers: &HeaderMap, query_key: &str) -> bool {
    if configured.is_empty() {
        return true;
    }
    let header_key = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    constant_time_eq(header_key, configured) || constant_time_eq(query_key, configured)
}

/// Edit access needs admin access plus an explicit `mode=admin`.
pub fn edit_authorized(configured: &str, headers: &HeaderMap, query: &AccessQuery) -> bool {
    query.mode == "admin" && admin_authorized(configured, headers, &query.key)
}

pub fn webhook_authorized(configured: &str, token: &str) -> bool {
    configured.is_empty() || constant_time_eq(token, configured)
}

fn require_admin(state: &AppState, headers: &HeaderMap, query: &AccessQuery) -> Result<(), ApiError> {
    if admin_authorized(&state.config.auth.admin_api_key, headers, &query.key) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

fn require_signature(state: &AppState, sf_id: &str, query: &AccessQuery) -> Result<(), ApiError> {
    if !query.sig.is_empty() && state.signer.verify(sf_id, &query.sig) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/admin/generate-link/{sf_id}", get(generate_link))
        .route("/admin/sync", post(manual_sync))
        .route("/admin/projects", get(admin_projects))
        .route("/admin/metrics", get(metrics_report))
        .route("/admin/metrics/import", post(metrics_import))
        .route("/webhook/clickup", post(clickup_webhook))
        .route("/status/{sf_id}", get(client_status))
        .route("/status/{sf_id}/update-date", post(update_date))
        .with_state(state)
}

pub async fn serve(state: AppState, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, router(state)).await
}

async fn index() -> Json<Value> {
    Json(json!({
        "service": "statusboard",
        "endpoints": {
            "generate_link": "/admin/generate-link/{sf_id}",
            "manual_sync": "/admin/sync",
            "admin_projects": "/admin/projects?key=<ADMIN_API_KEY>",
            "metrics_report": "/admin/metrics",
            "metrics_import": "/admin/metrics/import",
            "status_page": "/status/{sf_id}?sig=<signature>",
            "update_date": "/status/{sf_id}/update-date?sig=<signature>",
            "clickup_webhook": "/webhook/clickup",
        }
    }))
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkResponse {
    pub sf_id: String,
    pub signature: String,
    pub url_path: String,
}

async fn generate_link(
    State(state): State<AppState>,
    Path(sf_id): Path<String>,
    Query(query): Query<AccessQuery>,
    headers: HeaderMap,
) -> Result<Json<LinkResponse>, ApiError> {
    require_admin(&state, &headers, &query)?;
    Ok(Json(LinkResponse {
        signature: state.signer.sign(&sf_id),
        url_path: state.signer.status_path(&sf_id),
        sf_id,
    }))
}

async fn manual_sync(
    State(state): State<AppState>,
    Query(query): Query<AccessQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_admin(&state, &headers, &query)?;
    let total = blocking(move || Ok(state.syncer().refresh_all()?)).await?;
    Ok(Json(json!({ "ok": true, "synced_clients": total })))
}

/// Webhook bodies vary by event; anything unparseable is treated as empty.
fn webhook_payload(body: &[u8]) -> Value {
    serde_json::from_slice::<Value>(body)
        .ok()
        .filter(Value::is_object)
        .unwrap_or_else(|| json!({}))
}

async fn clickup_webhook(
    State(state): State<AppState>,
    Query(query): Query<AccessQuery>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    if !webhook_authorized(&state.config.auth.webhook_token, &query.token) {
        return Err(ApiError::Unauthorized);
    }
    let payload = webhook_payload(&body);
    let outcome = blocking(move || Ok(state.syncer().handle_webhook(&payload)?)).await?;
    Ok(Json(match outcome {
        WebhookOutcome::Updated { sf_id } => json!({ "ok": true, "updated_sf_id": sf_id }),
        WebhookOutcome::Ignored(reason) => json!({ "ok": true, "ignored": reason.as_str() }),
    }))
}

async fn admin_projects(
    State(state): State<AppState>,
    Query(query): Query<AccessQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    require_admin(&state, &headers, &query)?;
    let refresh = query.refresh == "1";
    let overview = blocking(move || {
        if refresh && let Err(e) = state.syncer().refresh_all() {
            tracing::warn!(error = %e, "project refresh failed, serving cached data");
        }
        let statuses = state.store.list_client_statuses()?;
        Ok(build_overview(&statuses, &state.signer, &query.key, None))
    })
    .await?;
    Ok(Json(overview).into_response())
}

async fn metrics_report(
    State(state): State<AppState>,
    Query(query): Query<AccessQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    require_admin(&state, &headers, &query)?;
    let report = blocking(move || {
        let statuses = state.store.list_client_statuses()?;
        let historical = state.store.list_historical_metrics()?;
        Ok(build_report(&statuses, &historical))
    })
    .await?;
    Ok(Json(report).into_response())
}

async fn metrics_import(
    State(state): State<AppState>,
    Query(query): Query<AccessQuery>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, ApiError> {
    require_admin(&state, &headers, &query)?;
    let outcome = parse_history(&body, &utc_now_rfc3339())?;
    let parsed = outcome.rows.len();
    let inserted = blocking(move || Ok(state.store.upsert_historical_metrics(&outcome.rows)?)).await?;
    tracing::info!(parsed, inserted, skipped = outcome.skipped, "imported historical metrics");
    Ok(Json(json!({
        "ok": true,
        "parsed": parsed,
        "inserted": inserted,
        "skipped": outcome.skipped,
        "delimiter": outcome.delimiter,
    })))
}

#[derive(Debug, Serialize)]
pub struct StatusPage {
    pub sf_id: String,
    pub task_name: String,
    pub task_url: String,
    pub synced_at: String,
    pub can_edit: bool,
    pub dashboard: DashboardView,
}

async fn client_status(
    State(state): State<AppState>,
    Path(sf_id): Path<String>,
    Query(query): Query<AccessQuery>,
    headers: HeaderMap,
) -> Result<Json<StatusPage>, ApiError> {
    require_signature(&state, &sf_id, &query)?;
    let can_edit = edit_authorized(&state.config.auth.admin_api_key, &headers, &query);

    let page = blocking(move || {
        if let Err(e) = state.syncer().refresh_client(&sf_id) {
            tracing::warn!(%sf_id, error = %e, "client refresh failed, serving cached data");
        }
        let Some(status) = state.store.get_client_status(&sf_id)? else {
            return Err(ApiError::NotFound(format!("no client with sf_id {sf_id}")));
        };
        let overrides = state.store.client_overrides(&sf_id)?;
        let dashboard = build_dashboard(DashboardInput {
            status: &status,
            overrides: &overrides,
            field_map: &state.config.field_map,
            can_edit,
            today: SystemClock.today(),
        });
        Ok(StatusPage {
            sf_id,
            task_name: status.task_name.clone(),
            task_url: status.task_url.clone(),
            synced_at: status.synced_at.clone(),
            can_edit,
            dashboard,
        })
    })
    .await?;
    Ok(Json(page))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateDateForm {
    pub metric_key: String,
    pub override_key: String,
    pub value: String,
    /// `acd` or `ecd`; only meaningful for ACD edits
    pub anchor: String,
}

impl UpdateDateForm {
    fn into_request(self) -> EditRequest {
        let use_acd = match self.anchor.trim().to_lowercase().as_str() {
            "acd" => Some(true),
            "ecd" => Some(false),
            _ => None,
        };
        EditRequest {
            metric_key: self.metric_key,
            override_key: self.override_key,
            value: self.value,
            use_acd,
        }
    }
}

async fn update_date(
    State(state): State<AppState>,
    Path(sf_id): Path<String>,
    Query(query): Query<AccessQuery>,
    headers: HeaderMap,
    Form(form): Form<UpdateDateForm>,
) -> Result<Redirect, ApiError> {
    require_signature(&state, &sf_id, &query)?;
    if !edit_authorized(&state.config.auth.admin_api_key, &headers, &query) {
        return Err(ApiError::Forbidden);
    }

    let request = form.into_request();
    let target = sf_id.clone();
    blocking(move || {
        let entry = apply_edit(state.source.as_ref(), &state.store, &state.config, &target, &request)?;
        Ok(entry)
    })
    .await?;

    Ok(Redirect::to(&format!(
        "/status/{}?sig={}&mode={}&key={}",
        encode_path_segment(&sf_id),
        encode_path_segment(&query.sig),
        encode_path_segment(&query.mode),
        encode_path_segment(&query.key),
    )))
}
