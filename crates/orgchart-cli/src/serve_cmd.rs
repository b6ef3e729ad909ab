use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use orgchart_core::permission::{Caller, CurrentUser, Permission, PermissionEntry};
use orgchart_core::plan::{NodeUpdate, Plan};
use orgchart_core::service::{ApiResponse, CsvExport, EntryContext, PlanService, PlansView};
use orgchart_core::share::ShareLink;
use orgchart_core::{ErrorKind, OrgError};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    service: PlanService,
    identity_header: HeaderName,
}

impl AppState {
    pub fn new(service: PlanService, identity_header: &str) -> Result<Self> {
        let identity_header = HeaderName::from_bytes(identity_header.as_bytes())
            .with_context(|| format!("invalid identity header name: {identity_header:?}"))?;
        Ok(Self {
            service,
            identity_header,
        })
    }

    /// The caller as asserted by the fronting proxy's identity header.
    fn caller(&self, headers: &HeaderMap) -> Caller {
        let email = headers
            .get(&self.identity_header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        Caller { email }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError(OrgError);

impl From<OrgError> for AppError {
    fn from(err: OrgError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self(OrgError::Validation(rejection.body_text()))
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Authorization | ErrorKind::TokenExpired | ErrorKind::TokenInvalid => {
            StatusCode::FORBIDDEN
        }
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Duplicate | ErrorKind::Reserved => StatusCode::CONFLICT,
        ErrorKind::StoreAccess => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = status_for(self.0.kind());
        (status, Json(ApiResponse::<()>::error(&self.0))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct EntryQuery {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddUserRequest {
    pub email: String,
    #[serde(default)]
    pub permission: Permission,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub permission: Permission,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateResponse {
    pub applied: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsersResponse {
    pub users: Vec<PermissionEntry>,
    pub current_user: CurrentUser,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(entry))
        .route("/api/plans", get(list_plans))
        .route("/api/plans/{id}", put(save_plan).delete(delete_plan))
        .route("/api/plans/{id}/nodes", post(batch_update_nodes))
        .route("/api/plans/{id}/export", get(export_plan))
        .route("/api/users", get(list_users).post(add_user))
        .route("/api/users/{email}", put(update_user).delete(remove_user))
        .route("/api/share", post(create_share_link))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(state: AppState, bind: &str, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {bind}:{port}"))?;
    tracing::info!("orgchart serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("orgchart serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<EntryQuery>,
) -> ApiResult<EntryContext> {
    let caller = state.caller(&headers);
    ok(state
        .service
        .resolve_entry(&caller, query.token.as_deref())
        .await?)
}

async fn list_plans(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<PlansView> {
    let caller = state.caller(&headers);
    ok(state.service.list_all_plans(&caller).await?)
}

async fn save_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<Plan>, JsonRejection>,
) -> ApiResult<()> {
    let caller = state.caller(&headers);
    let Json(plan) = body?;
    state.service.save_plan(&caller, &id, &plan).await?;
    ok(())
}

async fn delete_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let caller = state.caller(&headers);
    state.service.delete_plan(&caller, &id).await?;
    ok(())
}

async fn batch_update_nodes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<Vec<NodeUpdate>>, JsonRejection>,
) -> ApiResult<BatchUpdateResponse> {
    let caller = state.caller(&headers);
    let Json(updates) = body?;
    let applied = state
        .service
        .batch_update_nodes(&caller, &id, &updates)
        .await?;
    ok(BatchUpdateResponse { applied })
}

async fn export_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<CsvExport> {
    let caller = state.caller(&headers);
    ok(state.service.export_csv(&caller, &id).await?)
}

async fn list_users(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<UsersResponse> {
    let caller = state.caller(&headers);
    let users = state.service.list_shared_users(&caller).await?;
    let current_user = state.service.resolve_entry(&caller, None).await?.user;
    ok(UsersResponse {
        users,
        current_user,
    })
}

async fn add_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<AddUserRequest>, JsonRejection>,
) -> ApiResult<PermissionEntry> {
    let caller = state.caller(&headers);
    let Json(req) = body?;
    ok(state
        .service
        .add_shared_user(&caller, &req.email, req.permission)
        .await?)
}

async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(email): Path<String>,
    body: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> ApiResult<PermissionEntry> {
    let caller = state.caller(&headers);
    let Json(req) = body?;
    ok(state
        .service
        .update_user_permission(&caller, &email, req.permission)
        .await?)
}

async fn remove_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(email): Path<String>,
) -> ApiResult<()> {
    let caller = state.caller(&headers);
    state.service.remove_shared_user(&caller, &email).await?;
    ok(())
}

async fn create_share_link(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<ShareLink> {
    let caller = state.caller(&headers);
    ok(state.service.generate_share_link(&caller).await?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
