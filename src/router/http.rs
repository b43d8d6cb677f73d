//! HTTP handlers (spec section 6, "HTTP surface"). Deep business logic for
//! these endpoints is out of scope (spec section 1); what lives here is
//! the auth/correlation/error-mapping plumbing the router owns, plus a
//! thin call into the Collection Pipeline or a store for the rest.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;
use uuid::Uuid;

use crate::collection;
use crate::error::VireError;
use crate::models::{ClientType, Feedback, FeedbackCategory, FeedbackSeverity, FeedbackStatus, Role};

use super::{vendor_client_for, AppState, UserContext};

const CORRELATION_HEADER: &str = "x-correlation-id";

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            HeaderName::from_static("x-vire-user-id"),
            HeaderName::from_static("x-vire-service-id"),
            HeaderName::from_static(CORRELATION_HEADER),
        ]);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/version", get(version))
        .route("/api/diagnostics", get(diagnostics))
        .route("/api/market/collect", post(collect_market))
        .route("/api/market/stocks/:ticker", get(get_stock))
        .route("/api/portfolios/:name", get(get_portfolio))
        .route("/api/portfolios/:name/sync", post(sync_portfolio))
        .route("/api/feedback", post(create_feedback).get(list_feedback))
        .route("/api/feedback/:id", patch(patch_feedback).delete(delete_feedback))
        .route("/mcp", post(mcp_dispatch))
        .route("/api/services/register", post(register_service))
        .layer(cors)
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

fn error_status(err: &VireError) -> StatusCode {
    match err {
        VireError::NotFound(_) => StatusCode::NOT_FOUND,
        VireError::AlreadyExists(_) => StatusCode::CONFLICT,
        VireError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        VireError::Unauthenticated => StatusCode::UNAUTHORIZED,
        VireError::Forbidden(_) => StatusCode::FORBIDDEN,
        VireError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        VireError::UpstreamRateLimited(_) => StatusCode::SERVICE_UNAVAILABLE,
        VireError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        VireError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        VireError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Maps the error taxonomy of spec.md section 7 onto REST status codes.
struct ApiError(VireError);

impl From<VireError> for ApiError {
    fn from(e: VireError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = error_status(&self.0);
        let body = ErrorBody {
            error: format!("{:?}", self.0)
                .split('(')
                .next()
                .unwrap_or("internal")
                .to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(HealthBody { status: "ok" })
}

#[derive(Serialize)]
struct VersionBody {
    name: &'static str,
    version: &'static str,
}

async fn version() -> impl IntoResponse {
    Json(VersionBody {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct DiagnosticsBody {
    uptime_secs: i64,
    pending_jobs: i64,
    tracked_tickers: usize,
    portfolio_namespace_configured: bool,
}

async fn diagnostics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let pending_jobs = state.store.jobs.count_pending(None).await?;
    let tracked_tickers = state.store.stock_index.list().await?.len();
    Ok(Json(DiagnosticsBody {
        uptime_secs: (chrono::Utc::now() - state.started_at).num_seconds(),
        pending_jobs,
        tracked_tickers,
        portfolio_namespace_configured: state.store.has_portfolio_namespace(),
    }))
}

#[derive(Deserialize)]
struct CollectRequest {
    ticker: String,
    force: Option<bool>,
}

async fn collect_market(
    State(state): State<AppState>,
    context: UserContext,
    Json(req): Json<CollectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let vendor = vendor_client_for(&state, &context);
    let snapshot = collection::get_stock_data(
        state.store.clone(),
        state.freshness.clone(),
        vendor,
        &req.ticker,
        req.force.unwrap_or(false),
        Some(&context.correlation_id),
    )
    .await?;
    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

#[derive(Deserialize)]
struct StockQuery {
    force: Option<bool>,
}

async fn get_stock(
    State(state): State<AppState>,
    context: UserContext,
    Path(ticker): Path<String>,
    Query(query): Query<StockQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let vendor = vendor_client_for(&state, &context);
    let snapshot = collection::get_stock_data(
        state.store.clone(),
        state.freshness.clone(),
        vendor,
        &ticker,
        query.force.unwrap_or(false),
        Some(&context.correlation_id),
    )
    .await?;
    Ok(Json(snapshot))
}

async fn get_portfolio(
    State(state): State<AppState>,
    context: UserContext,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = context.require_user().map_err(|_| ApiError(VireError::Unauthenticated))?;
    let aggregate = collection::get_portfolio(&state.store, user_id, &name).await?;
    Ok(Json(aggregate))
}

#[derive(Serialize)]
struct SyncResponse {
    synced_tickers: Vec<String>,
}

/// Triggers a user-scoped sync using the user's own upstream credential,
/// if one is on file (spec section 4.6 responsibility 2): re-fetches core
/// data and enqueues slow slices for every ticker the portfolio holds.
async fn sync_portfolio(
    State(state): State<AppState>,
    context: UserContext,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = context.require_user().map_err(|_| ApiError(VireError::Unauthenticated))?;
    let aggregate = collection::get_portfolio(&state.store, user_id, &name).await?;
    let vendor = vendor_client_for(&state, &context);

    let mut synced = Vec::with_capacity(aggregate.holdings.len());
    for holding in &aggregate.holdings {
        collection::get_stock_data(
            state.store.clone(),
            state.freshness.clone(),
            vendor.clone(),
            &holding.ticker,
            true,
            Some(&context.correlation_id),
        )
        .await?;
        synced.push(holding.ticker.clone());
    }

    Ok(Json(SyncResponse { synced_tickers: synced }))
}

#[derive(Deserialize)]
struct FeedbackCreateRequest {
    session_id: String,
    client_type: ClientType,
    category: FeedbackCategory,
    severity: FeedbackSeverity,
    description: String,
    ticker: Option<String>,
    portfolio_name: Option<String>,
    tool_name: Option<String>,
    observed_value: Option<String>,
    expected_value: Option<String>,
}

#[derive(Serialize)]
struct FeedbackAccepted {
    accepted: bool,
    feedback_id: Uuid,
}

/// Feedback submission never fails closed (spec section 7): if the store
/// write fails, the failure is logged and the client still sees `202`.
/// Chosen policy is "drop with a log", not "buffer", recorded in
/// DESIGN.md.
async fn create_feedback(
    State(state): State<AppState>,
    Json(req): Json<FeedbackCreateRequest>,
) -> impl IntoResponse {
    let now = chrono::Utc::now();
    let feedback = Feedback {
        id: Uuid::new_v4(),
        session_id: req.session_id,
        client_type: req.client_type,
        category: req.category,
        severity: req.severity,
        description: req.description,
        ticker: req.ticker,
        portfolio_name: req.portfolio_name,
        tool_name: req.tool_name,
        observed_value: req.observed_value,
        expected_value: req.expected_value,
        status: FeedbackStatus::New,
        resolution_notes: None,
        created_at: now,
        updated_at: now,
    };

    if let Err(e) = state.store.feedback.create(&feedback).await {
        warn!(feedback_id = %feedback.id, error = %e, "dropping feedback submission after storage failure");
    }

    (StatusCode::ACCEPTED, Json(FeedbackAccepted { accepted: true, feedback_id: feedback.id }))
}

#[derive(Deserialize)]
struct FeedbackListQuery {
    status: Option<FeedbackStatus>,
}

async fn list_feedback(
    State(state): State<AppState>,
    Query(query): Query<FeedbackListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let items = state.store.feedback.list(query.status).await?;
    Ok(Json(items))
}

#[derive(Deserialize)]
struct FeedbackPatchRequest {
    status: FeedbackStatus,
    resolution_notes: Option<String>,
}

fn require_admin(context: &UserContext) -> Result<(), ApiError> {
    match context.role {
        Role::Admin | Role::Service => Ok(()),
        _ => Err(ApiError(VireError::Forbidden("admin or service role required".to_string()))),
    }
}

async fn patch_feedback(
    State(state): State<AppState>,
    context: UserContext,
    Path(id): Path<Uuid>,
    Json(req): Json<FeedbackPatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&context)?;
    let updated = state.store.feedback.update_triage(id, req.status, req.resolution_notes).await?;
    Ok(Json(updated))
}

async fn delete_feedback(
    State(state): State<AppState>,
    context: UserContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&context)?;
    state.store.feedback.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// MCP tool invocation surface (spec section 6). The tool catalog itself
/// is out of scope (spec section 1); this endpoint only implements the
/// discovery contract unauthenticated clients rely on.
async fn mcp_dispatch(context_result: Result<UserContext, StatusCode>) -> Response {
    let context = match context_result {
        Ok(c) => c,
        Err(status) => return status.into_response(),
    };
    if context.user_id.is_none() && context.role != Role::Service {
        let mut response = StatusCode::UNAUTHORIZED.into_response();
        response.headers_mut().insert(
            axum::http::header::WWW_AUTHENTICATE,
            HeaderValue::from_static(
                "Bearer resource_metadata=\"/.well-known/oauth-protected-resource\"",
            ),
        );
        return response;
    }
    StatusCode::NOT_IMPLEMENTED.into_response()
}

#[derive(Deserialize)]
struct ServiceRegisterRequest {
    service_id: String,
    key: String,
}

#[derive(Serialize)]
struct ServiceRegisterResponse {
    registered: bool,
}

/// Idempotent service-principal registration with a pre-shared key (spec
/// section 6); `501` when no service key is configured for this
/// deployment.
async fn register_service(
    State(state): State<AppState>,
    Json(req): Json<ServiceRegisterRequest>,
) -> Response {
    let Some(expected) = &state.service_registration_key else {
        return StatusCode::NOT_IMPLEMENTED.into_response();
    };
    if &req.key != expected {
        return ApiError(VireError::Forbidden("invalid service registration key".to_string())).into_response();
    }
    warn!(service_id = %req.service_id, "service principal registered (no persistent registry modeled)");
    Json(ServiceRegisterResponse { registered: true }).into_response()
}
