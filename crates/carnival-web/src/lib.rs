//! Axum JSON API for the carnival directory.

pub mod error;
pub mod extract;
pub mod user;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use carnival_core::{
    Carnival, CarnivalError, CarnivalId, CarnivalService, CarnivalSubmission, ClaimOutcome,
    ExternalCarnival, MergeReport, SiteConfig,
};
use carnival_sync::{sync_external_records, SyncPipeline, SyncReport};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::{AppError, AppResult};
pub use extract::{ApiJson, ApiPath, ApiQuery};
pub use user::{CurrentUser, USER_HEADER};

pub const CRATE_NAME: &str = "carnival-web";

pub struct AppState {
    pub service: CarnivalService,
    pub site: SiteConfig,
    /// `None` disables `POST /admin/sync`.
    pub pipeline: Option<Arc<SyncPipeline>>,
}

impl AppState {
    pub fn new(service: CarnivalService, site: SiteConfig) -> Self {
        Self {
            service,
            site,
            pipeline: None,
        }
    }

    pub fn with_pipeline(mut self, pipeline: Arc<SyncPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            port: lookup("CARNIVAL_WEB_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
        }
    }
}

pub fn app(state: AppState) -> Router {
    let state = Arc::new(state);
    Router::new()
        .route("/health", get(health_handler))
        .route("/carnivals", get(list_carnivals_handler).post(create_carnival_handler))
        .route("/carnivals/{id}", get(carnival_detail_handler))
        .route("/carnivals/{id}/claim", post(claim_handler))
        .route("/carnivals/{id}/release", post(release_handler))
        .route("/admin/sync", post(admin_sync_handler))
        .route("/admin/sync/import", post(admin_import_handler))
        .route("/admin/carnivals/{target}/merge/{source}", post(admin_merge_handler))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), site_gate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(config: ServerConfig, state: AppState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("binding port {}", config.port))?;
    info!(port = config.port, "carnival web listening");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

/// Public routes answer 503 while the site is in maintenance or coming-soon
/// mode. `/health` and `/admin/*` stay reachable.
async fn site_gate(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let path = request.uri().path();
    let exempt = path == "/health" || path.starts_with("/admin/");
    if exempt || state.site.mode.is_live() {
        return next.run(request).await;
    }
    AppError::SiteClosed(state.site.mode).into_response()
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "status": "ok", "siteMode": state.site.mode }))
}

async fn list_carnivals_handler(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Carnival>>> {
    let rows = state
        .service
        .store()
        .list_visible()
        .await
        .map_err(CarnivalError::from)?;
    Ok(Json(rows))
}

async fn carnival_detail_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<CarnivalId>,
) -> AppResult<Json<Carnival>> {
    let carnival = state
        .service
        .store()
        .find_carnival(id)
        .await
        .map_err(CarnivalError::from)?
        .filter(|c| c.is_active && !c.is_disabled)
        .ok_or(CarnivalError::NotFound(id))?;
    Ok(Json(carnival))
}

#[derive(Debug, Default, Deserialize)]
struct CreateParams {
    #[serde(default)]
    force: bool,
}

async fn create_carnival_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiQuery(params): ApiQuery<CreateParams>,
    ApiJson(submission): ApiJson<CarnivalSubmission>,
) -> AppResult<(StatusCode, Json<Carnival>)> {
    let carnival = state
        .service
        .create_or_merge(submission, &user, params.force)
        .await?;
    Ok((StatusCode::CREATED, Json(carnival)))
}

async fn claim_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<CarnivalId>,
) -> AppResult<Json<ClaimOutcome>> {
    Ok(Json(state.service.take_ownership(id, &user).await?))
}

async fn release_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath(id): ApiPath<CarnivalId>,
) -> AppResult<Json<ClaimOutcome>> {
    Ok(Json(state.service.release_ownership(id, &user).await?))
}

async fn admin_sync_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    user.require_admin()?;
    let pipeline = state.pipeline.as_ref().ok_or(AppError::SyncUnavailable)?;
    let summary = pipeline.run_once().await?;
    Ok(Json(json!({
        "newCarnivals": summary.new_carnivals,
        "runId": summary.run_id,
    })))
}

/// Ingests externally supplied records without fetching anything.
async fn admin_import_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiJson(records): ApiJson<Vec<ExternalCarnival>>,
) -> AppResult<Json<SyncReport>> {
    user.require_admin()?;
    let report = sync_external_records(state.service.store().as_ref(), records, Utc::now()).await;
    Ok(Json(report))
}

async fn admin_merge_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiPath((target, source)): ApiPath<(CarnivalId, CarnivalId)>,
) -> AppResult<Json<MergeReport>> {
    Ok(Json(state.service.merge_carnivals(source, target, &user).await?))
}
