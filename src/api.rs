//! 🌐 HTTP query surface
//!
//! Thin JSON layer over `EngineHandle`. Not-found is a 404, engine shutdown
//! or a full feed queue is a 503, validation failures are a 400.

use anyhow::{Context, Result};
use axum::{
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::ApiConfig;
use crate::error::{IngestError, ServiceError};
use crate::metrics::{self, EngineMetrics};
use crate::policy::PolicyUpdate;
use crate::service::EngineHandle;
use crate::types::ActivityEvent;

const DEFAULT_ACTIVITY_LIMIT: usize = 20;
const MAX_ACTIVITY_LIMIT: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub metrics: Arc<EngineMetrics>,
}

impl FromRef<AppState> for Arc<EngineMetrics> {
    fn from_ref(state: &AppState) -> Self {
        state.metrics.clone()
    }
}

pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        ApiError(e)
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        ApiError(ServiceError::Ingest(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ServiceError::EngineStopped => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Ingest(IngestError::QueueFull { .. } | IngestError::QueueClosed) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServiceError::Ingest(_) | ServiceError::Policy(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

fn not_found(what: &str, key: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("{} not found: {}", what, key) })),
    )
        .into_response()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/whales", get(list_whales))
        .route("/api/whales/:address", get(whale_detail))
        .route("/api/activities", get(list_activities).post(submit_activity))
        .route("/api/signals", get(list_signals))
        .route("/api/relations", get(list_relations))
        .route("/api/graph", get(network_graph))
        .route("/api/reports/:token", get(coin_report))
        .route("/api/auto-buy/policy", get(get_policy).post(update_policy))
        .route("/api/auto-buy/execute/:signal_id", post(trigger_auto_buy))
        .route("/api/executions", get(list_executions))
        .route("/api/status", get(status))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/health", get(metrics::health_handler))
        .with_state(state)
}

pub async fn serve(config: &ApiConfig, state: AppState) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind API server on {}", addr))?;

    info!("🌐 API server listening on http://{}", addr);
    info!("   • Signals: http://{}/api/signals", addr);
    info!("   • Metrics: http://{}/metrics", addr);

    axum::serve(listener, router(state))
        .await
        .context("API server failed")?;
    Ok(())
}

async fn list_whales(State(state): State<AppState>) -> ApiResult {
    Ok(Json(state.engine.wallets().await?).into_response())
}

async fn whale_detail(State(state): State<AppState>, Path(address): Path<String>) -> ApiResult {
    Ok(match state.engine.wallet_detail(&address).await? {
        Some(detail) => Json(detail).into_response(),
        None => not_found("wallet", &address),
    })
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    limit: Option<usize>,
}

async fn list_activities(State(state): State<AppState>, Query(query): Query<ActivityQuery>) -> ApiResult {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .min(MAX_ACTIVITY_LIMIT);
    Ok(Json(state.engine.activities(limit).await?).into_response())
}

async fn submit_activity(State(state): State<AppState>, Json(event): Json<ActivityEvent>) -> ApiResult {
    state.engine.submit(event)?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "queued": true }))).into_response())
}

async fn list_signals(State(state): State<AppState>) -> ApiResult {
    Ok(Json(state.engine.signals().await?).into_response())
}

async fn list_relations(State(state): State<AppState>) -> ApiResult {
    Ok(Json(state.engine.relations().await?).into_response())
}

async fn network_graph(State(state): State<AppState>) -> ApiResult {
    Ok(Json(state.engine.graph().await?).into_response())
}

async fn coin_report(State(state): State<AppState>, Path(token): Path<String>) -> ApiResult {
    Ok(Json(state.engine.report(&token).await?).into_response())
}

async fn get_policy(State(state): State<AppState>) -> ApiResult {
    Ok(Json(state.engine.policy().await?).into_response())
}

async fn update_policy(State(state): State<AppState>, Json(update): Json<PolicyUpdate>) -> ApiResult {
    Ok(Json(state.engine.update_policy(update).await?).into_response())
}

async fn trigger_auto_buy(State(state): State<AppState>, Path(signal_id): Path<String>) -> ApiResult {
    Ok(match state.engine.auto_buy(&signal_id).await? {
        Some(decision) => Json(decision).into_response(),
        None => not_found("signal", &signal_id),
    })
}

async fn list_executions(State(state): State<AppState>) -> ApiResult {
    Ok(Json(state.engine.executions().await?).into_response())
}

async fn status(State(state): State<AppState>) -> ApiResult {
    Ok(Json(state.engine.status().await?).into_response())
}
