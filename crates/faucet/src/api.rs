//! HTTP API for faucet service

use crate::error::{FaucetError, FaucetResult};
use crate::ledger::utc_timestamp;
use crate::service::{
    AddressReport, FaucetService, FundingRequest, FundingResponse, HealthReport, HealthStatus,
    HistoryReport, ReadinessReport, StatsReport, SyncReport,
};
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// Build the faucet router with tracing and, when enabled, CORS
pub fn router(service: Arc<FaucetService>) -> Router {
    let config = service.config().clone();

    let mut app = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/live", get(live_handler))
        .route("/stats", get(stats_handler))
        .route("/history", get(history_handler))
        .route("/request", post(request_handler))
        .route("/address", get(address_handler))
        .route("/sync", post(sync_handler));

    if config.metrics_enabled {
        app = app.route("/metrics", get(metrics_handler));
    }

    let mut app = app.with_state(service).layer(TraceLayer::new_for_http());

    if config.cors_enabled {
        app = app.layer(cors_layer(&config.allowed_origins));
        info!("CORS enabled for {:?}", config.allowed_origins);
    }

    app
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin: {}", o);
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Funding request handler
pub async fn request_handler(
    State(service): State<Arc<FaucetService>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    payload: Result<Json<FundingRequest>, JsonRejection>,
) -> FaucetResult<Json<FundingResponse>> {
    let Json(request) = payload.map_err(|e| FaucetError::InvalidRequest(e.body_text()))?;

    match service.request_funds(request, addr.ip()).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            error!("Funding request from {} failed: {}", addr, e);
            Err(e)
        }
    }
}

/// Health check handler; 503 when unhealthy
pub async fn health_handler(
    State(service): State<Arc<FaucetService>>,
) -> (StatusCode, Json<HealthReport>) {
    let report = service.health().await;
    let status = match report.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    };
    (status, Json(report))
}

pub async fn ready_handler(
    State(service): State<Arc<FaucetService>>,
) -> (StatusCode, Json<ReadinessReport>) {
    let report = service.readiness().await;
    let status = if report.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

pub async fn live_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "alive": true,
        "timestamp": utc_timestamp()
    }))
}

pub async fn stats_handler(State(service): State<Arc<FaucetService>>) -> Json<StatsReport> {
    Json(service.stats().await)
}

pub async fn history_handler(
    State(service): State<Arc<FaucetService>>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryReport> {
    Json(service.history(query.limit).await)
}

pub async fn address_handler(State(service): State<Arc<FaucetService>>) -> Json<AddressReport> {
    Json(service.address().await)
}

pub async fn sync_handler(
    State(service): State<Arc<FaucetService>>,
) -> FaucetResult<Json<SyncReport>> {
    service.sync().await.map(Json)
}

pub async fn metrics_handler(State(service): State<Arc<FaucetService>>) -> FaucetResult<impl IntoResponse> {
    let body = service.render_metrics()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

/// Root handler with info
pub async fn root_handler(State(service): State<Arc<FaucetService>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "Regtest Faucet",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "network": service.config().chain,
        "endpoints": {
            "GET /health": "Node and wallet health",
            "GET /ready": "Readiness probe",
            "GET /live": "Liveness probe",
            "GET /stats": "Faucet statistics",
            "GET /history": "Recent transactions (?limit=)",
            "POST /request": "Request funds {address, amount?, memo?}",
            "GET /address": "Faucet receiving address",
            "POST /sync": "Synchronize the faucet wallet",
            "GET /metrics": "Prometheus metrics"
        }
    }))
}
