//! HTTP routes
//!
//! - `GET /health` - JSON liveness and counters
//! - `POST /query` - bincode `QueryEnvelope` in, bincode `QueryResponse` out
//! - `GET /metrics` - Prometheus text (only from [`create_router_with_metrics`])

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use fog_view_core::constants::PROTOCOL_VERSION;
use fog_view_core::QueryEnvelope;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::state::SharedState;

pub const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub protocol_version: u16,
    pub uptime_secs: u64,
    pub queries_served: u64,
}

pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/query", post(query))
        .with_state(state)
}

pub fn create_router_with_metrics(state: SharedState, handle: PrometheusHandle) -> Router {
    create_router(state).route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    )
}

async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        protocol_version: PROTOCOL_VERSION,
        uptime_secs: state.uptime_secs(),
        queries_served: state.queries_served(),
    })
}

async fn query(State(state): State<SharedState>, body: Bytes) -> Result<impl IntoResponse> {
    let envelope = QueryEnvelope::from_bytes(&body)?;
    let response = state
        .reconciler
        .resolve(&envelope.aad, &envelope.request)
        .await?;
    state.count_query();

    let bytes = response.to_bytes()?;
    Ok(([(header::CONTENT_TYPE, OCTET_STREAM)], bytes))
}
