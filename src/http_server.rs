// HTTP Read API
// Serves room statistics as plain text, aggregated JSON and raw sample JSON

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    contracts::Sample,
    error::PingStatError,
    observability::{get_metrics, with_trace_id},
    services::{render_text_report, RoomStatsReport, StatsService},
    window::WindowQuery,
};

static SERVER_START_TIME: once_cell::sync::Lazy<Instant> = once_cell::sync::Lazy::new(Instant::now);

pub const MISSING_ROOM_ID: &str = "Room ID query param missing";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    stats: StatsService,
}

impl AppState {
    pub fn new(stats: StatsService) -> Self {
        Self { stats }
    }
}

/// Query parameters accepted by every stats endpoint
#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {
    pub room_id: Option<String>,
    #[serde(flatten)]
    pub window: WindowQuery,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub metrics: serde_json::Value,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(err: PingStatError) -> ApiError {
    let status = match &err {
        PingStatError::InvalidObservation { .. } => StatusCode::BAD_REQUEST,
        PingStatError::InvalidSample { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.kind().to_string(),
            message: err.to_string(),
        }),
    )
}

fn require_room_id(params: &StatsParams) -> Result<String, ApiError> {
    params
        .room_id
        .clone()
        .filter(|room_id| !room_id.is_empty())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "missing_room_id".to_string(),
                    message: MISSING_ROOM_ID.to_string(),
                }),
            )
        })
}

/// Create HTTP server with all routes configured
pub fn create_server(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats_text))
        .route("/stats.json", get(stats_json))
        .route("/stats.raw.json", get(stats_raw_json))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// Start the HTTP server on `addr` (e.g. `0.0.0.0:8080`)
pub async fn start_server(state: AppState, addr: &str) -> Result<()> {
    let app = create_server(state);
    let listener = TcpListener::bind(addr).await?;

    info!("pingstat HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: SERVER_START_TIME.elapsed().as_secs(),
        metrics: get_metrics(),
    })
}

async fn room_report(state: &AppState, params: &StatsParams) -> Result<RoomStatsReport, ApiError> {
    let room_id = require_room_id(params)?;
    with_trace_id("room_stats", state.stats.room_stats(&room_id, &params.window))
        .await
        .map_err(error_response)
}

/// Ranked plain-text report
async fn stats_text(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<String, ApiError> {
    let report = room_report(&state, &params).await?;
    Ok(render_text_report(&report))
}

/// Aggregated room summary with disclaimer
async fn stats_json(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<RoomStatsReport>, ApiError> {
    Ok(Json(room_report(&state, &params).await?))
}

/// Unaggregated samples, oldest first
async fn stats_raw_json(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<Vec<Sample>>, ApiError> {
    let room_id = require_room_id(&params)?;
    let samples = with_trace_id("raw_samples", state.stats.raw_samples(&room_id, &params.window))
        .await
        .map_err(error_response)?;
    Ok(Json(samples))
}
