//! Read-only consumer API over persisted indicator rows, using Axum

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Json, Response},
    routing::get,
    Router,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, Level};

use crate::db::{IndicatorStore, StoreError};
use crate::metrics::Metrics;
use crate::models::IndicatorRow;

/// Default window for range queries without `start`.
const DEFAULT_RANGE_DAYS: i64 = 90;

#[derive(Clone)]
pub struct AppState {
    pub health: Arc<RwLock<HealthStatus>>,
    pub metrics: Arc<Metrics>,
    pub start_time: Arc<Instant>,
    pub store: Option<Arc<dyn IndicatorStore>>,
}

#[derive(Clone, Debug)]
pub struct HealthStatus {
    pub status: String,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }
}

pub async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let health = state.health.read().await;
    let uptime_seconds = state.start_time.elapsed().as_secs();
    Ok(Json(json!({
        "status": health.status,
        "uptime_seconds": uptime_seconds,
        "store": state.store.as_ref().map(|s| s.name()),
        "service": "tickerlens-api"
    })))
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics
        .export()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn metrics_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    state.metrics.http_requests_in_flight.inc();
    let response = next.run(request).await;
    state.metrics.http_requests_in_flight.dec();

    let status = response.status();
    let duration = start.elapsed();
    state.metrics.http_requests_total.inc();
    state
        .metrics
        .http_request_duration_seconds
        .observe(duration.as_secs_f64());

    if status.is_server_error() {
        error!(
            method = %method,
            path = %path,
            status = %status,
            duration_ms = duration.as_millis() as u64,
            "HTTP request error"
        );
    }

    response
}

#[derive(Debug, Deserialize)]
struct RangeQuery {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

fn store_of(state: &AppState) -> Result<&Arc<dyn IndicatorStore>, StatusCode> {
    state.store.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

fn store_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Start of the default window ending at `end`; `None` below the date range.
fn default_start(end: NaiveDate) -> Option<NaiveDate> {
    end.checked_sub_signed(Duration::days(DEFAULT_RANGE_DAYS))
}

/// Rows for one instrument over `start..=end`, ascending.
async fn list_indicators(
    State(state): State<AppState>,
    Path(instrument_id): Path<String>,
    Query(params): Query<RangeQuery>,
) -> Result<Json<Vec<IndicatorRow>>, StatusCode> {
    let store = store_of(&state)?;
    let instrument_id = instrument_id.to_uppercase();
    let end = params.end.unwrap_or_else(|| Utc::now().date_naive());
    let start = match params.start {
        Some(start) => start,
        None => default_start(end).ok_or(StatusCode::BAD_REQUEST)?,
    };
    if start > end {
        return Err(StatusCode::BAD_REQUEST);
    }

    let rows = store.read(&instrument_id, start, end).await.map_err(|e| {
        error!(error = %e, instrument_id = %instrument_id, "Failed to read indicator rows");
        store_status(&e)
    })?;
    Ok(Json(rows))
}

/// Single row; 404 when nothing is stored for that day.
async fn get_indicator(
    State(state): State<AppState>,
    Path((instrument_id, date)): Path<(String, NaiveDate)>,
) -> Result<Json<IndicatorRow>, StatusCode> {
    let store = store_of(&state)?;
    let instrument_id = instrument_id.to_uppercase();
    let row = store.read_one(&instrument_id, date).await.map_err(|e| {
        error!(error = %e, instrument_id = %instrument_id, %date, "Failed to read indicator row");
        store_status(&e)
    })?;
    row.map(Json).ok_or(StatusCode::NOT_FOUND)
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/indicators/{instrument_id}", get(list_indicators))
        .route("/api/indicators/{instrument_id}/{date}", get(get_indicator))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                        .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
                )
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    metrics_middleware,
                ))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub async fn start_server(
    port: u16,
    store: Option<Arc<dyn IndicatorStore>>,
    metrics: Arc<Metrics>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    metrics
        .database_connected
        .set(i64::from(store.is_some()));

    let state = AppState {
        health: Arc::new(RwLock::new(HealthStatus::default())),
        metrics,
        start_time: Arc::new(Instant::now()),
        store,
    };
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!(port = port, "HTTP server listening on port {}", port);
    info!(
        "Metrics endpoint available at http://0.0.0.0:{}/metrics",
        port
    );
    axum::serve(listener, app).await?;

    Ok(())
}
