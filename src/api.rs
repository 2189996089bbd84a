//! HTTP control surface and WebSocket push.
//!
//! Thin wrappers over the pipeline:
//! - lifecycle: start/stop/status
//! - queries: paginated flows and responses, last-hour metrics
//! - testing: generate one batch, ingest a batch file
//! - push: `/ws` forwards every broadcast event to connected dashboards

use crate::error::PipelineError;
use crate::pipeline::Pipeline;
use crate::publisher::{ChannelPublisher, PushEvent};
use crate::record::Verdict;
use crate::store::{FlowFilter, ResponseFilter};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

const PER_PAGE_DEFAULT: usize = 20;
const PER_PAGE_MAX: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub publisher: Arc<ChannelPublisher>,
}

/// Generic API response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }
    }
}

fn bad_request(msg: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<Value>::error(msg)),
    )
        .into_response()
}

fn internal_error(err: &PipelineError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<Value>::error(&err.to_string())),
    )
        .into_response()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/api/system/start", post(handle_start))
        .route("/api/system/stop", post(handle_stop))
        .route("/api/system/status", get(handle_status))
        .route("/api/events", get(handle_events))
        .route("/api/responses", get(handle_responses))
        .route("/api/metrics", get(handle_metrics))
        .route("/api/generate", post(handle_generate))
        .route("/api/ingest", post(handle_ingest))
        .route("/ws", get(handle_ws))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Lifecycle handlers
// ============================================================================

async fn handle_health(State(state): State<AppState>) -> Json<ApiResponse<Value>> {
    let counts = state.pipeline.store().counts().await;
    Json(ApiResponse::success(serde_json::json!({
        "status": "ok",
        "records": counts.total_flows + counts.total_responses,
    })))
}

async fn handle_start(State(state): State<AppState>) -> Response {
    match state.pipeline.start() {
        Ok(()) => Json(ApiResponse::success(state.pipeline.statistics().await)).into_response(),
        Err(err) => bad_request(&err.to_string()),
    }
}

async fn handle_stop(State(state): State<AppState>) -> Response {
    match state.pipeline.stop().await {
        Ok(()) => Json(ApiResponse::success(state.pipeline.statistics().await)).into_response(),
        Err(err) => bad_request(&err.to_string()),
    }
}

async fn handle_status(State(state): State<AppState>) -> Json<ApiResponse<Value>> {
    Json(ApiResponse::success(state.pipeline.statistics().await))
}

// ============================================================================
// Query handlers
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
    /// "normal" or "anomalous".
    #[serde(rename = "type")]
    pub verdict: Option<String>,
    pub ip: Option<String>,
}

fn clamp_paging(page: Option<usize>, per_page: Option<usize>) -> (usize, usize) {
    (
        page.unwrap_or(1).max(1),
        per_page.unwrap_or(PER_PAGE_DEFAULT).clamp(1, PER_PAGE_MAX),
    )
}

async fn handle_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Response {
    let verdict = match query.verdict.as_deref() {
        None => None,
        Some("normal") => Some(Verdict::Normal),
        Some("anomalous") => Some(Verdict::Anomalous),
        Some(other) => return bad_request(&format!("unknown event type: {other}")),
    };

    let (page, per_page) = clamp_paging(query.page, query.per_page);
    let filter = FlowFilter {
        verdict,
        ip: query.ip,
        since: None,
    };
    let result = state.pipeline.store().list_flows(filter, page, per_page).await;

    Json(ApiResponse::success(serde_json::json!({
        "events": result.items,
        "pagination": {
            "page": result.page,
            "per_page": result.per_page,
            "total": result.total,
            "pages": result.page_count(),
        },
    })))
    .into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponsesQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
    /// Anomaly category, matched against either stage.
    #[serde(rename = "type")]
    pub category: Option<String>,
    /// "success" or "failed".
    pub status: Option<String>,
}

async fn handle_responses(
    State(state): State<AppState>,
    Query(query): Query<ResponsesQuery>,
) -> Response {
    let success = match query.status.as_deref() {
        None => None,
        Some("success") => Some(true),
        Some("failed") => Some(false),
        Some(other) => return bad_request(&format!("unknown status filter: {other}")),
    };

    let (page, per_page) = clamp_paging(query.page, query.per_page);
    let filter = ResponseFilter {
        category: query.category,
        success,
    };
    let result = state
        .pipeline
        .store()
        .list_responses(filter, page, per_page)
        .await;

    Json(ApiResponse::success(serde_json::json!({
        "responses": result.items,
        "pagination": {
            "page": result.page,
            "per_page": result.per_page,
            "total": result.total,
            "pages": result.page_count(),
        },
    })))
    .into_response()
}

async fn handle_metrics(State(state): State<AppState>) -> Json<ApiResponse<Value>> {
    Json(ApiResponse::success(state.pipeline.metrics().await))
}

// ============================================================================
// Testing surface
// ============================================================================

async fn handle_generate(State(state): State<AppState>) -> Response {
    match state.pipeline.generate_once().await {
        Ok(summary) => Json(ApiResponse::success(summary)).into_response(),
        Err(err) => internal_error(&err),
    }
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub path: String,
}

async fn handle_ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Response {
    match state.pipeline.ingest_file(&request.path).await {
        Ok(summary) => Json(ApiResponse::success(summary)).into_response(),
        Err(err @ (PipelineError::BatchRead { .. } | PipelineError::BatchParse { .. })) => {
            bad_request(&err.to_string())
        }
        Err(err) => internal_error(&err),
    }
}

// ============================================================================
// WebSocket push
// ============================================================================

async fn handle_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.publisher.subscribe();

    // New subscribers get a stats snapshot before the event stream.
    let snapshot = PushEvent::StatsUpdate(state.pipeline.statistics().await);
    if let Ok(payload) = serde_json::to_string(&snapshot) {
        if sender.send(Message::Text(payload.into())).await.is_err() {
            return;
        }
    }

    debug!("dashboard subscriber connected");

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let Ok(payload) = serde_json::to_string(&event) else {
                            continue;
                        };
                        if sender.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    // Best effort: a lagging subscriber just misses events.
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "slow dashboard subscriber dropped events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Inbound frames are ignored; the stream is one-way.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    debug!("dashboard subscriber disconnected");
}
