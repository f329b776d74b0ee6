//! HTTP API.
//!
//! - `GET /health` : liveness plus pipeline state
//! - `POST /events` : queue an event on the broker
//! - `GET /events?limit=N` : most recent persisted events
//! - `GET /stream` : Server-Sent Events, one `new_event` per persisted event

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::bus::{BrokerSession, BusError};
use crate::event::{IncomingEvent, StoredEvent};
use crate::handlers::fanout::LiveFanout;
use crate::pipeline::PipelineCoordinator;
use crate::storage::helpers::validate_event_type;
use crate::storage::{EventStore, StorageError, DEFAULT_LIST_LIMIT};

const SERVER_HELLO: &str = "server_hello";
const NEW_EVENT: &str = "new_event";

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<BrokerSession>,
    pub store: Arc<dyn EventStore>,
    pub fanout: Arc<LiveFanout>,
    pub coordinator: Arc<PipelineCoordinator>,
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve<F>(
    state: AppState,
    addr: &str,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "HTTP API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Build the axum router (separated for testing).
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/events", get(list_events).post(ingest_event))
        .route("/stream", get(stream))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

/// Error returned by a handler, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    InvalidEvent(String),
    Unavailable(String),
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidEvent(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::InvalidEvent(m) | ApiError::Unavailable(m) | ApiError::Internal(m) => m,
        }
    }
}

impl From<BusError> for ApiError {
    fn from(e: BusError) -> Self {
        match e {
            BusError::NotStarted | BusError::BrokerUnavailable(_) | BusError::Closed => {
                ApiError::Unavailable(e.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidEventType(_) => ApiError::InvalidEvent(e.to_string()),
            StorageError::Unavailable(_) => ApiError::Unavailable(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.message() }))).into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    pipeline: &'static str,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        pipeline: state.coordinator.state().as_str(),
    })
}

#[derive(Serialize)]
struct IngestResponse {
    status: &'static str,
}

async fn ingest_event(
    State(state): State<AppState>,
    Json(event): Json<IncomingEvent>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    validate_event_type(&event.event_type)?;

    state.session.publish(&event).await.map_err(|e| {
        error!(event_type = %event.event_type, error = %e, "Failed to publish event");
        ApiError::from(e)
    })?;

    Ok((StatusCode::ACCEPTED, Json(IngestResponse { status: "queued" })))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<usize>,
}

async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<StoredEvent>>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let events = state.store.list_recent(limit).await.map_err(|e| {
        error!(error = %e, "Failed to list events");
        ApiError::from(e)
    })?;
    Ok(Json(events))
}

async fn stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let subscription = state.fanout.subscribe().await;
    debug!(subscriber_id = subscription.id(), "Stream client connected");

    let hello = futures::stream::once(async {
        Ok::<_, Infallible>(
            SseEvent::default()
                .event(SERVER_HELLO)
                .data(json!({ "message": "connected" }).to_string()),
        )
    });

    let events = subscription.filter_map(|event| async move {
        match serde_json::to_string(&*event) {
            Ok(data) => Some(Ok::<_, Infallible>(
                SseEvent::default()
                    .event(NEW_EVENT)
                    .id(event.id.to_string())
                    .data(data),
            )),
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Failed to serialize event for stream");
                None
            }
        }
    });

    Sse::new(hello.chain(events)).keep_alive(KeepAlive::default())
}
