use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, warn};
use uuid::Uuid;

use relay_core::domain::event::{Event, EventKind, EventSource, StoreId};
use relay_db::repositories::{EventRepository, SqlEventRepository};
use relay_engine::{Orchestrator, OrchestratorError};

#[derive(Clone)]
pub struct IngestState {
    pub orchestrator: Arc<Orchestrator>,
    pub events: Arc<SqlEventRepository>,
}

/// Inbound envelope from the webhook bridge. Ids are caller-supplied
/// where the upstream has them; otherwise one is minted here and
/// idempotency degrades to per-delivery.
#[derive(Debug, Deserialize)]
pub struct IngestEnvelope {
    pub id: Option<String>,
    pub store_id: String,
    pub external_event_id: Option<String>,
    pub kind: String,
    pub source: Option<String>,
    #[serde(default)]
    pub payload: Value,
    pub received_at: Option<DateTime<Utc>>,
}

pub fn router(state: IngestState) -> Router {
    Router::new().route("/events/ingest", post(ingest_event)).with_state(state)
}

/// 202 when the event was fully handled (agent failures are visible in
/// run records, not here); 500 when context construction failed so the
/// upstream redelivers.
pub async fn ingest_event(
    State(state): State<IngestState>,
    Json(envelope): Json<IngestEnvelope>,
) -> (StatusCode, Json<Value>) {
    let Some(kind) = EventKind::parse(&envelope.kind) else {
        warn!(kind = %envelope.kind, "rejected event with unknown kind");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("unknown event kind `{}`", envelope.kind)})),
        );
    };

    let source = match envelope.source.as_deref() {
        Some(raw) => match EventSource::parse(raw) {
            Some(source) => source,
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": format!("unknown event source `{raw}`")})),
                );
            }
        },
        None => EventSource::Platform,
    };

    let event = Event {
        id: envelope.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        store_id: StoreId(envelope.store_id),
        external_event_id: envelope.external_event_id,
        kind,
        source,
        payload: envelope.payload,
        received_at: envelope.received_at.unwrap_or_else(Utc::now),
        processed_at: None,
    };

    if let Err(persist_error) = state.events.save(event.clone()).await {
        error!(event_id = %event.id, error = %persist_error, "failed to persist inbound event");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "event persistence failed"})),
        );
    }

    match state.orchestrator.process_event(&event).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({"status": "accepted", "event_id": event.id}))),
        Err(OrchestratorError::StoreNotFound(store_id)) => {
            warn!(event_id = %event.id, store_id = %store_id, "event for unknown store");
            (
                StatusCode::NOT_FOUND,
                Json(json!({"error": format!("store not found: {store_id}")})),
            )
        }
        Err(pipeline_error) => {
            error!(event_id = %event.id, error = %pipeline_error, "event processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "event processing failed, safe to redeliver"})),
            )
        }
    }
}
