//! Inbound webhook surface for the media server: verify, parse,
//! deduplicate, dispatch. Delivery is at-least-once and concurrent, so
//! every applied event is recorded in a ledger keyed by event identity,
//! and redeliveries are reported as duplicates without reapplying side
//! effects.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::post;
use axum::Router;
use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::RwLock;
use uuid::Uuid;

pub mod events;
pub mod verify;

use crate::audit::{AuditEvent, AuditKind, AuditSink};
use crate::meet::recording::RecordingOrchestrator;
use crate::meet::room::RoomService;
use crate::shared::error::{error_response, MeetError};
use crate::shared::models::{session_id_for_room_name, EventOutcome, WebhookEvent};
use crate::shared::state::AppState;
use events::MediaEvent;
use verify::SignatureVerifier;

pub struct WebhookIngestor {
    verifier: SignatureVerifier,
    ledger: RwLock<HashMap<String, WebhookEvent>>,
    rooms: Arc<RoomService>,
    recordings: Arc<RecordingOrchestrator>,
    audit: Arc<dyn AuditSink>,
}

impl WebhookIngestor {
    pub fn new(
        verifier: SignatureVerifier,
        rooms: Arc<RoomService>,
        recordings: Arc<RecordingOrchestrator>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            verifier,
            ledger: RwLock::new(HashMap::new()),
            rooms,
            recordings,
            audit,
        }
    }

    /// Single entry point for both webhook routes. Verification failures
    /// abort before parsing and leave no trace; once an event is verified,
    /// processing problems are recorded internally and the delivery is
    /// still acknowledged, so the sender does not retry forever.
    pub async fn handle_event(
        &self,
        body: &[u8],
        auth_header: Option<&str>,
    ) -> Result<EventOutcome, MeetError> {
        self.verifier.verify(body, auth_header)?;

        let event: MediaEvent = serde_json::from_slice(body)
            .map_err(|e| MeetError::Validation(format!("unparseable webhook payload: {e}")))?;

        let identity = event.identity();
        {
            // Reserving the ledger slot before dispatch serializes
            // concurrent deliveries of the same event: the loser of the
            // race observes the reservation and reports the duplicate.
            let mut ledger = self.ledger.write().await;
            if ledger.contains_key(&identity) {
                info!("Duplicate webhook event {identity} ({})", event.event);
                self.audit
                    .record(AuditEvent::new(
                        AuditKind::DuplicateEvent,
                        &identity,
                        &event.event,
                    ))
                    .await;
                return Ok(EventOutcome::Duplicate);
            }
            ledger.insert(
                identity.clone(),
                WebhookEvent {
                    id: identity.clone(),
                    event_type: event.event.clone(),
                    received_at: Utc::now(),
                    processed_at: None,
                    outcome: EventOutcome::Accepted,
                },
            );
        }

        match self.dispatch(&event).await {
            Ok(outcome) => {
                let mut ledger = self.ledger.write().await;
                if let Some(entry) = ledger.get_mut(&identity) {
                    entry.processed_at = Some(Utc::now());
                    entry.outcome = outcome;
                }
                Ok(outcome)
            }
            Err(e) => {
                if matches!(e, MeetError::Validation(_)) {
                    // Permanently malformed past verification: keep the
                    // ledger entry so redeliveries of the same bad event
                    // short-circuit instead of failing again.
                    warn!("Webhook event {identity} rejected: {e}");
                    let mut ledger = self.ledger.write().await;
                    if let Some(entry) = ledger.get_mut(&identity) {
                        entry.processed_at = Some(Utc::now());
                        entry.outcome = EventOutcome::Rejected;
                    }
                    return Ok(EventOutcome::Rejected);
                }
                // Release the reservation so the sender's redelivery gets
                // another chance at applying the event.
                self.ledger.write().await.remove(&identity);
                warn!("Webhook event {identity} failed to process: {e}");
                self.audit
                    .record(AuditEvent::new(
                        AuditKind::UpstreamFailure,
                        &identity,
                        format!("webhook processing failed: {e}"),
                    ))
                    .await;
                Ok(EventOutcome::Accepted)
            }
        }
    }

    async fn dispatch(&self, event: &MediaEvent) -> Result<EventOutcome, MeetError> {
        match event.event.as_str() {
            "room_started" => {
                if let Some(name) = event.room_name() {
                    if let Err(e) = self.rooms.mark_active(name).await {
                        warn!("Ignoring room_started: {e}");
                    }
                }
                Ok(EventOutcome::Accepted)
            }
            "room_finished" => {
                if let Some(name) = event.room_name() {
                    if let Some(room_id) = self.rooms.mark_ended(name).await {
                        self.recordings.finalize_room(room_id).await;
                    }
                }
                Ok(EventOutcome::Accepted)
            }
            "participant_joined" => {
                if let (Some(name), Some(p)) = (event.room_name(), event.participant.as_ref()) {
                    self.rooms.participant_joined(name, &p.identity).await;
                }
                Ok(EventOutcome::Accepted)
            }
            "participant_left" => {
                if let (Some(name), Some(p)) = (event.room_name(), event.participant.as_ref()) {
                    self.rooms.participant_left(name, &p.identity).await;
                }
                Ok(EventOutcome::Accepted)
            }
            "egress_started" => {
                let (egress, room_id) = self.egress_context(event).await?;
                if let Err(e) = self
                    .recordings
                    .on_egress_started(room_id, &egress.egress_id, egress.file_path.clone())
                    .await
                {
                    warn!("Ignoring egress_started: {e}");
                }
                Ok(EventOutcome::Accepted)
            }
            "egress_ended" => {
                let (egress, room_id) = self.egress_context(event).await?;
                if let Err(e) = self
                    .recordings
                    .on_egress_ended(room_id, &egress.egress_id, egress.file_path.clone())
                    .await
                {
                    warn!("Ignoring egress_ended: {e}");
                }
                Ok(EventOutcome::Accepted)
            }
            "egress_failed" => {
                let (egress, room_id) = self.egress_context(event).await?;
                let reason = egress.error.as_deref().unwrap_or("egress failed upstream");
                if let Err(e) = self
                    .recordings
                    .on_egress_failed(room_id, &egress.egress_id, reason)
                    .await
                {
                    warn!("Ignoring egress_failed: {e}");
                }
                Ok(EventOutcome::Accepted)
            }
            other => {
                debug!("Ignoring unrecognized webhook event type {other}");
                Ok(EventOutcome::Ignored)
            }
        }
    }

    /// Resolves the egress payload and its room. Egress events for rooms
    /// this service does not track cannot be applied.
    async fn egress_context(
        &self,
        event: &MediaEvent,
    ) -> Result<(events::EgressPayload, Uuid), MeetError> {
        let egress = event
            .egress_info
            .clone()
            .ok_or_else(|| MeetError::Validation("egress event without egressInfo".to_string()))?;
        let room_name = event
            .room_name()
            .ok_or_else(|| MeetError::Validation("egress event without room name".to_string()))?;
        let session_id = session_id_for_room_name(room_name)
            .ok_or_else(|| MeetError::State(format!("unrecognized room name {room_name}")))?;
        let room = self
            .rooms
            .get_room(session_id)
            .await
            .ok_or_else(|| MeetError::State(format!("egress event for unknown room {room_name}")))?;
        Ok((egress, room.id))
    }

    pub async fn ledger_entry(&self, identity: &str) -> Option<WebhookEvent> {
        self.ledger.read().await.get(identity).cloned()
    }
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhooks/room-events", post(handle_webhook))
        .route("/webhooks/recording", post(handle_webhook))
}

async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    // Some server versions send `Authorize` instead of `Authorization`.
    let auth = headers
        .get(header::AUTHORIZATION)
        .or_else(|| headers.get("Authorize"))
        .and_then(|v| v.to_str().ok());

    match state.ingestor.handle_event(&body, auth).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(serde_json::json!({ "outcome": outcome })),
        ),
        Err(e) => error_response(&e),
    }
}
