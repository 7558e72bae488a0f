//! End-to-end flow across the webhook ingestor, room lifecycle manager,
//! recording orchestrator, and token issuer, with the media server and
//! booking system replaced by fakes.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use meetserver::audit::LogAuditSink;
use meetserver::booking::InMemorySessionDirectory;
use meetserver::meet::media::MediaServerClient;
use meetserver::meet::recording::RecordingOrchestrator;
use meetserver::meet::room::RoomService;
use meetserver::meet::storage::LocalDiskStorage;
use meetserver::meet::token::TokenIssuer;
use meetserver::config::{MediaServerConfig, TokenConfig};
use meetserver::shared::error::MeetError;
use meetserver::shared::models::{
    EventOutcome, RecordingStatus, RoomStatus, SessionInfo,
};
use meetserver::shared::retry::RetryPolicy;
use meetserver::webhooks::verify::SignatureVerifier;
use meetserver::webhooks::WebhookIngestor;

struct FakeMediaServer;

#[async_trait]
impl MediaServerClient for FakeMediaServer {
    async fn create_room(&self, _room_name: &str) -> Result<(), MeetError> {
        Ok(())
    }
    async fn terminate_room(&self, _room_name: &str) -> Result<(), MeetError> {
        Ok(())
    }
}

struct Harness {
    rooms: Arc<RoomService>,
    recordings: Arc<RecordingOrchestrator>,
    ingestor: WebhookIngestor,
    signer: SignatureVerifier,
    tokens: TokenIssuer,
    _storage_dir: tempfile::TempDir,
}

const SECRET: &str = "test-webhook-secret";

async fn harness() -> Harness {
    let booking = Arc::new(InMemorySessionDirectory::new());
    booking
        .insert(SessionInfo {
            session_id: "sess-1".to_string(),
            mentor_id: "mentor-1".to_string(),
            mentee_id: "mentee-1".to_string(),
            scheduled_start: Utc::now(),
        })
        .await;

    let audit = Arc::new(LogAuditSink);
    let retries = RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        jitter_factor: 0.0,
    };
    let rooms = Arc::new(RoomService::new(
        Arc::new(FakeMediaServer),
        booking.clone(),
        audit.clone(),
        retries.clone(),
    ));
    let storage_dir = tempfile::tempdir().unwrap();
    let recordings = RecordingOrchestrator::new(
        Arc::new(LocalDiskStorage::new(storage_dir.path())),
        audit.clone(),
        retries,
        1,
    );
    let ingestor = WebhookIngestor::new(
        SignatureVerifier::new(SECRET),
        rooms.clone(),
        recordings.clone(),
        audit.clone(),
    );
    let tokens = TokenIssuer::new(
        &MediaServerConfig {
            url: "http://localhost:7880".to_string(),
            api_key: "devkey".to_string(),
            api_secret: "api-secret".to_string(),
        },
        &TokenConfig {
            ttl: Duration::from_secs(24 * 60 * 60),
        },
        booking,
        rooms.clone(),
        audit,
    );

    Harness {
        rooms,
        recordings,
        ingestor,
        signer: SignatureVerifier::new(SECRET),
        tokens,
        _storage_dir: storage_dir,
    }
}

impl Harness {
    async fn deliver(&self, body: &str) -> Result<EventOutcome, MeetError> {
        let sig = self.signer.sign(body.as_bytes());
        self.ingestor
            .handle_event(body.as_bytes(), Some(&sig))
            .await
    }

    async fn wait_terminal(&self, egress_id: &str) -> meetserver::shared::models::RecordingJob {
        for _ in 0..200 {
            if let Some(job) = self.recordings.get_job(egress_id).await {
                if job.status.is_terminal() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("recording {egress_id} never reached a terminal state");
    }
}

fn artifact_in(dir: &tempfile::TempDir) -> String {
    let path = dir.path().join("egress.mp4");
    std::fs::write(&path, b"recorded frames").unwrap();
    path.to_string_lossy().into_owned()
}

#[tokio::test]
async fn full_session_lifecycle_with_recording() {
    let h = harness().await;
    let work_dir = tempfile::tempdir().unwrap();
    let artifact = artifact_in(&work_dir);

    let room = h.rooms.create_room("sess-1").await.unwrap();
    assert_eq!(room.external_room_name, "session-sess-1");

    // The server confirms the room and both participants join.
    let outcome = h
        .deliver(r#"{"event":"room_started","id":"EV_1","room":{"name":"session-sess-1"}}"#)
        .await
        .unwrap();
    assert_eq!(outcome, EventOutcome::Accepted);
    for (id, user) in [("EV_2", "mentor-1"), ("EV_3", "mentee-1")] {
        h.deliver(&format!(
            r#"{{"event":"participant_joined","id":"{id}","room":{{"name":"session-sess-1"}},"participant":{{"identity":"{user}"}}}}"#
        ))
        .await
        .unwrap();
    }
    let room = h.rooms.get_room("sess-1").await.unwrap();
    assert_eq!(room.status, RoomStatus::Active);
    assert_eq!(room.participants.len(), 2);

    // A token can be issued while the window is open.
    let token = h.tokens.issue_token("sess-1", "mentee-1").await.unwrap();
    assert_eq!(token.room_name, "session-sess-1");
    assert!(!token.permissions.room_admin);

    // Recording starts and finishes; the artifact lands in storage.
    h.deliver(
        r#"{"event":"egress_started","id":"EV_4","egressInfo":{"egressId":"EG_1","roomName":"session-sess-1"}}"#,
    )
    .await
    .unwrap();
    h.deliver(&format!(
        r#"{{"event":"egress_ended","id":"EV_5","egressInfo":{{"egressId":"EG_1","roomName":"session-sess-1","filePath":"{artifact}"}}}}"#
    ))
    .await
    .unwrap();

    let job = h.wait_terminal("EG_1").await;
    assert_eq!(job.status, RecordingStatus::Completed);
    assert!(job.storage_url.is_some());
    assert!(!Path::new(&artifact).exists(), "temp artifact must be gone");

    // Room finishes; participants are marked left.
    h.deliver(r#"{"event":"room_finished","id":"EV_6","room":{"name":"session-sess-1"}}"#)
        .await
        .unwrap();
    let room = h.rooms.get_room("sess-1").await.unwrap();
    assert_eq!(room.status, RoomStatus::Ended);
    assert!(room.participants.iter().all(|p| p.left_at.is_some()));
}

#[tokio::test]
async fn redelivered_event_is_reported_duplicate_without_side_effects() {
    let h = harness().await;
    h.rooms.create_room("sess-1").await.unwrap();

    let body = r#"{"event":"participant_joined","id":"EV_7","room":{"name":"session-sess-1"},"participant":{"identity":"mentor-1"}}"#;
    assert_eq!(h.deliver(body).await.unwrap(), EventOutcome::Accepted);
    assert_eq!(h.deliver(body).await.unwrap(), EventOutcome::Duplicate);

    let room = h.rooms.get_room("sess-1").await.unwrap();
    assert_eq!(room.participants.len(), 1);

    let entry = h.ingestor.ledger_entry("EV_7").await.unwrap();
    assert_eq!(entry.outcome, EventOutcome::Accepted);
    assert!(entry.processed_at.is_some());
}

#[tokio::test]
async fn bad_signature_is_rejected_before_any_processing() {
    let h = harness().await;
    h.rooms.create_room("sess-1").await.unwrap();

    let body = r#"{"event":"room_finished","id":"EV_8","room":{"name":"session-sess-1"}}"#;
    let err = h
        .ingestor
        .handle_event(body.as_bytes(), Some("sha256=deadbeef"))
        .await
        .unwrap_err();
    assert!(matches!(err, MeetError::Auth(_)));

    // Nothing was applied or recorded.
    assert_eq!(
        h.rooms.get_room("sess-1").await.unwrap().status,
        RoomStatus::Active
    );
    assert!(h.ingestor.ledger_entry("EV_8").await.is_none());
}

#[tokio::test]
async fn malformed_payload_after_valid_signature_is_a_validation_error() {
    let h = harness().await;
    let err = h.deliver("{not json").await.unwrap_err();
    assert!(matches!(err, MeetError::Validation(_)));
}

#[tokio::test]
async fn structurally_invalid_event_is_rejected_and_remembered() {
    let h = harness().await;
    h.rooms.create_room("sess-1").await.unwrap();

    // Verified and parseable, but an egress event with no egressInfo can
    // never be applied, now or on redelivery.
    let body = r#"{"event":"egress_ended","id":"EV_11","room":{"name":"session-sess-1"}}"#;
    assert_eq!(h.deliver(body).await.unwrap(), EventOutcome::Rejected);

    let entry = h.ingestor.ledger_entry("EV_11").await.unwrap();
    assert_eq!(entry.outcome, EventOutcome::Rejected);
    assert!(entry.processed_at.is_some());

    // Redelivery short-circuits on the ledger instead of reparsing.
    assert_eq!(h.deliver(body).await.unwrap(), EventOutcome::Duplicate);
}

#[tokio::test]
async fn unrecognized_event_types_are_accepted_and_ignored() {
    let h = harness().await;
    let outcome = h
        .deliver(r#"{"event":"track_muted","id":"EV_9","room":{"name":"session-sess-1"}}"#)
        .await
        .unwrap();
    assert_eq!(outcome, EventOutcome::Ignored);
}

#[tokio::test]
async fn egress_ended_without_start_still_completes_the_recording() {
    let h = harness().await;
    let work_dir = tempfile::tempdir().unwrap();
    let artifact = artifact_in(&work_dir);
    h.rooms.create_room("sess-1").await.unwrap();

    h.deliver(&format!(
        r#"{{"event":"egress_ended","id":"EV_10","egressInfo":{{"egressId":"EG_2","roomName":"session-sess-1","filePath":"{artifact}"}}}}"#
    ))
    .await
    .unwrap();

    let job = h.wait_terminal("EG_2").await;
    assert_eq!(job.status, RecordingStatus::Completed);
}
