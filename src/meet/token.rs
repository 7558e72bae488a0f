use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use log::info;
use serde::Serialize;

use crate::audit::{AuditEvent, AuditKind, AuditSink};
use crate::booking::SessionDirectory;
use crate::config::{MediaServerConfig, TokenConfig};
use crate::meet::room::RoomService;
use crate::shared::error::MeetError;
use crate::shared::models::{
    is_well_formed_session_id, AccessToken, Permissions, RoomStatus,
};

/// Join window around the scheduled start: participants may fetch a token
/// from 15 minutes before until 2 hours after.
fn window_before_start() -> chrono::Duration {
    chrono::Duration::minutes(15)
}

fn window_after_start() -> chrono::Duration {
    chrono::Duration::hours(2)
}

/// Grant payload in the media server's wire shape, embedded in the JWT.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoGrant {
    room_join: bool,
    room: String,
    can_publish: bool,
    can_subscribe: bool,
    room_admin: bool,
}

#[derive(Debug, Serialize)]
struct Claims {
    sub: String,
    iss: String,
    nbf: i64,
    exp: i64,
    video: VideoGrant,
}

pub struct TokenIssuer {
    booking: Arc<dyn SessionDirectory>,
    rooms: Arc<RoomService>,
    audit: Arc<dyn AuditSink>,
    api_key: String,
    encoding_key: EncodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(
        media_config: &MediaServerConfig,
        token_config: &TokenConfig,
        booking: Arc<dyn SessionDirectory>,
        rooms: Arc<RoomService>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            booking,
            rooms,
            audit,
            api_key: media_config.api_key.clone(),
            encoding_key: EncodingKey::from_secret(media_config.api_secret.as_bytes()),
            ttl: token_config.ttl,
        }
    }

    pub async fn issue_token(
        &self,
        session_id: &str,
        requesting_user_id: &str,
    ) -> Result<AccessToken, MeetError> {
        self.issue_token_at(session_id, requesting_user_id, Utc::now())
            .await
    }

    /// Same as `issue_token` with an explicit clock, so the window rules
    /// can be exercised deterministically.
    pub async fn issue_token_at(
        &self,
        session_id: &str,
        requesting_user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AccessToken, MeetError> {
        if !is_well_formed_session_id(session_id) {
            return Err(MeetError::Validation(format!(
                "malformed session id {session_id:?}"
            )));
        }
        let session = self
            .booking
            .lookup(session_id)
            .await
            .ok_or_else(|| MeetError::NotFound(format!("unknown session {session_id}")))?;

        let role = session.role_of(requesting_user_id).ok_or_else(|| {
            MeetError::Authorization(format!(
                "{requesting_user_id} is not a participant of session {session_id}"
            ))
        })?;

        let window_open = session.scheduled_start - window_before_start();
        let window_close = session.scheduled_start + window_after_start();
        if now < window_open || now > window_close {
            return Err(MeetError::Authorization(format!(
                "session {session_id} is outside its join window"
            )));
        }

        let room = self
            .rooms
            .get_room(session_id)
            .await
            .filter(|r| r.status != RoomStatus::Ended)
            .ok_or_else(|| MeetError::NotFound(format!("no room for session {session_id}")))?;

        if self.rooms.is_kicked(session_id, requesting_user_id).await {
            return Err(MeetError::Authorization(format!(
                "{requesting_user_id} was removed from session {session_id}"
            )));
        }

        let permissions = Permissions::for_role(role);
        let expires_at = now
            + chrono::Duration::from_std(self.ttl)
                .unwrap_or_else(|_| chrono::Duration::hours(24));
        let claims = Claims {
            sub: requesting_user_id.to_string(),
            iss: self.api_key.clone(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            video: VideoGrant {
                room_join: true,
                room: room.external_room_name.clone(),
                can_publish: permissions.can_publish,
                can_subscribe: permissions.can_subscribe,
                room_admin: permissions.room_admin,
            },
        };
        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| MeetError::State(format!("token signing failed: {e}")))?;

        info!("Issued token for {requesting_user_id} on session {session_id}");
        self.audit
            .record(AuditEvent::new(
                AuditKind::TokenIssued,
                session_id,
                requesting_user_id,
            ))
            .await;

        Ok(AccessToken {
            session_id: session_id.to_string(),
            user_id: requesting_user_id.to_string(),
            room_name: room.external_room_name,
            permissions,
            expires_at,
            token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::LogAuditSink;
    use crate::booking::InMemorySessionDirectory;
    use crate::meet::media::MediaServerClient;
    use crate::shared::models::SessionInfo;
    use crate::shared::retry::RetryPolicy;
    use async_trait::async_trait;

    struct AlwaysUpMediaServer;

    #[async_trait]
    impl MediaServerClient for AlwaysUpMediaServer {
        async fn create_room(&self, _room_name: &str) -> Result<(), MeetError> {
            Ok(())
        }
        async fn terminate_room(&self, _room_name: &str) -> Result<(), MeetError> {
            Ok(())
        }
    }

    async fn issuer_for(start: DateTime<Utc>) -> (TokenIssuer, Arc<RoomService>) {
        let booking = Arc::new(InMemorySessionDirectory::new());
        booking
            .insert(SessionInfo {
                session_id: "sess-1".to_string(),
                mentor_id: "mentor-1".to_string(),
                mentee_id: "mentee-1".to_string(),
                scheduled_start: start,
            })
            .await;
        let rooms = Arc::new(RoomService::new(
            Arc::new(AlwaysUpMediaServer),
            booking.clone(),
            Arc::new(LogAuditSink),
            RetryPolicy::default(),
        ));
        rooms.create_room("sess-1").await.unwrap();
        let issuer = TokenIssuer::new(
            &MediaServerConfig {
                url: "http://localhost:7880".to_string(),
                api_key: "devkey".to_string(),
                api_secret: "secret".to_string(),
            },
            &TokenConfig {
                ttl: Duration::from_secs(24 * 60 * 60),
            },
            booking,
            rooms.clone(),
            Arc::new(LogAuditSink),
        );
        (issuer, rooms)
    }

    #[tokio::test]
    async fn window_scenario_from_the_booking_contract() {
        let start = Utc::now();
        let (issuer, _) = issuer_for(start).await;

        // T-20m: too early.
        let err = issuer
            .issue_token_at("sess-1", "mentor-1", start - chrono::Duration::minutes(20))
            .await
            .unwrap_err();
        assert!(matches!(err, MeetError::Authorization(_)));

        // T-10m: inside the window.
        let token = issuer
            .issue_token_at("sess-1", "mentor-1", start - chrono::Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(token.room_name, "session-sess-1");
        assert!(token.permissions.room_admin);

        // T+2h10m: too late, even for a valid participant.
        let err = issuer
            .issue_token_at(
                "sess-1",
                "mentor-1",
                start + chrono::Duration::hours(2) + chrono::Duration::minutes(10),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MeetError::Authorization(_)));
    }

    #[tokio::test]
    async fn non_participant_is_denied_inside_the_window() {
        let start = Utc::now();
        let (issuer, _) = issuer_for(start).await;
        let err = issuer
            .issue_token_at("sess-1", "someone-else", start)
            .await
            .unwrap_err();
        assert!(matches!(err, MeetError::Authorization(_)));
    }

    #[tokio::test]
    async fn kicked_participant_is_denied_despite_valid_window() {
        let start = Utc::now();
        let (issuer, rooms) = issuer_for(start).await;
        rooms.participant_joined("session-sess-1", "mentee-1").await;
        rooms.kick_participant("sess-1", "mentee-1").await.unwrap();

        let err = issuer
            .issue_token_at("sess-1", "mentee-1", start)
            .await
            .unwrap_err();
        assert!(matches!(err, MeetError::Authorization(_)));
    }

    #[tokio::test]
    async fn missing_room_is_not_found_for_valid_participant() {
        let start = Utc::now();
        let (issuer, rooms) = issuer_for(start).await;
        rooms.end_room("sess-1").await.unwrap();

        let err = issuer
            .issue_token_at("sess-1", "mentee-1", start)
            .await
            .unwrap_err();
        assert!(matches!(err, MeetError::NotFound(_)));
    }

    #[tokio::test]
    async fn malformed_session_id_fails_validation() {
        let (issuer, _) = issuer_for(Utc::now()).await;
        let err = issuer.issue_token("not a session!", "mentor-1").await.unwrap_err();
        assert!(matches!(err, MeetError::Validation(_)));
    }

    #[tokio::test]
    async fn token_is_a_signed_jwt_with_role_grants() {
        let start = Utc::now();
        let (issuer, _) = issuer_for(start).await;
        let token = issuer
            .issue_token_at("sess-1", "mentee-1", start)
            .await
            .unwrap();

        assert!(!token.permissions.room_admin);
        assert!(token.expires_at > start + chrono::Duration::hours(23));
        // Compact JWS form: header.payload.signature.
        assert_eq!(token.token.split('.').count(), 3);
    }
}
