use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditKind, AuditSink};
use crate::booking::SessionDirectory;
use crate::meet::media::MediaServerClient;
use crate::shared::error::MeetError;
use crate::shared::models::{
    external_room_name, is_well_formed_session_id, session_id_for_room_name, Participant, Room,
    RoomStatus,
};
use crate::shared::retry::{retry, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndOutcome {
    Ended,
    AlreadyEnded,
}

/// Owns Room and Participant state and mirrors it against the external
/// media server. Rooms are keyed by session id; the registry write lock
/// serializes transitions per entity.
pub struct RoomService {
    rooms: RwLock<HashMap<String, Room>>,
    media: Arc<dyn MediaServerClient>,
    booking: Arc<dyn SessionDirectory>,
    audit: Arc<dyn AuditSink>,
    retry_policy: RetryPolicy,
}

impl RoomService {
    pub fn new(
        media: Arc<dyn MediaServerClient>,
        booking: Arc<dyn SessionDirectory>,
        audit: Arc<dyn AuditSink>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            media,
            booking,
            audit,
            retry_policy,
        }
    }

    /// Creates the room upstream and mirrors it locally. The Pending row is
    /// inserted before the upstream call so a concurrent create for the
    /// same session observes the conflict instead of racing.
    pub async fn create_room(&self, session_id: &str) -> Result<Room, MeetError> {
        if !is_well_formed_session_id(session_id) {
            return Err(MeetError::Validation(format!(
                "malformed session id {session_id:?}"
            )));
        }
        if self.booking.lookup(session_id).await.is_none() {
            return Err(MeetError::NotFound(format!("unknown session {session_id}")));
        }

        let room_name = external_room_name(session_id);
        {
            let mut rooms = self.rooms.write().await;
            if let Some(existing) = rooms.get(session_id) {
                if existing.status != RoomStatus::Ended {
                    return Err(MeetError::Conflict(format!(
                        "session {session_id} already has a live room"
                    )));
                }
            }
            rooms.insert(
                session_id.to_string(),
                Room {
                    id: Uuid::new_v4(),
                    session_id: session_id.to_string(),
                    external_room_name: room_name.clone(),
                    status: RoomStatus::Pending,
                    created_at: Utc::now(),
                    ended_at: None,
                    participants: Vec::new(),
                },
            );
        }

        let created = retry(&self.retry_policy, "media server create_room", || {
            self.media.create_room(&room_name)
        })
        .await;
        if let Err(e) = created {
            self.rooms.write().await.remove(session_id);
            self.audit
                .record(AuditEvent::new(
                    AuditKind::UpstreamFailure,
                    session_id,
                    format!("room creation failed: {e}"),
                ))
                .await;
            return Err(e);
        }

        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(session_id)
            .ok_or_else(|| MeetError::State(format!("pending room for {session_id} vanished")))?;
        room.status = RoomStatus::Active;
        info!("Created room {room_name} for session {session_id}");
        self.audit
            .record(AuditEvent::new(AuditKind::RoomCreated, session_id, &room_name))
            .await;
        Ok(room.clone())
    }

    /// Ends the room locally first, then terminates it upstream. Ending an
    /// already-ended (or never-created) room is a reported no-op, so
    /// cleanup paths can call this repeatedly. An upstream failure after
    /// retries surfaces as `Upstream`, but local state stays `Ended`.
    pub async fn end_room(&self, session_id: &str) -> Result<EndOutcome, MeetError> {
        if !is_well_formed_session_id(session_id) {
            return Err(MeetError::Validation(format!(
                "malformed session id {session_id:?}"
            )));
        }
        if self.booking.lookup(session_id).await.is_none() {
            return Err(MeetError::NotFound(format!("unknown session {session_id}")));
        }

        let room_name = external_room_name(session_id);
        let was_live = {
            let mut rooms = self.rooms.write().await;
            match rooms.get_mut(session_id) {
                Some(room) if room.status != RoomStatus::Ended => {
                    end_locally(room);
                    true
                }
                _ => false,
            }
        };
        if !was_live {
            info!("Room for session {session_id} already ended; nothing to do");
            return Ok(EndOutcome::AlreadyEnded);
        }

        let terminated = retry(&self.retry_policy, "media server terminate_room", || {
            self.media.terminate_room(&room_name)
        })
        .await;
        if let Err(e) = terminated {
            self.audit
                .record(AuditEvent::new(
                    AuditKind::UpstreamFailure,
                    session_id,
                    format!("room termination failed, local state ended anyway: {e}"),
                ))
                .await;
            return Err(e);
        }

        self.audit
            .record(AuditEvent::new(AuditKind::RoomEnded, session_id, &room_name))
            .await;
        Ok(EndOutcome::Ended)
    }

    pub async fn get_room(&self, session_id: &str) -> Option<Room> {
        self.rooms.read().await.get(session_id).cloned()
    }

    /// Applies the server's `room_started` notification. Idempotent.
    pub async fn mark_active(&self, room_name: &str) -> Result<(), MeetError> {
        let session_id = session_id_for_room_name(room_name)
            .ok_or_else(|| MeetError::State(format!("unrecognized room name {room_name}")))?;
        let mut rooms = self.rooms.write().await;
        match rooms.get_mut(session_id) {
            Some(room) if room.status == RoomStatus::Ended => Err(MeetError::State(format!(
                "room {room_name} already ended, ignoring room_started"
            ))),
            Some(room) => {
                room.status = RoomStatus::Active;
                Ok(())
            }
            None => Err(MeetError::State(format!(
                "room_started for unknown room {room_name}"
            ))),
        }
    }

    /// Applies the server's `room_finished` notification: local state only,
    /// no upstream call. Returns the room id when a live room was ended so
    /// the caller can run the recording finalization check.
    pub async fn mark_ended(&self, room_name: &str) -> Option<Uuid> {
        let session_id = session_id_for_room_name(room_name)?;
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(session_id)?;
        if room.status == RoomStatus::Ended {
            return None;
        }
        end_locally(room);
        info!("Room {room_name} finished");
        Some(room.id)
    }

    /// Upserts a participant from a `participant_joined` event. Identities
    /// outside the session roster are logged and skipped; they can never
    /// hold a token for this room anyway.
    pub async fn participant_joined(&self, room_name: &str, user_id: &str) {
        let Some(session_id) = session_id_for_room_name(room_name) else {
            warn!("participant_joined for unrecognized room {room_name}");
            return;
        };
        let Some(session) = self.booking.lookup(session_id).await else {
            warn!("participant_joined for unknown session {session_id}");
            return;
        };
        let Some(role) = session.role_of(user_id) else {
            warn!("participant {user_id} not in roster for session {session_id}, skipping");
            return;
        };

        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(session_id) else {
            warn!("participant_joined for session {session_id} with no room");
            return;
        };
        if let Some(p) = room
            .participants
            .iter_mut()
            .find(|p| p.user_id == user_id)
        {
            // Rejoin: refresh timestamps, keep the kicked flag.
            p.joined_at = Utc::now();
            p.left_at = None;
        } else {
            room.participants.push(Participant {
                user_id: user_id.to_string(),
                role,
                joined_at: Utc::now(),
                left_at: None,
                kicked: false,
            });
        }
    }

    pub async fn participant_left(&self, room_name: &str, user_id: &str) {
        let Some(session_id) = session_id_for_room_name(room_name) else {
            return;
        };
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get_mut(session_id) {
            if let Some(p) = room
                .participants
                .iter_mut()
                .find(|p| p.user_id == user_id && p.left_at.is_none())
            {
                p.left_at = Some(Utc::now());
            }
        }
    }

    /// Marks a participant kicked. Token requests for them are denied from
    /// here on, regardless of the session window.
    pub async fn kick_participant(&self, session_id: &str, user_id: &str) -> Result<(), MeetError> {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(session_id)
            .ok_or_else(|| MeetError::NotFound(format!("no room for session {session_id}")))?;
        let participant = room
            .participants
            .iter_mut()
            .find(|p| p.user_id == user_id)
            .ok_or_else(|| {
                MeetError::NotFound(format!("{user_id} is not in room for {session_id}"))
            })?;
        participant.kicked = true;
        participant.left_at = Some(Utc::now());
        Ok(())
    }

    pub async fn is_kicked(&self, session_id: &str, user_id: &str) -> bool {
        self.rooms
            .read()
            .await
            .get(session_id)
            .map(|room| {
                room.participants
                    .iter()
                    .any(|p| p.user_id == user_id && p.kicked)
            })
            .unwrap_or(false)
    }
}

fn end_locally(room: &mut Room) {
    room.status = RoomStatus::Ended;
    room.ended_at = Some(Utc::now());
    for p in &mut room.participants {
        if p.left_at.is_none() {
            p.left_at = Some(room.ended_at.unwrap_or_else(Utc::now));
        }
    }
}
