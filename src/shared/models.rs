use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Pending,
    Active,
    Ended,
}

/// A logical meeting space tied 1:1 to a booked session. The external room
/// name is a pure function of the session id, so webhook payloads can be
/// mapped back without a side table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub session_id: String,
    pub external_room_name: String,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub participants: Vec<Participant>,
}

pub fn external_room_name(session_id: &str) -> String {
    format!("session-{session_id}")
}

pub fn session_id_for_room_name(room_name: &str) -> Option<&str> {
    room_name.strip_prefix("session-")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Mentor,
    Mentee,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: String,
    pub role: ParticipantRole,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub kicked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingStatus {
    Started,
    Ended,
    Uploading,
    Completed,
    Failed,
}

impl RecordingStatus {
    /// Position in the forward-only pipeline. `Failed` is reachable from
    /// any non-terminal state, so it ranks above everything.
    pub fn rank(self) -> u8 {
        match self {
            Self::Started => 0,
            Self::Ended => 1,
            Self::Uploading => 2,
            Self::Completed => 3,
            Self::Failed => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started => write!(f, "started"),
            Self::Ended => write!(f, "ended"),
            Self::Uploading => write!(f, "uploading"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingJob {
    pub id: Uuid,
    pub room_id: Uuid,
    pub egress_id: String,
    pub status: RecordingStatus,
    pub local_file_path: Option<String>,
    pub storage_url: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    Accepted,
    Duplicate,
    Rejected,
    Ignored,
}

/// Dedup ledger entry. The id is the external event id, or a content hash
/// when the sender supplies none; it is unique per applied event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub outcome: EventOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub can_publish: bool,
    pub can_subscribe: bool,
    pub room_admin: bool,
}

impl Permissions {
    pub fn for_role(role: ParticipantRole) -> Self {
        match role {
            ParticipantRole::Mentor => Self {
                can_publish: true,
                can_subscribe: true,
                room_admin: true,
            },
            ParticipantRole::Mentee => Self {
                can_publish: true,
                can_subscribe: true,
                room_admin: false,
            },
        }
    }
}

/// Minted per request and never stored; the JWT itself carries the expiry.
#[derive(Debug, Clone, Serialize)]
pub struct AccessToken {
    pub session_id: String,
    pub user_id: String,
    pub room_name: String,
    pub permissions: Permissions,
    pub expires_at: DateTime<Utc>,
    pub token: String,
}

/// Scheduling data owned by the booking system, read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub mentor_id: String,
    pub mentee_id: String,
    pub scheduled_start: DateTime<Utc>,
}

impl SessionInfo {
    pub fn role_of(&self, user_id: &str) -> Option<ParticipantRole> {
        if user_id == self.mentor_id {
            Some(ParticipantRole::Mentor)
        } else if user_id == self.mentee_id {
            Some(ParticipantRole::Mentee)
        } else {
            None
        }
    }
}

/// Session ids come from the booking system as opaque slugs; reject
/// anything that could not have been issued by it.
pub fn is_well_formed_session_id(session_id: &str) -> bool {
    !session_id.is_empty()
        && session_id.len() <= 64
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
