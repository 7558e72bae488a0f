//! Wire shapes for the media server's webhook payloads. Field names are
//! camelCase on the wire; unknown fields and event types are tolerated for
//! forward compatibility.

use serde::Deserialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaEvent {
    pub event: String,
    /// External event id; absent on some older server versions.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub room: Option<RoomPayload>,
    #[serde(default)]
    pub participant: Option<ParticipantPayload>,
    #[serde(default)]
    pub egress_info: Option<EgressPayload>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPayload {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantPayload {
    pub identity: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EgressPayload {
    pub egress_id: String,
    #[serde(default)]
    pub room_name: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl MediaEvent {
    /// The room name this event concerns, wherever the payload carries it.
    pub fn room_name(&self) -> Option<&str> {
        self.room
            .as_ref()
            .map(|r| r.name.as_str())
            .or_else(|| self.egress_info.as_ref()?.room_name.as_deref())
    }

    /// Stable identity for deduplication: the external event id when the
    /// sender supplies one, otherwise a hash of type, subject, and
    /// timestamp.
    pub fn identity(&self) -> String {
        if let Some(id) = &self.id {
            if !id.is_empty() {
                return id.clone();
            }
        }
        let subject = self
            .egress_info
            .as_ref()
            .map(|e| e.egress_id.as_str())
            .or_else(|| self.room_name())
            .unwrap_or("");
        let participant = self
            .participant
            .as_ref()
            .map(|p| p.identity.as_str())
            .unwrap_or("");
        let mut hasher = Sha256::new();
        hasher.update(self.event.as_bytes());
        hasher.update(b"|");
        hasher.update(subject.as_bytes());
        hasher.update(b"|");
        hasher.update(participant.as_bytes());
        hasher.update(b"|");
        hasher.update(self.created_at.unwrap_or_default().to_le_bytes());
        hex::encode(hasher.finalize())
    }
}
