//! Read-only view of the booking system. Meetserver never mutates
//! scheduling data; it only resolves a session's roster and time window.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::shared::models::SessionInfo;

#[async_trait]
pub trait SessionDirectory: Send + Sync {
    async fn lookup(&self, session_id: &str) -> Option<SessionInfo>;
}

/// In-process directory. Production wiring replaces this with a client for
/// the booking service; tests seed it directly.
#[derive(Default)]
pub struct InMemorySessionDirectory {
    sessions: RwLock<HashMap<String, SessionInfo>>,
}

impl InMemorySessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: SessionInfo) {
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session);
    }
}

#[async_trait]
impl SessionDirectory for InMemorySessionDirectory {
    async fn lookup(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions.read().await.get(session_id).cloned()
    }
}
