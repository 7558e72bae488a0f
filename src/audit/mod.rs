//! Audit sink seam. The durable event log is an external collaborator;
//! the default sink writes structured lines to the service log so operator
//! follow-up items (lost recordings, upstream failures) are never silent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    TokenIssued,
    RoomCreated,
    RoomEnded,
    DuplicateEvent,
    UpstreamFailure,
    RecordingCompleted,
    RecordingLost,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub kind: AuditKind,
    pub subject: String,
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(kind: AuditKind, subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            detail: detail.into(),
            at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn record(&self, event: AuditEvent) {
        match event.kind {
            AuditKind::UpstreamFailure | AuditKind::RecordingLost => warn!(
                "audit {:?} subject={} detail={}",
                event.kind, event.subject, event.detail
            ),
            _ => info!(
                "audit {:?} subject={} detail={}",
                event.kind, event.subject, event.detail
            ),
        }
    }
}
