use std::sync::Arc;

use crate::booking::SessionDirectory;
use crate::config::AppConfig;
use crate::meet::recording::RecordingOrchestrator;
use crate::meet::room::RoomService;
use crate::meet::token::TokenIssuer;
use crate::webhooks::WebhookIngestor;

pub struct AppState {
    pub config: AppConfig,
    pub booking: Arc<dyn SessionDirectory>,
    pub rooms: Arc<RoomService>,
    pub tokens: Arc<TokenIssuer>,
    pub recordings: Arc<RecordingOrchestrator>,
    pub ingestor: Arc<WebhookIngestor>,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            booking: Arc::clone(&self.booking),
            rooms: Arc::clone(&self.rooms),
            tokens: Arc::clone(&self.tokens),
            recordings: Arc::clone(&self.recordings),
            ingestor: Arc::clone(&self.ingestor),
        }
    }
}
