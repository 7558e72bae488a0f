//! Client for the external real-time media server's room admin API.
//! Injected as a trait so the lifecycle manager can be exercised against
//! fakes; the HTTP implementation talks to the vendor's REST surface.

use async_trait::async_trait;
use log::error;
use reqwest::Client;
use serde_json::json;

use crate::config::MediaServerConfig;
use crate::shared::error::MeetError;

#[async_trait]
pub trait MediaServerClient: Send + Sync {
    async fn create_room(&self, room_name: &str) -> Result<(), MeetError>;
    async fn terminate_room(&self, room_name: &str) -> Result<(), MeetError>;
}

pub struct HttpMediaServerClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpMediaServerClient {
    pub fn new(config: &MediaServerConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl MediaServerClient for HttpMediaServerClient {
    async fn create_room(&self, room_name: &str) -> Result<(), MeetError> {
        let url = format!("{}/rooms", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "name": room_name }))
            .send()
            .await
            .map_err(|e| MeetError::Upstream(format!("create room request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Media server rejected room creation ({status}): {body}");
            return Err(MeetError::Upstream(format!(
                "media server returned {status} creating room"
            )));
        }
        Ok(())
    }

    async fn terminate_room(&self, room_name: &str) -> Result<(), MeetError> {
        let url = format!("{}/rooms/{room_name}", self.base_url);
        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| MeetError::Upstream(format!("terminate room request failed: {e}")))?;

        // The room may already be gone upstream; that is not a failure.
        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Media server rejected room termination ({status}): {body}");
            return Err(MeetError::Upstream(format!(
                "media server returned {status} terminating room"
            )));
        }
        Ok(())
    }
}
