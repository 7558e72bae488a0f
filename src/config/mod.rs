use std::time::Duration;

#[derive(Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub media_server: MediaServerConfig,
    pub webhook: WebhookConfig,
    pub storage: StorageConfig,
    pub token: TokenConfig,
}

#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone)]
pub struct MediaServerConfig {
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Clone)]
pub struct WebhookConfig {
    /// Shared secret the media server signs webhook bodies with.
    pub signing_secret: String,
}

#[derive(Clone)]
pub struct StorageConfig {
    pub root: String,
    pub upload_workers: usize,
}

#[derive(Clone)]
pub struct TokenConfig {
    /// Hard ceiling on token lifetime; the join window, not the token
    /// expiry, is the effective access boundary.
    pub ttl: Duration,
}

fn get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let media_server = MediaServerConfig {
            url: {
                let url = get_str("MEDIA_SERVER_URL", "http://localhost:7880");
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    format!("http://{url}")
                } else {
                    url
                }
            },
            api_key: get_str("MEDIA_SERVER_API_KEY", "devkey"),
            api_secret: std::env::var("MEDIA_SERVER_API_SECRET")
                .map_err(|_| anyhow::anyhow!("MEDIA_SERVER_API_SECRET must be set"))?,
        };
        let webhook = WebhookConfig {
            signing_secret: std::env::var("WEBHOOK_SIGNING_SECRET")
                .map_err(|_| anyhow::anyhow!("WEBHOOK_SIGNING_SECRET must be set"))?,
        };
        Ok(AppConfig {
            server: ServerConfig {
                host: get_str("SERVER_HOST", "127.0.0.1"),
                port: std::env::var("SERVER_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
            },
            media_server,
            webhook,
            storage: StorageConfig {
                root: get_str("STORAGE_ROOT", "./recordings"),
                upload_workers: std::env::var("UPLOAD_WORKERS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(2),
            },
            token: TokenConfig {
                ttl: Duration::from_secs(
                    std::env::var("TOKEN_TTL_SECONDS")
                        .ok()
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(24 * 60 * 60),
                ),
            },
        })
    }
}
