use std::sync::Arc;

use dotenvy::dotenv;
use log::info;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use meetserver::audit::{AuditSink, LogAuditSink};
use meetserver::booking::{InMemorySessionDirectory, SessionDirectory};
use meetserver::config::AppConfig;
use meetserver::meet;
use meetserver::meet::media::HttpMediaServerClient;
use meetserver::meet::recording::RecordingOrchestrator;
use meetserver::meet::room::RoomService;
use meetserver::meet::storage::LocalDiskStorage;
use meetserver::meet::token::TokenIssuer;
use meetserver::shared::retry::RetryPolicy;
use meetserver::shared::state::AppState;
use meetserver::webhooks;
use meetserver::webhooks::verify::SignatureVerifier;
use meetserver::webhooks::WebhookIngestor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env()?;

    // Wiring order: config, verifier, lifecycle manager, then the
    // ingestor and orchestrator that depend on them.
    let verifier = SignatureVerifier::new(config.webhook.signing_secret.clone());
    let audit: Arc<dyn AuditSink> = Arc::new(LogAuditSink);
    let booking: Arc<dyn SessionDirectory> = Arc::new(InMemorySessionDirectory::new());
    let media = Arc::new(HttpMediaServerClient::new(&config.media_server));
    let rooms = Arc::new(RoomService::new(
        media,
        Arc::clone(&booking),
        Arc::clone(&audit),
        RetryPolicy::default(),
    ));
    let tokens = Arc::new(TokenIssuer::new(
        &config.media_server,
        &config.token,
        Arc::clone(&booking),
        Arc::clone(&rooms),
        Arc::clone(&audit),
    ));
    let storage = Arc::new(LocalDiskStorage::new(config.storage.root.clone()));
    let recordings = RecordingOrchestrator::new(
        storage,
        Arc::clone(&audit),
        RetryPolicy::default(),
        config.storage.upload_workers,
    );
    let ingestor = Arc::new(WebhookIngestor::new(
        verifier,
        Arc::clone(&rooms),
        Arc::clone(&recordings),
        Arc::clone(&audit),
    ));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState {
        config,
        booking,
        rooms,
        tokens,
        recordings,
        ingestor,
    });

    let app = axum::Router::new()
        .merge(meet::configure())
        .merge(webhooks::configure())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    info!("meetserver listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
