//! Live Trade Relay API Server
//!
//! Polls the trading agent for executed trades and streams them, together
//! with agent status and heartbeats, to browser clients over SSE.

mod routes;

use axum::{
    http::{header, Method},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use relay_kalshi::{KalshiClient, KalshiCredentials};
use relay_services::{
    notice_channel, AgentClient, AgentPoller, EventHub, FallbackDataSource, HeartbeatScheduler,
    NoticeSender, RelayConfig, TradeCache,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<EventHub>,
    pub poller: Arc<AgentPoller>,
    /// Webhook notices for the poll loop
    pub notices: NoticeSender,
    /// Fires on shutdown; open SSE streams end with it
    pub shutdown: CancellationToken,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env.local file
    if let Err(e) = dotenvy::from_filename(".env.local") {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env.local: {}", e);
        }
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,relay_api=debug")),
        )
        .init();

    info!("Starting Live Trade Relay");

    let config = RelayConfig::from_env()?;

    // Trade sources
    let agent = Arc::new(AgentClient::new(&config.agent)?);
    info!("Polling trading agent at {}", agent.base_url());

    let cache = Arc::new(TradeCache::new(&config.cache)?);
    match cache.purge_expired() {
        Ok(purged) if purged > 0 => info!("Purged {} expired cache entries", purged),
        Ok(_) => {}
        Err(e) => warn!("Failed to purge cache: {}", e),
    }

    let mut kalshi = KalshiClient::new(&config.kalshi.base_url, config.kalshi.timeout)?;
    match KalshiCredentials::from_env() {
        Some(credentials) => {
            info!("Kalshi credentials found, upstream fallback enabled");
            kalshi = kalshi.with_credentials(credentials);
        }
        None => {
            info!("No Kalshi credentials found - upstream fallback will be unavailable");
        }
    }

    let source = Arc::new(FallbackDataSource::standard(
        agent,
        cache,
        kalshi,
        config.kalshi.fills_limit,
        config.provider_timeout,
    ));

    // Live state and background loops
    let hub = Arc::new(EventHub::new(config.hub.clone()));
    let poller = Arc::new(AgentPoller::new(
        source,
        Arc::clone(&hub),
        config.poller.clone(),
    ));
    let (notices, notice_rx) = notice_channel();
    let cancel = CancellationToken::new();

    let poller_task = tokio::spawn(Arc::clone(&poller).run(notice_rx, cancel.clone()));
    let heartbeat_task = tokio::spawn(
        HeartbeatScheduler::new(Arc::clone(&hub), config.heartbeat_interval).run(cancel.clone()),
    );

    // Create app state
    let state = AppState {
        hub,
        poller,
        notices,
        shutdown: cancel.clone(),
    };

    // Configure CORS for frontend
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::CACHE_CONTROL]);

    // Build router
    let app = Router::new()
        .nest("/api", routes::api_routes())
        .layer(cors)
        .with_state(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    if let Err(e) = poller_task.await {
        warn!("Poller task ended abnormally: {}", e);
    }
    if let Err(e) = heartbeat_task.await {
        warn!("Heartbeat task ended abnormally: {}", e);
    }

    info!("Relay stopped");
    Ok(())
}

/// Resolves on Ctrl+C and stops the background loops
async fn shutdown_signal(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }

    info!("Shutdown signal received");
    cancel.cancel();
}
