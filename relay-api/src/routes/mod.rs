//! API route definitions

mod health;
mod sse;
mod webhooks;

use axum::Router;
use serde::Serialize;

use crate::AppState;

/// Error body shared by every route
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Create all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(sse::routes())
        .merge(webhooks::routes())
        .merge(health::routes())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::Router;
    use tokio_util::sync::CancellationToken;
    use relay_services::{
        notice_channel, AgentClient, AgentClientConfig, AgentPoller, EventHub, EventHubConfig,
        FallbackDataSource, NoticeReceiver, PollerConfig,
    };

    use crate::AppState;

    /// App state with an idle poller; notices are left in the returned receiver
    pub(crate) fn test_state(hub_config: EventHubConfig) -> (AppState, NoticeReceiver) {
        let hub = Arc::new(EventHub::new(hub_config));
        let agent = Arc::new(
            AgentClient::new(&AgentClientConfig {
                base_url: "http://127.0.0.1:1".to_string(),
                timeout: Duration::from_millis(50),
            })
            .unwrap(),
        );
        let source = Arc::new(FallbackDataSource::new(
            agent,
            Vec::new(),
            Duration::from_millis(50),
        ));
        let poller = Arc::new(AgentPoller::new(
            source,
            Arc::clone(&hub),
            PollerConfig::default(),
        ));
        let (notices, notice_rx) = notice_channel();

        (
            AppState {
                hub,
                poller,
                notices,
                shutdown: CancellationToken::new(),
            },
            notice_rx,
        )
    }

    pub(crate) fn test_app(state: AppState) -> Router {
        Router::new()
            .nest("/api", super::api_routes())
            .with_state(state)
    }
}
