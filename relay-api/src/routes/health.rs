//! Health check endpoints

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::Serialize;

use relay_services::PollState;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    agent_online: bool,
    last_update: f64,
    connected_clients: usize,
    poller_state: PollState,
}

/// Healthy while the agent is online, degraded (503) otherwise
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let snapshot = state.hub.snapshot();

    let (status, code) = if snapshot.is_online {
        ("healthy", StatusCode::OK)
    } else {
        ("degraded", StatusCode::SERVICE_UNAVAILABLE)
    };

    let response = HealthResponse {
        status: status.to_string(),
        agent_online: snapshot.is_online,
        last_update: snapshot.last_update,
        connected_clients: state.hub.subscriber_count(),
        poller_state: state.poller.state(),
    };

    (code, Json(response))
}

/// Simple liveness check (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Create health routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{test_app, test_state};
    use axum::body::Body;
    use axum::http::Request;
    use relay_services::EventHubConfig;
    use tower::ServiceExt;

    async fn get_status(app: axum::Router, uri: &str) -> StatusCode {
        app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_health_follows_agent_status() {
        let (state, _notices) = test_state(EventHubConfig::default());
        let hub = state.hub.clone();
        let app = test_app(state);

        assert_eq!(get_status(app.clone(), "/api/health").await, StatusCode::SERVICE_UNAVAILABLE);

        hub.commit(Vec::new(), Some(true));
        assert_eq!(get_status(app.clone(), "/api/health").await, StatusCode::OK);
        assert_eq!(get_status(app, "/api/health/live").await, StatusCode::OK);
    }
}
