//! Agent webhook intake
//!
//! The agent may announce status changes and executed trades directly.
//! Notices are queued for the poll loop, which commits them like polled
//! data; handlers never touch the hub's state themselves.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use relay_core::epoch_seconds;
use relay_services::{AgentNotice, AgentTrade};

use super::ErrorResponse;
use crate::AppState;

/// Create webhook routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bot/webhook/online", post(agent_online))
        .route("/bot/webhook/offline", post(agent_offline))
        .route("/bot/webhook/trade", post(agent_trade))
        .route("/bot/webhook/status", get(webhook_status))
}

#[derive(Debug, Default, Deserialize)]
struct StatusWebhook {
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    timestamp: Option<f64>,
}

#[derive(Debug, Serialize)]
struct StatusAck {
    success: bool,
    message: String,
    bot_id: String,
    timestamp: f64,
}

#[derive(Debug, Serialize)]
struct TradeAck {
    success: bool,
    message: String,
    trade_id: String,
    ticker: String,
    timestamp: f64,
}

#[derive(Debug, Serialize)]
struct WebhookStatus {
    webhook_system: &'static str,
    is_online: bool,
    last_update: f64,
    connected_sse_clients: usize,
    timestamp: f64,
}

async fn agent_online(
    State(state): State<AppState>,
    Json(payload): Json<StatusWebhook>,
) -> Response {
    status_notice(&state, payload, AgentNotice::Online, "online").await
}

async fn agent_offline(
    State(state): State<AppState>,
    Json(payload): Json<StatusWebhook>,
) -> Response {
    status_notice(&state, payload, AgentNotice::Offline, "offline").await
}

async fn status_notice(
    state: &AppState,
    payload: StatusWebhook,
    notice: AgentNotice,
    label: &str,
) -> Response {
    let bot_id = payload.bot_id.unwrap_or_else(|| "main".to_string());
    info!("Agent {} webhook received from {}", label, bot_id);

    if let Err(response) = forward(state, notice).await {
        return response;
    }

    (
        StatusCode::OK,
        Json(StatusAck {
            success: true,
            message: format!("Agent {} status received", label),
            bot_id,
            timestamp: payload.timestamp.unwrap_or_else(epoch_seconds),
        }),
    )
        .into_response()
}

async fn agent_trade(
    State(state): State<AppState>,
    Json(payload): Json<AgentTrade>,
) -> Response {
    let trade = match payload.into_trade() {
        Ok(trade) => trade,
        Err(e) => {
            warn!("Rejected trade webhook: {}", e);
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response();
        }
    };

    info!(
        "Trade webhook received: {:?} {} {} @ {}",
        trade.side, trade.quantity, trade.ticker, trade.price
    );

    let ack = TradeAck {
        success: true,
        message: "Trade webhook processed".to_string(),
        trade_id: trade.trade_id.clone(),
        ticker: trade.ticker.clone(),
        timestamp: trade.timestamp,
    };

    if let Err(response) = forward(&state, AgentNotice::Trade(trade)).await {
        return response;
    }

    (StatusCode::OK, Json(ack)).into_response()
}

/// Webhook intake state, useful when debugging delivery
async fn webhook_status(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.hub.snapshot();

    Json(WebhookStatus {
        webhook_system: "active",
        is_online: snapshot.is_online,
        last_update: snapshot.last_update,
        connected_sse_clients: state.hub.subscriber_count(),
        timestamp: epoch_seconds(),
    })
}

async fn forward(state: &AppState, notice: AgentNotice) -> Result<(), Response> {
    state.notices.send(notice).await.map_err(|_| {
        warn!("Poll loop is not running, dropping agent notice");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "relay is shutting down".to_string(),
            }),
        )
            .into_response()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{test_app, test_state};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use relay_services::EventHubConfig;
    use tower::ServiceExt;

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_online_webhook_queues_notice() {
        let (state, mut notices) = test_state(EventHubConfig::default());

        let response = test_app(state)
            .oneshot(post_json(
                "/api/bot/webhook/online",
                r#"{"is_online": true, "bot_id": "alpha", "timestamp": 12.5}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["bot_id"], "alpha");
        assert_eq!(json["timestamp"], 12.5);

        assert_eq!(notices.try_recv().unwrap(), AgentNotice::Online);
    }

    #[tokio::test]
    async fn test_trade_webhook_validates_and_queues() {
        let (state, mut notices) = test_state(EventHubConfig::default());
        let app = test_app(state);

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/bot/webhook/trade",
                r#"{"timestamp": 3.0, "ticker": "KX", "side": "SELL", "quantity": 2,
                    "price": 0.45, "trade_id": "wh-1", "source": "bot_live"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        match notices.try_recv().unwrap() {
            AgentNotice::Trade(trade) => assert_eq!(trade.trade_id, "wh-1"),
            other => panic!("expected trade notice, got {:?}", other),
        }

        let response = app
            .oneshot(post_json(
                "/api/bot/webhook/trade",
                r#"{"timestamp": 3.0, "ticker": "KX", "side": "SELL", "quantity": 0,
                    "price": 0.45, "trade_id": "wh-2"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_notice_rejected_when_poller_gone() {
        let (state, notices) = test_state(EventHubConfig::default());
        drop(notices);

        let response = test_app(state)
            .oneshot(post_json("/api/bot/webhook/offline", "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
