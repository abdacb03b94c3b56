//! Server-Sent Events routes
//!
//! Each connection attaches to the event hub, receives `initial_state`
//! first and then every routed event until the client goes away.

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, Sse},
        IntoResponse, Json, Response,
    },
    routing::get,
    Router,
};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use relay_core::{epoch_seconds, ChannelKind, RelayError, StreamEvent};
use relay_services::{ConnectionId, EventHub, HubStats, PollerStats};

use super::ErrorResponse;
use crate::AppState;

/// Create SSE routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sse/trading", get(trading_stream))
        .route("/sse/trades", get(trades_stream))
        .route("/sse/status", get(status_stream))
        .route("/sse/stats", get(stats))
}

async fn trading_stream(State(state): State<AppState>) -> Response {
    open_stream(&state, ChannelKind::All)
}

async fn trades_stream(State(state): State<AppState>) -> Response {
    open_stream(&state, ChannelKind::TradesOnly)
}

async fn status_stream(State(state): State<AppState>) -> Response {
    open_stream(&state, ChannelKind::StatusOnly)
}

/// Releases the subscription when the response stream is dropped
struct DetachGuard {
    hub: Arc<EventHub>,
    connection_id: ConnectionId,
}

impl Drop for DetachGuard {
    fn drop(&mut self) {
        if self.hub.detach(self.connection_id) {
            debug!("SSE client {} disconnected", self.connection_id);
        }
    }
}

fn open_stream(state: &AppState, channel_kind: ChannelKind) -> Response {
    match state.hub.attach(channel_kind) {
        Ok(attachment) => {
            let guard = DetachGuard {
                hub: Arc::clone(&state.hub),
                connection_id: attachment.subscription.connection_id,
            };
            let initial = Arc::new(StreamEvent::InitialState(attachment.initial_state));

            let stream = event_stream(initial, attachment.events, guard)
                .take_until(state.shutdown.clone().cancelled_owned());

            Sse::new(stream).into_response()
        }
        Err(e @ RelayError::CapacityReached(_)) => {
            warn!("Rejecting SSE client: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

fn event_stream(
    initial: Arc<StreamEvent>,
    events: relay_services::EventReceiver,
    guard: DetachGuard,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::once(async move { initial })
        .chain(ReceiverStream::new(events))
        .filter_map(move |event| {
            let _guard = &guard;
            futures_util::future::ready(to_sse_event(&event))
        })
        .map(Ok)
}

fn to_sse_event(event: &StreamEvent) -> Option<Event> {
    match event.data_json() {
        Ok(data) => Some(Event::default().event(event.name()).data(data)),
        Err(e) => {
            warn!("Failed to serialize {} event: {}", event.name(), e);
            None
        }
    }
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    hub: HubStats,
    poller: PollerStats,
    timestamp: f64,
}

/// Hub and poller statistics
async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatsResponse {
        hub: state.hub.stats(),
        poller: state.poller.stats(),
        timestamp: epoch_seconds(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{test_app, test_state};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use relay_services::EventHubConfig;
    use tower::ServiceExt;

    async fn first_chunk(response: Response) -> String {
        let mut body = response.into_body().into_data_stream();
        let chunk = body.next().await.unwrap().unwrap();
        String::from_utf8(chunk.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_stream_starts_with_initial_state_and_detaches_on_drop() {
        let (state, _notices) = test_state(EventHubConfig::default());
        let hub = Arc::clone(&state.hub);

        let response = test_app(state)
            .oneshot(Request::get("/api/sse/trading").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/event-stream"
        );
        assert_eq!(hub.subscriber_count(), 1);

        let frame = first_chunk(response).await;
        assert!(frame.starts_with("event:"));
        assert!(frame.contains("initial_state"));
        assert!(frame.contains("\"recent_trades\":[]"));

        // Response dropped with the stream
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_capacity_reached_is_503() {
        let (state, _notices) = test_state(EventHubConfig {
            max_subscribers: Some(0),
            ..EventHubConfig::default()
        });

        let response = test_app(state)
            .oneshot(Request::get("/api/sse/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let (state, _notices) = test_state(EventHubConfig::default());
        let _attached = state.hub.attach(ChannelKind::TradesOnly).unwrap();

        let response = test_app(state)
            .oneshot(Request::get("/api/sse/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["hub"]["connected_clients"], 1);
        assert_eq!(json["hub"]["clients"][0]["channel_kind"], "trades-only");
        assert_eq!(json["poller"]["state"], "idle");
    }
}
