//! Server-push event types
//!
//! These types define the protocol between the relay and its subscribers.
//! Every event is a named type plus a fixed JSON payload, framed as a
//! Server-Sent Event.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{AgentStatus, Trade};

// ============================================================================
// Channel Kinds
// ============================================================================

/// Subscription filter selecting which events a connection receives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelKind {
    /// Every event type
    All,
    /// Only `new_trades`
    TradesOnly,
    /// Only `bot_status` and `heartbeat`
    StatusOnly,
}

impl ChannelKind {
    /// Whether a subscriber on this channel receives events of `kind`
    pub fn accepts(&self, kind: EventKind) -> bool {
        match (self, kind) {
            // The snapshot is sent directly on attach, never routed
            (_, EventKind::InitialState) => true,
            (ChannelKind::All, _) => true,
            (ChannelKind::TradesOnly, EventKind::NewTrades) => true,
            (ChannelKind::StatusOnly, EventKind::BotStatus | EventKind::Heartbeat) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::All => "all",
            ChannelKind::TradesOnly => "trades-only",
            ChannelKind::StatusOnly => "status-only",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminant of a [`StreamEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    InitialState,
    NewTrades,
    BotStatus,
    Heartbeat,
}

impl EventKind {
    /// Wire name used as the SSE `event:` field
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::InitialState => "initial_state",
            EventKind::NewTrades => "new_trades",
            EventKind::BotStatus => "bot_status",
            EventKind::Heartbeat => "heartbeat",
        }
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Snapshot sent to a subscriber right after it attaches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialStatePayload {
    /// Recent trades, newest first
    pub recent_trades: Vec<Trade>,
    pub is_online: bool,
    /// Epoch seconds of the last committed state change
    pub last_update: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTradesPayload {
    /// Newly observed trades, newest first
    pub trades: Vec<Trade>,
    pub count: usize,
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotStatusPayload {
    pub is_online: bool,
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_clients: Option<usize>,
}

// ============================================================================
// Stream Events
// ============================================================================

/// Closed set of events pushed to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    InitialState(InitialStatePayload),
    NewTrades(NewTradesPayload),
    BotStatus(BotStatusPayload),
    Heartbeat(HeartbeatPayload),
}

impl StreamEvent {
    pub fn new_trades(trades: Vec<Trade>, timestamp: f64) -> Self {
        let count = trades.len();
        StreamEvent::NewTrades(NewTradesPayload {
            trades,
            count,
            timestamp,
        })
    }

    pub fn bot_status(status: &AgentStatus) -> Self {
        StreamEvent::BotStatus(BotStatusPayload {
            is_online: status.is_online,
            timestamp: status.observed_at,
        })
    }

    pub fn heartbeat(timestamp: f64, connected_clients: Option<usize>) -> Self {
        StreamEvent::Heartbeat(HeartbeatPayload {
            timestamp,
            connected_clients,
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            StreamEvent::InitialState(_) => EventKind::InitialState,
            StreamEvent::NewTrades(_) => EventKind::NewTrades,
            StreamEvent::BotStatus(_) => EventKind::BotStatus,
            StreamEvent::Heartbeat(_) => EventKind::Heartbeat,
        }
    }

    /// SSE event name
    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// JSON body of the SSE `data:` field
    pub fn data_json(&self) -> Result<String, serde_json::Error> {
        match self {
            StreamEvent::InitialState(p) => serde_json::to_string(p),
            StreamEvent::NewTrades(p) => serde_json::to_string(p),
            StreamEvent::BotStatus(p) => serde_json::to_string(p),
            StreamEvent::Heartbeat(p) => serde_json::to_string(p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TradeSide, TradeSource};
    use rust_decimal_macros::dec;

    fn trade(id: &str) -> Trade {
        Trade {
            timestamp: 10.0,
            ticker: "TICK".to_string(),
            side: TradeSide::Sell,
            quantity: 3,
            price: dec!(0.42),
            trade_id: id.to_string(),
            source: TradeSource::Cache,
        }
    }

    #[test]
    fn test_routing_table() {
        use EventKind::*;

        for kind in [NewTrades, BotStatus, Heartbeat] {
            assert!(ChannelKind::All.accepts(kind));
        }

        assert!(ChannelKind::TradesOnly.accepts(NewTrades));
        assert!(!ChannelKind::TradesOnly.accepts(BotStatus));
        assert!(!ChannelKind::TradesOnly.accepts(Heartbeat));

        assert!(!ChannelKind::StatusOnly.accepts(NewTrades));
        assert!(ChannelKind::StatusOnly.accepts(BotStatus));
        assert!(ChannelKind::StatusOnly.accepts(Heartbeat));
    }

    #[test]
    fn test_new_trades_counts() {
        let event = StreamEvent::new_trades(vec![trade("a"), trade("b")], 99.0);
        assert_eq!(event.name(), "new_trades");

        let data: serde_json::Value = serde_json::from_str(&event.data_json().unwrap()).unwrap();
        assert_eq!(data["count"], 2);
        assert_eq!(data["timestamp"], 99.0);
        assert_eq!(data["trades"][1]["trade_id"], "b");
    }

    #[test]
    fn test_heartbeat_omits_missing_client_count() {
        let event = StreamEvent::heartbeat(5.0, None);
        assert_eq!(event.data_json().unwrap(), r#"{"timestamp":5.0}"#);

        let event = StreamEvent::heartbeat(5.0, Some(3));
        assert_eq!(
            event.data_json().unwrap(),
            r#"{"timestamp":5.0,"connected_clients":3}"#
        );
    }

    #[test]
    fn test_bot_status_payload() {
        let status = AgentStatus {
            is_online: true,
            previous_online: false,
            observed_at: 12.5,
        };
        let event = StreamEvent::bot_status(&status);
        assert_eq!(event.name(), "bot_status");
        assert_eq!(
            event.data_json().unwrap(),
            r#"{"is_online":true,"timestamp":12.5}"#
        );
    }

    #[test]
    fn test_initial_state_shape() {
        let event = StreamEvent::InitialState(InitialStatePayload {
            recent_trades: vec![trade("x")],
            is_online: false,
            last_update: 1.0,
        });
        let data: serde_json::Value = serde_json::from_str(&event.data_json().unwrap()).unwrap();
        assert_eq!(data["recent_trades"][0]["trade_id"], "x");
        assert_eq!(data["is_online"], false);
        assert_eq!(data["last_update"], 1.0);
    }
}
