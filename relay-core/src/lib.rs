//! Core types for the live trade relay
//!
//! This crate defines the shared data structures used across the relay:
//! trades, agent status, the server-push event protocol and errors.

pub mod error;
pub mod event;
pub mod status;
pub mod trade;

pub use error::{RelayError, RelayResult};
pub use event::{
    BotStatusPayload, ChannelKind, EventKind, HeartbeatPayload, InitialStatePayload,
    NewTradesPayload, StreamEvent,
};
pub use status::{AgentStatus, StatusProbe};
pub use trade::{epoch_seconds, to_epoch_seconds, Trade, TradeSide, TradeSource};
