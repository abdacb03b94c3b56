//! Services for the live trade relay
//!
//! This crate wires the trade sources (agent, cache, Kalshi) into a single
//! poll loop and fans committed state out to subscribers through the
//! event hub.

pub mod agent_client;
pub mod change_detector;
pub mod config;
pub mod data_source;
pub mod event_hub;
pub mod heartbeat;
pub mod poller;
pub mod trade_cache;

pub use agent_client::{AgentClient, AgentClientConfig, AgentHealth, AgentStatusSource, AgentTrade};
pub use change_detector::{detect_new_trades, detect_new_trades_with};
pub use config::{KalshiSourceConfig, RelayConfig};
pub use data_source::{
    AgentProvider, CacheProvider, FallbackDataSource, SourcedTrades, TradeProvider,
    UpstreamProvider, AGENT_TRADES_KEY,
};
pub use event_hub::{
    Attachment, ClientInfo, CommitOutcome, ConnectionId, EventHub, EventHubConfig, EventReceiver,
    HubStats, Subscription,
};
pub use heartbeat::HeartbeatScheduler;
pub use poller::{
    notice_channel, AgentNotice, AgentPoller, NoticeReceiver, NoticeSender, PollOutcome,
    PollState, PollerConfig, PollerStats,
};
pub use trade_cache::{TradeCache, TradeCacheConfig, TradeCacheError, TtlClass};
