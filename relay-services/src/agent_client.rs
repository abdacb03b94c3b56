//! Trading agent HTTP client
//!
//! The agent exposes two endpoints: `GET /health` and `GET /trades`.
//! Both are called with a short timeout; anything slower is treated as
//! an outage and the relay falls back to its other sources.

use async_trait::async_trait;
use relay_core::{RelayError, RelayResult, StatusProbe, Trade, TradeSide, TradeSource};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub const DEFAULT_AGENT_URL: &str = "http://localhost:8000";
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct AgentClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for AgentClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_AGENT_URL.to_string(),
            timeout: DEFAULT_AGENT_TIMEOUT,
        }
    }
}

/// Body of `GET /health`; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentHealth {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub is_online: Option<bool>,
    #[serde(default)]
    pub trade_count: Option<u64>,
}

impl AgentHealth {
    /// Whether the agent reports itself as not running
    pub fn reports_down(&self) -> bool {
        if self.is_online == Some(false) {
            return true;
        }

        matches!(
            self.status.as_deref().map(str::to_lowercase).as_deref(),
            Some("offline" | "stopped" | "down" | "error")
        )
    }
}

/// A trade as the agent reports it, either from `/trades` or a webhook
#[derive(Debug, Clone, Deserialize)]
pub struct AgentTrade {
    pub timestamp: f64,
    pub ticker: String,
    pub side: String,
    pub quantity: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub trade_id: String,
}

impl AgentTrade {
    /// Validate and convert into a relay trade tagged `agent-live`
    pub fn into_trade(self) -> RelayResult<Trade> {
        if self.trade_id.trim().is_empty() {
            return Err(RelayError::malformed("agent trade without trade_id"));
        }

        let side = self
            .side
            .parse::<TradeSide>()
            .map_err(|e| RelayError::malformed(format!("trade {}: {}", self.trade_id, e)))?;

        let quantity = u32::try_from(self.quantity)
            .ok()
            .filter(|q| *q > 0)
            .ok_or_else(|| {
                RelayError::malformed(format!(
                    "trade {} has invalid quantity {}",
                    self.trade_id, self.quantity
                ))
            })?;

        if self.ticker.trim().is_empty() {
            return Err(RelayError::malformed(format!(
                "trade {} without ticker",
                self.trade_id
            )));
        }

        Ok(Trade {
            timestamp: self.timestamp,
            ticker: self.ticker,
            side,
            quantity,
            price: self.price,
            trade_id: self.trade_id,
            source: TradeSource::AgentLive,
        })
    }
}

/// `/trades` answers with either a bare array or a wrapper object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TradesBody {
    Bare(Vec<AgentTrade>),
    Wrapped { trades: Vec<AgentTrade> },
}

impl TradesBody {
    fn into_trades(self) -> Vec<AgentTrade> {
        match self {
            TradesBody::Bare(trades) => trades,
            TradesBody::Wrapped { trades } => trades,
        }
    }
}

/// Anything that can be asked whether the agent is up
#[async_trait]
pub trait AgentStatusSource: Send + Sync {
    async fn probe_status(&self) -> StatusProbe;
}

/// HTTP client for the trading agent
#[derive(Debug, Clone)]
pub struct AgentClient {
    client: Client,
    base_url: String,
}

impl AgentClient {
    pub fn new(config: &AgentClientConfig) -> RelayResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RelayError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the agent's recent trades, newest first
    ///
    /// Entries that fail validation are dropped with a warning; a body that
    /// is not a trade list at all is `Malformed`.
    #[instrument(skip(self))]
    pub async fn fetch_trades(&self) -> RelayResult<Vec<Trade>> {
        let url = format!("{}/trades", self.base_url);
        debug!("Fetching agent trades from: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            return Err(RelayError::api(format!(
                "agent /trades returned {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RelayError::unreachable(format!("Failed to read agent body: {}", e)))?;

        let parsed: TradesBody = serde_json::from_str(&body)
            .map_err(|e| RelayError::malformed(format!("agent /trades: {}", e)))?;

        let trades = parsed
            .into_trades()
            .into_iter()
            .filter_map(|raw| match raw.into_trade() {
                Ok(trade) => Some(trade),
                Err(e) => {
                    warn!("Dropping agent trade: {}", e);
                    None
                }
            })
            .collect();

        Ok(trades)
    }
}

#[async_trait]
impl AgentStatusSource for AgentClient {
    /// Probe `GET /health`
    ///
    /// A refused connection or a non-success status confirms the agent is
    /// down. Timeouts and unreadable bodies prove nothing either way.
    async fn probe_status(&self) -> StatusProbe {
        let url = format!("{}/health", self.base_url);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) if e.is_connect() => {
                debug!("Agent refused connection: {}", e);
                return StatusProbe::Offline;
            }
            Err(e) => {
                debug!("Agent health probe inconclusive: {}", e);
                return StatusProbe::Inconclusive;
            }
        };

        if !response.status().is_success() {
            debug!("Agent health returned {}", response.status());
            return StatusProbe::Offline;
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!("Failed to read agent health body: {}", e);
                return StatusProbe::Inconclusive;
            }
        };

        if body.trim().is_empty() {
            return StatusProbe::Online;
        }

        match serde_json::from_str::<AgentHealth>(&body) {
            Ok(health) if health.reports_down() => StatusProbe::Offline,
            Ok(_) => StatusProbe::Online,
            Err(e) => {
                warn!("Malformed agent health body: {}", e);
                StatusProbe::Inconclusive
            }
        }
    }
}

fn map_send_error(e: reqwest::Error) -> RelayError {
    if e.is_timeout() {
        RelayError::timeout(format!("agent request timed out: {}", e))
    } else {
        RelayError::unreachable(format!("agent unreachable: {}", e))
    }
}
