//! Fallback Data Source
//!
//! Trades come from an ordered list of providers: the live agent, then the
//! cache, then the upstream Kalshi API. The first provider that answers in
//! time wins; a failure just moves on to the next one.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use relay_core::{RelayError, RelayResult, StatusProbe, Trade, TradeSource};
use relay_kalshi::KalshiClient;

use crate::agent_client::{AgentClient, AgentStatusSource};
use crate::trade_cache::{TradeCache, TtlClass};

/// Cache key holding the agent's last successful trade list
pub const AGENT_TRADES_KEY: &str = "agent:trades:history";

/// One source of trades in the fallback chain
#[async_trait]
pub trait TradeProvider: Send + Sync {
    /// Tag applied to every trade this provider returns
    fn source(&self) -> TradeSource;

    /// Current trades, newest first
    async fn fetch_trades(&self) -> RelayResult<Vec<Trade>>;
}

/// Trades plus the provider that produced them
#[derive(Debug, Clone)]
pub struct SourcedTrades {
    pub source: TradeSource,
    pub trades: Vec<Trade>,
}

// ============================================================================
// Providers
// ============================================================================

/// Live agent; successful fetches are written through to the cache
pub struct AgentProvider {
    client: Arc<AgentClient>,
    cache: Arc<TradeCache>,
}

impl AgentProvider {
    pub fn new(client: Arc<AgentClient>, cache: Arc<TradeCache>) -> Self {
        Self { client, cache }
    }
}

#[async_trait]
impl TradeProvider for AgentProvider {
    fn source(&self) -> TradeSource {
        TradeSource::AgentLive
    }

    async fn fetch_trades(&self) -> RelayResult<Vec<Trade>> {
        let trades = self.client.fetch_trades().await?;

        if let Err(e) = self.cache.put_json(AGENT_TRADES_KEY, &trades, TtlClass::Long) {
            warn!("Failed to cache agent trades: {}", e);
        }

        Ok(trades)
    }
}

/// Last agent trade list still within its TTL
pub struct CacheProvider {
    cache: Arc<TradeCache>,
    key: String,
}

impl CacheProvider {
    pub fn new(cache: Arc<TradeCache>) -> Self {
        Self::with_key(cache, AGENT_TRADES_KEY)
    }

    pub fn with_key(cache: Arc<TradeCache>, key: impl Into<String>) -> Self {
        Self {
            cache,
            key: key.into(),
        }
    }
}

#[async_trait]
impl TradeProvider for CacheProvider {
    fn source(&self) -> TradeSource {
        TradeSource::Cache
    }

    async fn fetch_trades(&self) -> RelayResult<Vec<Trade>> {
        self.cache
            .get_json::<Vec<Trade>>(&self.key)?
            .ok_or_else(|| RelayError::cache(format!("no current entry for {}", self.key)))
    }
}

/// Portfolio fills from the Kalshi API
pub struct UpstreamProvider {
    client: KalshiClient,
    fills_limit: u32,
}

impl UpstreamProvider {
    pub fn new(client: KalshiClient, fills_limit: u32) -> Self {
        Self {
            client,
            fills_limit,
        }
    }
}

#[async_trait]
impl TradeProvider for UpstreamProvider {
    fn source(&self) -> TradeSource {
        TradeSource::FallbackApi
    }

    async fn fetch_trades(&self) -> RelayResult<Vec<Trade>> {
        self.client.get_fills(self.fills_limit).await
    }
}

// ============================================================================
// Fallback chain
// ============================================================================

/// Status probe plus ordered trade providers
pub struct FallbackDataSource {
    status: Arc<dyn AgentStatusSource>,
    providers: Vec<Arc<dyn TradeProvider>>,
    provider_timeout: Duration,
}

impl FallbackDataSource {
    pub fn new(
        status: Arc<dyn AgentStatusSource>,
        providers: Vec<Arc<dyn TradeProvider>>,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            status,
            providers,
            provider_timeout,
        }
    }

    /// Agent → cache → Kalshi, sharing one cache between write-through and read
    pub fn standard(
        agent: Arc<AgentClient>,
        cache: Arc<TradeCache>,
        kalshi: KalshiClient,
        fills_limit: u32,
        provider_timeout: Duration,
    ) -> Self {
        let providers: Vec<Arc<dyn TradeProvider>> = vec![
            Arc::new(AgentProvider::new(Arc::clone(&agent), Arc::clone(&cache))),
            Arc::new(CacheProvider::new(cache)),
            Arc::new(UpstreamProvider::new(kalshi, fills_limit)),
        ];

        Self::new(agent, providers, provider_timeout)
    }

    pub fn provider_sources(&self) -> Vec<TradeSource> {
        self.providers.iter().map(|p| p.source()).collect()
    }

    /// Probe agent liveness; a probe that overruns the timeout is inconclusive
    pub async fn fetch_status(&self) -> StatusProbe {
        match timeout(self.provider_timeout, self.status.probe_status()).await {
            Ok(probe) => probe,
            Err(_) => {
                debug!("Agent status probe exceeded {:?}", self.provider_timeout);
                StatusProbe::Inconclusive
            }
        }
    }

    /// Trades from the first provider that succeeds
    ///
    /// Returns `DataUnavailable` once every provider has failed.
    pub async fn fetch_trades(&self) -> RelayResult<SourcedTrades> {
        for provider in &self.providers {
            let source = provider.source();

            let result = match timeout(self.provider_timeout, provider.fetch_trades()).await {
                Ok(result) => result,
                Err(_) => Err(RelayError::timeout(format!(
                    "{} exceeded {:?}",
                    source, self.provider_timeout
                ))),
            };

            match result {
                Ok(trades) => {
                    if source != TradeSource::AgentLive {
                        info!("Serving {} trades from {}", trades.len(), source);
                    }
                    let trades = trades.into_iter().map(|t| t.with_source(source)).collect();
                    return Ok(SourcedTrades { source, trades });
                }
                Err(e @ RelayError::Malformed(_)) => {
                    warn!("Provider {} returned malformed data: {}", source, e);
                }
                Err(e) if e.is_transient() => {
                    debug!("Provider {} unavailable: {}", source, e);
                }
                Err(e) => {
                    debug!("Provider {} skipped: {}", source, e);
                }
            }
        }

        Err(RelayError::DataUnavailable)
    }
}

impl std::fmt::Debug for FallbackDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackDataSource")
            .field("providers", &self.provider_sources())
            .field("provider_timeout", &self.provider_timeout)
            .finish()
    }
}
