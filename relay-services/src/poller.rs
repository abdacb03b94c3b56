//! Agent Poll Loop
//!
//! The only writer of trade and status state. Every tick it probes the
//! agent, fetches trades through the fallback chain, keeps the ones the hub
//! has not seen and commits them. Between ticks it applies notices pushed by
//! the agent's webhooks.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relay_core::{RelayError, StatusProbe, Trade, TradeSource};

use crate::change_detector::detect_new_trades;
use crate::data_source::FallbackDataSource;
use crate::event_hub::{CommitOutcome, EventHub};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Buffer between the webhook handlers and the poll loop
pub const NOTICE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Something the agent told us directly
#[derive(Debug, Clone, PartialEq)]
pub enum AgentNotice {
    Online,
    Offline,
    Trade(Trade),
}

pub type NoticeSender = mpsc::Sender<AgentNotice>;
pub type NoticeReceiver = mpsc::Receiver<AgentNotice>;

pub fn notice_channel() -> (NoticeSender, NoticeReceiver) {
    mpsc::channel(NOTICE_CHANNEL_CAPACITY)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Idle,
    Fetching,
    Committing,
}

/// Result of one poll cycle
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Committed {
        source: TradeSource,
        outcome: CommitOutcome,
    },
    /// Every provider failed; no trades were committed
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollerStats {
    pub state: PollState,
    pub interval_ms: u64,
    pub cycles_completed: u64,
    pub cycles_skipped: u64,
    pub commits: u64,
    pub trades_committed: u64,
    pub notices_received: u64,
    pub last_source: Option<TradeSource>,
}

#[derive(Default)]
struct Counters {
    cycles_completed: AtomicU64,
    cycles_skipped: AtomicU64,
    commits: AtomicU64,
    trades_committed: AtomicU64,
    notices_received: AtomicU64,
}

/// Drives the fallback chain and commits into the hub
pub struct AgentPoller {
    source: Arc<FallbackDataSource>,
    hub: Arc<EventHub>,
    config: PollerConfig,
    state: RwLock<PollState>,
    last_source: RwLock<Option<TradeSource>>,
    counters: Counters,
}

impl AgentPoller {
    pub fn new(source: Arc<FallbackDataSource>, hub: Arc<EventHub>, config: PollerConfig) -> Self {
        Self {
            source,
            hub,
            config,
            state: RwLock::new(PollState::Idle),
            last_source: RwLock::new(None),
            counters: Counters::default(),
        }
    }

    /// Run until `cancel` fires
    pub async fn run(self: Arc<Self>, mut notices: NoticeReceiver, cancel: CancellationToken) {
        info!(
            "Starting agent poller with {:?} interval",
            self.config.interval
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                _ = ticker.tick() => {
                    self.poll_once().await;
                }

                Some(notice) = notices.recv() => {
                    self.handle_notice(notice);
                }
            }
        }

        info!("Agent poller stopped");
    }

    /// One Idle → Fetching → Committing → Idle cycle
    pub async fn poll_once(&self) -> PollOutcome {
        self.set_state(PollState::Fetching);

        let probe = self.source.fetch_status().await;
        let fetched = match self.source.fetch_trades().await {
            Ok(fetched) => fetched,
            Err(RelayError::DataUnavailable) => {
                warn!("All trade providers failed, skipping cycle");
                return self.skip_cycle(probe);
            }
            Err(e) => {
                warn!("Unexpected fetch error, skipping cycle: {}", e);
                return self.skip_cycle(probe);
            }
        };

        if probe == StatusProbe::Inconclusive {
            debug!("Agent status probe inconclusive, keeping current status");
        }

        let known = self.hub.known_ids();
        let new_trades = detect_new_trades(&known, &fetched.trades);

        self.set_state(PollState::Committing);
        let outcome = self.commit(new_trades, probe.as_online());

        *self.last_source.write() = Some(fetched.source);
        self.counters.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.set_state(PollState::Idle);

        PollOutcome::Committed {
            source: fetched.source,
            outcome,
        }
    }

    /// Apply one webhook notice as its own commit
    pub fn handle_notice(&self, notice: AgentNotice) -> CommitOutcome {
        self.counters.notices_received.fetch_add(1, Ordering::Relaxed);
        debug!("Handling agent notice: {:?}", notice);

        match notice {
            AgentNotice::Online => self.commit(Vec::new(), Some(true)),
            AgentNotice::Offline => self.commit(Vec::new(), Some(false)),
            AgentNotice::Trade(trade) => {
                let new_trades = detect_new_trades(&self.hub.known_ids(), &[trade]);
                self.commit(new_trades, None)
            }
        }
    }

    pub fn state(&self) -> PollState {
        *self.state.read()
    }

    pub fn stats(&self) -> PollerStats {
        PollerStats {
            state: self.state(),
            interval_ms: self.config.interval.as_millis() as u64,
            cycles_completed: self.counters.cycles_completed.load(Ordering::Relaxed),
            cycles_skipped: self.counters.cycles_skipped.load(Ordering::Relaxed),
            commits: self.counters.commits.load(Ordering::Relaxed),
            trades_committed: self.counters.trades_committed.load(Ordering::Relaxed),
            notices_received: self.counters.notices_received.load(Ordering::Relaxed),
            last_source: *self.last_source.read(),
        }
    }

    fn commit(&self, new_trades: Vec<Trade>, observed_online: Option<bool>) -> CommitOutcome {
        let outcome = self.hub.commit(new_trades, observed_online);

        if outcome != CommitOutcome::default() {
            self.counters.commits.fetch_add(1, Ordering::Relaxed);
            self.counters
                .trades_committed
                .fetch_add(outcome.trades_added as u64, Ordering::Relaxed);
        }
        if outcome.trades_added > 0 {
            info!("Committed {} new trades", outcome.trades_added);
        }

        outcome
    }

    /// Drops the trade half of a cycle. A probe that confirmed the agent is
    /// down is still committed; any other probe leaves status untouched.
    fn skip_cycle(&self, probe: StatusProbe) -> PollOutcome {
        if probe == StatusProbe::Offline {
            self.set_state(PollState::Committing);
            if self.commit(Vec::new(), Some(false)).status_changed {
                warn!("Agent confirmed offline");
            }
        }

        self.counters.cycles_skipped.fetch_add(1, Ordering::Relaxed);
        self.set_state(PollState::Idle);
        PollOutcome::Skipped
    }

    fn set_state(&self, state: PollState) {
        *self.state.write() = state;
    }
}

impl std::fmt::Debug for AgentPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentPoller")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}
