//! Event Hub
//!
//! Sole owner of the relay's live state: the recent-trades ring, the agent
//! status and the set of attached subscribers. State transitions go through
//! [`EventHub::commit`], which turns them into [`StreamEvent`]s and pushes
//! those into each subscriber's bounded queue without waiting.
//!
//! All state sits behind one mutex. Nothing awaits while it is held, so a
//! commit costs the same no matter how far behind a subscriber is.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use relay_core::{
    epoch_seconds, AgentStatus, ChannelKind, InitialStatePayload, RelayError, RelayResult,
    StreamEvent, Trade,
};

pub const DEFAULT_RING_CAPACITY: usize = 100;
pub const DEFAULT_SEEN_CAPACITY: usize = 1000;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
pub struct EventHubConfig {
    /// Recent trades kept for snapshots
    pub ring_capacity: usize,
    /// Trade ids remembered for change detection (at least `ring_capacity`)
    pub seen_capacity: usize,
    /// Per-subscriber queue size; a full queue disconnects the subscriber
    pub queue_capacity: usize,
    /// `None` accepts any number of subscribers
    pub max_subscribers: Option<usize>,
}

impl Default for EventHubConfig {
    fn default() -> Self {
        Self {
            ring_capacity: DEFAULT_RING_CAPACITY,
            seen_capacity: DEFAULT_SEEN_CAPACITY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_subscribers: None,
        }
    }
}

/// Opaque identifier of one subscriber connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub connection_id: ConnectionId,
    pub channel_kind: ChannelKind,
    pub created_at: f64,
}

pub type EventReceiver = mpsc::Receiver<Arc<StreamEvent>>;

/// Everything a new subscriber needs: its handle, the snapshot and its queue
#[derive(Debug)]
pub struct Attachment {
    pub subscription: Subscription,
    pub initial_state: InitialStatePayload,
    pub events: EventReceiver,
}

/// What a commit changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitOutcome {
    pub trades_added: usize,
    pub status_changed: bool,
}

/// Per-connection statistics
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub connection_id: ConnectionId,
    pub channel_kind: ChannelKind,
    pub created_at: f64,
    pub events_delivered: u64,
    pub queued: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    pub connected_clients: usize,
    pub total_connections: u64,
    pub events_published: u64,
    pub events_delivered: u64,
    pub overflow_detaches: u64,
    pub ring_size: usize,
    pub ring_capacity: usize,
    pub is_online: bool,
    pub last_update: f64,
    pub clients: Vec<ClientInfo>,
}

/// Insertion-ordered set of trade ids with a fixed capacity
struct SeenIds {
    order: VecDeque<String>,
    ids: HashSet<String>,
    capacity: usize,
}

impl SeenIds {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns false if `id` was already present
    fn insert(&mut self, id: &str) -> bool {
        if !self.ids.insert(id.to_string()) {
            return false;
        }
        self.order.push_back(id.to_string());

        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }
}

struct Subscriber {
    subscription: Subscription,
    tx: mpsc::Sender<Arc<StreamEvent>>,
    delivered: u64,
}

struct HubState {
    /// Newest first
    ring: VecDeque<Trade>,
    seen: SeenIds,
    status: AgentStatus,
    last_update: f64,
    subscribers: HashMap<ConnectionId, Subscriber>,
    total_connections: u64,
    events_published: u64,
    events_delivered: u64,
    overflow_detaches: u64,
}

impl HubState {
    fn snapshot(&self) -> InitialStatePayload {
        InitialStatePayload {
            recent_trades: self.ring.iter().cloned().collect(),
            is_online: self.status.is_online,
            last_update: self.last_update,
        }
    }

    /// Enqueue `event` for every subscriber whose channel accepts it
    ///
    /// Subscribers with a full or closed queue are removed.
    /// Detach subscribers whose receiver has been dropped
    fn prune_closed(&mut self) {
        self.subscribers.retain(|id, subscriber| {
            let open = !subscriber.tx.is_closed();
            if !open {
                debug!("Subscriber {} went away, detached", id);
            }
            open
        });
    }

    fn dispatch(&mut self, event: StreamEvent) -> usize {
        let kind = event.kind();
        let event = Arc::new(event);
        let mut delivered = 0;
        let mut dropped = Vec::new();

        for (id, subscriber) in self.subscribers.iter_mut() {
            if !subscriber.subscription.channel_kind.accepts(kind) {
                continue;
            }

            match subscriber.tx.try_send(Arc::clone(&event)) {
                Ok(()) => {
                    subscriber.delivered += 1;
                    delivered += 1;
                }
                Err(TrySendError::Full(_)) => dropped.push((*id, true)),
                Err(TrySendError::Closed(_)) => dropped.push((*id, false)),
            }
        }

        for (id, overflowed) in dropped {
            self.subscribers.remove(&id);
            if overflowed {
                self.overflow_detaches += 1;
                warn!("Subscriber {} queue full, disconnecting", id);
            } else {
                debug!("Subscriber {} went away, detached", id);
            }
        }

        self.events_published += 1;
        self.events_delivered += delivered as u64;
        delivered
    }
}

/// Authoritative relay state and subscriber registry
pub struct EventHub {
    config: EventHubConfig,
    state: Mutex<HubState>,
}

impl EventHub {
    pub fn new(config: EventHubConfig) -> Self {
        let config = EventHubConfig {
            ring_capacity: config.ring_capacity.max(1),
            seen_capacity: config.seen_capacity.max(config.ring_capacity).max(1),
            queue_capacity: config.queue_capacity.max(1),
            max_subscribers: config.max_subscribers,
        };
        let now = epoch_seconds();

        let state = HubState {
            ring: VecDeque::with_capacity(config.ring_capacity),
            seen: SeenIds::new(config.seen_capacity),
            status: AgentStatus::initial(now),
            last_update: now,
            subscribers: HashMap::new(),
            total_connections: 0,
            events_published: 0,
            events_delivered: 0,
            overflow_detaches: 0,
        };

        Self {
            config,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &EventHubConfig {
        &self.config
    }

    /// Apply new trades (newest first) and an observed online flag
    ///
    /// Ids already observed are skipped. Emits `bot_status` when the online
    /// flag flips and then `new_trades` when any trade was added.
    pub fn commit(&self, new_trades: Vec<Trade>, observed_online: Option<bool>) -> CommitOutcome {
        let now = epoch_seconds();
        let mut state = self.state.lock();

        // Insert oldest first so the newest trade ends up at the front
        let mut added = Vec::new();
        for trade in new_trades.into_iter().rev() {
            if !state.seen.insert(&trade.trade_id) {
                continue;
            }
            state.ring.push_front(trade.clone());
            added.push(trade);
        }
        state.ring.truncate(self.config.ring_capacity);
        added.reverse();

        let transition = observed_online.and_then(|online| state.status.transition(online, now));
        if let Some(next) = transition {
            info!(
                "Agent status changed: {} -> {}",
                if next.previous_online { "online" } else { "offline" },
                if next.is_online { "online" } else { "offline" }
            );
            state.status = next;
        }

        let outcome = CommitOutcome {
            trades_added: added.len(),
            status_changed: transition.is_some(),
        };

        if outcome == CommitOutcome::default() {
            return outcome;
        }
        state.last_update = now;

        if let Some(status) = transition {
            state.dispatch(StreamEvent::bot_status(&status));
        }
        if !added.is_empty() {
            debug!("Committing {} new trades", added.len());
            state.dispatch(StreamEvent::new_trades(added, now));
        }

        outcome
    }

    /// Register a subscriber and hand back its snapshot and event queue
    pub fn attach(&self, channel_kind: ChannelKind) -> RelayResult<Attachment> {
        let (tx, events) = mpsc::channel(self.config.queue_capacity);
        let mut state = self.state.lock();

        if let Some(max) = self.config.max_subscribers {
            if state.subscribers.len() >= max {
                return Err(RelayError::capacity(format!(
                    "subscriber limit of {} reached",
                    max
                )));
            }
        }

        let subscription = Subscription {
            connection_id: ConnectionId::new(),
            channel_kind,
            created_at: epoch_seconds(),
        };
        let initial_state = state.snapshot();

        state.subscribers.insert(
            subscription.connection_id,
            Subscriber {
                subscription: subscription.clone(),
                tx,
                delivered: 0,
            },
        );
        state.total_connections += 1;

        info!(
            "Subscriber {} attached on {} ({} connected)",
            subscription.connection_id,
            channel_kind,
            state.subscribers.len()
        );

        Ok(Attachment {
            subscription,
            initial_state,
            events,
        })
    }

    /// Remove a subscriber; returns false if it was already gone
    pub fn detach(&self, connection_id: ConnectionId) -> bool {
        let mut state = self.state.lock();
        let removed = state.subscribers.remove(&connection_id).is_some();

        if removed {
            info!(
                "Subscriber {} detached ({} connected)",
                connection_id,
                state.subscribers.len()
            );
        }
        removed
    }

    /// Push a heartbeat carrying the connected client count
    pub fn publish_heartbeat(&self) -> usize {
        let mut state = self.state.lock();
        state.prune_closed();
        let connected = state.subscribers.len();
        state.dispatch(StreamEvent::heartbeat(epoch_seconds(), Some(connected)))
    }

    /// Ids the change detector should treat as already observed
    pub fn known_ids(&self) -> HashSet<String> {
        self.state.lock().seen.ids.clone()
    }

    pub fn snapshot(&self) -> InitialStatePayload {
        self.state.lock().snapshot()
    }

    pub fn status(&self) -> AgentStatus {
        self.state.lock().status
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    pub fn stats(&self) -> HubStats {
        let state = self.state.lock();

        let clients = state
            .subscribers
            .values()
            .map(|s| ClientInfo {
                connection_id: s.subscription.connection_id,
                channel_kind: s.subscription.channel_kind,
                created_at: s.subscription.created_at,
                events_delivered: s.delivered,
                queued: s.tx.max_capacity() - s.tx.capacity(),
            })
            .collect();

        HubStats {
            connected_clients: state.subscribers.len(),
            total_connections: state.total_connections,
            events_published: state.events_published,
            events_delivered: state.events_delivered,
            overflow_detaches: state.overflow_detaches,
            ring_size: state.ring.len(),
            ring_capacity: self.config.ring_capacity,
            is_online: state.status.is_online,
            last_update: state.last_update,
            clients,
        }
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(EventHubConfig::default())
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("config", &self.config)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
