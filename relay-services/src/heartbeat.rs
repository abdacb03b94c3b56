//! Heartbeat scheduler
//!
//! Keeps idle subscriber connections alive by publishing a `heartbeat`
//! event through the hub on a fixed period.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::event_hub::EventHub;

pub struct HeartbeatScheduler {
    hub: Arc<EventHub>,
    period: Duration,
}

impl HeartbeatScheduler {
    pub fn new(hub: Arc<EventHub>, period: Duration) -> Self {
        Self { hub, period }
    }

    /// Publish one heartbeat per period until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) {
        info!("Starting heartbeat scheduler with {:?} period", self.period);

        // First beat one full period after start
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let delivered = self.hub.publish_heartbeat();
                    debug!("Heartbeat delivered to {} subscribers", delivered);
                }
            }
        }

        info!("Heartbeat scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{ChannelKind, EventKind, StreamEvent};

    #[tokio::test(start_paused = true)]
    async fn test_idle_subscriber_gets_heartbeat_within_one_period() {
        let hub = Arc::new(EventHub::default());
        let mut events = hub.attach(ChannelKind::StatusOnly).unwrap().events;
        let cancel = CancellationToken::new();

        let period = Duration::from_secs(30);
        let handle = tokio::spawn(HeartbeatScheduler::new(Arc::clone(&hub), period).run(cancel.clone()));

        let event = tokio::time::timeout(period + Duration::from_millis(10), events.recv())
            .await
            .expect("heartbeat within one period")
            .expect("queue open");

        assert_eq!(event.kind(), EventKind::Heartbeat);
        if let StreamEvent::Heartbeat(payload) = event.as_ref() {
            assert_eq!(payload.connected_clients, Some(1));
        }

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeats_keep_coming() {
        let hub = Arc::new(EventHub::default());
        let mut events = hub.attach(ChannelKind::All).unwrap().events;
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(
            HeartbeatScheduler::new(Arc::clone(&hub), Duration::from_secs(5)).run(cancel.clone()),
        );

        tokio::time::sleep(Duration::from_secs(16)).await;
        cancel.cancel();
        handle.await.unwrap();

        let mut beats = 0;
        while let Ok(event) = events.try_recv() {
            assert_eq!(event.kind(), EventKind::Heartbeat);
            beats += 1;
        }
        assert_eq!(beats, 3);
    }
}
