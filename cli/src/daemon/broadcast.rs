//! Fan-out of published snapshots to live subscribers.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};
use wattwise_protocol::{ComponentReading, DaemonResponse, DataSnapshot, PowerSample, Session};

pub type SubscriberId = u64;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HubError {
    #[error("Maximum subscribers ({0}) reached")]
    TooManySubscribers(usize),
}

#[derive(Default)]
struct HubState {
    subscribers: HashMap<SubscriberId, mpsc::Sender<DaemonResponse>>,
    latest: Option<DataSnapshot>,
}

/// Delivers every published snapshot to each registered subscriber.
///
/// Delivery never waits: a subscriber whose queue is full misses that update
/// and a subscriber whose receiver is gone is dropped. Each subscriber sees
/// updates in publish order.
pub struct BroadcastHub {
    state: Mutex<HubState>,
    max_subscribers: usize,
}

impl BroadcastHub {
    pub fn new(max_subscribers: usize) -> Self {
        Self {
            state: Mutex::new(HubState::default()),
            max_subscribers,
        }
    }

    fn state(&self) -> MutexGuard<'_, HubState> {
        // Every critical section leaves the map consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers `tx` under `id`. Re-subscribing an existing id replaces its channel.
    pub fn subscribe(
        &self,
        id: SubscriberId,
        tx: mpsc::Sender<DaemonResponse>,
    ) -> Result<(), HubError> {
        let mut state = self.state();
        if !state.subscribers.contains_key(&id) && state.subscribers.len() >= self.max_subscribers {
            return Err(HubError::TooManySubscribers(self.max_subscribers));
        }
        state.subscribers.insert(id, tx);
        debug!(subscriber = id, count = state.subscribers.len(), "Subscriber added");
        Ok(())
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut state = self.state();
        let removed = state.subscribers.remove(&id).is_some();
        if removed {
            debug!(subscriber = id, count = state.subscribers.len(), "Subscriber removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.state().subscribers.len()
    }

    /// Records the snapshot as the latest and pushes it to every subscriber.
    /// Returns how many subscribers accepted it.
    pub fn publish(
        &self,
        sample: PowerSample,
        components: Vec<ComponentReading>,
        session: Option<Session>,
    ) -> usize {
        let snapshot = DataSnapshot {
            timestamp: sample.timestamp,
            sample,
            components,
            session,
        };

        let mut state = self.state();
        state.latest = Some(snapshot.clone());

        let update = DaemonResponse::DataUpdate(snapshot);
        let mut delivered = 0;
        state.subscribers.retain(|id, tx| match tx.try_send(update.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                trace!(subscriber = *id, "Subscriber queue full, update dropped");
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber = *id, "Removed disconnected subscriber");
                false
            }
        });
        delivered
    }

    /// Most recently published snapshot.
    pub fn latest(&self) -> Option<DataSnapshot> {
        self.state().latest.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wattwise_protocol::MAX_SUBSCRIBERS;

    fn sample(timestamp: i64) -> PowerSample {
        PowerSample {
            timestamp,
            power_watts: 100.0,
            accumulated_kwh: 0.0,
            session_id: "s".to_string(),
            cpu_util_pct: 0.0,
            gpu_util_pct: 0.0,
            mem_util_pct: 0.0,
        }
    }

    fn timestamp_of(response: DaemonResponse) -> i64 {
        match response {
            DaemonResponse::DataUpdate(snapshot) => snapshot.timestamp,
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn test_updates_arrive_in_publish_order() {
        let hub = BroadcastHub::new(MAX_SUBSCRIBERS);
        let (tx_a, mut rx_a) = mpsc::channel(16);
        let (tx_b, mut rx_b) = mpsc::channel(16);
        hub.subscribe(1, tx_a).unwrap();
        hub.subscribe(2, tx_b).unwrap();

        for ts in 1..=5 {
            assert_eq!(hub.publish(sample(ts), Vec::new(), None), 2);
        }

        for rx in [&mut rx_a, &mut rx_b] {
            let received: Vec<i64> = (0..5)
                .map(|_| timestamp_of(rx.try_recv().unwrap()))
                .collect();
            assert_eq!(received, vec![1, 2, 3, 4, 5]);
        }
        assert_eq!(hub.latest().unwrap().timestamp, 5);
    }

    #[test]
    fn test_full_subscriber_does_not_block_others() {
        let hub = BroadcastHub::new(MAX_SUBSCRIBERS);
        let (slow_tx, mut slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(8);
        hub.subscribe(1, slow_tx).unwrap();
        hub.subscribe(2, fast_tx).unwrap();

        hub.publish(sample(1), Vec::new(), None);
        assert_eq!(hub.publish(sample(2), Vec::new(), None), 1);

        assert_eq!(timestamp_of(slow_rx.try_recv().unwrap()), 1);
        assert!(slow_rx.try_recv().is_err());
        assert_eq!(timestamp_of(fast_rx.try_recv().unwrap()), 1);
        assert_eq!(timestamp_of(fast_rx.try_recv().unwrap()), 2);
        assert_eq!(hub.subscriber_count(), 2);
    }

    #[test]
    fn test_closed_subscriber_is_removed() {
        let hub = BroadcastHub::new(MAX_SUBSCRIBERS);
        let (tx, rx) = mpsc::channel(4);
        hub.subscribe(7, tx).unwrap();
        drop(rx);

        assert_eq!(hub.publish(sample(1), Vec::new(), None), 0);
        assert_eq!(hub.subscriber_count(), 0);
        assert!(!hub.unsubscribe(7));
    }

    #[test]
    fn test_subscriber_limit() {
        let hub = BroadcastHub::new(2);
        let mut receivers = Vec::new();
        for id in 0..2 {
            let (tx, rx) = mpsc::channel(1);
            hub.subscribe(id, tx).unwrap();
            receivers.push(rx);
        }

        let (tx, _rx) = mpsc::channel(1);
        assert_eq!(hub.subscribe(9, tx.clone()), Err(HubError::TooManySubscribers(2)));
        assert!(hub.subscribe(0, tx.clone()).is_ok());

        assert!(hub.unsubscribe(1));
        assert!(hub.subscribe(9, tx).is_ok());
        assert_eq!(hub.subscriber_count(), 2);
    }

    #[test]
    fn test_latest_is_none_before_publish() {
        let hub = BroadcastHub::new(MAX_SUBSCRIBERS);
        assert!(hub.latest().is_none());
    }
}
