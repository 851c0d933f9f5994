//! In-memory event bus backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc::{self, error::SendTimeoutError};

use super::{PubSub, Subscription};
use crate::core::MachineError;

/// Default bound on how long a publish waits for one lane to accept.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// In-memory event bus with single-slot lanes.
///
/// Delivery policy: with no subscribers a publish returns immediately. With
/// subscribers, each lane is offered the value concurrently and given up on
/// after the publish timeout, so an idle reader cannot wedge a publisher.
#[derive(Debug)]
pub struct InMemoryPubSub {
    /// channel -> routine id -> lane sender.
    lanes: RwLock<HashMap<String, HashMap<String, mpsc::Sender<Value>>>>,
    closed: AtomicBool,
    publish_timeout: Duration,
}

impl Default for InMemoryPubSub {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPubSub {
    /// Create an empty bus with the default publish timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_publish_timeout(DEFAULT_PUBLISH_TIMEOUT)
    }

    /// Create an empty bus with a custom per-lane publish timeout.
    #[must_use]
    pub fn with_publish_timeout(publish_timeout: Duration) -> Self {
        Self {
            lanes: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            publish_timeout,
        }
    }

    /// Number of lanes registered on `channel`.
    #[must_use]
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.lanes.read().get(channel).map_or(0, HashMap::len)
    }

    fn prune_closed(&self, channel: &str) {
        let mut lanes = self.lanes.write();
        if let Some(subs) = lanes.get_mut(channel) {
            subs.retain(|_, tx| !tx.is_closed());
            if subs.is_empty() {
                lanes.remove(channel);
            }
        }
    }
}

#[async_trait]
impl PubSub for InMemoryPubSub {
    fn subscribe(&self, channel: &str, routine_id: &str) -> Result<Subscription, MachineError> {
        let mut lanes = self.lanes.write();
        // Checked under the write lock so close() cannot race a new lane in.
        if self.is_closed() {
            return Err(MachineError::Closed);
        }
        let (tx, rx) = mpsc::channel(1);
        lanes
            .entry(channel.to_owned())
            .or_default()
            .insert(routine_id.to_owned(), tx);
        tracing::debug!(channel, routine_id, "subscribed");
        Ok(Subscription::new(channel.to_owned(), rx))
    }

    async fn publish(&self, channel: &str, value: Value) -> Result<usize, MachineError> {
        if self.is_closed() {
            return Err(MachineError::Closed);
        }

        let targets: Vec<(String, mpsc::Sender<Value>)> = {
            let lanes = self.lanes.read();
            lanes
                .get(channel)
                .map(|subs| {
                    subs.iter()
                        .map(|(id, tx)| (id.clone(), tx.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };

        if targets.is_empty() {
            tracing::trace!(channel, "publish without subscribers dropped");
            return Ok(0);
        }

        let timeout = self.publish_timeout;
        let sends = targets.into_iter().map(|(id, tx)| {
            let value = value.clone();
            async move { (id, tx.send_timeout(value, timeout).await) }
        });

        let mut delivered = 0;
        let mut saw_closed = false;
        for (routine_id, outcome) in join_all(sends).await {
            match outcome {
                Ok(()) => delivered += 1,
                Err(SendTimeoutError::Timeout(_)) => {
                    tracing::warn!(channel, routine_id, "subscriber did not accept event in time");
                }
                Err(SendTimeoutError::Closed(_)) => saw_closed = true,
            }
        }

        if saw_closed {
            self.prune_closed(channel);
        }
        Ok(delivered)
    }

    fn unsubscribe(&self, routine_id: &str) {
        let mut lanes = self.lanes.write();
        lanes.retain(|_, subs| {
            subs.remove(routine_id);
            !subs.is_empty()
        });
    }

    fn close(&self) {
        let mut lanes = self.lanes.write();
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        lanes.clear();
        tracing::debug!("event bus closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_without_subscribers_returns_zero() {
        let bus = InMemoryPubSub::new();
        let delivered = tokio::time::timeout(Duration::from_millis(100), bus.publish("x", json!(1)))
            .await
            .expect("publish must not block")
            .unwrap();
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let bus = InMemoryPubSub::new();
        let mut a = bus.subscribe("x", "a").unwrap();
        let mut b = bus.subscribe("x", "b").unwrap();

        assert_eq!(bus.publish("x", json!("hi")).await.unwrap(), 2);
        assert_eq!(a.recv().await, Some(json!("hi")));
        assert_eq!(b.recv().await, Some(json!("hi")));
    }

    #[tokio::test]
    async fn test_resubscribe_replaces_lane() {
        let bus = InMemoryPubSub::new();
        let mut first = bus.subscribe("x", "a").unwrap();
        let mut second = bus.subscribe("x", "a").unwrap();
        assert_eq!(bus.subscriber_count("x"), 1);

        assert!(first.recv().await.is_none());
        assert_eq!(bus.publish("x", json!(7)).await.unwrap(), 1);
        assert_eq!(second.recv().await, Some(json!(7)));
    }

    #[tokio::test]
    async fn test_slow_subscriber_times_out() {
        let bus = InMemoryPubSub::with_publish_timeout(Duration::from_millis(20));
        let _idle = bus.subscribe("x", "idle").unwrap();

        // First value fills the single slot, second cannot be accepted.
        assert_eq!(bus.publish("x", json!(1)).await.unwrap(), 1);
        assert_eq!(bus.publish("x", json!(2)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dropped_reader_is_pruned() {
        let bus = InMemoryPubSub::new();
        drop(bus.subscribe("x", "gone").unwrap());
        assert_eq!(bus.publish("x", json!(1)).await.unwrap(), 0);
        assert_eq!(bus.subscriber_count("x"), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_all_lanes_of_routine() {
        let bus = InMemoryPubSub::new();
        let mut x = bus.subscribe("x", "r").unwrap();
        let _y = bus.subscribe("y", "r").unwrap();
        bus.unsubscribe("r");

        assert_eq!(bus.subscriber_count("x"), 0);
        assert_eq!(bus.subscriber_count("y"), 0);
        assert!(x.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_bus_fails_cleanly() {
        let bus = InMemoryPubSub::new();
        let mut sub = bus.subscribe("x", "a").unwrap();
        bus.close();
        bus.close();

        assert!(sub.recv().await.is_none());
        assert!(matches!(bus.publish("x", json!(1)).await, Err(MachineError::Closed)));
        assert!(matches!(bus.subscribe("x", "b"), Err(MachineError::Closed)));
    }
}
