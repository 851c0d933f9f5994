//! Event bus: in-process publish/subscribe scoped to one machine.

pub mod memory;

pub use memory::InMemoryPubSub;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::core::MachineError;

/// Abstraction for event bus backends.
///
/// A channel name maps to one delivery lane per subscribing routine.
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Register a lane for `routine_id` on `channel`, replacing any lane the
    /// routine already had there.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::Closed`] once the bus has been closed.
    fn subscribe(&self, channel: &str, routine_id: &str) -> Result<Subscription, MachineError>;

    /// Deliver `value` to the lanes currently registered on `channel` and
    /// return how many accepted it. Publishing to a channel without
    /// subscribers is a no-op that returns `Ok(0)`.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::Closed`] once the bus has been closed.
    async fn publish(&self, channel: &str, value: Value) -> Result<usize, MachineError>;

    /// Drop every lane owned by `routine_id`.
    fn unsubscribe(&self, routine_id: &str);

    /// Release all lanes. Readers observe end-of-stream. Idempotent.
    fn close(&self);

    /// Whether [`PubSub::close`] has been called.
    fn is_closed(&self) -> bool;
}

/// Receiving end of a delivery lane.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    rx: mpsc::Receiver<Value>,
}

impl Subscription {
    /// Wrap a lane receiver.
    #[must_use]
    pub const fn new(channel: String, rx: mpsc::Receiver<Value>) -> Self {
        Self { channel, rx }
    }

    /// Channel this lane is registered on.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next value. `None` once the lane has been replaced,
    /// unsubscribed, or the bus closed.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Take a value if one is waiting.
    pub fn try_recv(&mut self) -> Option<Value> {
        self.rx.try_recv().ok()
    }
}
