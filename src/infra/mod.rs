//! Infrastructure adapters: side cache and event bus backends.

pub mod cache;
pub mod pubsub;

pub use cache::{Cache, InMemoryCache};
pub use pubsub::{InMemoryPubSub, PubSub, Subscription};
