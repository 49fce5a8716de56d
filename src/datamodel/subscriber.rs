//! The subscriber capability a leaf publishes through.

use async_trait::async_trait;

/// Anything that can receive retained and live publishes from the data
/// model. Implementations (the embedded MQTT broker's per-client state,
/// a bridge) must make `publish` non-blocking: individual subscriber
/// `publish` calls must never block the caller.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// A stable identity used to dedup (subscriber, cookie) pairs:
    /// "subscribing twice with equal subscriber replaces the prior cookie."
    fn subscriber_id(&self) -> u64;

    fn name(&self) -> &str;

    async fn publish(&self, topic: &str, payload: &str, retained: bool);
}

#[derive(Clone)]
pub struct Subscription {
    pub subscriber: std::sync::Arc<dyn Subscriber>,
    pub cookie: u32,
}
