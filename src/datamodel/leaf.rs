//! Leaf values, grounded on
//! `components/DataModel/DataModelElement.cpp` and the per-kind
//! `DataModelUInt32Leaf`/`DataModelHundredthsInt16Leaf` etc. siblings,
//! collapsed here into a single tagged-union value rather than a family
//! of per-kind leaf types.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;

use crate::fixed_point::{FixedPoint, HundredthsScale, TenthsScale};

use super::subscriber::{Subscriber, Subscription};

/// The kinds of value a leaf may hold.
#[derive(Debug, Clone, PartialEq)]
pub enum LeafValue {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    I16(i16),
    TenthsI16(FixedPoint<TenthsScale>),
    TenthsU32(FixedPoint<TenthsScale>),
    HundredthsU8(FixedPoint<HundredthsScale>),
    HundredthsI16(FixedPoint<HundredthsScale>),
    HundredthsU32(FixedPoint<HundredthsScale>),
    Str(String),
}

impl LeafValue {
    /// The wire/native string representation used for retained-value
    /// delivery and MQTT payloads.
    pub fn format(&self) -> String {
        match self {
            LeafValue::Bool(b) => if *b { "true".to_string() } else { "false".to_string() },
            LeafValue::U8(v) => v.to_string(),
            LeafValue::U16(v) => v.to_string(),
            LeafValue::U32(v) => v.to_string(),
            LeafValue::I16(v) => v.to_string(),
            LeafValue::TenthsI16(v) | LeafValue::TenthsU32(v) => v.format(),
            LeafValue::HundredthsU8(v) | LeafValue::HundredthsI16(v) | LeafValue::HundredthsU32(v) => v.format(),
            LeafValue::Str(s) => s.clone(),
        }
    }
}

/// Global counter allocator for leaf identity, so `Arc<Leaf>` and its
/// `LeafHandle` wrapper can be compared/hashed without relying on pointer
/// casts.
static NEXT_LEAF_ID: AtomicU64 = AtomicU64::new(1);

struct LeafState {
    value: Option<LeafValue>,
    subscriptions: Vec<Subscription>,
}

/// A named node holding at most one value of a declared kind.
///
/// The tree's cyclic parent/child references are avoided by precomputing
/// the leaf's full topic string at construction time instead of walking
/// parent pointers on every publish, which is sufficient since the tree
/// is append-only for the life of the process.
pub struct Leaf {
    id: u64,
    pub name: String,
    pub topic: String,
    pub max_string_len: Option<usize>,
    state: AsyncMutex<LeafState>,
    has_subscribers: AtomicBool,
    update_counter: Arc<AtomicU64>,
}

/// A cheap, cloneable handle to a leaf, used pervasively by components that
/// need to write into the data model from many call sites.
pub type LeafHandle = Arc<Leaf>;

impl Leaf {
    pub(crate) fn new(name: &str, topic: String, update_counter: Arc<AtomicU64>) -> Arc<Self> {
        Arc::new(Leaf {
            id: NEXT_LEAF_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            topic,
            max_string_len: None,
            state: AsyncMutex::new(LeafState { value: None, subscriptions: Vec::new() }),
            has_subscribers: AtomicBool::new(false),
            update_counter,
        })
    }

    pub(crate) fn new_string(name: &str, topic: String, update_counter: Arc<AtomicU64>, max_len: usize) -> Arc<Self> {
        Arc::new(Leaf {
            id: NEXT_LEAF_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            topic,
            max_string_len: Some(max_len),
            state: AsyncMutex::new(LeafState { value: None, subscriptions: Vec::new() }),
            has_subscribers: AtomicBool::new(false),
            update_counter,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Assign a new value: if the leaf currently has no value, or the new
    /// value compares unequal to the current one, update in place, mark
    /// present, bump the global update counter, and dispatch to
    /// subscribers. Spec §4.2 "Write".
    pub async fn set(&self, value: LeafValue) {
        let value = match (&value, self.max_string_len) {
            (LeafValue::Str(s), Some(max)) if s.chars().count() > max => {
                log::warn!("truncating string leaf {} to {} chars", self.topic, max);
                LeafValue::Str(s.chars().take(max).collect())
            }
            _ => value,
        };

        let changed = {
            let mut state = self.state.lock().await;
            let changed = match &state.value {
                None => true,
                Some(existing) => existing != &value,
            };
            if changed {
                state.value = Some(value);
            }
            changed
        };

        if changed {
            self.update_counter.fetch_add(1, Ordering::Relaxed);
            self.dispatch_publish(false).await;
        }
    }

    /// Clear the value. This is itself a change.
    pub async fn clear(&self) {
        let had_value = {
            let mut state = self.state.lock().await;
            let had_value = state.value.is_some();
            state.value = None;
            had_value
        };
        if had_value {
            self.update_counter.fetch_add(1, Ordering::Relaxed);
            self.dispatch_publish(false).await;
        }
    }

    async fn dispatch_publish(&self, retained: bool) {
        if !self.has_subscribers.load(Ordering::Relaxed) {
            return;
        }

        let (payload, subs) = {
            let state = self.state.lock().await;
            let payload = state.value.as_ref().map(|v| v.format());
            (payload, state.subscriptions.clone())
        };

        let Some(payload) = payload else { return };
        for sub in subs {
            sub.subscriber.publish(&self.topic, &payload, retained).await;
        }
    }

    /// Add or replace a (subscriber, cookie) pair. Delivers the retained
    /// value immediately if present.
    pub async fn subscribe(&self, subscriber: Arc<dyn Subscriber>, cookie: u32) {
        let retained_payload = {
            let mut state = self.state.lock().await;
            if let Some(existing) = state.subscriptions.iter_mut().find(|s| s.subscriber.subscriber_id() == subscriber.subscriber_id()) {
                existing.cookie = cookie;
            } else {
                state.subscriptions.push(Subscription { subscriber: Arc::clone(&subscriber), cookie });
            }
            self.has_subscribers.store(true, Ordering::Relaxed);
            state.value.as_ref().map(|v| v.format())
        };

        if let Some(payload) = retained_payload {
            subscriber.publish(&self.topic, &payload, true).await;
        }
    }

    pub async fn unsubscribe(&self, subscriber_id: u64) {
        let mut state = self.state.lock().await;
        state.subscriptions.retain(|s| s.subscriber.subscriber_id() != subscriber_id);
        if state.subscriptions.is_empty() {
            self.has_subscribers.store(false, Ordering::Relaxed);
        }
    }

    pub async fn subscription_count(&self) -> usize {
        self.state.lock().await.subscriptions.len()
    }

    pub async fn has_value(&self) -> bool {
        self.state.lock().await.value.is_some()
    }

    pub async fn value(&self) -> Option<LeafValue> {
        self.state.lock().await.value.clone()
    }

    pub async fn format(&self) -> Option<String> {
        self.state.lock().await.value.as_ref().map(|v| v.format())
    }
}

/// Typed convenience setters/getters used pervasively by decoders; kept as
/// inherent methods on the `Arc<Leaf>` alias via a small extension trait so
/// call sites read `leaf.set_u32(3).await` rather than constructing
/// `LeafValue` variants by hand everywhere.
#[async_trait::async_trait]
pub trait LeafExt {
    async fn set_bool(&self, v: bool);
    async fn set_u8(&self, v: u8);
    async fn set_u16(&self, v: u16);
    async fn set_u32(&self, v: u32);
    async fn set_i16(&self, v: i16);
    async fn set_tenths(&self, v: FixedPoint<TenthsScale>);
    async fn set_hundredths(&self, v: FixedPoint<HundredthsScale>);
    async fn set_string(&self, v: String);
    async fn get_u32(&self) -> Option<u32>;
    async fn get_string(&self) -> Option<String>;
}

#[async_trait::async_trait]
impl LeafExt for LeafHandle {
    async fn set_bool(&self, v: bool) {
        self.set(LeafValue::Bool(v)).await;
    }
    async fn set_u8(&self, v: u8) {
        self.set(LeafValue::U8(v)).await;
    }
    async fn set_u16(&self, v: u16) {
        self.set(LeafValue::U16(v)).await;
    }
    async fn set_u32(&self, v: u32) {
        self.set(LeafValue::U32(v)).await;
    }
    async fn set_i16(&self, v: i16) {
        self.set(LeafValue::I16(v)).await;
    }
    async fn set_tenths(&self, v: FixedPoint<TenthsScale>) {
        self.set(LeafValue::TenthsI16(v)).await;
    }
    async fn set_hundredths(&self, v: FixedPoint<HundredthsScale>) {
        self.set(LeafValue::HundredthsI16(v)).await;
    }
    async fn set_string(&self, v: String) {
        self.set(LeafValue::Str(v)).await;
    }
    async fn get_u32(&self) -> Option<u32> {
        match self.value().await {
            Some(LeafValue::U32(v)) => Some(v),
            _ => None,
        }
    }
    async fn get_string(&self) -> Option<String> {
        match self.value().await {
            Some(LeafValue::Str(v)) => Some(v),
            _ => None,
        }
    }
}
