//! Stats/telemetry plumbing, grounded on
//! `components/StatsManager/StatsManager.cpp`, `StatsHolder.h` and
//! `StatCounter.h`.
//!
//! A [`StatsHolder`] is any component that wants its counters harvested
//! periodically into the data model. The manager owns the list and the
//! timer; holders own their own [`StatCounter`]s and leaves.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::datamodel::leaf::{LeafExt, LeafHandle};

/// A monotonically increasing counter that exports a raw count and a
/// samples-per-second rate. Wraps modulo 2^32 exactly as the original's
/// unsigned subtraction does.
#[derive(Debug, Default)]
pub struct StatCounter {
    count: u32,
    last_interval_count: u32,
}

impl StatCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self) {
        self.count = self.count.wrapping_add(1);
    }

    pub fn increment_by(&mut self, addition: u32) {
        self.count = self.count.wrapping_add(addition);
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Overwrite the raw count directly, for counters whose source of
    /// truth lives elsewhere (e.g. the data model's own update counter)
    /// rather than being incremented through this type.
    pub fn sync_count(&mut self, count: u32) {
        self.count = count;
    }

    /// Write the current count to `count_leaf` and the rate
    /// `(count - previous_count) * 1000 / ms_elapsed` (truncated) to
    /// `rate_leaf`. `ms_elapsed` of zero yields a rate of zero rather than
    /// dividing by zero (the original guards the same case implicitly via
    /// the stats manager never ticking at 0ms).
    pub async fn update(&mut self, count_leaf: &LeafHandle, rate_leaf: &LeafHandle, ms_elapsed: u32) {
        let delta = self.count.wrapping_sub(self.last_interval_count);
        self.last_interval_count = self.count;

        count_leaf.set_u32(self.count).await;

        let rate = if ms_elapsed == 0 {
            0
        } else {
            (delta as u64 * 1000 / ms_elapsed as u64) as u32
        };
        rate_leaf.set_u32(rate).await;
    }
}

/// Implemented by any component that registers with the [`StatsManager`].
#[async_trait::async_trait]
pub trait StatsHolder: Send + Sync {
    /// Called once per stats tick with the actual elapsed wall-clock time
    /// since the previous tick, not the nominal period.
    async fn export_stats(&self, ms_elapsed: u32);
}

/// Runs the fixed-period (default 10s) harvest loop across all registered
/// holders, grounded on `StatsManager.cpp`'s `task()` loop.
pub struct StatsManager {
    holders: Mutex<Vec<Arc<dyn StatsHolder>>>,
    period: Duration,
}

impl StatsManager {
    pub fn new(period: Duration) -> Self {
        StatsManager { holders: Mutex::new(Vec::new()), period }
    }

    pub async fn add_stats_holder(&self, holder: Arc<dyn StatsHolder>) {
        self.holders.lock().await.push(holder);
    }

    /// Runs forever, tick-driven. Intended to be spawned as its own task.
    pub async fn run(self: Arc<Self>) {
        let mut last_harvest = Instant::now();
        loop {
            tokio::time::sleep(self.period).await;

            let now = Instant::now();
            let elapsed = now.duration_since(last_harvest).as_millis() as u32;
            last_harvest = now;

            log::debug!("Harvesting stats with elapsed time {elapsed}ms");

            let holders = self.holders.lock().await.clone();
            for holder in holders {
                holder.export_stats(elapsed).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datamodel::node::Node;

    #[tokio::test]
    async fn counter_exposes_rate() {
        let root = Node::new_root();
        let count_leaf = root.add_u32_leaf("count").await;
        let rate_leaf = root.add_u32_leaf("rate").await;

        let mut counter = StatCounter::new();
        for _ in 0..100 {
            counter.increment();
        }
        counter.update(&count_leaf, &rate_leaf, 1000).await;

        assert_eq!(count_leaf.get_u32().await, Some(100));
        assert_eq!(rate_leaf.get_u32().await, Some(100));
    }

    #[tokio::test]
    async fn counter_wraps_modulo_2_32() {
        let root = Node::new_root();
        let count_leaf = root.add_u32_leaf("count").await;
        let rate_leaf = root.add_u32_leaf("rate").await;

        let mut counter = StatCounter { count: u32::MAX - 2, last_interval_count: u32::MAX - 2 };
        counter.increment();
        counter.increment();
        counter.increment();
        counter.increment();
        // count wrapped from MAX-2 by +4: MAX-2, MAX-1, MAX, 0, 1 => delta of 4
        counter.update(&count_leaf, &rate_leaf, 1000).await;
        assert_eq!(rate_leaf.get_u32().await, Some(4));
    }
}
