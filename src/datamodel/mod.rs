//! The hierarchical observable data model.

pub mod leaf;
pub mod node;
pub mod subscriber;
pub mod topic;

use std::sync::Arc;

use crate::stats::{StatCounter, StatsHolder, StatsManager};

use leaf::{LeafExt, LeafHandle};
use node::Node;

/// Owns the tree root plus the `/$sys/...` namespace, grounded on
/// `components/DataModel/include/DataModel.h`.
pub struct DataModel {
    root: Arc<Node>,
    sys: Arc<Node>,
    subscriptions_count_leaf: LeafHandle,
    retained_count_leaf: LeafHandle,
    updates_leaf: LeafHandle,
    update_rate_leaf: LeafHandle,
    updates_counter: tokio::sync::Mutex<StatCounter>,
}

impl DataModel {
    pub async fn new() -> Arc<Self> {
        let root = Node::new_root();
        let sys = root.add_node("$sys").await;
        let broker = sys.add_node("broker").await;
        let subscriptions = broker.add_node("subscriptions").await;
        let subscriptions_count_leaf = subscriptions.add_u32_leaf("count").await;
        let messages = broker.add_node("messages").await;
        let retained = messages.add_node("retained").await;
        let retained_count_leaf = retained.add_u32_leaf("count").await;
        let data_model_node = sys.add_node("dataModel").await;
        let updates_leaf = data_model_node.add_u32_leaf("updates").await;
        let update_rate_leaf = data_model_node.add_u32_leaf("updateRate").await;

        Arc::new(DataModel {
            root,
            sys,
            subscriptions_count_leaf,
            retained_count_leaf,
            updates_leaf,
            update_rate_leaf,
            updates_counter: tokio::sync::Mutex::new(StatCounter::new()),
        })
    }

    pub fn root(&self) -> &Arc<Node> {
        &self.root
    }

    pub fn sys_node(&self) -> &Arc<Node> {
        &self.sys
    }

}

#[async_trait::async_trait]
impl StatsHolder for DataModel {
    async fn export_stats(&self, ms_elapsed: u32) {
        let mut counter = self.updates_counter.lock().await;
        counter.sync_count(self.root.update_count() as u32);
        counter.update(&self.updates_leaf, &self.update_rate_leaf, ms_elapsed).await;
        self.subscriptions_count_leaf.set_u32(0).await;
        self.retained_count_leaf.set_u32(0).await;
    }
}

/// Convenience for wiring: register the data model itself with the stats
/// manager, so data model updates flow into `$sys/dataModel/*`.
pub async fn register(data_model: Arc<DataModel>, stats_manager: &Arc<StatsManager>) {
    stats_manager.add_stats_holder(data_model).await;
}
