//! Interior nodes and the tree root, grounded on
//! `components/DataModel/DataModelNode.cpp`, `DataModelRoot.cpp`, and
//! `DataModelElement.cpp`.
//!
//! Rather than the original's raw parent pointers, this uses
//! borrow-relation-only references with lifetime equal to the root's:
//! every [`Node`] and [`Leaf`] is owned by an `Arc` rooted at the tree's
//! root, which itself is held for the program's duration — no node is
//! ever destroyed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;

use super::leaf::{Leaf, LeafHandle};
use super::subscriber::Subscriber;
use super::topic::{is_multi_level_wildcard, is_valid_node_name, is_valid_topic_filter, LEVEL_SEPARATOR};

enum Child {
    Node(Arc<Node>),
    Leaf(LeafHandle),
}

impl Child {
    fn name(&self) -> &str {
        match self {
            Child::Node(n) => &n.name,
            Child::Leaf(l) => &l.name,
        }
    }
}

/// A named non-leaf node with an ordered child list. Adding a child to a
/// parent prepends it to the parent's child list, so topic enumeration
/// order is the reverse of construction order; this is implemented
/// literally (new children are inserted at index 0) so the observable
/// behavior matches the original exactly rather than just approximating
/// it.
pub struct Node {
    pub name: String,
    topic: String,
    children: AsyncMutex<Vec<Child>>,
    update_counter: Arc<AtomicU64>,
    subscription_lock: Arc<AsyncMutex<()>>,
}

impl Node {
    /// Construct the distinguished root node (no name, empty topic).
    pub fn new_root() -> Arc<Self> {
        Arc::new(Node {
            name: String::new(),
            topic: String::new(),
            children: AsyncMutex::new(Vec::new()),
            update_counter: Arc::new(AtomicU64::new(0)),
            subscription_lock: Arc::new(AsyncMutex::new(())),
        })
    }

    fn child_topic(&self, name: &str) -> String {
        if self.topic.is_empty() {
            name.to_string()
        } else {
            format!("{}{}{}", self.topic, LEVEL_SEPARATOR, name)
        }
    }

    /// Add an interior child node, returning a handle to it.
    pub async fn add_node(self: &Arc<Self>, name: &str) -> Arc<Node> {
        assert!(is_valid_node_name(name), "invalid data model node name: {name}");
        let child = Arc::new(Node {
            name: name.to_string(),
            topic: self.child_topic(name),
            children: AsyncMutex::new(Vec::new()),
            update_counter: Arc::clone(&self.update_counter),
            subscription_lock: Arc::clone(&self.subscription_lock),
        });
        self.children.lock().await.insert(0, Child::Node(Arc::clone(&child)));
        child
    }

    async fn add_leaf(self: &Arc<Self>, name: &str) -> LeafHandle {
        assert!(is_valid_node_name(name), "invalid data model leaf name: {name}");
        let leaf = Leaf::new(name, self.child_topic(name), Arc::clone(&self.update_counter));
        self.children.lock().await.insert(0, Child::Leaf(Arc::clone(&leaf)));
        leaf
    }

    pub async fn add_bool_leaf(self: &Arc<Self>, name: &str) -> LeafHandle {
        self.add_leaf(name).await
    }
    pub async fn add_u8_leaf(self: &Arc<Self>, name: &str) -> LeafHandle {
        self.add_leaf(name).await
    }
    pub async fn add_u16_leaf(self: &Arc<Self>, name: &str) -> LeafHandle {
        self.add_leaf(name).await
    }
    pub async fn add_u32_leaf(self: &Arc<Self>, name: &str) -> LeafHandle {
        self.add_leaf(name).await
    }
    pub async fn add_i16_leaf(self: &Arc<Self>, name: &str) -> LeafHandle {
        self.add_leaf(name).await
    }
    pub async fn add_tenths_leaf(self: &Arc<Self>, name: &str) -> LeafHandle {
        self.add_leaf(name).await
    }
    pub async fn add_hundredths_leaf(self: &Arc<Self>, name: &str) -> LeafHandle {
        self.add_leaf(name).await
    }
    pub async fn add_string_leaf(self: &Arc<Self>, name: &str, max_len: usize) -> LeafHandle {
        assert!(is_valid_node_name(name), "invalid data model leaf name: {name}");
        let leaf = Leaf::new_string(name, self.child_topic(name), Arc::clone(&self.update_counter), max_len);
        self.children.lock().await.insert(0, Child::Leaf(Arc::clone(&leaf)));
        leaf
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn update_count(&self) -> u64 {
        self.update_counter.load(Ordering::Relaxed)
    }

    /// Subscribe to every leaf under this subtree (used for `#` and the
    /// root's own `#`/$-exclusion logic), returning the number matched.
    async fn subscribe_all(&self, subscriber: &Arc<dyn Subscriber>, cookie: u32, exclude_dollar: bool) -> usize {
        let mut matched = 0;
        let children = self.children.lock().await;
        for child in children.iter() {
            if exclude_dollar && child.name().starts_with('$') {
                continue;
            }
            matched += match child {
                Child::Node(n) => Box::pin(n.subscribe_all(subscriber, cookie, false)).await,
                Child::Leaf(l) => {
                    l.subscribe(Arc::clone(subscriber), cookie).await;
                    1
                }
            };
        }
        matched
    }

    async fn subscribe_children(&self, levels: &[&str], subscriber: &Arc<dyn Subscriber>, cookie: u32, is_root: bool) -> usize {
        let first = levels[0];
        if first == "#" {
            return self.subscribe_all(subscriber, cookie, false).await;
        }
        let rest = &levels[1..];
        let is_single_wildcard = first == "+";

        let mut matched = 0;
        let children = self.children.lock().await;
        for child in children.iter() {
            if is_root && is_single_wildcard && child.name().starts_with('$') {
                continue;
            }
            let name_matches = is_single_wildcard || child.name() == first;
            if !name_matches {
                continue;
            }

            if rest.is_empty() {
                // Last level: only leaves can hold values.
                if let Child::Leaf(l) = child {
                    l.subscribe(Arc::clone(subscriber), cookie).await;
                    matched += 1;
                }
            } else if let Child::Node(n) = child {
                matched += Box::pin(n.subscribe_children(rest, subscriber, cookie, false)).await;
            }
        }
        matched
    }

    /// Walk the tree interpreting `topic_filter` level by level, per spec
    /// §4.2. Returns the count of matched leaves (`> 0` == success).
    pub async fn subscribe(self: &Arc<Self>, topic_filter: &str, subscriber: Arc<dyn Subscriber>, cookie: u32) -> usize {
        if !is_valid_topic_filter(topic_filter) {
            log::warn!("illegal topic filter '{topic_filter}'");
            return 0;
        }

        let _guard = self.subscription_lock.lock().await;

        let is_root = self.topic.is_empty();
        if is_multi_level_wildcard(topic_filter) {
            return self.subscribe_all(&subscriber, cookie, is_root).await;
        }

        let levels: Vec<&str> = topic_filter.split(LEVEL_SEPARATOR).collect();
        self.subscribe_children(&levels, &subscriber, cookie, is_root).await
    }

    async fn unsubscribe_all(&self, subscriber_id: u64) {
        let children = self.children.lock().await;
        for child in children.iter() {
            match child {
                Child::Node(n) => Box::pin(n.unsubscribe_all(subscriber_id)).await,
                Child::Leaf(l) => l.unsubscribe(subscriber_id).await,
            }
        }
    }

    async fn unsubscribe_children(&self, levels: &[&str], subscriber_id: u64) {
        let first = levels[0];
        if first == "#" {
            self.unsubscribe_all(subscriber_id).await;
            return;
        }
        let rest = &levels[1..];
        let is_single_wildcard = first == "+";

        let children = self.children.lock().await;
        for child in children.iter() {
            let name_matches = is_single_wildcard || child.name() == first;
            if !name_matches {
                continue;
            }
            if rest.is_empty() {
                if let Child::Leaf(l) = child {
                    l.unsubscribe(subscriber_id).await;
                }
            } else if let Child::Node(n) = child {
                Box::pin(n.unsubscribe_children(rest, subscriber_id)).await;
            }
        }
    }

    /// Mirror of [`Node::subscribe`]: removes all matching (subscriber, *)
    /// entries from matched leaves.
    pub async fn unsubscribe(self: &Arc<Self>, topic_filter: &str, subscriber_id: u64) {
        if !is_valid_topic_filter(topic_filter) {
            log::warn!("illegal topic filter '{topic_filter}' in unsubscribe");
            return;
        }

        let _guard = self.subscription_lock.lock().await;

        if is_multi_level_wildcard(topic_filter) {
            self.unsubscribe_all(subscriber_id).await;
            return;
        }

        let levels: Vec<&str> = topic_filter.split(LEVEL_SEPARATOR).collect();
        self.unsubscribe_children(&levels, subscriber_id).await;
    }

    pub async fn unsubscribe_everywhere(self: &Arc<Self>, subscriber_id: u64) {
        let _guard = self.subscription_lock.lock().await;
        self.unsubscribe_all(subscriber_id).await;
    }

    /// Child names in registration order (i.e. reverse of insertion, per
    /// the prepend rule above) — used by tests and by `$sys` dumps.
    pub async fn child_names(&self) -> Vec<String> {
        self.children.lock().await.iter().map(|c| c.name().to_string()).collect()
    }

    pub async fn find_leaf(self: &Arc<Self>, path: &[&str]) -> Option<LeafHandle> {
        if path.is_empty() {
            return None;
        }

        enum Found {
            Leaf(LeafHandle),
            Node(Arc<Node>),
        }

        let found = {
            let children = self.children.lock().await;
            children.iter().find(|c| c.name() == path[0]).map(|c| match c {
                Child::Leaf(l) => Found::Leaf(Arc::clone(l)),
                Child::Node(n) => Found::Node(Arc::clone(n)),
            })
        };

        match found {
            Some(Found::Leaf(l)) if path.len() == 1 => Some(l),
            Some(Found::Node(n)) if path.len() > 1 => Box::pin(n.find_leaf(&path[1..])).await,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datamodel::leaf::LeafExt;
    use std::sync::Mutex;

    struct TestSubscriber {
        id: u64,
        received: Mutex<Vec<(String, String, bool)>>,
    }

    #[async_trait::async_trait]
    impl Subscriber for TestSubscriber {
        fn subscriber_id(&self) -> u64 {
            self.id
        }
        fn name(&self) -> &str {
            "test"
        }
        async fn publish(&self, topic: &str, payload: &str, retained: bool) {
            self.received.lock().unwrap().push((topic.to_string(), payload.to_string(), retained));
        }
    }

    #[tokio::test]
    async fn construction_order_is_reversed_in_traversal() {
        let root = Node::new_root();
        root.add_node("a").await;
        root.add_node("b").await;
        root.add_node("c").await;
        assert_eq!(root.child_names().await, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn subscribe_delivers_retained_value_immediately() {
        let root = Node::new_root();
        let leaf = root.add_u32_leaf("count").await;
        leaf.set_u32(42).await;

        let sub = Arc::new(TestSubscriber { id: 1, received: Mutex::new(Vec::new()) });
        let sub_dyn: Arc<dyn Subscriber> = sub.clone();
        let matched = root.subscribe("count", sub_dyn, 0).await;
        assert_eq!(matched, 1);

        let received = sub.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0], ("count".to_string(), "42".to_string(), true));
    }

    #[tokio::test]
    async fn write_after_subscribe_is_not_retained() {
        let root = Node::new_root();
        let leaf = root.add_u32_leaf("count").await;

        let sub = Arc::new(TestSubscriber { id: 1, received: Mutex::new(Vec::new()) });
        let sub_dyn: Arc<dyn Subscriber> = sub.clone();
        root.subscribe("count", sub_dyn, 0).await;
        leaf.set_u32(7).await;

        let received = sub.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0], ("count".to_string(), "7".to_string(), false));
    }

    #[tokio::test]
    async fn writing_equal_value_sends_nothing() {
        let root = Node::new_root();
        let leaf = root.add_u32_leaf("count").await;
        leaf.set_u32(5).await;

        let sub = Arc::new(TestSubscriber { id: 1, received: Mutex::new(Vec::new()) });
        let sub_dyn: Arc<dyn Subscriber> = sub.clone();
        root.subscribe("count", sub_dyn, 0).await; // delivers retained 5
        leaf.set_u32(5).await; // no change

        let received = sub.received.lock().unwrap();
        assert_eq!(received.len(), 1); // just the retained delivery
    }

    #[tokio::test]
    async fn wildcard_subscriptions_match_children() {
        let root = Node::new_root();
        let gps = root.add_node("gps").await;
        let time = gps.add_u32_leaf("time").await;
        let lat = gps.add_u32_leaf("lat").await;
        time.set_u32(1).await;
        lat.set_u32(2).await;

        let sub = Arc::new(TestSubscriber { id: 9, received: Mutex::new(Vec::new()) });
        let sub_dyn: Arc<dyn Subscriber> = sub.clone();
        let matched = root.subscribe("gps/+", sub_dyn, 0).await;
        assert_eq!(matched, 2);
    }

    #[tokio::test]
    async fn dollar_prefixed_topics_excluded_from_wildcards() {
        let root = Node::new_root();
        let sys = root.add_node("$sys").await;
        let uptime = sys.add_u32_leaf("uptime").await;
        uptime.set_u32(1).await;

        let sub: Arc<dyn Subscriber> = Arc::new(TestSubscriber { id: 2, received: Mutex::new(Vec::new()) });
        let matched = root.subscribe("#", sub, 0).await;
        assert_eq!(matched, 0);
    }

    #[tokio::test]
    async fn unsubscribe_then_resubscribe_is_clean() {
        let root = Node::new_root();
        let leaf = root.add_u32_leaf("count").await;
        let sub: Arc<dyn Subscriber> = Arc::new(TestSubscriber { id: 3, received: Mutex::new(Vec::new()) });

        root.subscribe("count", Arc::clone(&sub), 0).await;
        assert_eq!(leaf.subscription_count().await, 1);
        root.unsubscribe("count", sub.subscriber_id()).await;
        assert_eq!(leaf.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn resubscribe_same_subscriber_replaces_cookie() {
        let root = Node::new_root();
        let leaf = root.add_u32_leaf("count").await;
        let sub: Arc<dyn Subscriber> = Arc::new(TestSubscriber { id: 4, received: Mutex::new(Vec::new()) });

        root.subscribe("count", Arc::clone(&sub), 1).await;
        root.subscribe("count", Arc::clone(&sub), 2).await;
        assert_eq!(leaf.subscription_count().await, 1);
    }

    #[tokio::test]
    async fn clear_is_a_change() {
        let root = Node::new_root();
        let leaf = root.add_u32_leaf("count").await;
        leaf.set_u32(5).await;
        assert!(leaf.has_value().await);
        let before = root.update_count();
        leaf.clear().await;
        assert!(!leaf.has_value().await);
        assert!(root.update_count() > before);
    }
}
