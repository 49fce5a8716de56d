//! Generic NMEA-to-NMEA bridge, grounded on `NMEABridge.cpp`:
//! a fixed set of three-letter message types read off a source, forwarded
//! verbatim to a destination.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use crate::datamodel::leaf::{LeafExt, LeafHandle};
use crate::datamodel::node::Node;
use crate::error::{LunaMonError, Result};
use crate::nmea0183::source::LineHandler;
use crate::nmea0183::tag::Talker;
use crate::stats::{StatCounter, StatsHolder};

use super::BridgeTarget;

/// Forwards lines of configured message types from a source to a
/// destination, counting bridged/dropped rather than ever blocking the
/// source's dispatch.
pub struct NmeaBridge {
    name: String,
    message_types: HashSet<String>,
    destination: Arc<dyn BridgeTarget>,

    bridged_messages: AsyncMutex<StatCounter>,
    bridged_messages_leaf: LeafHandle,
    bridged_message_rate_leaf: LeafHandle,
    dropped_messages: AsyncMutex<u32>,
    dropped_messages_leaf: LeafHandle,
}

impl NmeaBridge {
    /// Parses a comma-separated message-type list. An empty element is a
    /// fatal configuration error at startup (an unparseable bridge can
    /// never do anything useful); a duplicate is only a warning, matching
    /// `NMEABridge`'s own `buildBridgedMessageSet`.
    pub async fn new(
        name: &str,
        message_type_list: &[String],
        destination: Arc<dyn BridgeTarget>,
        sys_node: &Arc<Node>,
    ) -> Result<Arc<Self>> {
        let mut message_types = HashSet::new();
        for msg_type in message_type_list {
            if msg_type.is_empty() {
                return Err(LunaMonError::Configuration(format!(
                    "empty NMEA message type in bridge '{name}' list"
                )));
            }
            if !message_types.insert(msg_type.clone()) {
                log::warn!("duplicate NMEA message type '{msg_type}' in bridge '{name}' list");
            }
        }

        let node = sys_node.add_node(name).await;
        Ok(Arc::new(NmeaBridge {
            name: name.to_string(),
            message_types,
            destination,
            bridged_messages: AsyncMutex::new(StatCounter::new()),
            bridged_messages_leaf: node.add_u32_leaf("bridged").await,
            bridged_message_rate_leaf: node.add_u32_leaf("bridgedRate").await,
            dropped_messages: AsyncMutex::new(0),
            dropped_messages_leaf: node.add_u32_leaf("dropped").await,
        }))
    }
}

#[async_trait]
impl LineHandler for NmeaBridge {
    async fn handle_line(&self, _talker: &Talker, msg_type: &str, body: &str, _fields: &[&str]) {
        if !self.message_types.contains(msg_type) {
            return;
        }

        if self.destination.forward(body).await {
            self.bridged_messages.lock().await.increment();
            log::debug!("bridged NMEA {msg_type} message to {}", self.destination.target_name());
        } else {
            *self.dropped_messages.lock().await += 1;
            log::debug!(
                "dropped NMEA {msg_type} message due to full output interface {}",
                self.destination.target_name()
            );
        }
    }
}

#[async_trait]
impl StatsHolder for NmeaBridge {
    async fn export_stats(&self, ms_elapsed: u32) {
        self.bridged_messages
            .lock()
            .await
            .update(&self.bridged_messages_leaf, &self.bridged_message_rate_leaf, ms_elapsed)
            .await;
        let dropped = *self.dropped_messages.lock().await;
        self.dropped_messages_leaf.set_u32(dropped).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingTarget {
        accept: bool,
    }

    #[async_trait]
    impl BridgeTarget for RecordingTarget {
        fn target_name(&self) -> String {
            "test".to_string()
        }

        async fn forward(&self, _body: &str) -> bool {
            self.accept
        }
    }

    #[tokio::test]
    async fn unconfigured_message_type_is_ignored() {
        let root = Node::new_root();
        let destination = Arc::new(RecordingTarget { accept: true });
        let bridge = NmeaBridge::new("testBridge", &["GGA".to_string()], destination, &root).await.unwrap();

        let talker = Talker::from_str("GP").unwrap();
        bridge.handle_line(&talker, "RMC", "GPRMC,", &[]).await;

        assert_eq!(bridge.bridged_messages.lock().await.count(), 0);
    }

    #[tokio::test]
    async fn configured_message_type_is_bridged() {
        let root = Node::new_root();
        let destination = Arc::new(RecordingTarget { accept: true });
        let bridge = NmeaBridge::new("testBridge", &["GGA".to_string()], destination, &root).await.unwrap();

        let talker = Talker::from_str("GP").unwrap();
        bridge.handle_line(&talker, "GGA", "GPGGA,", &[]).await;

        assert_eq!(bridge.bridged_messages.lock().await.count(), 1);
    }

    #[tokio::test]
    async fn a_refused_send_counts_as_dropped() {
        let root = Node::new_root();
        let destination = Arc::new(RecordingTarget { accept: false });
        let bridge = NmeaBridge::new("testBridge", &["GGA".to_string()], destination, &root).await.unwrap();

        let talker = Talker::from_str("GP").unwrap();
        bridge.handle_line(&talker, "GGA", "GPGGA,", &[]).await;

        assert_eq!(*bridge.dropped_messages.lock().await, 1);
    }

    #[tokio::test]
    async fn an_empty_message_type_is_rejected() {
        let root = Node::new_root();
        let destination = Arc::new(RecordingTarget { accept: true });
        let result = NmeaBridge::new("testBridge", &["".to_string()], destination, &root).await;
        assert!(result.is_err());
    }
}
