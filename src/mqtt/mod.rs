//! Embedded MQTT broker: observes the data model and forwards
//! changes to subscribed remote clients. Strictly one-directional —
//! clients may only SUBSCRIBE/UNSUBSCRIBE, never PUBLISH into the data
//! model — so the inbound packet surface is limited to CONNECT/SUBSCRIBE/
//! UNSUBSCRIBE/PINGREQ/DISCONNECT. Grounded on `MQTTUtil.cpp`'s wire
//! primitives and on [`crate::interface::nmea_server::NmeaServer`]'s
//! accept-loop/per-client-task shape, since no full MQTT broker source
//! survived retrieval.

pub mod client;
pub mod codec;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::Mutex as AsyncMutex;

use crate::datamodel::leaf::{LeafExt, LeafHandle};
use crate::datamodel::node::Node;
use crate::error::{LunaMonError, Result};
use crate::stats::StatsHolder;

/// Binds a port and accepts MQTT clients forever, spawning one task per
/// connection. Each connection owns its own `Subscriber` registration
/// against the data model's root node, torn down on disconnect.
pub struct MqttBroker {
    port: u16,
    root: Arc<Node>,
    next_client_id: AtomicU64,

    connects: AsyncMutex<u32>,
    connects_leaf: LeafHandle,
    disconnects: AsyncMutex<u32>,
    disconnects_leaf: LeafHandle,
    connect_failures: AsyncMutex<u32>,
    connect_failures_leaf: LeafHandle,
    active_clients: AsyncMutex<u32>,
    active_clients_leaf: LeafHandle,
}

impl MqttBroker {
    pub async fn new(port: u16, root: Arc<Node>, sys_node: &Arc<Node>) -> Arc<Self> {
        let node = sys_node.add_node("mqttBroker").await;
        Arc::new(MqttBroker {
            port,
            root,
            next_client_id: AtomicU64::new(1),
            connects: AsyncMutex::new(0),
            connects_leaf: node.add_u32_leaf("connects").await,
            disconnects: AsyncMutex::new(0),
            disconnects_leaf: node.add_u32_leaf("disconnects").await,
            connect_failures: AsyncMutex::new(0),
            connect_failures_leaf: node.add_u32_leaf("connectFailures").await,
            active_clients: AsyncMutex::new(0),
            active_clients_leaf: node.add_u32_leaf("activeClients").await,
        })
    }

    /// Binds and accepts connections forever. A bind failure is a
    /// hardware/runtime error and is fatal, matching
    /// `NmeaServer::run`'s treatment of its own listener.
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.port))
            .await
            .map_err(|e| LunaMonError::Hardware(format!("binding MQTT broker port {}: {e}", self.port)))?;
        log::info!("MQTT broker listening on port {}", self.port);

        loop {
            match listener.accept().await {
                Ok((socket, addr)) => {
                    let broker = Arc::clone(self);
                    let id = broker.next_client_id.fetch_add(1, Ordering::Relaxed);
                    *broker.connects.lock().await += 1;
                    *broker.active_clients.lock().await += 1;
                    log::info!("accepted MQTT client connection from {addr}");

                    let root = Arc::clone(&broker.root);
                    tokio::spawn(async move {
                        if let Err(e) = client::run(socket, id, root).await {
                            log::warn!("MQTT client {addr} session ended with error: {e}");
                        }
                        *broker.active_clients.lock().await -= 1;
                        *broker.disconnects.lock().await += 1;
                    });
                }
                Err(e) => {
                    log::warn!("unable to accept MQTT client connection: {e}");
                    *self.connect_failures.lock().await += 1;
                }
            }
        }
    }
}

#[async_trait]
impl StatsHolder for MqttBroker {
    async fn export_stats(&self, _ms_elapsed: u32) {
        let connects = *self.connects.lock().await;
        self.connects_leaf.set_u32(connects).await;
        let disconnects = *self.disconnects.lock().await;
        self.disconnects_leaf.set_u32(disconnects).await;
        let connect_failures = *self.connect_failures.lock().await;
        self.connect_failures_leaf.set_u32(connect_failures).await;
        let active_clients = *self.active_clients.lock().await;
        self.active_clients_leaf.set_u32(active_clients).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_broker_starts_with_zeroed_stats() {
        let root = Node::new_root();
        let broker = MqttBroker::new(1883, Arc::clone(&root), &root).await;
        assert_eq!(*broker.connects.lock().await, 0);
        assert_eq!(*broker.active_clients.lock().await, 0);
    }
}
