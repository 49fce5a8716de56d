//! Interface abstraction: a stable name, a protocol tag, a
//! mode, a read-loop task, a queue-backed `send`/`send_message` pair
//! serialized through a single drain task, and the received-bytes stats
//! every interface carries, grounded on `components/Interface/Interface.cpp`.
//!
//! Four physical variants implement the contract: [`uart::UartInterface`]
//! (hardware UART), [`softuart::SoftUartInterface`] (the pulse-timer path
//! of [`crate::softuart`], required for SeaTalk), [`wifi::WiFiInterface`]
//! (TCP client with reconnect), and [`nmea_server::NmeaServer`] (TCP
//! listener fanning out to multiple clients, which the original does not
//! model as an `Interface` subclass either).

pub mod nmea_server;
pub mod softuart;
pub mod uart;
pub mod wifi;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Mutex as AsyncMutex;

use crate::datamodel::leaf::{LeafExt, LeafHandle};
use crate::datamodel::node::Node;
use crate::nmea0183::source::NmeaLineSource;
use crate::stats::{StatCounter, StatsHolder};

/// Depth of an interface's outgoing queue before `send_message(blocking:
/// false)` starts refusing sends: there is no unbounded queue, so a
/// stuck client eventually sheds load instead of consuming memory.
const TX_QUEUE_DEPTH: usize = 32;

/// Implemented by whatever a physical interface's read loop should hand
/// received bytes to: an [`NmeaLineSource`] for the NMEA and $STALK
/// protocols, or (for raw SeaTalk) the soft-UART character builder
/// feeding [`crate::seatalk::SeaTalkInterface`] directly, bypassing this
/// trait entirely since that path carries a 9th command-marker bit a
/// plain byte can't.
#[async_trait]
pub trait RxSink: Send + Sync {
    async fn feed_byte(&self, byte: u8);
}

/// Adapts an [`NmeaLineSource`] to [`RxSink`] for UART and WiFi
/// interfaces carrying NMEA 0183 or $STALK-wrapped traffic.
pub struct NmeaRxSink(pub Arc<NmeaLineSource>);

#[async_trait]
impl RxSink for NmeaRxSink {
    async fn feed_byte(&self, byte: u8) {
        self.0.feed(byte).await;
    }
}

/// Common plumbing shared by every physical interface variant: the
/// `receivedBytes`/`receivedByteRate` stats pair of `Interface.cpp`,
/// generalized with a bounded outgoing queue and a single drain task so
/// `send`/`send_message` are serialized without an explicit lock (the
/// original's `takeWriteLock`/`releaseWriteLock` around a direct write).
pub struct InterfaceBase {
    name: String,
    interface_node: Arc<Node>,
    received_bytes: AsyncMutex<StatCounter>,
    received_bytes_leaf: LeafHandle,
    received_byte_rate_leaf: LeafHandle,
    dropped_messages: AsyncMutex<u32>,
    dropped_messages_leaf: LeafHandle,
    tx: mpsc::Sender<Vec<u8>>,
}

impl InterfaceBase {
    pub async fn new(name: &str, sys_node: &Arc<Node>) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let interface_node = sys_node.add_node(name).await;
        let (tx, rx) = mpsc::channel(TX_QUEUE_DEPTH);

        let base = InterfaceBase {
            name: name.to_string(),
            received_bytes: AsyncMutex::new(StatCounter::new()),
            received_bytes_leaf: interface_node.add_u32_leaf("receivedBytes").await,
            received_byte_rate_leaf: interface_node.add_u32_leaf("receivedByteRate").await,
            dropped_messages: AsyncMutex::new(0),
            dropped_messages_leaf: interface_node.add_u32_leaf("droppedMessages").await,
            tx,
            interface_node,
        };
        (base, rx)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interface_node(&self) -> &Arc<Node> {
        &self.interface_node
    }

    pub async fn note_received(&self, n: u32) {
        self.received_bytes.lock().await.increment_by(n);
    }

    /// `send_message(bytes, length, blocking) -> bool`: a
    /// blocking send waits for queue space (mirroring the original's
    /// direct, always-eventually-successful write); a non-blocking send
    /// refuses and counts a drop when the queue is full.
    pub async fn send_message(&self, bytes: &[u8], blocking: bool) -> bool {
        if blocking {
            self.tx.send(bytes.to_vec()).await.is_ok()
        } else {
            match self.tx.try_send(bytes.to_vec()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    *self.dropped_messages.lock().await += 1;
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            }
        }
    }

    /// `send(bytes, length) -> count_sent`: a blocking send
    /// that reports how many bytes were accepted.
    pub async fn send(&self, bytes: &[u8]) -> usize {
        if self.send_message(bytes, true).await {
            bytes.len()
        } else {
            0
        }
    }

    pub async fn export_base_stats(&self, ms_elapsed: u32) {
        self.received_bytes
            .lock()
            .await
            .update(&self.received_bytes_leaf, &self.received_byte_rate_leaf, ms_elapsed)
            .await;
        let dropped = *self.dropped_messages.lock().await;
        self.dropped_messages_leaf.set_u32(dropped).await;
    }
}

#[async_trait]
impl StatsHolder for InterfaceBase {
    async fn export_stats(&self, ms_elapsed: u32) {
        self.export_base_stats(ms_elapsed).await;
    }
}
