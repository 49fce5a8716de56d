//! WiFi (TCP client) interface: connects to
//! a configured `ipv4:port`, reconnects after a 1s delay on any read
//! failure, and exports connection state as a boolean leaf, grounded on
//! `WiFiInterface.cpp`. "WiFi" here is the original's name for the
//! transport, not a literal requirement — any reachable TCP source
//! qualifies.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::datamodel::leaf::{LeafExt, LeafHandle};
use crate::datamodel::node::Node;
use crate::error::{LunaMonError, Result};
use crate::stats::StatsHolder;

use super::{InterfaceBase, RxSink};

const RECONNECT_DELAY: Duration = Duration::from_millis(1000);
const READ_BUFFER_SIZE: usize = 512;

pub struct WiFiInterface {
    base: InterfaceBase,
    address: String,
    port: u16,
    state_leaf: LeafHandle,
}

impl WiFiInterface {
    pub async fn new(name: &str, address: &str, port: u16, sys_node: &Arc<Node>) -> (Arc<Self>, mpsc::Receiver<Vec<u8>>) {
        let (base, rx) = InterfaceBase::new(name, sys_node).await;
        let state_leaf = base.interface_node().add_bool_leaf("state").await;
        state_leaf.set_bool(false).await;
        (Arc::new(WiFiInterface { base, address: address.to_string(), port, state_leaf }), rx)
    }

    pub fn base(&self) -> &InterfaceBase {
        &self.base
    }

    pub fn name(&self) -> &str {
        self.base.name()
    }

    /// Runs forever: connect, read until failure, mark disconnected,
    /// delay, reconnect. A bad address is a configuration error and is
    /// fatal immediately rather than looping forever against a socket
    /// that can never connect.
    pub async fn run(self: Arc<Self>, mut tx_queue: mpsc::Receiver<Vec<u8>>, sink: Arc<dyn RxSink>) -> Result<()> {
        let write_half = AsyncMutex::new(None::<tokio::net::tcp::OwnedWriteHalf>);
        let write_half = Arc::new(write_half);

        {
            let write_half = Arc::clone(&write_half);
            tokio::spawn(async move {
                while let Some(bytes) = tx_queue.recv().await {
                    let mut guard = write_half.lock().await;
                    if let Some(writer) = guard.as_mut() {
                        if let Err(e) = writer.write_all(&bytes).await {
                            log::warn!("WiFi source write failed: {e}");
                        }
                    }
                }
            });
        }

        loop {
            let stream = match TcpStream::connect((self.address.as_str(), self.port)).await {
                Ok(stream) => stream,
                Err(e) => {
                    log::warn!("failed to connect to WiFi NMEA source {}:{}: {e}", self.address, self.port);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            };
            log::debug!("connected to NMEA source {}:{}", self.address, self.port);
            self.state_leaf.set_bool(true).await;

            let (mut read_half, write_half_new) = stream.into_split();
            *write_half.lock().await = Some(write_half_new);

            let mut buffer = vec![0u8; READ_BUFFER_SIZE];
            loop {
                match read_half.read(&mut buffer).await {
                    Ok(0) => {
                        log::warn!("WiFi source connection closed");
                        break;
                    }
                    Ok(n) => {
                        self.base.note_received(n as u32).await;
                        for &byte in &buffer[..n] {
                            sink.feed_byte(byte).await;
                        }
                    }
                    Err(e) => {
                        log::warn!("WiFi source read failed: {e}");
                        break;
                    }
                }
            }

            self.state_leaf.set_bool(false).await;
            *write_half.lock().await = None;
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }
}

#[async_trait]
impl StatsHolder for WiFiInterface {
    async fn export_stats(&self, ms_elapsed: u32) {
        self.base.export_base_stats(ms_elapsed).await;
    }
}

/// Surfaces a bad address at startup rather than looping on a socket
/// that can never connect: an invalid configuration value is a fatal
/// startup error for the WiFi interface's address field.
pub fn validate_address(address: &str) -> Result<()> {
    address
        .parse::<std::net::Ipv4Addr>()
        .map(|_| ())
        .map_err(|_| LunaMonError::Configuration(format!("bad WiFi source IPv4 address '{address}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_a_malformed_address() {
        assert!(validate_address("not-an-ip").is_err());
        assert!(validate_address("10.0.0.5").is_ok());
    }
}
