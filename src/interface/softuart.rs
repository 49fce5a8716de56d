//! Soft-UART interface: adapts the
//! pulse-timer character builder/bit streamer of [`crate::softuart`] to
//! the interface contract. SeaTalk needs 9 data bits, which no hardware
//! UART on the target exposes, so this is its only physical transport.
//!
//! The actual GPIO/RMT pulse capture and generation is a peripheral
//! driver concern with no desktop equivalent (see DESIGN.md); this
//! module is generic over a [`PulseTransport`] so a concrete driver can
//! be dropped in later without touching the framing logic, the same
//! seam `RMTCharBuilder` sits behind in the original.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::datamodel::node::Node;
use crate::seatalk::master::SeaTalkSink;
use crate::seatalk::SeaTalkInterface;
use crate::softuart::{bitstream, CharBuilder, Pulse, SoftUartParams};
use crate::stats::StatsHolder;

/// Receives pulses from the physical RX path and accepts pulses to
/// transmit.
#[async_trait]
pub trait PulseTransport: Send + Sync {
    async fn recv_pulse(&self) -> Option<Pulse>;
    async fn send_pulses(&self, pulses: &[Pulse]);
}

pub struct SoftUartInterface<T: PulseTransport> {
    params: SoftUartParams,
    transport: T,
    char_builder: Arc<CharBuilder>,
}

impl<T: PulseTransport + 'static> SoftUartInterface<T> {
    pub async fn new(params: SoftUartParams, transport: T, rx_node: &Arc<Node>) -> (Arc<Self>, mpsc::Receiver<u16>) {
        let (output, rx) = mpsc::channel(64);
        let char_builder = Arc::new(CharBuilder::new(params, output, rx_node).await);
        (Arc::new(SoftUartInterface { params, transport, char_builder }), rx)
    }

    /// Drains pulses into the character builder on one task while the
    /// caller's task drains completed characters into `seatalk`,
    /// splitting each `u16` back into its byte and command-marker bit.
    pub async fn run(self: Arc<Self>, mut chars: mpsc::Receiver<u16>, seatalk: Arc<SeaTalkInterface>) {
        let reader = {
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                while let Some(pulse) = this.transport.recv_pulse().await {
                    this.char_builder.add_pulse(pulse).await;
                }
                this.char_builder.stream_complete().await;
            })
        };

        while let Some(value) = chars.recv().await {
            let byte = (value & 0xff) as u8;
            let is_command = value & 0x100 != 0;
            seatalk.process_byte(byte, is_command).await;
        }

        let _ = reader.await;
    }
}

#[async_trait]
impl<T: PulseTransport> SeaTalkSink for SoftUartInterface<T> {
    /// Sets the command-marker bit on the first byte only, per SeaTalk's
    /// 9-bit wire convention (§4.7).
    async fn send_datagram(&self, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            let value = if i == 0 { 0x100 | b as u16 } else { b as u16 };
            let pulses = bitstream::encode_char(value, &self.params);
            self.transport.send_pulses(&pulses).await;
        }
    }
}

#[async_trait]
impl<T: PulseTransport> StatsHolder for SoftUartInterface<T> {
    async fn export_stats(&self, ms_elapsed: u32) {
        self.char_builder.export_stats(ms_elapsed).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::softuart::{DataWidth, Parity, StopBits};
    use std::sync::Mutex as StdMutex;

    /// Records every pulse handed to it for transmission; this test only
    /// exercises the TX-side encoding, so `recv_pulse` is never called.
    struct RecordingTransport {
        sent: StdMutex<Vec<Pulse>>,
    }

    #[async_trait]
    impl PulseTransport for RecordingTransport {
        async fn recv_pulse(&self) -> Option<Pulse> {
            None
        }

        async fn send_pulses(&self, pulses: &[Pulse]) {
            self.sent.lock().unwrap().extend_from_slice(pulses);
        }
    }

    #[tokio::test]
    async fn transmitted_datagram_round_trips_through_the_character_builder() {
        let params = SoftUartParams::new(DataWidth::Nine, Parity::None, StopBits::One, 100);
        let transport = RecordingTransport { sent: StdMutex::new(Vec::new()) };
        let root = Node::new_root();
        let rx_node = root.add_node("rx").await;
        let (interface, mut chars) = SoftUartInterface::new(params, transport, &rx_node).await;

        // A freshly built character builder spends its first reported
        // stream synchronizing rather than decoding (see the
        // `CharBuilder` tests); prime it with a throwaway character
        // first so the datagram itself lands on an already-synchronized
        // builder.
        let priming = bitstream::encode_char(0x000, &params);
        for pulse in priming {
            interface.char_builder.add_pulse(pulse).await;
        }
        interface.char_builder.stream_complete().await;
        chars.try_recv().ok();

        interface.send_datagram(&[0x30, 0x00, 0x02]).await;

        let pulses = interface.transport.sent.lock().unwrap().clone();
        for pulse in pulses {
            interface.char_builder.add_pulse(pulse).await;
        }
        interface.char_builder.stream_complete().await;

        let mut received = Vec::new();
        while let Ok(value) = chars.try_recv() {
            received.push(value);
        }
        assert_eq!(received, vec![0x130, 0x000, 0x002]);
    }
}
