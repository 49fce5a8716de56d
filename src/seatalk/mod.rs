//! SeaTalk bus support: datagram framing, decoding into the
//! data model, the write-side "master" commands, and the `$STALK`
//! NMEA-wrapped transport, grounded on the `components/SeaTalk` and
//! `components/STALK*` family of the original.

pub mod command;
pub mod datagram;
pub mod master;
pub mod parser;
pub mod stalk;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use crate::datamodel::leaf::{LeafExt, LeafHandle};
use crate::datamodel::node::Node;
use crate::stats::{StatCounter, StatsHolder};

use datagram::DatagramAssembler;
use parser::SeaTalkParser;

/// Ties a [`DatagramAssembler`] to a [`SeaTalkParser`] for a soft-UART (9th
/// bit framed) transport, and exports the input/output stats the original
/// registers under `seaTalk/input` and `seaTalk/output`, grounded on
/// `SeaTalkInterface`'s constructor and `processBuffer`/`exportStats`.
pub struct SeaTalkInterface {
    assembler: AsyncMutex<DatagramAssembler>,
    parser: Arc<SeaTalkParser>,

    input_datagrams: AsyncMutex<StatCounter>,
    input_datagrams_leaf: LeafHandle,
    input_datagram_rate_leaf: LeafHandle,
    merged_datagrams_leaf: LeafHandle,
    output_datagrams: AsyncMutex<StatCounter>,
    output_datagrams_leaf: LeafHandle,
    output_datagram_rate_leaf: LeafHandle,
    output_errors_leaf: LeafHandle,
    output_errors: AsyncMutex<u32>,
}

impl SeaTalkInterface {
    pub async fn new(seatalk_node: &Arc<Node>) -> Arc<Self> {
        let input_node = seatalk_node.add_node("input").await;
        let output_node = seatalk_node.add_node("output").await;
        let parser = SeaTalkParser::new(&input_node).await;

        Arc::new(SeaTalkInterface {
            assembler: AsyncMutex::new(DatagramAssembler::new()),
            parser,
            input_datagrams: AsyncMutex::new(StatCounter::new()),
            input_datagrams_leaf: input_node.add_u32_leaf("datagrams").await,
            input_datagram_rate_leaf: input_node.add_u32_leaf("datagramRate").await,
            merged_datagrams_leaf: input_node.add_u32_leaf("mergedDatagrams").await,
            output_datagrams: AsyncMutex::new(StatCounter::new()),
            output_datagrams_leaf: output_node.add_u32_leaf("datagrams").await,
            output_datagram_rate_leaf: output_node.add_u32_leaf("datagramRate").await,
            output_errors_leaf: output_node.add_u32_leaf("errors").await,
            output_errors: AsyncMutex::new(0),
        })
    }

    pub fn parser(&self) -> &Arc<SeaTalkParser> {
        &self.parser
    }

    /// Feed one 9-bit receive character; decodes and counts a complete
    /// datagram when the boundary is reached.
    pub async fn process_byte(&self, byte: u8, is_command_byte: bool) {
        let completed = self.assembler.lock().await.feed(byte, is_command_byte);
        if let Some(datagram) = completed {
            self.input_datagrams.lock().await.increment();
            self.parser.parse_line(&datagram).await;
        }
    }

    /// Records a successfully transmitted outbound datagram.
    pub async fn note_sent(&self) {
        self.output_datagrams.lock().await.increment();
    }

    /// Records a short/failed write on the outbound side, grounded on
    /// `SeaTalkInterface::sendCommand`'s `outputErrors` increment.
    pub async fn note_send_error(&self) {
        *self.output_errors.lock().await += 1;
    }
}

#[async_trait]
impl StatsHolder for SeaTalkInterface {
    async fn export_stats(&self, ms_elapsed: u32) {
        self.input_datagrams
            .lock()
            .await
            .update(&self.input_datagrams_leaf, &self.input_datagram_rate_leaf, ms_elapsed)
            .await;
        self.merged_datagrams_leaf.set_u32(self.assembler.lock().await.merged_datagrams()).await;
        self.output_datagrams
            .lock()
            .await
            .update(&self.output_datagrams_leaf, &self.output_datagram_rate_leaf, ms_elapsed)
            .await;
        self.output_errors_leaf.set_u32(*self.output_errors.lock().await).await;
        self.parser.export_stats(ms_elapsed).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn process_byte_decodes_a_full_datagram() {
        let root = Node::new_root();
        let seatalk_node = root.add_node("seaTalk").await;
        let interface = SeaTalkInterface::new(&seatalk_node).await;

        interface.process_byte(0x90, true).await; // Device Identification, command byte
        interface.process_byte(0x00, false).await; // attribute, len 3
        interface.process_byte(0x07, false).await; // device id

        assert_eq!(interface.input_datagrams.lock().await.count(), 1);
    }

    #[tokio::test]
    async fn mid_datagram_command_byte_counts_as_merged() {
        let root = Node::new_root();
        let seatalk_node = root.add_node("seaTalk").await;
        let interface = SeaTalkInterface::new(&seatalk_node).await;

        interface.process_byte(0x00, true).await; // Depth, len 5
        interface.process_byte(0x02, false).await;
        interface.process_byte(0x10, true).await; // new command arrives early

        assert_eq!(interface.assembler.lock().await.merged_datagrams(), 1);
    }
}
