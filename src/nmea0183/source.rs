//! Ties framing, tag parsing, talker filtering and handler dispatch
//! together into the per-interface NMEA 0183 ingest path, grounded on
//! `components/NMEALineSource/NMEALineSource.cpp`.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use crate::datamodel::leaf::{LeafExt, LeafHandle};
use crate::datamodel::node::Node;
use crate::stats::{StatCounter, StatsHolder};

use super::line::{LineAccumulator, LineEvent};
use super::tag::{parse_tag, Talker};

/// Implemented by anything that wants to see validated, talker-filtered
/// NMEA 0183 lines: the data-model decoder, a bridge, or both at once.
/// The original calls every registered handler
/// unconditionally for each line and lets each decide independently
/// whether the line is relevant to it, rather than stopping at a single
/// consumer; this keeps that behavior.
#[async_trait]
pub trait LineHandler: Send + Sync {
    async fn handle_line(&self, talker: &Talker, msg_type: &str, body: &str, fields: &[&str]);
}

struct SourceState {
    accumulator: LineAccumulator,
    talkers_seen: HashSet<String>,
}

/// One NMEA 0183 ingest path: byte accumulation -> checksum-verified
/// line -> tag parse -> talker filter -> handler fan-out, with its own
/// `nmea/input/*` stats subtree exactly mirroring the original's.
pub struct NmeaLineSource {
    filtered_talkers: HashSet<String>,
    handlers: AsyncMutex<Vec<Arc<dyn LineHandler>>>,
    state: AsyncMutex<SourceState>,

    messages_counter: AsyncMutex<StatCounter>,
    messages_leaf: LeafHandle,
    message_rate_leaf: LeafHandle,
    talkers_leaf: LeafHandle,
    talker_filtered_messages: AsyncMutex<u32>,
    talker_filtered_messages_leaf: LeafHandle,
    bad_tag_messages: AsyncMutex<u32>,
    bad_tag_messages_leaf: LeafHandle,
}

const MAX_TALKERS_REPORTED: usize = 16;

impl NmeaLineSource {
    pub async fn new(interface_node: &Arc<Node>, filtered_talkers: &[String]) -> Arc<Self> {
        let nmea_node = interface_node.add_node("nmea").await;
        let input_node = nmea_node.add_node("input").await;

        let source = NmeaLineSource {
            filtered_talkers: filtered_talkers.iter().cloned().collect(),
            handlers: AsyncMutex::new(Vec::new()),
            state: AsyncMutex::new(SourceState { accumulator: LineAccumulator::new(), talkers_seen: HashSet::new() }),
            messages_counter: AsyncMutex::new(StatCounter::new()),
            messages_leaf: input_node.add_u32_leaf("messages").await,
            message_rate_leaf: input_node.add_u32_leaf("messageRate").await,
            talkers_leaf: input_node.add_string_leaf("talkers", MAX_TALKERS_REPORTED * 3).await,
            talker_filtered_messages: AsyncMutex::new(0),
            talker_filtered_messages_leaf: input_node.add_u32_leaf("talkerFilteredMsgs").await,
            bad_tag_messages: AsyncMutex::new(0),
            bad_tag_messages_leaf: input_node.add_u32_leaf("badTagMsgs").await,
        };
        source.talkers_leaf.set_string(String::new()).await;

        Arc::new(source)
    }

    pub async fn add_line_handler(&self, handler: Arc<dyn LineHandler>) {
        self.handlers.lock().await.push(handler);
    }

    /// Feed one received byte; drives the framing state machine and, on a
    /// completed line, runs tag parsing, talker filtering, and dispatch.
    pub async fn feed(&self, byte: u8) {
        let event = {
            let mut state = self.state.lock().await;
            state.accumulator.feed(byte)
        };

        match event {
            Some(LineEvent::Line { body, encapsulated: _ }) => self.line_completed(&body).await,
            Some(LineEvent::BadChecksum) => log::warn!("NMEA line with bad checksum"),
            Some(LineEvent::TooLong) => log::warn!("NMEA line exceeded maximum length"),
            Some(LineEvent::BareCarriageReturn) => log::warn!("NMEA line with CR but no LF, ignoring"),
            None => {}
        }
    }

    async fn line_completed(&self, body: &str) {
        self.messages_counter.lock().await.increment();

        let mut words = body.splitn(2, ',');
        let tag_word = words.next().unwrap_or("");
        let rest = words.next().unwrap_or("");

        let Some(tag) = parse_tag(tag_word) else {
            log::warn!("bad NMEA tag '{tag_word}'");
            *self.bad_tag_messages.lock().await += 1;
            return;
        };

        let talker_str = tag.talker.as_str();
        {
            let mut state = self.state.lock().await;
            if state.talkers_seen.insert(talker_str.clone()) {
                self.new_talker_seen(&state.talkers_seen).await;
            }
        }

        if self.filtered_talkers.contains(&talker_str) {
            *self.talker_filtered_messages.lock().await += 1;
            log::debug!("filtering NMEA message from talker '{talker_str}': {body}");
            return;
        }

        let fields: Vec<&str> = if rest.is_empty() { Vec::new() } else { rest.split(',').collect() };
        let handlers = self.handlers.lock().await.clone();
        for handler in handlers {
            handler.handle_line(&tag.talker, &tag.msg_type, body, &fields).await;
        }
    }

    async fn new_talker_seen(&self, talkers_seen: &HashSet<String>) {
        if talkers_seen.len() > MAX_TALKERS_REPORTED {
            log::debug!("maximum NMEA talkers exceeded, not reporting further talkers");
            return;
        }
        let mut sorted: Vec<&String> = talkers_seen.iter().collect();
        sorted.sort();
        let joined = sorted.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(",");
        self.talkers_leaf.set_string(joined).await;
    }
}

#[async_trait]
impl StatsHolder for NmeaLineSource {
    async fn export_stats(&self, ms_elapsed: u32) {
        self.messages_counter.lock().await.update(&self.messages_leaf, &self.message_rate_leaf, ms_elapsed).await;
        let talker_filtered = *self.talker_filtered_messages.lock().await;
        self.talker_filtered_messages_leaf.set_u32(talker_filtered).await;
        let bad_tags = *self.bad_tag_messages.lock().await;
        self.bad_tag_messages_leaf.set_u32(bad_tags).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingHandler {
        seen: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl LineHandler for RecordingHandler {
        async fn handle_line(&self, talker: &Talker, msg_type: &str, _body: &str, _fields: &[&str]) {
            self.seen.lock().unwrap().push(format!("{talker}{msg_type}"));
        }
    }

    #[tokio::test]
    async fn dispatches_well_formed_lines_to_handlers() {
        let root = Node::new_root();
        let source = NmeaLineSource::new(&root, &[]).await;
        let handler = Arc::new(RecordingHandler { seen: StdMutex::new(Vec::new()) });
        source.add_line_handler(handler.clone()).await;

        let line = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";
        for b in line.bytes() {
            source.feed(b).await;
        }

        assert_eq!(handler.seen.lock().unwrap().as_slice(), &["GPGGA".to_string()]);
    }

    #[tokio::test]
    async fn filtered_talker_is_not_dispatched() {
        let root = Node::new_root();
        let source = NmeaLineSource::new(&root, &["GP".to_string()]).await;
        let handler = Arc::new(RecordingHandler { seen: StdMutex::new(Vec::new()) });
        source.add_line_handler(handler.clone()).await;

        let line = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";
        for b in line.bytes() {
            source.feed(b).await;
        }

        assert!(handler.seen.lock().unwrap().is_empty());
        assert_eq!(*source.talker_filtered_messages.lock().await, 1);
    }

    #[tokio::test]
    async fn proprietary_tag_normalizes_talker() {
        let root = Node::new_root();
        let source = NmeaLineSource::new(&root, &[]).await;
        let handler = Arc::new(RecordingHandler { seen: StdMutex::new(Vec::new()) });
        source.add_line_handler(handler.clone()).await;

        let body = "PGRMZ,0,F,3";
        let cs = super::super::line::checksum(body.as_bytes());
        let line = format!("${body}*{}\r\n", super::super::line::format_checksum(cs));
        for b in line.bytes() {
            source.feed(b).await;
        }

        assert_eq!(handler.seen.lock().unwrap().as_slice(), &["PDPROPRIETARY".to_string()]);
    }
}
