//! `$STALK`-wrapped SeaTalk, grounded on `STALKInterface.cpp`
//! (NMEA-checksummed framing, one datagram per sentence) and
//! `STALKUARTInterface.cpp` (the Digital Yachts resend workaround).

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{Duration, Instant};

use super::datagram::SeaTalkDatagram;
use super::parser::SeaTalkParser;

const DIGITAL_YACHTS_STARTUP_DELAY: Duration = Duration::from_secs(5);
const DIGITAL_YACHTS_RESEND_INTERVAL: Duration = Duration::from_secs(30);

/// A transport that can send raw text lines, used for the `$STALK` sentence
/// itself and for the Digital Yachts `$PDGY` configuration workaround.
#[async_trait]
pub trait StalkLineSink: Send + Sync {
    async fn send_line(&self, line: &str);
}

fn hex_byte(s: &str) -> Option<u8> {
    if s.len() != 2 {
        return None;
    }
    u8::from_str_radix(s, 16).ok()
}

/// Decodes checksum-validated `$STALK`/`$PDGY` sentence bodies (the text
/// between `$` and `*`, as produced by [`crate::nmea0183::line::LineAccumulator`])
/// into SeaTalk datagrams, one complete datagram per sentence.
pub struct StalkDecoder {
    last_message_illformed: AtomicBool,
    messages: AsyncMutex<u32>,
    illformed_messages: AsyncMutex<u32>,
    proprietary_messages: AsyncMutex<u32>,
    first_resend: AtomicBool,
    next_resend_allowed_at: AsyncMutex<Option<Instant>>,
}

impl Default for StalkDecoder {
    fn default() -> Self {
        StalkDecoder {
            last_message_illformed: AtomicBool::new(false),
            messages: AsyncMutex::new(0),
            illformed_messages: AsyncMutex::new(0),
            proprietary_messages: AsyncMutex::new(0),
            first_resend: AtomicBool::new(true),
            next_resend_allowed_at: AsyncMutex::new(None),
        }
    }
}

impl StalkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one checksum-validated sentence body and, if it is a
    /// well-formed `$STALK` datagram, hand it to `parser`.
    pub async fn handle_body(&self, body: &str, parser: &SeaTalkParser) {
        *self.messages.lock().await += 1;

        let mut fields = body.split(',');
        let tag = fields.next().unwrap_or("");

        let well_formed = match tag {
            "STALK" => self.decode_stalk_fields(fields, parser).await,
            "PDGY" => {
                *self.proprietary_messages.lock().await += 1;
                true
            }
            _ => false,
        };

        if !well_formed {
            *self.illformed_messages.lock().await += 1;
        }
        self.last_message_illformed.store(!well_formed, Ordering::Relaxed);
    }

    async fn decode_stalk_fields<'a>(&self, fields: impl Iterator<Item = &'a str>, parser: &SeaTalkParser) -> bool {
        let mut datagram = SeaTalkDatagram::new();
        for field in fields {
            let Some(byte) = hex_byte(field) else { return false };
            datagram.append(byte);
        }

        if datagram.was_overrun() || !datagram.is_complete() {
            return false;
        }

        parser.parse_line(&datagram).await;
        true
    }

    pub fn last_message_illformed(&self) -> bool {
        self.last_message_illformed.load(Ordering::Relaxed)
    }

    /// Encode a datagram as a `$STALK,XX,XX,...*CS` sentence.
    pub fn encode(datagram: &SeaTalkDatagram) -> String {
        let hex_bytes: Vec<String> = datagram.as_bytes().iter().map(|b| format!("{b:02X}")).collect();
        let body = format!("STALK,{}", hex_bytes.join(","));
        let checksum = crate::nmea0183::line::checksum(body.as_bytes());
        format!("${body}*{}\r\n", crate::nmea0183::line::format_checksum(checksum))
    }

    /// Re-sends the Digital Yachts `$PDGY,STalk,On` configuration command
    /// if the last decoded message was ill-formed and the resend timer has
    /// expired, per `STALKUARTInterface::workAroundDigitalYachtsBugs`.
    pub async fn maybe_resend_digital_yachts_config(&self, sink: &dyn StalkLineSink) {
        if !self.last_message_illformed() {
            return;
        }

        let now = Instant::now();
        let mut next_allowed = self.next_resend_allowed_at.lock().await;
        match *next_allowed {
            Some(deadline) if now < deadline => return,
            None => {
                *next_allowed = Some(now + DIGITAL_YACHTS_STARTUP_DELAY);
                return;
            }
            _ => {}
        }
        *next_allowed = Some(now + DIGITAL_YACHTS_RESEND_INTERVAL);
        drop(next_allowed);

        if self.first_resend.swap(false, Ordering::Relaxed) {
            sink.send_line("\r\n").await;
        }
        sink.send_line("$PDGY,STalk,On\r\n").await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datamodel::node::Node;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        lines: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StalkLineSink for RecordingSink {
        async fn send_line(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
        }
    }

    #[tokio::test]
    async fn well_formed_stalk_line_decodes_to_a_datagram() {
        let root = Node::new_root();
        let input_node = root.add_node("input").await;
        let parser = SeaTalkParser::new(&input_node).await;
        let decoder = StalkDecoder::new();

        // command 0x90 (Device Identification), attribute 0x00, byte2 0x05.
        decoder.handle_body("STALK,90,00,05", &parser).await;

        assert!(!decoder.last_message_illformed());
        assert_eq!(*decoder.messages.lock().await, 1);
        assert_eq!(*decoder.illformed_messages.lock().await, 0);
    }

    #[tokio::test]
    async fn truncated_datagram_is_illformed() {
        let root = Node::new_root();
        let input_node = root.add_node("input").await;
        let parser = SeaTalkParser::new(&input_node).await;
        let decoder = StalkDecoder::new();

        // attribute 0x02 implies a 5 byte datagram, only 3 bytes given.
        decoder.handle_body("STALK,00,02,05", &parser).await;

        assert!(decoder.last_message_illformed());
        assert_eq!(*decoder.illformed_messages.lock().await, 1);
    }

    #[tokio::test]
    async fn pdgy_tag_is_ignored_not_illformed() {
        let root = Node::new_root();
        let input_node = root.add_node("input").await;
        let parser = SeaTalkParser::new(&input_node).await;
        let decoder = StalkDecoder::new();

        decoder.handle_body("PDGY,STalk,On", &parser).await;

        assert!(!decoder.last_message_illformed());
        assert_eq!(*decoder.proprietary_messages.lock().await, 1);
    }

    #[tokio::test]
    async fn encode_round_trips_through_the_checksum_framing() {
        let mut datagram = SeaTalkDatagram::new();
        datagram.append(0x00);
        datagram.append(0x02);
        datagram.append(0x00);
        datagram.append(0x00);
        datagram.append(0x00);

        let line = StalkDecoder::encode(&datagram);
        assert!(line.starts_with("$STALK,00,02,00,00,00*"));
        assert!(line.ends_with("\r\n"));
    }

    #[tokio::test]
    async fn resend_workaround_waits_for_startup_delay_then_resends() {
        let decoder = StalkDecoder::new();
        decoder.last_message_illformed.store(true, Ordering::Relaxed);
        let sink = RecordingSink::default();

        // First call just arms the startup delay, no send yet.
        decoder.maybe_resend_digital_yachts_config(&sink).await;
        assert!(sink.lines.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn resend_workaround_is_a_no_op_when_last_message_was_well_formed() {
        let decoder = StalkDecoder::new();
        let sink = RecordingSink::default();

        decoder.maybe_resend_digital_yachts_config(&sink).await;
        assert!(sink.lines.lock().unwrap().is_empty());
    }
}
