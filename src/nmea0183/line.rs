//! NMEA 0183 line framing and checksum, grounded on
//! `components/NMEALineSource/NMEALineSource.cpp` and `NMEALine.cpp`.

pub const MAX_LINE_LENGTH: usize = 82;

/// An accumulator that turns a byte stream into CR/LF-framed, checksum
/// validated NMEA 0183 sentence bodies (the text between the leading
/// `$`/`!` and the trailing `*XX`, delimiters stripped).
#[derive(Default)]
pub struct LineAccumulator {
    buffer: String,
    carriage_return_found: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum LineEvent {
    /// A complete, checksum-valid sentence body plus whether it was
    /// encapsulated (`!`, used by AIS) rather than standard (`$`).
    Line { body: String, encapsulated: bool },
    /// Checksum was present but did not match.
    BadChecksum,
    /// Line exceeded `MAX_LINE_LENGTH` including CR/LF and was discarded.
    TooLong,
    /// A bare CR without a following LF; the buffer was reset.
    BareCarriageReturn,
}

impl LineAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte; returns `Some(event)` whenever a line boundary is
    /// reached, `None` while still accumulating.
    pub fn feed(&mut self, byte: u8) -> Option<LineEvent> {
        if self.carriage_return_found {
            self.carriage_return_found = false;
            if byte == b'\n' {
                return self.finish_line();
            } else {
                self.buffer.clear();
                if byte == b'\r' {
                    self.carriage_return_found = true;
                    return None;
                }
                self.push(byte);
                return Some(LineEvent::BareCarriageReturn);
            }
        }

        if byte == b'\r' {
            self.carriage_return_found = true;
            return None;
        }

        self.push(byte);
        if self.buffer.len() > MAX_LINE_LENGTH {
            self.buffer.clear();
            self.carriage_return_found = false;
            return Some(LineEvent::TooLong);
        }

        None
    }

    fn push(&mut self, byte: u8) {
        self.buffer.push(byte as char);
    }

    fn finish_line(&mut self) -> Option<LineEvent> {
        let line = std::mem::take(&mut self.buffer);
        // `line` excludes the CR/LF; total on-wire length including CR/LF
        // must not exceed MAX_LINE_LENGTH (82 bytes incl. CR/LF is
        // accepted, 83 is rejected).
        if line.len() + 2 > MAX_LINE_LENGTH {
            return Some(LineEvent::TooLong);
        }

        let mut chars = line.chars();
        let first = chars.next()?;
        let encapsulated = match first {
            '$' => false,
            '!' => true,
            _ => return Some(LineEvent::BadChecksum),
        };

        let rest = &line[1..];
        let star_pos = rest.rfind('*')?;
        let (content, checksum_str) = (&rest[..star_pos], &rest[star_pos + 1..]);
        if checksum_str.len() != 2 {
            return Some(LineEvent::BadChecksum);
        }
        let expected = u8::from_str_radix(checksum_str, 16).ok()?;
        let computed = checksum(content.as_bytes());
        if computed != expected {
            return Some(LineEvent::BadChecksum);
        }

        Some(LineEvent::Line { body: content.to_string(), encapsulated })
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.carriage_return_found = false;
    }
}

/// XOR checksum of all bytes strictly between the `$`/`!` and the `*`.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Format a checksum as the two uppercase hex digits that follow `*` on
/// the wire.
pub fn format_checksum(cs: u8) -> String {
    format!("{cs:02X}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_str(acc: &mut LineAccumulator, s: &str) -> Vec<LineEvent> {
        let mut events = Vec::new();
        for b in s.bytes() {
            if let Some(e) = acc.feed(b) {
                events.push(e);
            }
        }
        events
    }

    #[test]
    fn checksum_round_trip() {
        let content = "GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,";
        let cs = checksum(content.as_bytes());
        assert_eq!(format_checksum(cs), "47");
    }

    #[test]
    fn accepts_well_formed_line() {
        let mut acc = LineAccumulator::new();
        let line = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";
        let events = feed_str(&mut acc, line);
        assert_eq!(events.len(), 1);
        match &events[0] {
            LineEvent::Line { body, encapsulated } => {
                assert!(!encapsulated);
                assert!(body.starts_with("GPGGA,123519"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_checksum() {
        let mut acc = LineAccumulator::new();
        let events = feed_str(&mut acc, "$GPGGA,1*00\r\n");
        assert_eq!(events, vec![LineEvent::BadChecksum]);
    }

    #[test]
    fn bare_carriage_return_resets_buffer() {
        let mut acc = LineAccumulator::new();
        let events = feed_str(&mut acc, "$GPGGA,garbage\rand more");
        assert!(events.iter().any(|e| matches!(e, LineEvent::BareCarriageReturn)));
    }

    #[test]
    fn line_at_82_bytes_accepted_83_rejected() {
        // Build a body such that "$" + body + "*XX" + "\r\n" == 82 bytes exactly.
        // Total = 1 (marker) + body.len() + 3 (*XX) + 2 (CRLF) == 82
        // => body.len() == 76
        let body: String = "A".repeat(76);
        let cs = checksum(body.as_bytes());
        let line = format!("${body}*{}\r\n", format_checksum(cs));
        assert_eq!(line.len(), 82);
        let mut acc = LineAccumulator::new();
        let events = feed_str(&mut acc, &line);
        assert!(matches!(events.last(), Some(LineEvent::Line { .. })), "82-byte line should be accepted: {events:?}");

        let body83: String = "A".repeat(77);
        let cs83 = checksum(body83.as_bytes());
        let line83 = format!("${body83}*{}\r\n", format_checksum(cs83));
        assert_eq!(line83.len(), 83);
        let mut acc83 = LineAccumulator::new();
        let events83 = feed_str(&mut acc83, &line83);
        assert!(events83.iter().any(|e| matches!(e, LineEvent::TooLong)), "83-byte line should be rejected: {events83:?}");
    }
}
