//! NMEA tag-word parsing: talker + message type extraction and
//! proprietary-message normalization, grounded on
//! `components/NMEA/NMEATalker.cpp` and `NMEAMsgType.cpp`.

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Talker(pub [u8; 2]);

impl Talker {
    pub fn from_str(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.len() == 2 {
            Some(Talker([bytes[0], bytes[1]]))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> String {
        String::from_utf8_lossy(&self.0).to_string()
    }
}

impl std::fmt::Display for Talker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub talker: Talker,
    pub msg_type: String,
}

pub const PROPRIETARY_TALKER: &str = "PD";
pub const PROPRIETARY_TYPE: &str = "PROPRIETARY";

/// Parses the leading comma-separated word of a stripped NMEA line into a
/// talker + message type, handling the 4-character proprietary-message
/// form by normalizing to talker = "PD", type = "PROPRIETARY".
pub fn parse_tag(word: &str) -> Option<Tag> {
    if word.len() == 5 {
        let talker = Talker::from_str(&word[0..2])?;
        let msg_type = word[2..5].to_string();
        Some(Tag { talker, msg_type })
    } else if word.len() == 4 && word.starts_with('P') {
        Some(Tag { talker: Talker::from_str(PROPRIETARY_TALKER).unwrap(), msg_type: PROPRIETARY_TYPE.to_string() })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_tag() {
        let tag = parse_tag("GPGGA").unwrap();
        assert_eq!(tag.talker.as_str(), "GP");
        assert_eq!(tag.msg_type, "GGA");
    }

    #[test]
    fn normalizes_proprietary_tag() {
        let tag = parse_tag("PGRM").unwrap();
        assert_eq!(tag.talker.as_str(), "PD");
        assert_eq!(tag.msg_type, "PROPRIETARY");
    }

    #[test]
    fn rejects_bad_length() {
        assert!(parse_tag("GPG").is_none());
        assert!(parse_tag("XGPGGA").is_none());
    }
}
