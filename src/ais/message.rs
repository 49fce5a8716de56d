//! AIS message-type dispatch, grounded
//! on `components/AIS/AISMessage.cpp`'s `parse`/`parseStaticAndVoyageRelatedData`/
//! `parseStaticDataReport`.

use super::bitreader::BitReader;
use super::contact::{Position, ShipDimensions};

#[derive(Debug, Clone, PartialEq)]
pub enum DecodedMessage {
    /// Type 5: static and voyage-related data.
    StaticAndVoyageData { mmsi: u32, name: String, ship_type: u8, dimensions: ShipDimensions },
    /// Type 21: aid-to-navigation report.
    AidToNavigation { mmsi: u32, nav_aid_type: u8, name: String, position: Position, dimensions: ShipDimensions },
    /// Type 24 part A: name only.
    StaticDataReportPartA { mmsi: u32, name: String },
    /// Type 24 part B: ship type and dimensions.
    StaticDataReportPartB { mmsi: u32, ship_type: u8, dimensions: ShipDimensions },
    /// A recognized but unhandled type (spec: "Other types are logged
    /// and counted").
    Unhandled { msg_type: u8 },
}

/// Dispatches on the leading 6-bit message type. `message_size_bits` is
/// the reassembled bit count before this call consumed any of it.
pub fn decode(bits: &[bool]) -> Option<DecodedMessage> {
    let message_size_bits = bits.len();
    let mut reader = BitReader::new(bits);
    let msg_type = reader.read_u8(6)?;

    match msg_type {
        5 => decode_static_and_voyage_data(&mut reader, message_size_bits),
        21 => decode_aid_to_navigation(&mut reader, message_size_bits),
        24 => decode_static_data_report(&mut reader, message_size_bits),
        other => Some(DecodedMessage::Unhandled { msg_type: other }),
    }
}

fn decode_static_and_voyage_data(reader: &mut BitReader, message_size_bits: usize) -> Option<DecodedMessage> {
    // The original tolerates 424, 422 or 420 bits (truncated transmitters).
    if ![424, 422, 420].contains(&message_size_bits) {
        log::warn!("AIS static and voyage data message with bad length ({message_size_bits})");
        return None;
    }

    reader.skip(2); // repeat indicator
    let mmsi = reader.read_u32(30)?;
    reader.skip(2); // AIS version
    reader.skip(30); // IMO number
    reader.read_ais_string(7); // call sign, not retained on the contact
    let name = reader.read_ais_string(20);
    let ship_type = reader.read_u8(8)?;
    let to_bow = reader.read_u32(9)? as u16;
    let to_stern = reader.read_u32(9)? as u16;
    let to_port = reader.read_u8(6)?;
    let to_starboard = reader.read_u8(6)?;
    let dimensions = ShipDimensions::from_raw(to_bow, to_stern, to_port, to_starboard);
    reader.skip(4); // EPFD fix type (not retained)
    reader.skip(4 + 5 + 5 + 6); // ETA month/day/hour/minute
    reader.skip(8); // draught

    let destination_bits = if message_size_bits > 420 { 20 } else { 18 };
    reader.read_ais_string(destination_bits);

    Some(DecodedMessage::StaticAndVoyageData { mmsi, name, ship_type, dimensions })
}

fn decode_aid_to_navigation(reader: &mut BitReader, message_size_bits: usize) -> Option<DecodedMessage> {
    if !(272..=360).contains(&message_size_bits) {
        log::warn!("AIS aid-to-navigation message with bad length ({message_size_bits})");
        return None;
    }

    reader.skip(2); // repeat indicator
    let mmsi = reader.read_u32(30)?;
    let nav_aid_type = reader.read_u8(5)?;
    let name = reader.read_ais_string(20);
    reader.skip(1); // position accuracy
    let longitude_raw = reader.read_i32(28)?;
    let latitude_raw = reader.read_i32(27)?;
    let to_bow = reader.read_u32(9)? as u16;
    let to_stern = reader.read_u32(9)? as u16;
    let to_port = reader.read_u8(6)?;
    let to_starboard = reader.read_u8(6)?;

    Some(DecodedMessage::AidToNavigation {
        mmsi,
        nav_aid_type,
        name,
        position: Position::from_raw(longitude_raw, latitude_raw),
        dimensions: ShipDimensions::from_raw(to_bow, to_stern, to_port, to_starboard),
    })
}

fn decode_static_data_report(reader: &mut BitReader, message_size_bits: usize) -> Option<DecodedMessage> {
    if message_size_bits < 40 {
        log::warn!("AIS static data report with bad length ({message_size_bits})");
        return None;
    }

    reader.skip(2); // repeat indicator
    let mmsi = reader.read_u32(30)?;
    let part_number = reader.read_u8(2)?;

    match part_number {
        0 => {
            if message_size_bits != 160 && message_size_bits != 168 {
                log::warn!("AIS static data report part A with bad length ({message_size_bits})");
                return None;
            }
            let name = reader.read_ais_string(20);
            Some(DecodedMessage::StaticDataReportPartA { mmsi, name })
        }
        1 => {
            if message_size_bits != 168 {
                log::warn!("AIS static data report part B with bad length ({message_size_bits})");
                return None;
            }
            let ship_type = reader.read_u8(8)?;
            reader.read_ais_string(3); // vendor id
            reader.skip(4); // unit model code
            reader.skip(20); // serial number
            let to_bow = reader.read_u32(9)? as u16;
            let to_stern = reader.read_u32(9)? as u16;
            let to_port = reader.read_u8(6)?;
            let to_starboard = reader.read_u8(6)?;
            Some(DecodedMessage::StaticDataReportPartB {
                mmsi,
                ship_type,
                dimensions: ShipDimensions::from_raw(to_bow, to_stern, to_port, to_starboard),
            })
        }
        _ => {
            log::warn!("AIS static data report with bad part number ({part_number})");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ais::armor::unarmor;

    #[test]
    fn unhandled_type_is_counted_not_dropped_silently() {
        // Type 1 (position report class A) isn't in the handled set.
        let bits = unarmor("1", 0).unwrap();
        // Too short to be a real type 1, but decode() only needs the 6-bit tag to classify it.
        let mut padded = bits;
        padded.resize(6, false);
        let decoded = decode(&padded);
        assert!(matches!(decoded, Some(DecodedMessage::Unhandled { msg_type: _ })));
    }

    #[test]
    fn rejects_short_buffer() {
        assert!(decode(&[]).is_none());
    }
}
