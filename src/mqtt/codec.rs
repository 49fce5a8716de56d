//! Minimal MQTT 3.1.1 wire encoding covering just what the broker needs
//! to interact with the data model: just enough of the fixed header,
//! remaining-length varint, and length-prefixed string encoding to
//! drive CONNECT/
//! SUBSCRIBE/UNSUBSCRIBE/PINGREQ/DISCONNECT in and CONNACK/SUBACK/
//! UNSUBACK/PINGRESP/PUBLISH out, grounded on `MQTTUtil.cpp`'s
//! `mqttWriteRemainingLength`/`mqttWriteUInt16`/`mqttWriteMQTTString` and
//! `MQTTPingRequestMessage.cpp`'s fixed-header flag/length validation.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{LunaMonError, Result};

pub const CONNECT: u8 = 1;
pub const CONNACK: u8 = 2;
pub const PUBLISH: u8 = 3;
pub const SUBSCRIBE: u8 = 8;
pub const SUBACK: u8 = 9;
pub const UNSUBSCRIBE: u8 = 10;
pub const UNSUBACK: u8 = 11;
pub const PINGREQ: u8 = 12;
pub const PINGRESP: u8 = 13;
pub const DISCONNECT: u8 = 14;

pub struct FixedHeader {
    pub packet_type: u8,
    pub flags: u8,
    pub remaining_length: u32,
}

/// Reads a fixed header off the wire; a read of zero bytes on the first
/// byte means the client closed the connection cleanly.
pub async fn read_fixed_header<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<FixedHeader>> {
    let first = match reader.read_u8().await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(LunaMonError::Network(format!("MQTT read failed: {e}"))),
    };

    let mut remaining_length: u32 = 0;
    let mut multiplier: u32 = 1;
    loop {
        let byte = reader
            .read_u8()
            .await
            .map_err(|e| LunaMonError::Network(format!("MQTT read failed mid remaining-length: {e}")))?;
        remaining_length += (byte & 0x7f) as u32 * multiplier;
        if byte & 0x80 == 0 {
            break;
        }
        multiplier *= 0x80;
        if multiplier > 0x80 * 0x80 * 0x80 {
            return Err(LunaMonError::Frame("MQTT remaining length field too long".to_string()));
        }
    }

    Ok(Some(FixedHeader { packet_type: first >> 4, flags: first & 0x0f, remaining_length }))
}

pub async fn read_exact(reader: &mut (impl AsyncRead + Unpin), len: u32) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await.map_err(|e| LunaMonError::Network(format!("MQTT body read failed: {e}")))?;
    Ok(buf)
}

/// A length-prefixed UTF-8 string, per MQTT 3.1.1 section 1.5.3.
pub fn read_mqtt_string(buf: &[u8], pos: &mut usize) -> Option<String> {
    if buf.len() < *pos + 2 {
        return None;
    }
    let len = u16::from_be_bytes([buf[*pos], buf[*pos + 1]]) as usize;
    *pos += 2;
    if buf.len() < *pos + len {
        return None;
    }
    let s = String::from_utf8_lossy(&buf[*pos..*pos + len]).to_string();
    *pos += len;
    Some(s)
}

pub fn encode_remaining_length(mut length: usize, out: &mut Vec<u8>) {
    loop {
        let mut byte = (length % 0x80) as u8;
        length /= 0x80;
        if length > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if length == 0 {
            break;
        }
    }
}

pub fn encode_mqtt_string(s: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(&(s.len() as u16).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
}

pub fn encode_packet(packet_type: u8, flags: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![(packet_type << 4) | flags];
    encode_remaining_length(body.len(), &mut out);
    out.extend_from_slice(body);
    out
}

pub async fn write_packet<W: AsyncWrite + Unpin>(writer: &mut W, packet_type: u8, flags: u8, body: &[u8]) -> Result<()> {
    let out = encode_packet(packet_type, flags, body);
    writer.write_all(&out).await.map_err(|e| LunaMonError::Network(format!("MQTT write failed: {e}")))
}

/// Builds a QoS 0 PUBLISH body (topic + payload, no packet identifier).
pub fn publish_body(topic: &str, payload: &str) -> Vec<u8> {
    let mut body = Vec::new();
    encode_mqtt_string(topic, &mut body);
    body.extend_from_slice(payload.as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_length_round_trips_across_encoding_widths() {
        for &n in &[0usize, 127, 128, 16383, 16384, 2_097_151] {
            let mut out = Vec::new();
            encode_remaining_length(n, &mut out);

            let mut remaining_length: u32 = 0;
            let mut multiplier: u32 = 1;
            let mut i = 0;
            loop {
                let byte = out[i];
                i += 1;
                remaining_length += (byte & 0x7f) as u32 * multiplier;
                if byte & 0x80 == 0 {
                    break;
                }
                multiplier *= 0x80;
            }
            assert_eq!(remaining_length as usize, n);
        }
    }

    #[test]
    fn mqtt_string_round_trips() {
        let mut out = Vec::new();
        encode_mqtt_string("gps/time", &mut out);
        let mut pos = 0;
        assert_eq!(read_mqtt_string(&out, &mut pos).as_deref(), Some("gps/time"));
        assert_eq!(pos, out.len());
    }

    #[test]
    fn truncated_string_length_prefix_is_rejected() {
        let buf = [0x00];
        let mut pos = 0;
        assert_eq!(read_mqtt_string(&buf, &mut pos), None);
    }
}
