//! 6-bit "AIS armoring" alphabet, grounded on
//! `components/AIS/AISString.cpp`'s `codeToChar` (the reverse mapping:
//! wire character -> 6-bit value rather than 6-bit value -> display
//! character).

/// Decode one armored payload character to its 6-bit value, or `None`
/// if it falls outside the two valid ranges.
pub fn decode_char(c: u8) -> Option<u8> {
    match c {
        48..=87 => Some(c - 48),
        96..=119 => Some(c - 56),
        _ => None,
    }
}

/// Unarmor a VDM/VDO payload string into a flat bitstream (MSB-first
/// within each 6-bit group), trimming the trailing `fill_bits` padding
/// bits from the end.
pub fn unarmor(payload: &str, fill_bits: u32) -> Option<Vec<bool>> {
    let mut bits = Vec::with_capacity(payload.len() * 6);
    for c in payload.bytes() {
        let value = decode_char(c)?;
        for shift in (0..6).rev() {
            bits.push((value >> shift) & 1 == 1);
        }
    }
    let fill = fill_bits as usize;
    if fill > bits.len() {
        return None;
    }
    bits.truncate(bits.len() - fill);
    Some(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_boundary_characters() {
        assert_eq!(decode_char(b'0'), Some(0));
        assert_eq!(decode_char(b'W'), Some(39));
        assert_eq!(decode_char(b'`'), Some(40));
        assert_eq!(decode_char(b'w'), Some(63));
        assert_eq!(decode_char(b' '), None);
    }

    #[test]
    fn unarmors_and_trims_fill_bits() {
        let bits = unarmor("6", 4).unwrap();
        // '6' decodes to value 6 = 0b000110; with the trailing 4 fill
        // bits trimmed, only the leading 2 bits survive.
        assert_eq!(bits, vec![false, false]);
    }
}
