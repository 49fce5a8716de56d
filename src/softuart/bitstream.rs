//! Transmit-side bit streamer: encodes one
//! character into a start bit, N data bits LSB-first, an optional parity
//! bit and 1/1.5/2 stop bits, then coalesces the result into pulses.

use super::config::{Parity, SoftUartParams};
use super::pulse::{coalesce, Pulse};

fn parity_bit(data: u16, bits_per_char: u8, parity: Parity) -> Option<u8> {
    let ones = (0..bits_per_char).filter(|i| (data >> i) & 1 == 1).count();
    let even_ones = ones % 2 == 0;
    match parity {
        Parity::None => None,
        Parity::Even => Some(if even_ones { 0 } else { 1 }),
        Parity::Odd => Some(if even_ones { 1 } else { 0 }),
        Parity::Mark => Some(1),
        Parity::Space => Some(0),
    }
}

/// Encodes one character (9 bits wide to accommodate SeaTalk; unused high
/// bits are ignored for narrower widths) into the pulse sequence a
/// transmit peripheral would write to the GPIO.
pub fn encode_char(data: u16, params: &SoftUartParams) -> Vec<Pulse> {
    let bits_per_char = params.bits_per_char();
    let mut levels = Vec::with_capacity(params.data_bits_per_frame() as usize + 3);

    levels.push(0); // start bit

    for i in 0..bits_per_char {
        levels.push(((data >> i) & 1) as u8);
    }

    if let Some(bit) = parity_bit(data, bits_per_char, params.parity) {
        levels.push(bit);
    }

    let mut pulses = coalesce(&levels, params.bit_duration);

    let stop_duration = params.stop_bit_duration();
    match pulses.last_mut() {
        Some(last) if last.level == 1 => last.duration += stop_duration,
        _ => pulses.push(Pulse::new(1, stop_duration)),
    }

    pulses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::softuart::config::{DataWidth, StopBits};

    #[test]
    fn start_bit_is_always_a_zero_level_pulse_one_bit_long() {
        let params = SoftUartParams::new(DataWidth::Eight, Parity::None, StopBits::One, 100);
        let pulses = encode_char(0xff, &params);
        assert_eq!(pulses[0], Pulse::new(0, 100));
    }

    #[test]
    fn all_ones_byte_coalesces_data_and_stop_into_one_pulse() {
        let params = SoftUartParams::new(DataWidth::Eight, Parity::None, StopBits::One, 100);
        let pulses = encode_char(0xff, &params);
        // start (0) then 8 data bits + 1 stop bit, all level 1, coalesced.
        assert_eq!(pulses, vec![Pulse::new(0, 100), Pulse::new(1, 900)]);
    }

    #[test]
    fn even_parity_adds_a_bit_to_make_ones_count_even() {
        let params = SoftUartParams::new(DataWidth::Eight, Parity::Even, StopBits::One, 100);
        // 0x01 has one set bit (odd); even parity bit should be 1.
        let pulses = encode_char(0x01, &params);
        // start(0,100) data-bit0(1,100) data-bits1..7(0,700) parity(1,100) stop(1,100)
        assert_eq!(pulses, vec![
            Pulse::new(0, 100),
            Pulse::new(1, 100),
            Pulse::new(0, 700),
            Pulse::new(1, 200),
        ]);
    }

    #[test]
    fn nine_bit_width_carries_the_seatalk_command_marker_bit() {
        let params = SoftUartParams::new(DataWidth::Nine, Parity::None, StopBits::One, 100);
        let pulses = encode_char(0x1ff, &params);
        assert_eq!(pulses, vec![Pulse::new(0, 100), Pulse::new(1, 1000)]);
    }

    #[test]
    fn one_and_half_stop_bits_extends_the_final_pulse() {
        let params = SoftUartParams::new(DataWidth::Eight, Parity::None, StopBits::OneAndHalf, 100);
        let pulses = encode_char(0x00, &params);
        // start+8 data bits all 0 (900 ticks), then 1.5 stop bits (150 ticks) at level 1.
        assert_eq!(pulses, vec![Pulse::new(0, 900), Pulse::new(1, 150)]);
    }
}
