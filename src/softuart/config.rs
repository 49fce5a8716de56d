//! Per-interface soft-UART framing parameters, grounded on
//! `RMTCharBuilder.cpp`'s constructor and `InterfaceParams.h`.

/// Data bits per character, 5 through 9 (SeaTalk needs 9, which no
/// hardware UART on the target chip supports).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataWidth {
    Five,
    Six,
    Seven,
    Eight,
    Nine,
}

impl DataWidth {
    pub fn bits(self) -> u8 {
        match self {
            DataWidth::Five => 5,
            DataWidth::Six => 6,
            DataWidth::Seven => 7,
            DataWidth::Eight => 8,
            DataWidth::Nine => 9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
    Mark,
    Space,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    OneAndHalf,
    Two,
}

impl StopBits {
    /// Stop-bit duration expressed in half-bit units (2, 3 or 4), matching
    /// the original's `halfStopBits`.
    fn half_bits(self) -> u16 {
        match self {
            StopBits::One => 2,
            StopBits::OneAndHalf => 3,
            StopBits::Two => 4,
        }
    }
}

/// Timing and framing parameters shared by a soft-UART interface's
/// transmit and receive paths.
#[derive(Debug, Clone, Copy)]
pub struct SoftUartParams {
    pub data_width: DataWidth,
    pub parity: Parity,
    pub stop_bits: StopBits,
    /// Duration of one bit, in peripheral ticks.
    pub bit_duration: u16,
}

impl SoftUartParams {
    pub fn new(data_width: DataWidth, parity: Parity, stop_bits: StopBits, bit_duration: u16) -> Self {
        SoftUartParams { data_width, parity, stop_bits, bit_duration }
    }

    pub fn bits_per_char(&self) -> u8 {
        self.data_width.bits()
    }

    /// Data bits per frame, including the parity bit if configured, per
    /// the original's `dataBitsPerFrame`.
    pub fn data_bits_per_frame(&self) -> u8 {
        match self.parity {
            Parity::None => self.bits_per_char(),
            _ => self.bits_per_char() + 1,
        }
    }

    pub fn has_parity(&self) -> bool {
        self.parity != Parity::None
    }

    /// Nominal duration of the stop-bit(s), in ticks.
    pub fn stop_bit_duration(&self) -> u16 {
        (self.bit_duration * self.stop_bits.half_bits()) / 2
    }

    /// Shortest acceptable stop-bit duration: 80% of nominal.
    pub fn min_stop_bit_duration(&self) -> u16 {
        ((self.stop_bit_duration() as u32 * 8) / 10) as u16
    }

    /// Pulses shorter than this are glitches and discarded: 10% of a bit
    /// duration.
    pub fn glitch_threshold(&self) -> u16 {
        self.bit_duration / 10
    }

    pub fn is_glitch(&self, duration: u16) -> bool {
        duration < self.glitch_threshold()
    }

    /// Converts a pulse duration to a whole number of bits, rounding to
    /// nearest: `round(d / bit_duration)`.
    pub fn duration_to_bits(&self, duration: u16) -> u16 {
        let half = self.bit_duration / 2;
        (duration + half) / self.bit_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_adds_a_data_bit_per_frame() {
        let none = SoftUartParams::new(DataWidth::Nine, Parity::None, StopBits::One, 208);
        let even = SoftUartParams::new(DataWidth::Nine, Parity::Even, StopBits::One, 208);
        assert_eq!(none.data_bits_per_frame(), 9);
        assert_eq!(even.data_bits_per_frame(), 10);
    }

    #[test]
    fn one_and_half_stop_bits_is_between_one_and_two() {
        let one = SoftUartParams::new(DataWidth::Eight, Parity::None, StopBits::One, 100);
        let one_half = SoftUartParams::new(DataWidth::Eight, Parity::None, StopBits::OneAndHalf, 100);
        let two = SoftUartParams::new(DataWidth::Eight, Parity::None, StopBits::Two, 100);
        assert_eq!(one.stop_bit_duration(), 100);
        assert_eq!(one_half.stop_bit_duration(), 150);
        assert_eq!(two.stop_bit_duration(), 200);
    }

    #[test]
    fn duration_rounds_to_nearest_bit_count() {
        let params = SoftUartParams::new(DataWidth::Eight, Parity::None, StopBits::One, 100);
        assert_eq!(params.duration_to_bits(149), 1);
        assert_eq!(params.duration_to_bits(151), 2);
    }

    #[test]
    fn glitch_threshold_is_ten_percent_of_a_bit() {
        let params = SoftUartParams::new(DataWidth::Eight, Parity::None, StopBits::One, 100);
        assert!(params.is_glitch(9));
        assert!(!params.is_glitch(10));
    }
}
