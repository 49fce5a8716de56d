//! Exact decimal-fraction arithmetic for marine instrument scales.
//!
//! The original represents each fixed-point scale (tenths, hundredths, at
//! 8/16/32-bit widths) as its own hand-written class
//! (`components/FixedPoint/HundredthsInt16.cpp` and siblings). Rust's
//! generics collapse those into two parametrized types, [`Tenths`] and
//! [`Hundredths`], over any integer whole-part type.

use std::fmt;

/// Number of sub-units per whole unit for a fixed-point scale.
pub trait Scale: Copy {
    const SUB_UNITS: i64;
    const DIGITS: usize;
}

/// Tenths (one fractional digit), e.g. apparent wind speed in knots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TenthsScale;
impl Scale for TenthsScale {
    const SUB_UNITS: i64 = 10;
    const DIGITS: usize = 1;
}

/// Hundredths (two fractional digits), e.g. BME280 pressure/humidity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HundredthsScale;
impl Scale for HundredthsScale {
    const SUB_UNITS: i64 = 100;
    const DIGITS: usize = 2;
}

/// A signed fixed-point decimal, stored as a whole part and a sub-unit part,
/// generic over its [`Scale`]. Arithmetic is exact: all operations stay in
/// integer sub-units and round-to-nearest only where precision is
/// unavoidably lost (multiply/divide).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPoint<S: Scale> {
    /// Total value in sub-units (e.g. tenths), so `12.5` at tenths scale is 125.
    sub_units: i64,
    _scale: std::marker::PhantomData<S>,
}

pub type Tenths = FixedPoint<TenthsScale>;
pub type Hundredths = FixedPoint<HundredthsScale>;

impl<S: Scale> FixedPoint<S> {
    /// Construct directly from a raw sub-unit count (e.g. `150` tenths == `15.0`).
    pub fn from_sub_units(sub_units: i64) -> Self {
        FixedPoint { sub_units, _scale: std::marker::PhantomData }
    }

    /// Construct from a whole part and a sub-unit remainder, e.g.
    /// `FixedPoint::new(12, 5)` at tenths scale is `12.5`.
    pub fn new(whole: i64, sub: i64) -> Self {
        let sign = if whole < 0 { -1 } else { 1 };
        Self::from_sub_units(whole * S::SUB_UNITS + sign * sub)
    }

    /// Construct from a Qm.n fixed-point integer as used by the BME280
    /// compensation formulas (Q22.10 has `n = 10`, Q24.8 has `n = 8`).
    pub fn from_q_format(raw: i64, fractional_bits: u32) -> Self {
        let scale = 1i64 << fractional_bits;
        let whole = raw / scale;
        let frac = raw - whole * scale;
        // Round frac/scale to the nearest sub-unit.
        let sub_units = whole * S::SUB_UNITS + round_div(frac * S::SUB_UNITS, scale);
        Self::from_sub_units(sub_units)
    }

    pub fn sub_units(&self) -> i64 {
        self.sub_units
    }

    pub fn whole(&self) -> i64 {
        self.sub_units / S::SUB_UNITS
    }

    pub fn sub(&self) -> i64 {
        (self.sub_units % S::SUB_UNITS).abs()
    }

    pub fn add_scalar(&self, whole_units: i64) -> Self {
        Self::from_sub_units(self.sub_units + whole_units * S::SUB_UNITS)
    }

    pub fn sub_scalar(&self, whole_units: i64) -> Self {
        Self::from_sub_units(self.sub_units - whole_units * S::SUB_UNITS)
    }

    pub fn mul_scalar(&self, multiplier: i64) -> Self {
        Self::from_sub_units(self.sub_units * multiplier)
    }

    /// Divide by a scalar, truncating towards zero for the whole part and
    /// rounding the fractional remainder (round-to-nearest, per §4.1).
    pub fn div_scalar(&self, divisor: i64) -> Self {
        let scaled = self.sub_units * 10; // one extra digit for rounding
        let q = scaled / divisor;
        Self::from_sub_units(round_div(q, 10))
    }

    /// Render with the scale's fixed number of fractional digits, explicit
    /// zero padding, per §4.1.
    pub fn format(&self) -> String {
        let neg = self.sub_units < 0;
        let abs = self.sub_units.unsigned_abs() as i64;
        let whole = abs / S::SUB_UNITS;
        let sub = abs % S::SUB_UNITS;
        let sign = if neg && (whole != 0 || sub != 0) { "-" } else { "" };
        format!("{sign}{whole}.{sub:0width$}", width = S::DIGITS)
    }

    /// Parse a string matching `[0-9]+(\.[0-9]{0,3})?`, rounding a fourth
    /// fractional digit into the third (and then into the type's own
    /// precision), per §4.1. Returns `None` on any other input.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        let (neg, s) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let mut parts = s.splitn(2, '.');
        let int_part = parts.next()?;
        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let whole: i64 = int_part.parse().ok()?;

        let frac_part = parts.next().unwrap_or("");
        if frac_part.len() > 3 || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if parts.next().is_some() {
            return None;
        }

        // Normalize the fractional text to 4 digits (thousandths), then
        // round the 4th digit into the 3rd, then truncate/round into the
        // type's own number of digits.
        let mut digits4 = [0i64; 4];
        for (i, c) in frac_part.bytes().take(4).enumerate() {
            digits4[i] = (c - b'0') as i64;
        }
        let thousandths = digits4[0] * 100 + digits4[1] * 10 + digits4[2];
        let rounded_thousandths = if digits4[3] >= 5 { thousandths + 1 } else { thousandths };
        // rounded_thousandths is now a 0..=1000 value at 1/1000 resolution;
        // convert into this scale's sub-units (round to nearest).
        let sub_units_frac = round_div(rounded_thousandths * S::SUB_UNITS, 1000);

        let sign = if neg { -1 } else { 1 };
        Some(Self::from_sub_units(sign * (whole * S::SUB_UNITS + sub_units_frac)))
    }
}

impl<S: Scale + Eq> PartialOrd for FixedPoint<S> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<S: Scale + Eq> Ord for FixedPoint<S> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sub_units.cmp(&other.sub_units)
    }
}

impl<S: Scale> fmt::Display for FixedPoint<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

fn round_div(numerator: i64, denominator: i64) -> i64 {
    if denominator == 0 {
        return 0;
    }
    let half = denominator / 2;
    if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        -((-numerator + half) / denominator)
    }
}

/// Temperature unit conversions, used by NMEA MTW/environment leaves.
pub mod temperature {
    /// Celsius tenths -> Fahrenheit tenths, round-to-nearest.
    pub fn c_tenths_to_f_tenths(c_tenths: i32) -> i32 {
        // F = C * 9/5 + 32
        let scaled = c_tenths as i64 * 9;
        let q = scaled / 5;
        let rem = scaled % 5;
        let rounded = if rem.abs() * 2 >= 5 {
            q + rem.signum()
        } else {
            q
        };
        (rounded + 320) as i32
    }
}

/// Speed unit conversions (knots as the canonical unit), used by NMEA
/// speed/wind extractors (§4.5).
pub mod speed {
    /// Knots (tenths) -> mph (tenths), round-to-nearest.
    pub fn knots_tenths_to_mph_tenths(knots_tenths: i32) -> i32 {
        round_mul_div(knots_tenths, 115_078, 100_000)
    }

    /// Knots (tenths) -> km/h (tenths), round-to-nearest.
    pub fn knots_tenths_to_kmh_tenths(knots_tenths: i32) -> i32 {
        round_mul_div(knots_tenths, 1_852, 1_000)
    }

    /// Knots (tenths) -> m/s (tenths), round-to-nearest.
    pub fn knots_tenths_to_ms_tenths(knots_tenths: i32) -> i32 {
        round_mul_div(knots_tenths, 1_852, 3_600)
    }

    fn round_mul_div(value: i32, mul: i64, div: i64) -> i32 {
        let scaled = value as i64 * mul;
        let q = scaled / div;
        let rem = scaled % div;
        let rounded = if rem.abs() * 2 >= div.abs() {
            q + rem.signum()
        } else {
            q
        };
        rounded as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_pads_zeroes() {
        let v = Hundredths::new(3, 5);
        assert_eq!(v.format(), "3.05");
        let v = Tenths::new(3, 5);
        assert_eq!(v.format(), "3.5");
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(Tenths::parse("12.3.4").is_none());
        assert!(Tenths::parse("abc").is_none());
        assert!(Tenths::parse("").is_none());
        assert!(Tenths::parse("12.34567").is_none());
    }

    #[test]
    fn parse_rounds_fourth_digit_into_third() {
        // 12.3456 rounds to 12.346 at thousandths, then to the type's own
        // precision: tenths rounds 12.346 -> 12.3.
        let v = Tenths::parse("12.3456").unwrap();
        assert_eq!(v.format(), "12.3");

        let v = Hundredths::parse("1.2349").unwrap();
        // thousandths: 234 + round(9/10)=1 => 235 -> hundredths rounds to 24? let's verify:
        // digits4 = [2,3,4,9]; thousandths=234; 4th digit 9>=5 => 235
        // 235 thousandths -> hundredths: round(235*100/1000) = round(23.5) = 24
        assert_eq!(v.sub_units(), 124);
    }

    #[test]
    fn round_trip_within_precision() {
        for raw in [0i64, 1, 5, 99, 100, 1234, -42] {
            let v = Hundredths::from_sub_units(raw);
            let formatted = v.format();
            let parsed = Hundredths::parse(&formatted).unwrap();
            assert_eq!(v, parsed, "round trip failed for {raw}");
        }
    }

    #[test]
    fn q_format_conversion() {
        // Q24.8: raw 256 == 1.0
        let v: FixedPoint<HundredthsScale> = FixedPoint::from_q_format(256, 8);
        assert_eq!(v.whole(), 1);
        assert_eq!(v.sub(), 0);
    }

    #[test]
    fn div_scalar_rounds() {
        let v = Tenths::from_sub_units(10); // 1.0
        let result = v.div_scalar(3); // 1/3 = 0.333... tenths: 3.333 tenths rounds to 3
        assert_eq!(result.sub_units(), 3);
    }

    #[test]
    fn temperature_conversion() {
        assert_eq!(temperature::c_tenths_to_f_tenths(0), 320);
        assert_eq!(temperature::c_tenths_to_f_tenths(1000), 2120);
    }

    #[test]
    fn speed_conversions() {
        // 10 knots -> ~18.52 km/h
        assert_eq!(speed::knots_tenths_to_kmh_tenths(100), 185);
    }
}
