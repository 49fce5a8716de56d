//! Per-field extractors, grounded on the many small `NMEA*.cpp`
//! per-field types (`NMEAHundredthsUInt8.cpp`, `NMEAMagneticVariation.cpp`,
//! `NMEAFAAModeIndicator.cpp`, `NMEAGPSQuality.cpp`,
//! `NMEARadioChannelCode.cpp`, ...).
//!
//! Every extractor takes a field view (a `&str`, possibly empty) and
//! returns `Option<T>`: `None` on a parse failure, logged by the caller as
//! a warning, leaving that field unset rather than failing the rest of
//! the line.

use crate::fixed_point::{Hundredths, Tenths};

pub fn hex_u8(field: &str) -> Option<u8> {
    if field.len() != 2 || !field.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(field, 16).ok()
}

pub fn unsigned(field: &str) -> Option<u32> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

pub fn signed(field: &str) -> Option<i32> {
    if field.is_empty() {
        return None;
    }
    field.parse().ok()
}

pub fn tenths(field: &str) -> Option<Tenths> {
    if field.is_empty() {
        return None;
    }
    Tenths::parse(field)
}

pub fn hundredths(field: &str) -> Option<Hundredths> {
    if field.is_empty() {
        return None;
    }
    Hundredths::parse(field)
}

/// `HHMMSS` or `HHMMSS.ss`, per GGA/RMC/etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NmeaTime {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
}

pub fn time_hhmmss(field: &str) -> Option<NmeaTime> {
    if field.len() < 6 || !field[..6].bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: u8 = field[0..2].parse().ok()?;
    let minutes: u8 = field[2..4].parse().ok()?;
    let seconds: u8 = field[4..6].parse().ok()?;
    if hours > 23 || minutes > 59 || seconds > 59 {
        return None;
    }
    Some(NmeaTime { hours, minutes, seconds })
}

impl std::fmt::Display for NmeaTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

/// `DDMMYY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NmeaDate {
    pub day: u8,
    pub month: u8,
    pub year: u16,
}

pub fn date_ddmmyy(field: &str) -> Option<NmeaDate> {
    if field.len() != 6 || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let day: u8 = field[0..2].parse().ok()?;
    let month: u8 = field[2..4].parse().ok()?;
    let year_2digit: u16 = field[4..6].parse().ok()?;
    if day == 0 || day > 31 || month == 0 || month > 12 {
        return None;
    }
    // Two-digit years are assumed post-2000, matching the original's
    // pragmatic interpretation for a device built well after 2000.
    Some(NmeaDate { day, month, year: 2000 + year_2digit })
}

/// Latitude/longitude in `DDMM.MMMM`/`DDDMM.MMMM` form with an N/S or E/W
/// hemisphere suffix. Kept as degrees plus minutes-in-ten-thousandths
/// rather than converted to decimal degrees, so formatting round-trips
/// the wire representation exactly (no float rounding on the way back
/// out to `DD\u{b0} MM.MMMM'`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coordinate {
    pub negative: bool,
    pub degrees: u32,
    pub minutes_ten_thousandths: u32,
}

pub fn latitude(value_field: &str, hemisphere_field: &str) -> Option<Coordinate> {
    parse_lat_lon(value_field, hemisphere_field, 2)
}

pub fn longitude(value_field: &str, hemisphere_field: &str) -> Option<Coordinate> {
    parse_lat_lon(value_field, hemisphere_field, 3)
}

fn parse_lat_lon(value_field: &str, hemisphere_field: &str, degree_digits: usize) -> Option<Coordinate> {
    if value_field.len() < degree_digits + 1 {
        return None;
    }
    let degrees: u32 = value_field[..degree_digits].parse().ok()?;
    let minutes = parse_minutes_ten_thousandths(&value_field[degree_digits..])?;
    if minutes >= 600_000 {
        return None;
    }
    let negative = match hemisphere_field {
        "N" | "E" => false,
        "S" | "W" => true,
        _ => return None,
    };
    Some(Coordinate { negative, degrees, minutes_ten_thousandths: minutes })
}

/// Parses a minutes field like `"07.038"` into ten-thousandths (70380),
/// padding or truncating the fractional part as needed.
fn parse_minutes_ten_thousandths(field: &str) -> Option<u32> {
    let mut parts = field.splitn(2, '.');
    let whole_str = parts.next()?;
    if whole_str.is_empty() || !whole_str.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let whole: u32 = whole_str.parse().ok()?;
    let frac_str = parts.next().unwrap_or("");
    if !frac_str.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut digits = [0u32; 4];
    for (i, c) in frac_str.bytes().take(4).enumerate() {
        digits[i] = (c - b'0') as u32;
    }
    let frac = digits[0] * 1000 + digits[1] * 100 + digits[2] * 10 + digits[3];
    Some(whole * 10_000 + frac)
}

impl Coordinate {
    /// Formats as `DD\u{b0} MM.MMMM' H`, e.g. `"48\u{b0} 07.0380' N"`.
    pub fn format_dm(&self, positive_hemisphere: &str, negative_hemisphere: &str) -> String {
        let hemisphere = if self.negative { negative_hemisphere } else { positive_hemisphere };
        let minutes = self.minutes_ten_thousandths / 10_000;
        let minutes_frac = self.minutes_ten_thousandths % 10_000;
        format!("{}\u{b0} {minutes:02}.{minutes_frac:04}' {hemisphere}", self.degrees)
    }
}

/// East-positive, west-negative (see DESIGN.md for this decision).
pub fn magnetic_variation(value_field: &str, direction_field: &str) -> Option<Tenths> {
    let magnitude = tenths(value_field)?;
    match direction_field {
        "E" => Some(magnitude),
        "W" => Some(Tenths::from_sub_units(-magnitude.sub_units())),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedUnits {
    Knots,
    KmPerHour,
    MetersPerSecond,
}

pub fn speed_units(field: &str) -> Option<SpeedUnits> {
    match field {
        "N" => Some(SpeedUnits::Knots),
        "K" => Some(SpeedUnits::KmPerHour),
        "M" => Some(SpeedUnits::MetersPerSecond),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureUnits {
    Celsius,
    Fahrenheit,
}

pub fn temperature_units(field: &str) -> Option<TemperatureUnits> {
    match field {
        "C" => Some(TemperatureUnits::Celsius),
        "F" => Some(TemperatureUnits::Fahrenheit),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaaModeIndicator {
    Autonomous,
    Differential,
    Estimated,
    Manual,
    Simulated,
    NotValid,
    Precise,
}

pub fn faa_mode_indicator(field: &str) -> Option<FaaModeIndicator> {
    match field {
        "A" => Some(FaaModeIndicator::Autonomous),
        "D" => Some(FaaModeIndicator::Differential),
        "E" => Some(FaaModeIndicator::Estimated),
        "M" => Some(FaaModeIndicator::Manual),
        "S" => Some(FaaModeIndicator::Simulated),
        "N" => Some(FaaModeIndicator::NotValid),
        "P" => Some(FaaModeIndicator::Precise),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpsQuality {
    NoFix,
    GpsFix,
    DifferentialGpsFix,
    PpsFix,
    RealTimeKinematic,
    FloatRtk,
    Estimated,
    ManualInput,
    Simulation,
}

impl GpsQuality {
    pub fn name(&self) -> &'static str {
        match self {
            GpsQuality::NoFix => "No Fix",
            GpsQuality::GpsFix => "GPS Fix",
            GpsQuality::DifferentialGpsFix => "Differential GPS Fix",
            GpsQuality::PpsFix => "PPS Fix",
            GpsQuality::RealTimeKinematic => "Real Time Kinematic",
            GpsQuality::FloatRtk => "Float RTK",
            GpsQuality::Estimated => "Estimated",
            GpsQuality::ManualInput => "Manual Input",
            GpsQuality::Simulation => "Simulation",
        }
    }
}

pub fn gps_quality(field: &str) -> Option<GpsQuality> {
    match field {
        "0" => Some(GpsQuality::NoFix),
        "1" => Some(GpsQuality::GpsFix),
        "2" => Some(GpsQuality::DifferentialGpsFix),
        "3" => Some(GpsQuality::PpsFix),
        "4" => Some(GpsQuality::RealTimeKinematic),
        "5" => Some(GpsQuality::FloatRtk),
        "6" => Some(GpsQuality::Estimated),
        "7" => Some(GpsQuality::ManualInput),
        "8" => Some(GpsQuality::Simulation),
        _ => None,
    }
}

/// Radio channel designator used on VDM/VDO sentences: 'A' is AIS1
/// (161.975 MHz / 87B), 'B' is AIS2 (162.025 MHz / 88B).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioChannel {
    A,
    B,
}

pub fn radio_channel(field: &str) -> Option<RadioChannel> {
    match field {
        "A" | "1" => Some(RadioChannel::A),
        "B" | "2" => Some(RadioChannel::B),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_parses_and_rejects() {
        let t = time_hhmmss("123519").unwrap();
        assert_eq!(t.to_string(), "12:35:19");
        assert!(time_hhmmss("996000").is_none());
        assert!(time_hhmmss("12").is_none());
    }

    #[test]
    fn date_parses() {
        let d = date_ddmmyy("230394").unwrap();
        assert_eq!((d.day, d.month, d.year), (23, 3, 2094));
    }

    #[test]
    fn latitude_matches_end_to_end_example() {
        let lat = latitude("4807.038", "N").unwrap();
        assert_eq!(lat.format_dm("N", "S"), "48\u{b0} 07.0380' N");
    }

    #[test]
    fn longitude_parses_three_digit_degrees() {
        let lon = longitude("01131.000", "E").unwrap();
        assert_eq!(lon.format_dm("E", "W"), "11\u{b0} 31.0000' E");
    }

    #[test]
    fn magnetic_variation_sign_convention() {
        let east = magnetic_variation("5.0", "E").unwrap();
        let west = magnetic_variation("5.0", "W").unwrap();
        assert!(east.sub_units() > 0);
        assert!(west.sub_units() < 0);
    }

    #[test]
    fn gps_quality_matches_example() {
        assert_eq!(gps_quality("1").unwrap().name(), "GPS Fix");
    }
}
