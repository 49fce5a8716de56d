//! SeaTalk command-byte identifiers, grounded on `SeaTalkCommand.cpp`'s
//! name table. Byte assignments follow Thomas Knauf's public SeaTalk
//! reference (thomasknauf.de/seatalk.htm), the same source the original
//! cites.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeaTalkCommand {
    DepthBelowTransducer,
    ApparentWindAngle,
    ApparentWindSpeed,
    SpeedThroughWaterV1,
    WaterTemperatureV1,
    DisplayUnitsMileageAndSpeed,
    SpeedThroughWaterV2,
    WaterTemperatureV2,
    SetLampIntensity,
    LatitudePosition,
    LongitudePosition,
    SpeedOverGround,
    CourseOverGround,
    HoursMinutesSeconds,
    YearMonthDay,
    SatelliteInfo,
    RawLatitudeAndLongitude,
    CountDownTimer,
    UnknownCommand60,
    E80StartUp,
    AutoPilotHeadingCourseAndRudder,
    AutoPilotStatus,
    DeviceIdentification,
    MagneticVariation,
    AutoPilotHeadingAndRudder,
    GpsAndDgpsInfo,
    UnknownGpsCommandA7,
    Unknown(u8),
}

impl SeaTalkCommand {
    pub fn from_byte(byte: u8) -> Self {
        use SeaTalkCommand::*;
        match byte {
            0x00 => DepthBelowTransducer,
            0x10 => ApparentWindAngle,
            0x11 => ApparentWindSpeed,
            0x20 => SpeedThroughWaterV1,
            0x23 => WaterTemperatureV1,
            0x24 => DisplayUnitsMileageAndSpeed,
            0x26 => SpeedThroughWaterV2,
            0x27 => WaterTemperatureV2,
            0x30 => SetLampIntensity,
            0x50 => LatitudePosition,
            0x51 => LongitudePosition,
            0x52 => SpeedOverGround,
            0x53 => CourseOverGround,
            0x54 => HoursMinutesSeconds,
            0x56 => YearMonthDay,
            0x57 => SatelliteInfo,
            0x58 => RawLatitudeAndLongitude,
            0x59 => CountDownTimer,
            0x60 => UnknownCommand60,
            0x61 => E80StartUp,
            0x84 => AutoPilotHeadingCourseAndRudder,
            0x86 => AutoPilotStatus,
            0x90 => DeviceIdentification,
            0x99 => MagneticVariation,
            0x9c => AutoPilotHeadingAndRudder,
            0xa4 => GpsAndDgpsInfo,
            0xa7 => UnknownGpsCommandA7,
            other => Unknown(other),
        }
    }

    pub fn byte(self) -> u8 {
        use SeaTalkCommand::*;
        match self {
            DepthBelowTransducer => 0x00,
            ApparentWindAngle => 0x10,
            ApparentWindSpeed => 0x11,
            SpeedThroughWaterV1 => 0x20,
            WaterTemperatureV1 => 0x23,
            DisplayUnitsMileageAndSpeed => 0x24,
            SpeedThroughWaterV2 => 0x26,
            WaterTemperatureV2 => 0x27,
            SetLampIntensity => 0x30,
            LatitudePosition => 0x50,
            LongitudePosition => 0x51,
            SpeedOverGround => 0x52,
            CourseOverGround => 0x53,
            HoursMinutesSeconds => 0x54,
            YearMonthDay => 0x56,
            SatelliteInfo => 0x57,
            RawLatitudeAndLongitude => 0x58,
            CountDownTimer => 0x59,
            UnknownCommand60 => 0x60,
            E80StartUp => 0x61,
            AutoPilotHeadingCourseAndRudder => 0x84,
            AutoPilotStatus => 0x86,
            DeviceIdentification => 0x90,
            MagneticVariation => 0x99,
            AutoPilotHeadingAndRudder => 0x9c,
            GpsAndDgpsInfo => 0xa4,
            UnknownGpsCommandA7 => 0xa7,
            Unknown(byte) => byte,
        }
    }

    pub fn name(self) -> &'static str {
        use SeaTalkCommand::*;
        match self {
            DepthBelowTransducer => "Depth Below Transducer",
            ApparentWindAngle => "Apparent Wind Angle",
            ApparentWindSpeed => "Apparent Wind Speed",
            SpeedThroughWaterV1 => "Speed Through Water V1",
            WaterTemperatureV1 => "Water Temperature V1",
            DisplayUnitsMileageAndSpeed => "Display Units For Mileage & Speed",
            SpeedThroughWaterV2 => "Speed Through Water V2",
            WaterTemperatureV2 => "Water Temperature V2",
            SetLampIntensity => "Set lamp Intensity",
            LatitudePosition => "Latitude Position",
            LongitudePosition => "Longitude Position",
            SpeedOverGround => "Speed Over Ground",
            CourseOverGround => "Course Over Ground",
            HoursMinutesSeconds => "Time",
            YearMonthDay => "Date",
            SatelliteInfo => "Satellite Info",
            RawLatitudeAndLongitude => "Raw Latitude and Longitude",
            CountDownTimer => "Count Down Timer",
            UnknownCommand60 => "Unknown Command 0x60",
            E80StartUp => "E80 Start Up",
            AutoPilotHeadingCourseAndRudder => "Auto pilot heading, course and rudder",
            AutoPilotStatus => "Auto pilot status",
            DeviceIdentification => "Device identification",
            MagneticVariation => "Magnetic Variation",
            AutoPilotHeadingAndRudder => "Auto pilot heading and rudder",
            GpsAndDgpsInfo => "GPS and DGPS Info",
            UnknownGpsCommandA7 => "Unknown GPS Command A7",
            Unknown(_) => "Unknown",
        }
    }
}

impl fmt::Display for SeaTalkCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The lamp backlight intensity levels a `SET_LAMP_INTENSITY` datagram can
/// carry, grounded on `SeaTalkLampIntensity.cpp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeaTalkLampIntensity {
    L0,
    L1,
    L2,
    L3,
    Unknown(u8),
}

impl SeaTalkLampIntensity {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => SeaTalkLampIntensity::L0,
            1 => SeaTalkLampIntensity::L1,
            2 => SeaTalkLampIntensity::L2,
            3 => SeaTalkLampIntensity::L3,
            other => SeaTalkLampIntensity::Unknown(other),
        }
    }

    pub fn byte(self) -> u8 {
        match self {
            SeaTalkLampIntensity::L0 => 0,
            SeaTalkLampIntensity::L1 => 1,
            SeaTalkLampIntensity::L2 => 2,
            SeaTalkLampIntensity::L3 => 3,
            SeaTalkLampIntensity::Unknown(byte) => byte,
        }
    }

    pub fn is_valid(self) -> bool {
        !matches!(self, SeaTalkLampIntensity::Unknown(_))
    }

    /// The next intensity in the L0 -> L1 -> L2 -> L3 -> L0 cycle, used by
    /// the lamp-dimmer button handler.
    pub fn cycle(self) -> Self {
        match self {
            SeaTalkLampIntensity::L0 => SeaTalkLampIntensity::L1,
            SeaTalkLampIntensity::L1 => SeaTalkLampIntensity::L2,
            SeaTalkLampIntensity::L2 => SeaTalkLampIntensity::L3,
            SeaTalkLampIntensity::L3 | SeaTalkLampIntensity::Unknown(_) => SeaTalkLampIntensity::L0,
        }
    }
}

impl fmt::Display for SeaTalkLampIntensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", match self {
                SeaTalkLampIntensity::L0 => "L0",
                SeaTalkLampIntensity::L1 => "L1",
                SeaTalkLampIntensity::L2 => "L2",
                SeaTalkLampIntensity::L3 => "L3",
                SeaTalkLampIntensity::Unknown(_) => unreachable!(),
            })
        } else {
            write!(f, "Unknown (0x{:02x})", self.byte())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_known_command_bytes() {
        for &byte in &[0x00u8, 0x10, 0x11, 0x20, 0x23, 0x30, 0x50, 0x51, 0x84, 0x9c, 0xa4] {
            assert_eq!(SeaTalkCommand::from_byte(byte).byte(), byte);
        }
    }

    #[test]
    fn unrecognized_byte_is_unknown() {
        assert_eq!(SeaTalkCommand::from_byte(0xff), SeaTalkCommand::Unknown(0xff));
    }

    #[test]
    fn lamp_intensity_cycles_and_wraps() {
        let mut intensity = SeaTalkLampIntensity::L0;
        for expected in [SeaTalkLampIntensity::L1, SeaTalkLampIntensity::L2, SeaTalkLampIntensity::L3, SeaTalkLampIntensity::L0] {
            intensity = intensity.cycle();
            assert_eq!(intensity, expected);
        }
    }

    #[test]
    fn invalid_lamp_intensity_is_reported() {
        let intensity = SeaTalkLampIntensity::from_byte(7);
        assert!(!intensity.is_valid());
    }
}
