//! SeaTalk datagram decoding, grounded on `SeaTalkParser.cpp`.
//! Each handler validates the datagram's length and attribute nibble
//! before decoding fields, counting `commandLengthErrors`/
//! `commandFormatErrors` on mismatch exactly as the original does.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use crate::datamodel::leaf::{LeafExt, LeafHandle};
use crate::datamodel::node::Node;
use crate::fixed_point::{Hundredths, Tenths};
use crate::stats::StatsHolder;

use super::command::{SeaTalkCommand, SeaTalkLampIntensity};
use super::datagram::SeaTalkDatagram;

const MAX_KNOWN_DEVICES: usize = 16;

/// Observes decoded fields as they're parsed, alongside the data model
/// leaves every field is also published to. [`crate::bridge::seatalk::SeaTalkNmeaBridge`]
/// is the only implementation: the original wires its NMEA-sentence
/// synthesis straight off `SeaTalkParser`'s decode methods rather than
/// through the data model, and a late-bound observer keeps that
/// direct-callback shape without forcing every parser construction site
/// to supply one.
#[async_trait]
pub trait SeaTalkObserver: Send + Sync {
    async fn depth_feet(&self, feet: Tenths);
    async fn heading_magnetic(&self, degrees: u16);
    async fn apparent_wind_angle(&self, angle: Tenths);
    async fn apparent_wind_speed_knots(&self, speed: Tenths);
    async fn rudder_angle(&self, degrees: i16);
}

struct WaterLeaves {
    depth_below_transducer_meters: LeafHandle,
    depth_below_transducer_feet: LeafHandle,
    anchor_depth_alarm: LeafHandle,
    shallow_depth_alarm: LeafHandle,
    deep_depth_alarm: LeafHandle,
    depth_transducer_defective: LeafHandle,
    water_speed_knots: LeafHandle,
    water_temperature_celsius: LeafHandle,
    water_temperature_fahrenheit: LeafHandle,
    water_temperature_sensor_defective: LeafHandle,
    water_speed_mph: LeafHandle,
    water_average_speed_knots: LeafHandle,
    water_average_speed_mph: LeafHandle,
    water_average_speed_stopped: LeafHandle,
    water_speed_second_sensor_knots: LeafHandle,
    water_speed_second_sensor_mph: LeafHandle,
}

struct WindLeaves {
    apparent_wind_angle: LeafHandle,
    apparent_wind_speed_knots: LeafHandle,
    apparent_wind_speed_mps: LeafHandle,
}

struct GpsLeaves {
    latitude: LeafHandle,
    longitude: LeafHandle,
    speed_over_ground: LeafHandle,
    track_made_good_magnetic: LeafHandle,
    time: LeafHandle,
    date: LeafHandle,
    number_satellites: LeafHandle,
    horizontal_dilution_of_precision: LeafHandle,
    magnetic_variation: LeafHandle,
    gps_quality: LeafHandle,
    altitude: LeafHandle,
    geoidal_separation: LeafHandle,
    data_age: LeafHandle,
    differential_reference_station: LeafHandle,
    active_satellites: LeafHandle,
}

struct AutoPilotLeaves {
    status: LeafHandle,
    heading_sensor: LeafHandle,
    course: LeafHandle,
    mode: LeafHandle,
    off_course_alarm: LeafHandle,
    wind_shift_alarm: LeafHandle,
    rudder_center: LeafHandle,
}

/// Decodes SeaTalk datagrams into the data model, grounded on
/// `SeaTalkParser`. Construction wires up one leaf per field the original
/// exports; fields the original decodes only for debug logging (raw
/// lat/long) are not given leaves, matching its "do not export... could be
/// used in a misleading way" comment.
pub struct SeaTalkParser {
    water: WaterLeaves,
    wind: WindLeaves,
    gps: GpsLeaves,
    autopilot: AutoPilotLeaves,

    known_devices: AsyncMutex<Vec<u8>>,
    known_devices_leaf: LeafHandle,
    ignored_commands: AsyncMutex<u32>,
    ignored_commands_leaf: LeafHandle,
    unknown_commands: AsyncMutex<u32>,
    unknown_commands_leaf: LeafHandle,
    command_length_errors: AsyncMutex<u32>,
    command_length_errors_leaf: LeafHandle,
    command_format_errors: AsyncMutex<u32>,
    command_format_errors_leaf: LeafHandle,

    observer: AsyncMutex<Option<Arc<dyn SeaTalkObserver>>>,
}

impl SeaTalkParser {
    pub async fn new(input_node: &Arc<Node>) -> Arc<Self> {
        let water_node = input_node.add_node("water").await;
        let wind_node = input_node.add_node("wind").await;
        let gps_node = input_node.add_node("gps").await;
        let autopilot_node = input_node.add_node("autopilot").await;

        let parser = SeaTalkParser {
            water: WaterLeaves {
                depth_below_transducer_meters: water_node.add_tenths_leaf("depthBelowTransducerMeters").await,
                depth_below_transducer_feet: water_node.add_tenths_leaf("depthBelowTransducerFeet").await,
                anchor_depth_alarm: water_node.add_bool_leaf("anchorDepthAlarm").await,
                shallow_depth_alarm: water_node.add_bool_leaf("shallowDepthAlarm").await,
                deep_depth_alarm: water_node.add_bool_leaf("deepDepthAlarm").await,
                depth_transducer_defective: water_node.add_bool_leaf("depthTransducerDefective").await,
                water_speed_knots: water_node.add_tenths_leaf("waterSpeedKnots").await,
                water_temperature_celsius: water_node.add_tenths_leaf("waterTemperatureCelsius").await,
                water_temperature_fahrenheit: water_node.add_tenths_leaf("waterTemperatureFahrenheit").await,
                water_temperature_sensor_defective: water_node.add_bool_leaf("waterTemperatureSensorDefective").await,
                water_speed_mph: water_node.add_hundredths_leaf("waterSpeedMPH").await,
                water_average_speed_knots: water_node.add_hundredths_leaf("waterAverageSpeedKnots").await,
                water_average_speed_mph: water_node.add_hundredths_leaf("waterAverageSpeedMPH").await,
                water_average_speed_stopped: water_node.add_bool_leaf("waterAverageSpeedStopped").await,
                water_speed_second_sensor_knots: water_node.add_hundredths_leaf("waterSpeedSecondSensorKnots").await,
                water_speed_second_sensor_mph: water_node.add_hundredths_leaf("waterSpeedSecondSensorMPH").await,
            },
            wind: WindLeaves {
                apparent_wind_angle: wind_node.add_tenths_leaf("apparentWindAngle").await,
                apparent_wind_speed_knots: wind_node.add_tenths_leaf("apparentWindSpeedKnots").await,
                apparent_wind_speed_mps: wind_node.add_tenths_leaf("apparentWindSpeedMPS").await,
            },
            gps: GpsLeaves {
                latitude: gps_node.add_string_leaf("latitude", 16).await,
                longitude: gps_node.add_string_leaf("longitude", 16).await,
                speed_over_ground: gps_node.add_tenths_leaf("speedOverGround").await,
                track_made_good_magnetic: gps_node.add_tenths_leaf("trackMadeGoodMagnetic").await,
                time: gps_node.add_string_leaf("time", 8).await,
                date: gps_node.add_string_leaf("date", 10).await,
                number_satellites: gps_node.add_u8_leaf("numberSatellites").await,
                horizontal_dilution_of_precision: gps_node.add_u8_leaf("horizontalDilutionOfPrecision").await,
                magnetic_variation: gps_node.add_i16_leaf("magneticVariation").await,
                gps_quality: gps_node.add_string_leaf("gpsQuality", 24).await,
                altitude: gps_node.add_i16_leaf("altitude").await,
                geoidal_separation: gps_node.add_i16_leaf("geoidalSeparation").await,
                data_age: gps_node.add_u16_leaf("dataAge").await,
                differential_reference_station: gps_node.add_u16_leaf("differentialReferenceStation").await,
                active_satellites: gps_node.add_string_leaf("activeSatellites", 24).await,
            },
            autopilot: AutoPilotLeaves {
                status: autopilot_node.add_string_leaf("status", 24).await,
                heading_sensor: autopilot_node.add_u16_leaf("headingSensor").await,
                course: autopilot_node.add_tenths_leaf("course").await,
                mode: autopilot_node.add_string_leaf("mode", 8).await,
                off_course_alarm: autopilot_node.add_bool_leaf("offCourseAlarm").await,
                wind_shift_alarm: autopilot_node.add_bool_leaf("windShiftAlarm").await,
                rudder_center: autopilot_node.add_i16_leaf("rudderCenter").await,
            },
            known_devices: AsyncMutex::new(Vec::new()),
            known_devices_leaf: input_node.add_string_leaf("knownDevices", MAX_KNOWN_DEVICES * 3 + 1).await,
            ignored_commands: AsyncMutex::new(0),
            ignored_commands_leaf: input_node.add_u32_leaf("ignoredCommands").await,
            unknown_commands: AsyncMutex::new(0),
            unknown_commands_leaf: input_node.add_u32_leaf("unknownCommands").await,
            command_length_errors: AsyncMutex::new(0),
            command_length_errors_leaf: input_node.add_u32_leaf("lengthErrors").await,
            command_format_errors: AsyncMutex::new(0),
            command_format_errors_leaf: input_node.add_u32_leaf("formatErrors").await,

            observer: AsyncMutex::new(None),
        };
        Arc::new(parser)
    }

    /// Registers a bridge to receive decoded depth, heading, wind and
    /// rudder values as they're parsed. Replaces any prior observer.
    pub async fn set_observer(&self, observer: Arc<dyn SeaTalkObserver>) {
        *self.observer.lock().await = Some(observer);
    }

    async fn notify_observer<F, Fut>(&self, f: F)
    where
        F: FnOnce(Arc<dyn SeaTalkObserver>) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let observer = self.observer.lock().await.clone();
        if let Some(observer) = observer {
            f(observer).await;
        }
    }

    pub async fn parse_line(&self, datagram: &SeaTalkDatagram) {
        if datagram.is_empty() {
            log::warn!("ignoring 0 length SeaTalk message");
            return;
        }

        use SeaTalkCommand::*;
        let command = datagram.command();
        match command {
            DepthBelowTransducer => self.parse_depth_below_transducer(datagram).await,
            ApparentWindAngle => self.parse_apparent_wind_angle(datagram).await,
            ApparentWindSpeed => self.parse_apparent_wind_speed(datagram).await,
            SpeedThroughWaterV1 => self.parse_speed_through_water_v1(datagram).await,
            WaterTemperatureV1 => self.parse_water_temperature_v1(datagram).await,
            SpeedThroughWaterV2 => self.parse_speed_through_water_v2(datagram).await,
            WaterTemperatureV2 => self.parse_water_temperature_v2(datagram).await,
            SetLampIntensity => self.parse_set_lamp_intensity(datagram).await,
            LatitudePosition => self.parse_latitude_position(datagram).await,
            LongitudePosition => self.parse_longitude_position(datagram).await,
            SpeedOverGround => self.parse_speed_over_ground(datagram).await,
            CourseOverGround => self.parse_course_over_ground(datagram).await,
            HoursMinutesSeconds => self.parse_time(datagram).await,
            YearMonthDay => self.parse_date(datagram).await,
            SatelliteInfo => self.parse_satellite_info(datagram).await,
            RawLatitudeAndLongitude => self.parse_raw_latitude_and_longitude(datagram).await,
            AutoPilotStatus => self.parse_autopilot_status(datagram).await,
            AutoPilotHeadingCourseAndRudder => self.parse_autopilot_heading_course_and_rudder(datagram).await,
            DeviceIdentification => self.parse_device_identification(datagram).await,
            MagneticVariation => self.parse_magnetic_variation(datagram).await,
            AutoPilotHeadingAndRudder => self.parse_autopilot_heading_and_rudder(datagram).await,
            GpsAndDgpsInfo => self.parse_gps_and_dgps_info(datagram).await,
            DisplayUnitsMileageAndSpeed | CountDownTimer | UnknownCommand60 | E80StartUp | UnknownGpsCommandA7 => {
                self.ignored_command(command).await;
            }
            Unknown(_) => self.unknown_command(command, datagram).await,
        }
    }

    async fn check_length(&self, expected: usize, datagram: &SeaTalkDatagram) -> bool {
        if datagram.len() != expected {
            log::warn!("{} message with an unexpected length ({})", datagram.command(), datagram.len());
            *self.command_length_errors.lock().await += 1;
            false
        } else {
            true
        }
    }

    async fn check_attribute(&self, datagram: &SeaTalkDatagram, expected: u8, mask: u8) -> bool {
        if datagram.attribute() & mask != expected {
            log::warn!("unsupported {} attribute 0x{:02x}", datagram.command(), datagram.attribute());
            *self.command_format_errors.lock().await += 1;
            false
        } else {
            true
        }
    }

    async fn ignored_command(&self, command: SeaTalkCommand) {
        log::debug!("ignoring {command} message");
        *self.ignored_commands.lock().await += 1;
    }

    async fn unknown_command(&self, command: SeaTalkCommand, datagram: &SeaTalkDatagram) {
        log::warn!("ignoring {} byte unknown SeaTalk message (type 0x{:02x})", datagram.len(), command.byte());
        *self.unknown_commands.lock().await += 1;
    }

    async fn parse_depth_below_transducer(&self, datagram: &SeaTalkDatagram) {
        if !self.check_length(5, datagram).await || !self.check_attribute(datagram, 0x02, 0xff).await {
            return;
        }

        let byte2 = datagram[2];
        let byte3 = datagram[3];
        let anchor_alarm = byte2 & 0x80 != 0;
        let depth_is_meters = byte2 & 0x40 != 0;
        let transducer_defective = byte2 & 0x04 != 0;
        let deep_alarm = byte2 & 0x02 != 0;
        let shallow_alarm = byte2 & 0x01 != 0;
        let depth = Tenths::from_sub_units(((datagram[4] as i64) << 8) | byte3 as i64);

        if depth_is_meters {
            self.water.depth_below_transducer_meters.set_tenths(depth).await;
        } else {
            self.water.depth_below_transducer_feet.set_tenths(depth).await;
            self.notify_observer(|o| async move { o.depth_feet(depth).await }).await;
        }
        self.water.anchor_depth_alarm.set_bool(anchor_alarm).await;
        self.water.shallow_depth_alarm.set_bool(shallow_alarm).await;
        self.water.deep_depth_alarm.set_bool(deep_alarm).await;
        self.water.depth_transducer_defective.set_bool(transducer_defective).await;
    }

    async fn parse_apparent_wind_angle(&self, datagram: &SeaTalkDatagram) {
        if !self.check_length(4, datagram).await || !self.check_attribute(datagram, 0x01, 0xff).await {
            return;
        }

        let angle_x2 = ((datagram[2] as i64) << 8) | datagram[3] as i64;
        let angle = Tenths::from_sub_units(angle_x2 * 5);
        self.wind.apparent_wind_angle.set_tenths(angle).await;
        self.notify_observer(|o| async move { o.apparent_wind_angle(angle).await }).await;
    }

    async fn parse_apparent_wind_speed(&self, datagram: &SeaTalkDatagram) {
        if !self.check_length(4, datagram).await || !self.check_attribute(datagram, 0x01, 0xff).await {
            return;
        }

        let byte2 = datagram[2];
        let byte3 = datagram[3];
        if byte3 > 9 {
            log::warn!("bad Apparent Wind Speed message byte 3 value (0x{byte3:02x})");
            *self.command_format_errors.lock().await += 1;
            return;
        }

        let speed_is_mps = byte2 & 0x80 != 0;
        let speed = Tenths::new((byte2 & 0x7f) as i64, byte3 as i64);
        if speed_is_mps {
            self.wind.apparent_wind_speed_mps.set_tenths(speed).await;
        } else {
            self.wind.apparent_wind_speed_knots.set_tenths(speed).await;
            self.notify_observer(|o| async move { o.apparent_wind_speed_knots(speed).await }).await;
        }
    }

    async fn parse_speed_through_water_v1(&self, datagram: &SeaTalkDatagram) {
        if !self.check_length(4, datagram).await || !self.check_attribute(datagram, 0x01, 0xff).await {
            return;
        }

        let speed_tenths = ((datagram[3] as i64) << 8) | datagram[2] as i64;
        self.water.water_speed_knots.set_tenths(Tenths::from_sub_units(speed_tenths)).await;
    }

    async fn parse_water_temperature_v1(&self, datagram: &SeaTalkDatagram) {
        if !self.check_length(4, datagram).await || !self.check_attribute(datagram, 0x01, 0x0f).await {
            return;
        }

        let sensor_defective = datagram.attribute() & 0x40 != 0;
        let celsius = datagram[2];
        let fahrenheit = datagram[3];

        self.water.water_temperature_celsius.set_tenths(Tenths::new(celsius as i64, 0)).await;
        self.water.water_temperature_fahrenheit.set_tenths(Tenths::new(fahrenheit as i64, 0)).await;
        self.water.water_temperature_sensor_defective.set_bool(sensor_defective).await;
    }

    async fn parse_speed_through_water_v2(&self, datagram: &SeaTalkDatagram) {
        if !self.check_length(7, datagram).await || !self.check_attribute(datagram, 0x04, 0xff).await {
            return;
        }

        let flags = datagram[6];
        let first_sensor_speed = Hundredths::from_sub_units(((datagram[3] as i64) << 8) | datagram[2] as i64);
        let has_average_speed = flags & 0x80 == 0x00;
        let average_or_second_speed = Hundredths::from_sub_units(((datagram[5] as i64) << 8) | datagram[4] as i64);
        let average_stopped = flags & 0x01 == 0x01;
        let miles_per_hour = flags & 0x02 == 0x02;

        if miles_per_hour {
            self.water.water_speed_mph.set_hundredths(first_sensor_speed).await;
            if has_average_speed {
                self.water.water_average_speed_mph.set_hundredths(average_or_second_speed).await;
                self.water.water_average_speed_stopped.set_bool(average_stopped).await;
            } else {
                self.water.water_speed_second_sensor_mph.set_hundredths(average_or_second_speed).await;
            }
        } else {
            self.water.water_speed_knots.set_hundredths(first_sensor_speed).await;
            if has_average_speed {
                self.water.water_average_speed_knots.set_hundredths(average_or_second_speed).await;
                self.water.water_average_speed_stopped.set_bool(average_stopped).await;
            } else {
                self.water.water_speed_second_sensor_knots.set_hundredths(average_or_second_speed).await;
            }
        }
    }

    async fn parse_water_temperature_v2(&self, datagram: &SeaTalkDatagram) {
        if !self.check_length(4, datagram).await || !self.check_attribute(datagram, 0x01, 0xff).await {
            return;
        }

        let celsius_x10_plus_100 = ((datagram[3] as i64) << 8) | datagram[2] as i64;
        let celsius_x10 = celsius_x10_plus_100 - 100;
        self.water.water_temperature_celsius.set_tenths(Tenths::from_sub_units(celsius_x10)).await;
    }

    async fn parse_set_lamp_intensity(&self, datagram: &SeaTalkDatagram) {
        if !self.check_length(3, datagram).await || !self.check_attribute(datagram, 0x00, 0xff).await {
            return;
        }

        let byte2 = datagram[2];
        if byte2 & 0xf0 != 0 {
            log::warn!("bad Lamp Intensity message byte 2 value (0x{byte2:02x})");
            *self.command_format_errors.lock().await += 1;
            return;
        }

        let intensity = SeaTalkLampIntensity::from_byte(byte2);
        log::debug!("lamp intensity {intensity}");
    }

    fn format_coordinate(degrees: u8, minutes_x100: u16, suffix: char) -> String {
        format!("{degrees}\u{b0} {:02}.{:02}' {suffix}", minutes_x100 / 100, minutes_x100 % 100)
    }

    async fn parse_latitude_position(&self, datagram: &SeaTalkDatagram) {
        if !self.check_length(5, datagram).await || !self.check_attribute(datagram, 0x02, 0x0f).await {
            return;
        }

        let degrees = datagram[2];
        let minutes_x100 = ((datagram[4] & 0x7f) as u16) << 8 | datagram[3] as u16;
        let suffix = if datagram[4] & 0x80 == 0 { 'N' } else { 'S' };
        self.gps.latitude.set_string(Self::format_coordinate(degrees, minutes_x100, suffix)).await;
    }

    async fn parse_longitude_position(&self, datagram: &SeaTalkDatagram) {
        if !self.check_length(5, datagram).await || !self.check_attribute(datagram, 0x02, 0x0f).await {
            return;
        }

        let degrees = datagram[2];
        let minutes_x100 = ((datagram[4] & 0x7f) as u16) << 8 | datagram[3] as u16;
        let suffix = if datagram[4] & 0x80 == 0 { 'W' } else { 'E' };
        self.gps.longitude.set_string(Self::format_coordinate(degrees, minutes_x100, suffix)).await;
    }

    async fn parse_speed_over_ground(&self, datagram: &SeaTalkDatagram) {
        if !self.check_length(4, datagram).await || !self.check_attribute(datagram, 0x01, 0xff).await {
            return;
        }

        let speed_x10 = ((datagram[3] as i64) << 8) | datagram[2] as i64;
        self.gps.speed_over_ground.set_tenths(Tenths::from_sub_units(speed_x10)).await;
    }

    async fn parse_course_over_ground(&self, datagram: &SeaTalkDatagram) {
        if !self.check_length(3, datagram).await || !self.check_attribute(datagram, 0x00, 0x0f).await {
            return;
        }

        let attribute_bits = datagram[1] & 0xf0;
        let course_x2 = ((attribute_bits & 0x30) >> 4) as i64 * 90 * 2
            + (((datagram[2] & 0x3f) << 1) as i64) * 2
            + ((attribute_bits & 0xc0) >> 6) as i64;
        self.gps.track_made_good_magnetic.set_tenths(Tenths::from_sub_units(course_x2 * 5)).await;
    }

    async fn parse_time(&self, datagram: &SeaTalkDatagram) {
        if !self.check_length(4, datagram).await || !self.check_attribute(datagram, 0x01, 0x0f).await {
            return;
        }

        let seconds = ((datagram[2] & 0x03) << 4) | ((datagram[1] & 0xf0) >> 4);
        let minutes = (datagram[2] & 0xfc) >> 2;
        let hours = datagram[3];
        self.gps.time.set_string(format!("{hours:02}:{minutes:02}:{seconds:02}")).await;
    }

    async fn parse_date(&self, datagram: &SeaTalkDatagram) {
        if !self.check_length(4, datagram).await || !self.check_attribute(datagram, 0x01, 0x0f).await {
            return;
        }

        let month = (datagram[1] & 0xf0) >> 4;
        let day = datagram[2];
        let year = datagram[3] as u16 + 2000;
        self.gps.date.set_string(format!("{month:02}/{day:02}/{year:04}")).await;
    }

    async fn parse_satellite_info(&self, datagram: &SeaTalkDatagram) {
        if !self.check_length(3, datagram).await || !self.check_attribute(datagram, 0x00, 0x0f).await {
            return;
        }

        let number_satellites = (datagram[1] & 0xf0) >> 4;
        let hdop = datagram[2];
        self.gps.number_satellites.set_u8(number_satellites).await;
        self.gps.horizontal_dilution_of_precision.set_u8(hdop).await;
    }

    /// Decoded for debugging purposes only; not exported to the data model
    /// since the raw fix could be misleadingly precise (matches the
    /// original's explicit choice not to export it).
    async fn parse_raw_latitude_and_longitude(&self, datagram: &SeaTalkDatagram) {
        if !self.check_length(8, datagram).await || !self.check_attribute(datagram, 0x05, 0x0f).await {
            return;
        }

        let latitude_degrees = datagram[2];
        let latitude_minutes_x1000 = (datagram[3] as u16) << 8 | datagram[4] as u16;
        let longitude_degrees = datagram[5];
        let longitude_minutes_x1000 = (datagram[6] as u16) << 8 | datagram[7] as u16;
        let is_south = datagram[1] & 0x10 != 0;
        let is_east = datagram[1] & 0x20 != 0;

        log::debug!(
            "raw position {latitude_degrees}\u{b0} {:.3}' {} {longitude_degrees}\u{b0} {:.3}' {}",
            latitude_minutes_x1000 as f64 / 1000.0,
            if is_south { 'S' } else { 'N' },
            longitude_minutes_x1000 as f64 / 1000.0,
            if is_east { 'E' } else { 'W' },
        );
    }

    fn mode_bits_to_name(mode_bits: u8) -> &'static str {
        match mode_bits {
            0x0 => "Standby",
            0x2 => "Auto",
            0x6 => "Wind",
            0xa => "Track",
            _ => "Unknown",
        }
    }

    async fn parse_autopilot_status(&self, datagram: &SeaTalkDatagram) {
        if !self.check_length(10, datagram).await || !self.check_attribute(datagram, 0x07, 0xff).await {
            return;
        }

        let status = match datagram[2] {
            0x00 => "Okay".to_string(),
            0x01 => "Auto Release Error".to_string(),
            0x08 => "Drive Stopped".to_string(),
            other => format!("Unknown Error (0x{other:02x})"),
        };
        self.autopilot.status.set_string(status).await;
    }

    async fn parse_autopilot_heading_course_and_rudder(&self, datagram: &SeaTalkDatagram) {
        if !self.check_length(9, datagram).await || !self.check_attribute(datagram, 0x06, 0x0f).await {
            return;
        }

        let attribute_byte = datagram[1];
        let upper_bits = attribute_byte & 0xc0;
        let upper_bits_set: u16 = if upper_bits != 0 { if upper_bits == 0xc0 { 2 } else { 1 } } else { 0 };
        let heading = ((attribute_byte & 0x30) >> 4) as u16 * 90 + (datagram[2] & 0x3f) as u16 * 2 + upper_bits_set;
        let course_x2 = ((datagram[2] & 0xc0) >> 6) as i64 * 90 * 2 + datagram[3] as i64;
        let mode = Self::mode_bits_to_name(datagram[4] & 0x0f);
        let alarms = datagram[5] & 0x0f;
        let off_course_alarm = alarms & 0x4 != 0;
        let wind_shift_alarm = alarms & 0x8 != 0;
        let rudder_position = datagram[6] as i8;

        self.autopilot.heading_sensor.set_u16(heading).await;
        self.autopilot.course.set_tenths(Tenths::from_sub_units(course_x2 * 5)).await;
        self.autopilot.mode.set_string(mode.to_string()).await;
        self.autopilot.off_course_alarm.set_bool(off_course_alarm).await;
        self.autopilot.wind_shift_alarm.set_bool(wind_shift_alarm).await;
        self.autopilot.rudder_center.set_i16(rudder_position as i16).await;
        self.notify_observer(|o| async move {
            o.heading_magnetic(heading).await;
            o.rudder_angle(rudder_position as i16).await;
        })
        .await;
    }

    async fn parse_device_identification(&self, datagram: &SeaTalkDatagram) {
        if !self.check_length(3, datagram).await || !self.check_attribute(datagram, 0x00, 0xff).await {
            return;
        }

        let device_id = datagram[2];
        let mut known = self.known_devices.lock().await;
        if !known.contains(&device_id) && known.len() < MAX_KNOWN_DEVICES {
            known.push(device_id);
            let joined = known.iter().map(|d| format!("{d:02x}")).collect::<Vec<_>>().join(",");
            drop(known);
            self.known_devices_leaf.set_string(joined).await;
        }
    }

    async fn parse_magnetic_variation(&self, datagram: &SeaTalkDatagram) {
        if !self.check_length(3, datagram).await || !self.check_attribute(datagram, 0x00, 0xff).await {
            return;
        }

        let variation = datagram[2] as i8;
        self.gps.magnetic_variation.set_i16(variation as i16).await;
    }

    async fn parse_autopilot_heading_and_rudder(&self, datagram: &SeaTalkDatagram) {
        if !self.check_length(4, datagram).await || !self.check_attribute(datagram, 0x01, 0x0f).await {
            return;
        }

        let attribute_byte = datagram[1];
        let upper_bits = attribute_byte & 0xc0;
        let upper_bits_set: u16 = if upper_bits != 0 { if upper_bits == 0xc0 { 2 } else { 1 } } else { 0 };
        let heading = ((attribute_byte & 0x30) >> 4) as u16 * 90 + (datagram[2] & 0x3f) as u16 * 2 + upper_bits_set;
        let rudder_position = datagram[3] as i8;

        self.autopilot.heading_sensor.set_u16(heading).await;
        self.autopilot.rudder_center.set_i16(rudder_position as i16).await;
        self.notify_observer(|o| async move {
            o.heading_magnetic(heading).await;
            o.rudder_angle(rudder_position as i16).await;
        })
        .await;
    }

    async fn parse_gps_and_dgps_info(&self, datagram: &SeaTalkDatagram) {
        match datagram.attribute() {
            0x57 => self.parse_gps_and_dgps_fix_info(datagram).await,
            0x74 => self.parse_active_satellites(datagram).await,
            other => log::debug!("ignoring GPS and DGPS subcommand 0x{other:02x}"),
        }
    }

    fn signal_quality_description(code: u8, available: bool) -> &'static str {
        if !available {
            return "Not Available";
        }
        match code {
            0 => "Fix Not Available",
            1 => "GPS Fix",
            2 => "Differential GPS Fix",
            3 => "PPS Fix",
            4 => "Real Time Kinematic",
            5 => "Float RTK",
            6 => "Estimated",
            7 => "Manual Input Mode",
            8 => "Simulated Mode",
            _ => "Unknown",
        }
    }

    async fn parse_gps_and_dgps_fix_info(&self, datagram: &SeaTalkDatagram) {
        let signal_quality_code = datagram[2] & 0x0f;
        let signal_quality_available = datagram[2] & 0x10 == 0x10;
        let hdop = datagram[3] & 0x7c;
        let hdop_available = datagram[3] & 0x80 == 0x80;
        let antenna_height = datagram[5] as i8;
        let number_satellites = ((datagram[2] & 0xe0) >> 4) | (datagram[3] & 0x01);
        let number_satellites_available = datagram[3] & 0x02 == 0x02;
        let geo_separation = datagram[6] as i16 * 16;
        let differential_age = ((datagram[7] & 0xe0) >> 2) as u16 | (datagram[8] & 0x0f) as u16;
        let differential_age_available = datagram[8] & 0x10 == 0x10;
        let differential_station_id = (((datagram[8] & 0xc0) as u16) << 2) | datagram[9] as u16;
        let differential_station_id_available = datagram[8] & 0x20 == 0x20;

        self.gps.gps_quality.set_string(Self::signal_quality_description(signal_quality_code, signal_quality_available).to_string()).await;
        if hdop_available {
            self.gps.horizontal_dilution_of_precision.set_u8(hdop).await;
        } else {
            self.gps.horizontal_dilution_of_precision.clear().await;
        }
        self.gps.altitude.set_i16(antenna_height as i16).await;
        if number_satellites_available {
            self.gps.number_satellites.set_u8(number_satellites).await;
        } else {
            self.gps.number_satellites.clear().await;
        }
        self.gps.geoidal_separation.set_i16(geo_separation).await;
        if differential_age_available {
            self.gps.data_age.set_u16(differential_age).await;
        } else {
            self.gps.data_age.clear().await;
        }
        if differential_station_id_available {
            self.gps.differential_reference_station.set_u16(differential_station_id).await;
        } else {
            self.gps.differential_reference_station.clear().await;
        }
    }

    async fn parse_active_satellites(&self, datagram: &SeaTalkDatagram) {
        let ids: Vec<String> = (2..=6).filter(|&pos| datagram[pos] != 0).map(|pos| datagram[pos].to_string()).collect();
        self.gps.active_satellites.set_string(ids.join(",")).await;
    }
}

#[async_trait]
impl StatsHolder for SeaTalkParser {
    async fn export_stats(&self, _ms_elapsed: u32) {
        self.ignored_commands_leaf.set_u32(*self.ignored_commands.lock().await).await;
        self.unknown_commands_leaf.set_u32(*self.unknown_commands.lock().await).await;
        self.command_length_errors_leaf.set_u32(*self.command_length_errors.lock().await).await;
        self.command_format_errors_leaf.set_u32(*self.command_format_errors.lock().await).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datamodel::leaf::LeafValue;

    fn datagram(bytes: &[u8]) -> SeaTalkDatagram {
        let mut d = SeaTalkDatagram::new();
        for &b in bytes {
            d.append(b);
        }
        d
    }

    #[tokio::test]
    async fn depth_below_transducer_decodes_meters_and_alarms() {
        let root = Node::new_root();
        let input_node = root.add_node("input").await;
        let parser = SeaTalkParser::new(&input_node).await;

        // command 0x00, attribute 0x02 (len 5), byte2 = 0x43 (meters + deep alarm), depth 100 (10.0m)
        parser.parse_line(&datagram(&[0x00, 0x02, 0x43, 0x64, 0x00])).await;

        assert_eq!(parser.water.depth_below_transducer_meters.value().await, Some(LeafValue::TenthsI16(Tenths::from_sub_units(100))));
        assert!(parser.water.deep_depth_alarm.get_u32().await.is_none()); // bool leaf, not u32
        assert_eq!(parser.water.deep_depth_alarm.value().await, Some(LeafValue::Bool(true)));
    }

    #[tokio::test]
    async fn wrong_length_counts_a_length_error_and_does_not_decode() {
        let root = Node::new_root();
        let input_node = root.add_node("input").await;
        let parser = SeaTalkParser::new(&input_node).await;

        parser.parse_line(&datagram(&[0x00, 0x02, 0x00])).await;

        assert_eq!(*parser.command_length_errors.lock().await, 1);
        assert!(!parser.water.depth_below_transducer_meters.has_value().await);
    }

    #[tokio::test]
    async fn unsupported_attribute_counts_a_format_error() {
        let root = Node::new_root();
        let input_node = root.add_node("input").await;
        let parser = SeaTalkParser::new(&input_node).await;

        // attribute nibble 0x05 instead of the expected 0x02.
        parser.parse_line(&datagram(&[0x00, 0x05, 0x00, 0x00, 0x00])).await;

        assert_eq!(*parser.command_format_errors.lock().await, 1);
    }

    #[tokio::test]
    async fn ignored_command_is_counted_not_logged_as_unknown() {
        let root = Node::new_root();
        let input_node = root.add_node("input").await;
        let parser = SeaTalkParser::new(&input_node).await;

        parser.parse_line(&datagram(&[0x24, 0x00, 0x00])).await;

        assert_eq!(*parser.ignored_commands.lock().await, 1);
        assert_eq!(*parser.unknown_commands.lock().await, 0);
    }

    #[tokio::test]
    async fn unrecognized_command_byte_is_counted_as_unknown() {
        let root = Node::new_root();
        let input_node = root.add_node("input").await;
        let parser = SeaTalkParser::new(&input_node).await;

        parser.parse_line(&datagram(&[0xfe, 0x00, 0x00])).await;

        assert_eq!(*parser.unknown_commands.lock().await, 1);
    }

    #[tokio::test]
    async fn latitude_position_formats_degrees_minutes_hemisphere() {
        let root = Node::new_root();
        let input_node = root.add_node("input").await;
        let parser = SeaTalkParser::new(&input_node).await;

        // degrees=48, minutesX100 = 0x0713 = 1811 -> 18.11', north (bit7 of byte4 clear)
        parser.parse_line(&datagram(&[0x50, 0x02, 48, 0x13, 0x07])).await;

        assert_eq!(parser.gps.latitude.get_string().await, Some("48\u{b0} 18.11' N".to_string()));
    }

    #[tokio::test]
    async fn device_identification_accumulates_known_devices_once_each() {
        let root = Node::new_root();
        let input_node = root.add_node("input").await;
        let parser = SeaTalkParser::new(&input_node).await;

        parser.parse_line(&datagram(&[0x90, 0x00, 0x05])).await;
        parser.parse_line(&datagram(&[0x90, 0x00, 0x05])).await;
        parser.parse_line(&datagram(&[0x90, 0x00, 0x0a])).await;

        assert_eq!(parser.known_devices_leaf.get_string().await, Some("05,0a".to_string()));
    }
}
