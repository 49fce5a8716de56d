//! Typed NMEA 0183 sentence bodies for the supported message types,
//! grounded on the per-message `NMEA*Message.cpp` files
//! (`NMEAGGAMessage.cpp`, `NMEARMCMessage.cpp`, `NMEAMWVMessage.cpp`,
//! ...). Each message owns just the fields the data model cares about;
//! fields that fail to parse come back `None` rather than failing the
//! whole sentence.

use crate::fixed_point::Tenths;
use crate::nmea0183::fields::*;

fn field<'a>(fields: &[&'a str], index: usize) -> &'a str {
    fields.get(index).copied().unwrap_or("")
}

/// Depth below transducer/surface/keel, from DBT/DBK/DBS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DepthMessage {
    pub feet: Option<Tenths>,
    pub meters: Option<Tenths>,
    pub fathoms: Option<Tenths>,
}

pub fn parse_dbt(fields: &[&str]) -> DepthMessage {
    DepthMessage {
        feet: tenths(field(fields, 0)),
        meters: tenths(field(fields, 2)),
        fathoms: tenths(field(fields, 4)),
    }
}

pub fn parse_dbk(fields: &[&str]) -> DepthMessage {
    parse_dbt(fields)
}

pub fn parse_dbs(fields: &[&str]) -> DepthMessage {
    parse_dbt(fields)
}

/// Water depth and offset from transducer, from DPT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DptMessage {
    pub depth_meters: Option<Tenths>,
    pub offset_meters: Option<Tenths>,
}

pub fn parse_dpt(fields: &[&str]) -> DptMessage {
    DptMessage { depth_meters: tenths(field(fields, 0)), offset_meters: tenths(field(fields, 1)) }
}

/// GPS fix, from GGA.
#[derive(Debug, Clone, Default)]
pub struct GgaMessage {
    pub time: Option<NmeaTime>,
    pub latitude: Option<Coordinate>,
    pub longitude: Option<Coordinate>,
    pub quality: Option<GpsQuality>,
    pub satellites_in_use: Option<u32>,
    pub hdop: Option<Tenths>,
    pub altitude_meters: Option<Tenths>,
    pub geoid_separation_meters: Option<Tenths>,
}

pub fn parse_gga(fields: &[&str]) -> GgaMessage {
    GgaMessage {
        time: time_hhmmss(field(fields, 0)),
        latitude: latitude(field(fields, 1), field(fields, 2)),
        longitude: longitude(field(fields, 3), field(fields, 4)),
        quality: gps_quality(field(fields, 5)),
        satellites_in_use: unsigned(field(fields, 6)),
        hdop: tenths(field(fields, 7)),
        altitude_meters: tenths(field(fields, 8)),
        geoid_separation_meters: tenths(field(fields, 10)),
    }
}

/// Geographic position, from GLL.
#[derive(Debug, Clone, Default)]
pub struct GllMessage {
    pub latitude: Option<Coordinate>,
    pub longitude: Option<Coordinate>,
    pub time: Option<NmeaTime>,
    pub valid: bool,
}

pub fn parse_gll(fields: &[&str]) -> GllMessage {
    GllMessage {
        latitude: latitude(field(fields, 0), field(fields, 1)),
        longitude: longitude(field(fields, 2), field(fields, 3)),
        time: time_hhmmss(field(fields, 4)),
        valid: field(fields, 5) == "A",
    }
}

/// Satellite fix status and DOP, from GSA.
#[derive(Debug, Clone, Default)]
pub struct GsaMessage {
    pub automatic_mode: bool,
    pub fix_type: Option<u32>,
    pub satellite_ids: Vec<u32>,
    pub pdop: Option<Tenths>,
    pub hdop: Option<Tenths>,
    pub vdop: Option<Tenths>,
}

pub fn parse_gsa(fields: &[&str]) -> GsaMessage {
    GsaMessage {
        automatic_mode: field(fields, 0) == "A",
        fix_type: unsigned(field(fields, 1)),
        satellite_ids: (2..14).filter_map(|i| unsigned(field(fields, i))).collect(),
        pdop: tenths(field(fields, 14)),
        hdop: tenths(field(fields, 15)),
        vdop: tenths(field(fields, 16)),
    }
}

/// Pseudorange noise statistics, from GST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GstMessage {
    pub rms_deviation: Option<Tenths>,
    pub lat_error_meters: Option<Tenths>,
    pub lon_error_meters: Option<Tenths>,
    pub alt_error_meters: Option<Tenths>,
}

pub fn parse_gst(fields: &[&str]) -> GstMessage {
    GstMessage {
        rms_deviation: tenths(field(fields, 1)),
        lat_error_meters: tenths(field(fields, 2)),
        lon_error_meters: tenths(field(fields, 3)),
        alt_error_meters: tenths(field(fields, 4)),
    }
}

/// Satellites in view, from GSV. A scan may span several GSV sentences;
/// the caller accumulates `satellites_in_view` across a full set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GsvMessage {
    pub total_messages: Option<u32>,
    pub message_number: Option<u32>,
    pub satellites_in_view: Option<u32>,
}

pub fn parse_gsv(fields: &[&str]) -> GsvMessage {
    GsvMessage {
        total_messages: unsigned(field(fields, 0)),
        message_number: unsigned(field(fields, 1)),
        satellites_in_view: unsigned(field(fields, 2)),
    }
}

/// Recommended minimum GPS data, from RMC.
#[derive(Debug, Clone, Default)]
pub struct RmcMessage {
    pub time: Option<NmeaTime>,
    pub valid: bool,
    pub latitude: Option<Coordinate>,
    pub longitude: Option<Coordinate>,
    pub speed_over_ground_knots: Option<Tenths>,
    pub course_over_ground_degrees: Option<Tenths>,
    pub date: Option<NmeaDate>,
    pub magnetic_variation_degrees: Option<Tenths>,
    pub mode: Option<FaaModeIndicator>,
}

pub fn parse_rmc(fields: &[&str]) -> RmcMessage {
    RmcMessage {
        time: time_hhmmss(field(fields, 0)),
        valid: field(fields, 1) == "A",
        latitude: latitude(field(fields, 2), field(fields, 3)),
        longitude: longitude(field(fields, 4), field(fields, 5)),
        speed_over_ground_knots: tenths(field(fields, 6)),
        course_over_ground_degrees: tenths(field(fields, 7)),
        date: date_ddmmyy(field(fields, 8)),
        magnetic_variation_degrees: magnetic_variation(field(fields, 9), field(fields, 10)),
        mode: faa_mode_indicator(field(fields, 11)),
    }
}

/// Course and speed over ground, from VTG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VtgMessage {
    pub course_true_degrees: Option<Tenths>,
    pub course_magnetic_degrees: Option<Tenths>,
    pub speed_knots: Option<Tenths>,
    pub speed_kmh: Option<Tenths>,
    pub mode: Option<FaaModeIndicator>,
}

pub fn parse_vtg(fields: &[&str]) -> VtgMessage {
    VtgMessage {
        course_true_degrees: tenths(field(fields, 0)),
        course_magnetic_degrees: tenths(field(fields, 2)),
        speed_knots: tenths(field(fields, 4)),
        speed_kmh: tenths(field(fields, 6)),
        mode: faa_mode_indicator(field(fields, 8)),
    }
}

/// Heading, deviation and variation, from HDG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HdgMessage {
    pub heading_degrees: Option<Tenths>,
    pub deviation_degrees: Option<Tenths>,
    pub variation_degrees: Option<Tenths>,
}

pub fn parse_hdg(fields: &[&str]) -> HdgMessage {
    let deviation = match (tenths(field(fields, 1)), field(fields, 2)) {
        (Some(magnitude), "W") => Some(Tenths::from_sub_units(-magnitude.sub_units())),
        (Some(magnitude), _) => Some(magnitude),
        (None, _) => None,
    };
    HdgMessage {
        heading_degrees: tenths(field(fields, 0)),
        deviation_degrees: deviation,
        variation_degrees: magnetic_variation(field(fields, 3), field(fields, 4)),
    }
}

/// Water temperature, from MTW.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MtwMessage {
    pub temperature_tenths: Option<Tenths>,
}

pub fn parse_mtw(fields: &[&str]) -> MtwMessage {
    MtwMessage { temperature_tenths: tenths(field(fields, 0)) }
}

/// Wind speed and angle, from MWV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MwvMessage {
    pub angle_degrees: Option<Tenths>,
    pub reference_is_true: bool,
    pub speed: Option<Tenths>,
    pub speed_units: Option<SpeedUnits>,
    pub valid: bool,
}

pub fn parse_mwv(fields: &[&str]) -> MwvMessage {
    MwvMessage {
        angle_degrees: tenths(field(fields, 0)),
        reference_is_true: field(fields, 1) == "T",
        speed: tenths(field(fields, 2)),
        speed_units: speed_units(field(fields, 3)),
        valid: field(fields, 4) == "A",
    }
}

/// Rudder sensor angle, from RSA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RsaMessage {
    pub starboard_degrees: Option<Tenths>,
    pub starboard_valid: bool,
    pub port_degrees: Option<Tenths>,
    pub port_valid: bool,
}

pub fn parse_rsa(fields: &[&str]) -> RsaMessage {
    RsaMessage {
        starboard_degrees: tenths(field(fields, 0)),
        starboard_valid: field(fields, 1) == "A",
        port_degrees: tenths(field(fields, 2)),
        port_valid: field(fields, 3) == "A",
    }
}

/// Free-form text broadcast, from TXT.
#[derive(Debug, Clone, Default)]
pub struct TxtMessage {
    pub total_messages: Option<u32>,
    pub message_number: Option<u32>,
    pub identifier: Option<u32>,
    pub text: String,
}

pub fn parse_txt(fields: &[&str]) -> TxtMessage {
    TxtMessage {
        total_messages: unsigned(field(fields, 0)),
        message_number: unsigned(field(fields, 1)),
        identifier: unsigned(field(fields, 2)),
        text: field(fields, 3).to_string(),
    }
}

/// AIS payload carried in a VDM/VDO sentence. The AIS decoder (spec
/// §4.6) handles fragment reassembly and 6-bit payload decoding; this
/// struct is the pass-through envelope the NMEA 0183 layer hands it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VdmVdoMessage {
    pub own_ship: bool,
    pub total_fragments: u32,
    pub fragment_number: u32,
    pub sequential_message_id: Option<u32>,
    pub radio_channel: Option<RadioChannel>,
    pub payload: String,
    pub fill_bits: u32,
}

pub fn parse_vdm_vdo(own_ship: bool, fields: &[&str]) -> Option<VdmVdoMessage> {
    Some(VdmVdoMessage {
        own_ship,
        total_fragments: unsigned(field(fields, 0))?,
        fragment_number: unsigned(field(fields, 1))?,
        sequential_message_id: unsigned(field(fields, 2)),
        radio_channel: radio_channel(field(fields, 3)),
        payload: field(fields, 4).to_string(),
        fill_bits: unsigned(field(fields, 5)).unwrap_or(0),
    })
}

/// Water speed and heading, from VHW.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VhwMessage {
    pub heading_true_degrees: Option<Tenths>,
    pub heading_magnetic_degrees: Option<Tenths>,
    pub speed_knots: Option<Tenths>,
    pub speed_kmh: Option<Tenths>,
}

pub fn parse_vhw(fields: &[&str]) -> VhwMessage {
    VhwMessage {
        heading_true_degrees: tenths(field(fields, 0)),
        heading_magnetic_degrees: tenths(field(fields, 2)),
        speed_knots: tenths(field(fields, 4)),
        speed_kmh: tenths(field(fields, 6)),
    }
}

/// A decoded NMEA 0183 sentence body, dispatched by message type (spec
/// §4.5). Types not in the supported list are counted and dropped by
/// the caller rather than represented here.
#[derive(Debug, Clone)]
pub enum Message {
    Dbt(DepthMessage),
    Dbk(DepthMessage),
    Dbs(DepthMessage),
    Dpt(DptMessage),
    Gga(GgaMessage),
    Gll(GllMessage),
    Gsa(GsaMessage),
    Gst(GstMessage),
    Gsv(GsvMessage),
    Rmc(RmcMessage),
    Vtg(VtgMessage),
    Hdg(HdgMessage),
    Mtw(MtwMessage),
    Mwv(MwvMessage),
    Rsa(RsaMessage),
    Txt(TxtMessage),
    VdmVdo(VdmVdoMessage),
    Vhw(VhwMessage),
}

/// Dispatches on message type, returning `None` for unsupported types
/// (the caller counts these via `$sys/nmea/unsupportedMessageCount`).
pub fn parse_message(msg_type: &str, fields: &[&str]) -> Option<Message> {
    match msg_type {
        "DBT" => Some(Message::Dbt(parse_dbt(fields))),
        "DBK" => Some(Message::Dbk(parse_dbk(fields))),
        "DBS" => Some(Message::Dbs(parse_dbs(fields))),
        "DPT" => Some(Message::Dpt(parse_dpt(fields))),
        "GGA" => Some(Message::Gga(parse_gga(fields))),
        "GLL" => Some(Message::Gll(parse_gll(fields))),
        "GSA" => Some(Message::Gsa(parse_gsa(fields))),
        "GST" => Some(Message::Gst(parse_gst(fields))),
        "GSV" => Some(Message::Gsv(parse_gsv(fields))),
        "RMC" => Some(Message::Rmc(parse_rmc(fields))),
        "VTG" => Some(Message::Vtg(parse_vtg(fields))),
        "HDG" => Some(Message::Hdg(parse_hdg(fields))),
        "MTW" => Some(Message::Mtw(parse_mtw(fields))),
        "MWV" => Some(Message::Mwv(parse_mwv(fields))),
        "RSA" => Some(Message::Rsa(parse_rsa(fields))),
        "TXT" => Some(Message::Txt(parse_txt(fields))),
        "VDM" => parse_vdm_vdo(false, fields).map(Message::VdmVdo),
        "VDO" => parse_vdm_vdo(true, fields).map(Message::VdmVdo),
        "VHW" => Some(Message::Vhw(parse_vhw(fields))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(body: &str) -> Vec<&str> {
        let mut parts = body.split(',');
        parts.next();
        parts.collect()
    }

    #[test]
    fn parses_gga_end_to_end() {
        let fields = split("GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,");
        let gga = parse_gga(&fields);
        assert_eq!(gga.time.unwrap().to_string(), "12:35:19");
        assert_eq!(gga.latitude.unwrap().format_dm("N", "S"), "48\u{b0} 07.0380' N");
        assert_eq!(gga.quality.unwrap().name(), "GPS Fix");
        assert_eq!(gga.satellites_in_use, Some(8));
    }

    #[test]
    fn parses_mwv_true_wind() {
        let fields = split("WIMWV,045.0,T,10.5,N,A");
        let mwv = parse_mwv(&fields);
        assert!(mwv.reference_is_true);
        assert_eq!(mwv.speed_units, Some(SpeedUnits::Knots));
        assert!(mwv.valid);
    }

    #[test]
    fn parses_rmc_with_west_variation() {
        let fields = split("GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W");
        let rmc = parse_rmc(&fields);
        assert!(rmc.valid);
        assert!(rmc.magnetic_variation_degrees.unwrap().sub_units() < 0);
        assert_eq!(rmc.date.unwrap().year, 2094);
    }

    #[test]
    fn vdm_fragment_fields_round_trip() {
        let fields = split("AIVDM,2,1,3,A,55P5TL01VIaAL@7WKO@mBplU@<PDhh000000001S;AJ::4A80?4i@E53,0");
        let vdm = parse_vdm_vdo(false, &fields).unwrap();
        assert_eq!(vdm.total_fragments, 2);
        assert_eq!(vdm.fragment_number, 1);
        assert_eq!(vdm.sequential_message_id, Some(3));
        assert_eq!(vdm.radio_channel, Some(RadioChannel::A));
    }

    #[test]
    fn unsupported_type_returns_none() {
        assert!(parse_message("ZZZ", &[]).is_none());
    }

    #[test]
    fn hdg_applies_west_deviation_sign() {
        let fields = split("HCHDG,123.4,1.0,W,2.0,E");
        let hdg = parse_hdg(&fields);
        assert!(hdg.deviation_degrees.unwrap().sub_units() < 0);
        assert!(hdg.variation_degrees.unwrap().sub_units() > 0);
    }
}
