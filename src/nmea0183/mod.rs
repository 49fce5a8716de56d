//! NMEA 0183 ingest: framing, tag/field parsing, typed messages and the
//! line source that ties them together.

pub mod fields;
pub mod line;
pub mod messages;
pub mod source;
pub mod tag;
