//! SeaTalk-to-NMEA bridge, grounded
//! on `SeaTalkNMEABridge.cpp`: synthesizes DBT/HDM/MWV/RSA sentences from
//! decoded SeaTalk fields under a configured two-character talker code.
//!
//! The original's `SeaTalkParser` calls a bridge's `bridgeXXXMessage`
//! methods directly as each datagram is decoded. This attaches the same
//! way, as a [`SeaTalkObserver`] registered on a
//! [`crate::seatalk::parser::SeaTalkParser`], rather than observing
//! through the data model: SeaTalk only ever has one writer for these
//! leaves, so a typed callback is simpler than round-tripping through
//! string-valued publish/subscribe (see DESIGN.md).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use crate::fixed_point::Tenths;
use crate::seatalk::parser::SeaTalkObserver;

use super::BridgeTarget;

fn validity_code(valid: bool) -> &'static str {
    if valid {
        "A"
    } else {
        "V"
    }
}

struct WindState {
    angle: Option<Tenths>,
    speed_knots: Option<Tenths>,
}

/// Holds a two-character talker code and a destination; each decoded
/// SeaTalk field of interest is immediately synthesized into its NMEA
/// equivalent and forwarded.
pub struct SeaTalkNmeaBridge {
    talker_code: String,
    destination: Arc<dyn BridgeTarget>,
    wind: AsyncMutex<WindState>,
}

impl SeaTalkNmeaBridge {
    pub fn new(talker_code: &str, destination: Arc<dyn BridgeTarget>) -> Arc<Self> {
        Arc::new(SeaTalkNmeaBridge {
            talker_code: talker_code.to_string(),
            destination,
            wind: AsyncMutex::new(WindState { angle: None, speed_knots: None }),
        })
    }

    async fn send(&self, msg_type: &str, fields: &str) {
        let body = format!("{}{msg_type},{fields}", self.talker_code);
        self.destination.forward(&body).await;
    }
}

#[async_trait]
impl SeaTalkObserver for SeaTalkNmeaBridge {
    /// `$--DBT,<feet>,f,,M,,F`: only the feet field is populated, matching
    /// the original, which is only ever called from the feet branch of
    /// the depth decode.
    async fn depth_feet(&self, feet: Tenths) {
        self.send("DBT", &format!("{feet},f,,M,,F")).await;
    }

    /// `$--HDM,<degrees>,M`.
    async fn heading_magnetic(&self, degrees: u16) {
        self.send("HDM", &format!("{degrees},M")).await;
    }

    async fn apparent_wind_angle(&self, angle: Tenths) {
        let mut wind = self.wind.lock().await;
        wind.angle = Some(angle);
        let speed_knots = wind.speed_knots;
        drop(wind);
        self.send_mwv(Some(angle), speed_knots).await;
    }

    async fn apparent_wind_speed_knots(&self, speed: Tenths) {
        let mut wind = self.wind.lock().await;
        wind.speed_knots = Some(speed);
        let angle = wind.angle;
        drop(wind);
        self.send_mwv(angle, Some(speed)).await;
    }

    /// `$--RSA,<starboard>,<A|V>,<port>,<A|V>`. SeaTalk only carries a
    /// single rudder sensor, so it's reported as the starboard angle with
    /// the port field marked invalid, rather than inventing a second
    /// sensor reading.
    async fn rudder_angle(&self, degrees: i16) {
        self.send("RSA", &format!("{degrees},A,,V")).await
    }
}

impl SeaTalkNmeaBridge {
    /// `$--MWV,<angle>,R,<speed>,K,<A|V>`: relative (apparent) wind,
    /// speed in knots, with either field left blank and the overall
    /// status marked invalid until both have been observed at least
    /// once.
    async fn send_mwv(&self, angle: Option<Tenths>, speed_knots: Option<Tenths>) {
        let angle_field = angle.map(|a| a.to_string()).unwrap_or_default();
        let speed_field = speed_knots.map(|s| s.to_string()).unwrap_or_default();
        let valid = angle.is_some() && speed_knots.is_some();
        self.send("MWV", &format!("{angle_field},R,{speed_field},K,{}", validity_code(valid))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingTarget {
        bodies: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl BridgeTarget for RecordingTarget {
        fn target_name(&self) -> String {
            "test".to_string()
        }

        async fn forward(&self, body: &str) -> bool {
            self.bodies.lock().unwrap().push(body.to_string());
            true
        }
    }

    #[tokio::test]
    async fn depth_is_bridged_as_dbt_in_feet() {
        let destination = Arc::new(RecordingTarget { bodies: StdMutex::new(Vec::new()) });
        let bridge = SeaTalkNmeaBridge::new("II", destination.clone());
        bridge.depth_feet(Tenths::new(42, 0)).await;
        assert_eq!(destination.bodies.lock().unwrap().as_slice(), &["IIDBT,42.0,f,,M,,F".to_string()]);
    }

    #[tokio::test]
    async fn heading_is_bridged_as_hdm() {
        let destination = Arc::new(RecordingTarget { bodies: StdMutex::new(Vec::new()) });
        let bridge = SeaTalkNmeaBridge::new("II", destination.clone());
        bridge.heading_magnetic(183).await;
        assert_eq!(destination.bodies.lock().unwrap().as_slice(), &["IIHDM,183,M".to_string()]);
    }

    #[tokio::test]
    async fn mwv_is_invalid_until_both_angle_and_speed_are_known() {
        let destination = Arc::new(RecordingTarget { bodies: StdMutex::new(Vec::new()) });
        let bridge = SeaTalkNmeaBridge::new("II", destination.clone());

        bridge.apparent_wind_angle(Tenths::new(45, 0)).await;
        bridge.apparent_wind_speed_knots(Tenths::new(10, 5)).await;

        let bodies = destination.bodies.lock().unwrap().clone();
        assert_eq!(bodies[0], "IIMWV,45.0,R,,K,V");
        assert_eq!(bodies[1], "IIMWV,45.0,R,10.5,K,A");
    }

    #[tokio::test]
    async fn rudder_angle_is_bridged_as_starboard_with_port_invalid() {
        let destination = Arc::new(RecordingTarget { bodies: StdMutex::new(Vec::new()) });
        let bridge = SeaTalkNmeaBridge::new("II", destination.clone());
        bridge.rudder_angle(-7).await;
        assert_eq!(destination.bodies.lock().unwrap().as_slice(), &["IIRSA,-7,A,,V".to_string()]);
    }
}
