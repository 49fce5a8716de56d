//! Runtime configuration surface, replacing the original's compile-time
//! `#define`s with a `serde`-deserialized config file plus `Default`
//! impls reproducing the documented defaults.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LunaMonConfig {
    pub ais: AisConfig,
    pub nmea_server: NmeaServerConfig,
    pub mqtt_broker: MqttBrokerConfig,
    pub digital_yachts_workaround: DigitalYachtsWorkaroundConfig,
    #[serde(rename = "interface")]
    pub interfaces: Vec<InterfaceConfig>,
    #[serde(rename = "bridge")]
    pub bridges: Vec<BridgeConfig>,
    pub stats_period_secs: u64,
}

impl Default for LunaMonConfig {
    fn default() -> Self {
        LunaMonConfig {
            ais: AisConfig::default(),
            nmea_server: NmeaServerConfig::default(),
            mqtt_broker: MqttBrokerConfig::default(),
            digital_yachts_workaround: DigitalYachtsWorkaroundConfig::default(),
            interfaces: Vec::new(),
            bridges: Vec::new(),
            stats_period_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttBrokerConfig {
    pub port: u16,
}

impl Default for MqttBrokerConfig {
    fn default() -> Self {
        MqttBrokerConfig { port: 1883 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AisConfig {
    pub max_contacts: usize,
    pub contacts_dump_period_secs: u64,
    pub contacts_lock_timeout_secs: u64,
}

impl Default for AisConfig {
    fn default() -> Self {
        AisConfig { max_contacts: 100, contacts_dump_period_secs: 30, contacts_lock_timeout_secs: 60 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NmeaServerConfig {
    pub max_clients: usize,
    pub port: u16,
}

impl Default for NmeaServerConfig {
    fn default() -> Self {
        NmeaServerConfig { max_clients: 5, port: 10110 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DigitalYachtsWorkaroundConfig {
    pub enabled: bool,
    pub resend_interval_secs: u64,
}

impl Default for DigitalYachtsWorkaroundConfig {
    fn default() -> Self {
        DigitalYachtsWorkaroundConfig { enabled: false, resend_interval_secs: 30 }
    }
}

/// SeaTalk's wire parameters are fixed by the protocol, not configurable.
pub const SEATALK_BAUD: u32 = 4800;
pub const SEATALK_DATA_BITS: u8 = 9;
pub const SEATALK_STOP_BITS: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Nmea,
    SeaTalk,
    Stalk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Rx,
    Tx,
    RxTx,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhysicalParams {
    Uart { tty_path: String, baud: u32 },
    SoftUart { rx_gpio: u32, tx_gpio: u32, baud: u32, data_bits: u8 },
    Wifi { address: String, port: u16 },
    Server { port: u16, max_clients: usize },
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceConfig {
    pub name: String,
    pub protocol: Protocol,
    pub role: Role,
    pub physical: PhysicalParams,
    #[serde(default)]
    pub filtered_talkers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    pub name: String,
    pub source: String,
    pub destination: String,
    /// Message types to forward, for a source speaking NMEA 0183. Ignored
    /// when the source is a SeaTalk/$STALK interface, which always
    /// synthesizes DBT/HDM/MWV/RSA rather than forwarding verbatim.
    #[serde(default)]
    pub message_types: Vec<String>,
    /// Two-character talker code used when the source is a SeaTalk/$STALK
    /// interface; unused otherwise.
    #[serde(default)]
    pub talker_code: Option<String>,
}

impl LunaMonConfig {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: LunaMonConfig = toml::from_str(&text)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = LunaMonConfig::default();
        assert_eq!(config.ais.max_contacts, 100);
        assert_eq!(config.ais.contacts_dump_period_secs, 30);
        assert_eq!(config.ais.contacts_lock_timeout_secs, 60);
        assert_eq!(config.nmea_server.max_clients, 5);
        assert_eq!(config.mqtt_broker.port, 1883);
        assert!(!config.digital_yachts_workaround.enabled);
        assert_eq!(config.digital_yachts_workaround.resend_interval_secs, 30);
    }

    #[test]
    fn parses_minimal_toml() {
        let toml_text = r#"
            stats_period_secs = 5

            [[interface]]
            name = "uart-a"
            protocol = "nmea"
            role = "rxtx"
            filtered_talkers = ["AI"]

            [interface.physical]
            kind = "uart"
            tty_path = "/dev/ttyUSB0"
            baud = 4800

            [[bridge]]
            name = "a-to-b"
            source = "uart-a"
            destination = "uart-b"
            message_types = ["DBT", "MWV"]
        "#;
        let config: LunaMonConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(config.interfaces.len(), 1);
        assert_eq!(config.interfaces[0].filtered_talkers, vec!["AI"]);
        assert_eq!(config.bridges[0].message_types, vec!["DBT", "MWV"]);
    }
}
