//! Process entry point: loads configuration, builds the data model and
//! every configured interface/bridge, and runs them as a set of
//! concurrent tasks: one task per interface, one task for the stats
//! manager, one task for the MQTT broker, one task for the AIS
//! contact-table periodic dumper, one task for the NMEA server accept
//! loop plus one transient task per bridge.

use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::Mutex as AsyncMutex;

use lunamon::ais::{dump as ais_dump, AisDecoder};
use lunamon::bridge::generic::NmeaBridge;
use lunamon::bridge::seatalk::SeaTalkNmeaBridge;
use lunamon::bridge::BridgeTarget;
use lunamon::cli::Cli;
use lunamon::config::{BridgeConfig, InterfaceConfig, LunaMonConfig, PhysicalParams, Protocol};
use lunamon::datamodel::node::Node;
use lunamon::datamodel::{self, DataModel};
use lunamon::error::{error_exit, LunaMonError, Result};
use lunamon::interface::nmea_server::NmeaServer;
use lunamon::interface::uart::UartInterface;
use lunamon::interface::wifi::{self, WiFiInterface};
use lunamon::interface::{NmeaRxSink, RxSink};
use lunamon::mqtt::MqttBroker;
use lunamon::nmea0183::line::{LineAccumulator, LineEvent};
use lunamon::nmea0183::source::{LineHandler, NmeaLineSource};
use lunamon::seatalk::parser::SeaTalkParser;
use lunamon::seatalk::stalk::StalkDecoder;
use lunamon::stats::{StatsHolder, StatsManager};

/// Ring buffer size handed to every hardware UART interface. The original
/// sizes this per board from a `#define`; a config surface for per-port
/// sizing was never added here, so every UART interface shares one
/// generously-sized default (see DESIGN.md).
const DEFAULT_UART_RX_BUFFER: usize = 256;

/// What a fully constructed interface offers to the rest of the wiring: a
/// bridge destination, and (for NMEA-speaking sources) somewhere to
/// register further line handlers or a SeaTalk bridge observer.
struct RunningInterface {
    target: Arc<dyn BridgeTarget>,
    line_source: Option<Arc<NmeaLineSource>>,
    seatalk_parser: Option<Arc<SeaTalkParser>>,
}

/// Adapts a raw byte stream carrying checksum-framed `$STALK`/`$PDGY`
/// sentences into [`StalkDecoder::handle_body`] calls, for the `stalk`
/// protocol over a UART or WiFi physical transport.
struct StalkRxSink {
    accumulator: AsyncMutex<LineAccumulator>,
    decoder: StalkDecoder,
    parser: Arc<SeaTalkParser>,
}

#[async_trait::async_trait]
impl RxSink for StalkRxSink {
    async fn feed_byte(&self, byte: u8) {
        let event = self.accumulator.lock().await.feed(byte);
        match event {
            Some(LineEvent::Line { body, .. }) => self.decoder.handle_body(&body, &self.parser).await,
            Some(LineEvent::BadChecksum) => log::warn!("$STALK line with bad checksum"),
            Some(LineEvent::TooLong) => log::warn!("$STALK line exceeded maximum length"),
            Some(LineEvent::BareCarriageReturn) => log::warn!("$STALK line with CR but no LF, ignoring"),
            None => {}
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = cli.log_level.parse().unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::new().filter_level(log_level).init();

    let config = match &cli.config {
        Some(path) => match LunaMonConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("failed to load configuration from {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => LunaMonConfig::default(),
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(config, cli.nmea_server_port));
    ExitCode::SUCCESS
}

async fn run(config: LunaMonConfig, nmea_server_port_override: Option<u16>) -> ! {
    let data_model = DataModel::new().await;
    let root = Arc::clone(data_model.root());
    let sys = Arc::clone(data_model.sys_node());
    let stats_manager = Arc::new(StatsManager::new(Duration::from_secs(config.stats_period_secs)));
    datamodel::register(Arc::clone(&data_model), &stats_manager).await;

    let ais_node = root.add_node("ais").await;
    let ais_decoder = AisDecoder::new(
        &ais_node,
        config.ais.max_contacts,
        Duration::from_secs(config.ais.contacts_lock_timeout_secs),
    )
    .await;
    stats_manager.add_stats_holder(Arc::clone(&ais_decoder) as Arc<dyn StatsHolder>).await;
    tokio::spawn(ais_dump::run(Arc::clone(ais_decoder.contacts()), Duration::from_secs(config.ais.contacts_dump_period_secs)));

    let nmea_server_port = nmea_server_port_override.unwrap_or(config.nmea_server.port);
    let nmea_server = NmeaServer::new(nmea_server_port, config.nmea_server.max_clients, &sys).await;
    stats_manager.add_stats_holder(Arc::clone(&nmea_server) as Arc<dyn StatsHolder>).await;
    {
        let nmea_server = Arc::clone(&nmea_server);
        tokio::spawn(async move {
            if let Err(e) = nmea_server.run().await {
                error_exit(&e.to_string());
            }
        });
    }

    let mqtt_broker = MqttBroker::new(config.mqtt_broker.port, Arc::clone(&root), &sys).await;
    stats_manager.add_stats_holder(Arc::clone(&mqtt_broker) as Arc<dyn StatsHolder>).await;
    {
        let mqtt_broker = Arc::clone(&mqtt_broker);
        tokio::spawn(async move {
            if let Err(e) = mqtt_broker.run().await {
                error_exit(&e.to_string());
            }
        });
    }

    let mut interfaces: HashMap<String, RunningInterface> = HashMap::new();
    interfaces.insert(
        "nmeaServer".to_string(),
        RunningInterface { target: Arc::clone(&nmea_server) as Arc<dyn BridgeTarget>, line_source: None, seatalk_parser: None },
    );

    for interface_config in &config.interfaces {
        match build_interface(interface_config, &root, &sys, &ais_decoder, &stats_manager).await {
            Ok(running) => {
                interfaces.insert(interface_config.name.clone(), running);
            }
            Err(e) if e.is_fatal() => error_exit(&format!("interface '{}': {e}", interface_config.name)),
            Err(e) => log::error!("failed to configure interface '{}': {e}", interface_config.name),
        }
    }

    for bridge_config in &config.bridges {
        if let Err(e) = build_bridge(bridge_config, &interfaces, &sys, &stats_manager).await {
            if e.is_fatal() {
                error_exit(&format!("bridge '{}': {e}", bridge_config.name));
            }
            log::error!("failed to configure bridge '{}': {e}", bridge_config.name);
        }
    }

    tokio::spawn(stats_manager.run());

    std::future::pending::<()>().await;
    unreachable!("pending future never resolves");
}

async fn build_interface(
    cfg: &InterfaceConfig,
    root: &Arc<Node>,
    sys: &Arc<Node>,
    ais_decoder: &Arc<AisDecoder>,
    stats_manager: &Arc<StatsManager>,
) -> Result<RunningInterface> {
    match (&cfg.physical, cfg.protocol) {
        (PhysicalParams::Uart { tty_path, baud }, Protocol::Nmea | Protocol::Stalk) => {
            let (interface, rx_queue) = UartInterface::new(&cfg.name, tty_path, *baud, DEFAULT_UART_RX_BUFFER, sys).await;
            stats_manager.add_stats_holder(Arc::clone(&interface) as Arc<dyn StatsHolder>).await;
            let running = wire_nmea_capable(root, interface.base().interface_node(), cfg, ais_decoder, stats_manager).await;

            let interface_for_run = Arc::clone(&interface);
            let sink = build_sink(&running);
            tokio::spawn(async move {
                if let Err(e) = interface_for_run.run(rx_queue, sink).await {
                    error_exit(&e.to_string());
                }
            });

            Ok(RunningInterface { target: interface, line_source: running.line_source, seatalk_parser: running.seatalk_parser })
        }
        (PhysicalParams::Wifi { address, port }, Protocol::Nmea | Protocol::Stalk) => {
            wifi::validate_address(address)?;
            let (interface, rx_queue) = WiFiInterface::new(&cfg.name, address, *port, sys).await;
            stats_manager.add_stats_holder(Arc::clone(&interface) as Arc<dyn StatsHolder>).await;
            let running = wire_nmea_capable(root, interface.base().interface_node(), cfg, ais_decoder, stats_manager).await;

            let interface_for_run = Arc::clone(&interface);
            let sink = build_sink(&running);
            tokio::spawn(async move {
                if let Err(e) = interface_for_run.run(rx_queue, sink).await {
                    error_exit(&e.to_string());
                }
            });

            Ok(RunningInterface { target: interface, line_source: running.line_source, seatalk_parser: running.seatalk_parser })
        }
        (PhysicalParams::Server { port, max_clients }, _) => {
            let server = NmeaServer::new(*port, *max_clients, sys).await;
            stats_manager.add_stats_holder(Arc::clone(&server) as Arc<dyn StatsHolder>).await;
            let run_server = Arc::clone(&server);
            tokio::spawn(async move {
                if let Err(e) = run_server.run().await {
                    error_exit(&e.to_string());
                }
            });
            Ok(RunningInterface { target: server, line_source: None, seatalk_parser: None })
        }
        (PhysicalParams::SoftUart { .. }, _) => Err(LunaMonError::Hardware(format!(
            "interface '{}': soft-UART GPIO driver not available on this platform",
            cfg.name
        ))),
        (_, Protocol::SeaTalk) => Err(LunaMonError::Configuration(format!(
            "interface '{}': raw SeaTalk protocol requires a soft-UART physical transport",
            cfg.name
        ))),
    }
}

struct NmeaCapableWiring {
    line_source: Option<Arc<NmeaLineSource>>,
    seatalk_parser: Option<Arc<SeaTalkParser>>,
}

/// Builds whichever of an [`NmeaLineSource`] (protocol `nmea`) or a
/// [`StalkRxSink`]-backed [`SeaTalkParser`] (protocol `stalk`) a
/// byte-oriented interface needs, registering the AIS decoder and stats
/// along the way.
async fn wire_nmea_capable(
    root: &Arc<Node>,
    interface_node: &Arc<Node>,
    cfg: &InterfaceConfig,
    ais_decoder: &Arc<AisDecoder>,
    stats_manager: &Arc<StatsManager>,
) -> NmeaCapableWiring {
    match cfg.protocol {
        Protocol::Nmea => {
            let line_source = NmeaLineSource::new(interface_node, &cfg.filtered_talkers).await;
            line_source.add_line_handler(Arc::clone(ais_decoder) as Arc<dyn LineHandler>).await;
            stats_manager.add_stats_holder(Arc::clone(&line_source) as Arc<dyn StatsHolder>).await;
            NmeaCapableWiring { line_source: Some(line_source), seatalk_parser: None }
        }
        Protocol::Stalk => {
            let seatalk_node = root.add_node(&cfg.name).await;
            let parser = SeaTalkParser::new(&seatalk_node).await;
            stats_manager.add_stats_holder(Arc::clone(&parser) as Arc<dyn StatsHolder>).await;
            NmeaCapableWiring { line_source: None, seatalk_parser: Some(parser) }
        }
        Protocol::SeaTalk => unreachable!("filtered out before this is called"),
    }
}

fn build_sink(running: &NmeaCapableWiring) -> Arc<dyn RxSink> {
    if let Some(line_source) = &running.line_source {
        Arc::new(NmeaRxSink(Arc::clone(line_source)))
    } else if let Some(parser) = &running.seatalk_parser {
        Arc::new(StalkRxSink { accumulator: AsyncMutex::new(LineAccumulator::new()), decoder: StalkDecoder::new(), parser: Arc::clone(parser) })
    } else {
        unreachable!("wire_nmea_capable always sets exactly one of line_source/seatalk_parser")
    }
}

/// Wires one configured bridge: a [`SeaTalkNmeaBridge`] when the source
/// speaks SeaTalk/$STALK, a generic [`NmeaBridge`] when it speaks NMEA
/// 0183 directly.
async fn build_bridge(
    cfg: &BridgeConfig,
    interfaces: &HashMap<String, RunningInterface>,
    sys: &Arc<Node>,
    stats_manager: &Arc<StatsManager>,
) -> Result<()> {
    let source = interfaces
        .get(&cfg.source)
        .ok_or_else(|| LunaMonError::Configuration(format!("unknown bridge source interface '{}'", cfg.source)))?;
    let destination = interfaces
        .get(&cfg.destination)
        .ok_or_else(|| LunaMonError::Configuration(format!("unknown bridge destination interface '{}'", cfg.destination)))?;

    if let Some(parser) = &source.seatalk_parser {
        let talker_code = cfg.talker_code.clone().unwrap_or_else(|| "II".to_string());
        let bridge = SeaTalkNmeaBridge::new(&talker_code, Arc::clone(&destination.target));
        parser.set_observer(bridge).await;
        return Ok(());
    }

    let line_source = source
        .line_source
        .as_ref()
        .ok_or_else(|| LunaMonError::Configuration(format!("bridge source '{}' has no usable line source", cfg.source)))?;
    let bridge = NmeaBridge::new(&cfg.name, &cfg.message_types, Arc::clone(&destination.target), sys).await?;
    stats_manager.add_stats_holder(Arc::clone(&bridge) as Arc<dyn StatsHolder>).await;
    line_source.add_line_handler(bridge).await;
    Ok(())
}
