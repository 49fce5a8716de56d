//! Process-level CLI surface, generalized from the teacher's
//! `structopt`-based `Opt` (see `examples/setnorth-sailstats-logger/src/main.rs`)
//! to `clap`'s derive API, which is the CLI crate the rest of the example
//! pack (`optim-enterprises-bv-ac-client`, `dandyvica-dqy`) converges on.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "lunamon", about = "Marine instrumentation hub: NMEA 0183/SeaTalk/AIS ingest and republish")]
pub struct Cli {
    /// Path to the TOML configuration file describing interfaces and bridges.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the NMEA republish server's listen port.
    #[arg(long)]
    pub nmea_server_port: Option<u16>,

    /// Log level filter (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
