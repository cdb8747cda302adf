// Rust guideline compliant 2026-07-25

//! Command-line surface.

use clap::Parser;
use std::path::PathBuf;

/// Host-resident intrusion detection pipeline over network flow records.
#[derive(Parser, Debug)]
#[command(name = "flowsentry", version, about)]
pub struct Cli {
    /// Minimum amount of flows in a destination tuple before it is
    /// reported.
    #[arg(short = 'a', long, default_value_t = -1)]
    pub amount: i64,

    /// Path to the configuration file.
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Amount of verbosity (more info about the results).
    #[arg(short = 'v', long)]
    pub verbose: Option<u8>,

    /// Amount of debugging (inner information about the program).
    #[arg(short = 'e', long)]
    pub debug: Option<u8>,

    /// Width of the time window used, in seconds.
    #[arg(short = 'w', long)]
    pub width: Option<f64>,

    /// File with addresses to whitelist, one per line.
    #[arg(short = 'W', long)]
    pub whitelist: Option<PathBuf>,

    /// Input: a pcap, binetflow, nfdump or suricata file, a zeek folder or
    /// log file, an interface name, or the literal `stdin`.
    #[arg(short = 'f', long)]
    pub filepath: Option<PathBuf>,

    /// Line type of stdin input: zeek, suricata or argus.
    #[arg(long)]
    pub line_type: Option<String>,

    /// Use the curses output interface.
    #[arg(short = 'C', long)]
    pub curses: bool,

    /// Do not create log files.
    #[arg(short = 'l', long)]
    pub nologfiles: bool,

    /// Output directory.
    #[arg(short = 'o', long, default_value = "output")]
    pub output: PathBuf,

    /// Store port; keys the database files so parallel runs do not clash.
    #[arg(short = 'P', long, default_value_t = crate::config::DEFAULT_PORT)]
    pub port: u16,
}
