// Rust guideline compliant 2026-07-25

//! Configuration: the INI file surface plus the CLI/config merge.
//!
//! A parameter passed on the command line always overrides the
//! configuration file; the file fills the gaps, and hard defaults fill the
//! rest. List values accept both plain comma-separated form and the
//! bracketed `['a', 'b']` form older deployments carry.

use crate::cli::Cli;
use domain::LineType;
use profiler::{Direction, HomeNetwork};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default time window width W, seconds (one hour).
pub const DEFAULT_WIDTH: f64 = 3600.0;

/// Default store port; keys the database file names.
pub const DEFAULT_PORT: u16 = 6379;

// ---------------------------------------------------------------------------
// RawConfig (INI)
// ---------------------------------------------------------------------------

/// Parsed INI file: section -> key -> raw value.
#[derive(Debug, Default)]
pub struct RawConfig {
    sections: HashMap<String, HashMap<String, String>>,
}

impl RawConfig {
    /// Parse INI text. Unknown lines are ignored rather than fatal -- a
    /// config typo must not kill the pipeline.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current = String::new();
        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current = name.trim().to_owned();
                sections.entry(current.clone()).or_default();
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                sections
                    .entry(current.clone())
                    .or_default()
                    .insert(key.trim().to_owned(), value.trim().to_owned());
            }
        }
        Self { sections }
    }

    /// Read and parse `path`. A missing file yields an empty configuration.
    #[must_use]
    pub fn load(path: Option<&Path>) -> Self {
        match path {
            Some(p) => match std::fs::read_to_string(p) {
                Ok(text) => Self::parse(&text),
                Err(e) => {
                    log::warn!("config.load: path={} error={e}", p.display());
                    Self::default()
                }
            },
            None => Self::default(),
        }
    }

    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections.get(section)?.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn get_bool(&self, section: &str, key: &str) -> Option<bool> {
        match self.get(section, key)?.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Some(true),
            "false" | "no" | "0" | "off" => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_f64(&self, section: &str, key: &str) -> Option<f64> {
        self.get(section, key)?.parse().ok()
    }

    #[must_use]
    pub fn get_u8(&self, section: &str, key: &str) -> Option<u8> {
        self.get(section, key)?.parse().ok()
    }

    /// Parse a list value: `a, b, c` or `['a', 'b', 'c']`.
    #[must_use]
    pub fn get_list(&self, section: &str, key: &str) -> Vec<String> {
        let Some(raw) = self.get(section, key) else {
            return vec![];
        };
        raw.trim_matches(['[', ']'])
            .split(',')
            .map(|item| item.trim().trim_matches(['\'', '"']).trim().to_owned())
            .filter(|item| !item.is_empty())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Settings (CLI + config merged)
// ---------------------------------------------------------------------------

/// Fully resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Minimum flow count in a destination tuple before it is reported.
    pub amount: i64,
    pub config_path: Option<PathBuf>,
    pub verbose: u8,
    pub debug: u8,
    /// Time window width W, seconds.
    pub width: f64,
    pub whitelist: Option<PathBuf>,
    /// Input file/folder/interface; `stdin` reads standard input.
    pub filepath: Option<PathBuf>,
    /// Declared stdin line type.
    pub line_type: Option<LineType>,
    pub curses: bool,
    pub create_log_files: bool,
    pub output_dir: PathBuf,
    /// Store port; keys the database file names under the output dir.
    pub port: u16,
    pub direction: Direction,
    pub home_network: Option<HomeNetwork>,
    /// Modules that are not started.
    pub disabled_modules: Vec<String>,
    /// Detections whose evidence is suppressed.
    pub disabled_detections: Vec<String>,
    /// Metadata directory name under the output dir; `None` disables it.
    pub metadata_dir: Option<String>,
    pub store_zeek_copy: bool,
    pub delete_zeek_files: bool,
}

impl Settings {
    /// Merge CLI arguments over the configuration file over defaults.
    #[must_use]
    pub fn resolve(cli: &Cli, config: &RawConfig) -> Self {
        let verbose = cli
            .verbose
            .or_else(|| config.get_u8("parameters", "verbose"))
            .unwrap_or(1)
            .max(1);
        let debug = cli
            .debug
            .or_else(|| config.get_u8("parameters", "debug"))
            .unwrap_or(0);
        let width = cli
            .width
            .or_else(|| config.get_f64("parameters", "time_window_width"))
            .unwrap_or(DEFAULT_WIDTH);
        let create_log_files = !cli.nologfiles
            && config
                .get_bool("parameters", "create_log_files")
                .unwrap_or(true);
        let direction = config
            .get("parameters", "direction")
            .and_then(Direction::from_token)
            .unwrap_or_default();
        let home_network = config
            .get("parameters", "home_network")
            .and_then(HomeNetwork::parse);

        Self {
            amount: cli.amount,
            config_path: cli.config.clone(),
            verbose,
            debug,
            width,
            whitelist: cli.whitelist.clone(),
            filepath: cli.filepath.clone(),
            line_type: cli.line_type.as_deref().and_then(LineType::from_token),
            curses: cli.curses,
            create_log_files,
            output_dir: cli.output.clone(),
            port: cli.port,
            direction,
            home_network,
            disabled_modules: config.get_list("parameters", "disable"),
            disabled_detections: config.get_list("parameters", "disabled_detections"),
            metadata_dir: config
                .get("parameters", "metadata_dir")
                .map(str::to_owned),
            store_zeek_copy: config
                .get_bool("parameters", "store_a_copy_of_zeek_files")
                .unwrap_or(false),
            delete_zeek_files: config
                .get_bool("parameters", "delete_zeek_files")
                .unwrap_or(false),
        }
    }

    /// Database file for this run, keyed by the store port.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.output_dir.join(format!("flows_{}.sqlite", self.port))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
