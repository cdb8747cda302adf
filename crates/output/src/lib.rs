// Rust guideline compliant 2026-07-18

//! Output sink: the single writer behind which all worker output is
//! serialized.
//!
//! Workers push [`LogEnvelope`] values (`<verbosity>|<debug>|<origin>|<text>`)
//! through a cheap-to-clone [`OutputHandle`]; one [`OutputSink`] worker
//! drains the queue and writes to the console and, when enabled, to
//! `flowsentry_output.txt` and `errors.log` under the output directory.
//! Because the sink is the sole stdout/stderr writer, interleaved output
//! from N workers stays line-atomic.
//!
//! Producers never block: the queue is unbounded, and the pressure counter
//! on every handle surfaces its depth.
//!
//! Entry points: [`OutputConfig::builder`], [`channel`], [`OutputSink::run`].

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// LogEnvelope
// ---------------------------------------------------------------------------

/// Errors around the sink and its envelope format.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// The supplied configuration is invalid.
    #[error("invalid output configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// An envelope string did not have the `v|d|origin|text` shape.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    /// A log file could not be opened or written.
    #[error("log file error: {0}")]
    Io(#[from] std::io::Error),
}

/// One queued output line: `<verbosity>|<debug>|<origin>|<text>`.
///
/// `verbosity > 0` selects console output up to the configured verbose
/// level; `debug > 0` marks the line as an error destined for `errors.log`
/// (and the console up to the configured debug level).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEnvelope {
    pub verbosity: u8,
    pub debug: u8,
    /// Worker that produced the line.
    pub origin: String,
    pub text: String,
}

impl fmt::Display for LogEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            self.verbosity, self.debug, self.origin, self.text
        )
    }
}

impl FromStr for LogEnvelope {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(4, '|');
        let (Some(v), Some(d), Some(origin), Some(text)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(OutputError::MalformedEnvelope(s.to_owned()));
        };
        let verbosity = v
            .parse::<u8>()
            .map_err(|_| OutputError::MalformedEnvelope(s.to_owned()))?;
        let debug = d
            .parse::<u8>()
            .map_err(|_| OutputError::MalformedEnvelope(s.to_owned()))?;
        Ok(Self {
            verbosity,
            debug,
            origin: origin.to_owned(),
            text: text.to_owned(),
        })
    }
}

// ---------------------------------------------------------------------------
// OutputConfig + builder
// ---------------------------------------------------------------------------

/// Process-wide output thresholds and file targets.
///
/// Construct via [`OutputConfig::builder`].
#[derive(Debug)]
pub struct OutputConfig {
    /// Console verbosity threshold, always at least 1.
    pub verbose: u8,
    /// Console debug threshold; 0 keeps errors off the console.
    pub debug: u8,
    /// Directory for `flowsentry_output.txt` and `errors.log`; `None`
    /// disables log files.
    pub log_dir: Option<PathBuf>,
}

/// Builder for [`OutputConfig`].
#[derive(Debug)]
pub struct OutputConfigBuilder {
    verbose: u8,
    debug: u8,
    log_dir: Option<PathBuf>,
}

impl OutputConfig {
    /// Create a builder. Defaults: `verbose = 1`, `debug = 0`, no log files.
    #[must_use]
    pub fn builder() -> OutputConfigBuilder {
        OutputConfigBuilder {
            verbose: 1,
            debug: 0,
            log_dir: None,
        }
    }
}

impl OutputConfigBuilder {
    /// Set the console verbosity threshold.
    #[must_use]
    pub fn verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set the console debug threshold.
    #[must_use]
    pub fn debug(mut self, debug: u8) -> Self {
        self.debug = debug;
        self
    }

    /// Enable log files under `dir`.
    #[must_use]
    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::InvalidConfig`] when `verbose` is zero.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<OutputConfig, OutputError> {
        if self.verbose == 0 {
            return Err(OutputError::InvalidConfig {
                reason: "verbose must be >= 1".to_owned(),
            });
        }
        Ok(OutputConfig {
            verbose: self.verbose,
            debug: self.debug,
            log_dir: self.log_dir,
        })
    }
}

// ---------------------------------------------------------------------------
// Handle + sink
// ---------------------------------------------------------------------------

/// Name of the sink log file under the output directory.
pub const OUTPUT_LOG: &str = "flowsentry_output.txt";
/// Name of the error log file under the output directory.
pub const ERRORS_LOG: &str = "errors.log";

/// Create the producer handle / sink worker pair.
#[must_use]
pub fn channel(config: OutputConfig) -> (OutputHandle, OutputSink) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        OutputHandle {
            tx,
            depth: Arc::clone(&depth),
        },
        OutputSink { rx, depth, config },
    )
}

/// Cheap-to-clone producer handle to the sink queue.
#[derive(Debug, Clone)]
pub struct OutputHandle {
    tx: mpsc::UnboundedSender<LogEnvelope>,
    depth: Arc<AtomicUsize>,
}

impl OutputHandle {
    /// Queue one line. Never blocks; silently dropped once the sink has
    /// exited (shutdown stragglers).
    pub fn send(&self, verbosity: u8, debug: u8, origin: &str, text: impl Into<String>) {
        let env = LogEnvelope {
            verbosity,
            debug,
            origin: origin.to_owned(),
            text: text.into(),
        };
        if self.tx.send(env).is_ok() {
            self.depth.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Queue an error line (`debug = 1`) destined for `errors.log`.
    pub fn error(&self, origin: &str, text: impl Into<String>) {
        self.send(0, 1, origin, text);
    }

    /// Current queue depth -- the monitoring counter surfacing pressure.
    #[must_use]
    pub fn pressure(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}

/// The single sink worker draining the queue.
#[derive(Debug)]
pub struct OutputSink {
    rx: mpsc::UnboundedReceiver<LogEnvelope>,
    depth: Arc<AtomicUsize>,
    config: OutputConfig,
}

/// Counters reported when the sink drains and exits.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OutputSummary {
    /// Envelopes drained from the queue.
    pub processed: u64,
    /// Envelopes routed to `errors.log`.
    pub errors: u64,
}

impl OutputSink {
    /// Drain the queue until every producer handle is dropped, then flush
    /// and return the summary.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::Io`] when a log file cannot be opened.
    pub async fn run(mut self) -> Result<OutputSummary, OutputError> {
        let mut files = match &self.config.log_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                let open = |name: &str| {
                    OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(dir.join(name))
                };
                Some((open(OUTPUT_LOG)?, open(ERRORS_LOG)?))
            }
            None => None,
        };

        let mut summary = OutputSummary::default();
        while let Some(env) = self.rx.recv().await {
            self.depth.fetch_sub(1, Ordering::Relaxed);
            summary.processed += 1;

            let line = format!("[{}] {}", env.origin, env.text);
            if env.debug > 0 {
                summary.errors += 1;
                if let Some((_, errors_file)) = files.as_mut() {
                    writeln!(errors_file, "{line}")?;
                }
                if env.debug <= self.config.debug {
                    eprintln!("{line}");
                }
            }
            if env.verbosity > 0 && env.verbosity <= self.config.verbose {
                println!("{line}");
                if let Some((out_file, _)) = files.as_mut() {
                    writeln!(out_file, "{line}")?;
                }
            }
        }

        if let Some((mut out_file, mut errors_file)) = files {
            out_file.flush()?;
            errors_file.flush()?;
        }
        log::info!(
            "output.sink.stopped: processed={} errors={}",
            summary.processed,
            summary.errors
        );
        Ok(summary)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
