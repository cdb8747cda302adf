// Rust guideline compliant 2026-07-18

//! Shared domain types for the flowsentry pipeline.
//!
//! Defines [`FlowRecord`] and its sub-records, [`ProfileId`], [`Evidence`],
//! the [`ChannelMessage`] envelope, the [`FlowSink`]/[`FlowSource`] hexagonal
//! ports for the profiler queue, and the cross-worker [`Termination`] and
//! [`InterruptCounter`] signals. All pipeline crates depend on this crate;
//! no other workspace crate is imported here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Transport protocol of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Udp,
    Icmp,
    Arp,
    /// Anything the sources report that is not one of the above.
    Other,
}

impl Transport {
    /// Map a source protocol token (case-insensitive) to a transport.
    ///
    /// Unknown tokens become [`Transport::Other`] rather than an error:
    /// exotic protocols must not kill a flow record.
    #[must_use]
    pub fn from_token(token: &str) -> Self {
        match token.to_ascii_lowercase().as_str() {
            "tcp" => Self::Tcp,
            "udp" => Self::Udp,
            "icmp" | "ipv6-icmp" | "icmp6" => Self::Icmp,
            "arp" => Self::Arp,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
            Self::Arp => "arp",
            Self::Other => "other",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Endpoint + app-layer sub-records
// ---------------------------------------------------------------------------

/// One side of a flow: address plus optional port (ARP flows carry none).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub addr: IpAddr,
    pub port: Option<u16>,
}

impl Endpoint {
    #[must_use]
    pub fn new(addr: IpAddr, port: Option<u16>) -> Self {
        Self { addr, port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(p) => write!(f, "{}:{p}", self.addr),
            None => write!(f, "{}", self.addr),
        }
    }
}

/// DNS query summary attached to a flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DnsFields {
    pub query: Option<String>,
    pub qtype: Option<String>,
    pub rcode: Option<String>,
    pub answers: Vec<String>,
}

/// HTTP request summary attached to a flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpFields {
    pub method: Option<String>,
    pub host: Option<String>,
    pub uri: Option<String>,
    pub status_code: Option<u16>,
    pub user_agent: Option<String>,
    pub response_body_len: Option<u64>,
}

/// TLS handshake summary attached to a flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SslFields {
    pub server_name: Option<String>,
    pub subject: Option<String>,
    pub issuer: Option<String>,
    pub validation_status: Option<String>,
    pub version: Option<String>,
}

/// SMTP transaction summary attached to a flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmtpFields {
    pub mail_from: Option<String>,
    pub rcpt_to: Option<String>,
    pub last_reply: Option<String>,
}

/// SSH session summary attached to a flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SshFields {
    pub client: Option<String>,
    pub server: Option<String>,
    pub version: Option<String>,
    pub auth_success: Option<bool>,
}

/// Sparse application-layer sub-record. At most one per flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppLayer {
    Dns(DnsFields),
    Http(HttpFields),
    Ssl(SslFields),
    Smtp(SmtpFields),
    Ssh(SshFields),
}

// ---------------------------------------------------------------------------
// FlowRecord
// ---------------------------------------------------------------------------

/// Errors raised while validating or parsing a flow record.
///
/// All of these follow the same policy at the stage boundary: the record is
/// skipped, an error counter is incremented, and processing continues.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FlowError {
    /// A required field was absent from the source record.
    #[error("missing field '{0}'")]
    MissingField(String),
    /// A field was present but could not be interpreted.
    #[error("bad value '{value}' for field '{field}'")]
    BadField { field: String, value: String },
    /// Duration must be non-negative.
    #[error("negative duration {0}")]
    NegativeDuration(f64),
    /// The source line was not in the expected format at all.
    #[error("unparseable line: {0}")]
    Unparseable(String),
}

/// One bidirectional network interaction summary -- the canonical internal
/// unit every input source is normalized into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    /// Source-assigned flow identifier (zeek uid, suricata flow_id, or
    /// synthesized for formats without one).
    pub uid: String,
    /// Start timestamp, seconds with fraction. Monotonic within one source.
    pub ts: f64,
    /// Originator endpoint. Always present.
    pub orig: Endpoint,
    /// Responder endpoint. One-sided records (e.g. gratuitous ARP
    /// announcements) carry none.
    pub resp: Option<Endpoint>,
    pub proto: Transport,
    pub duration: f64,
    pub orig_bytes: u64,
    pub resp_bytes: u64,
    pub orig_pkts: u64,
    pub resp_pkts: u64,
    /// Connection-state token as reported by the source (e.g. `SF`, `CON`).
    pub state: String,
    /// Optional application-layer sub-record.
    pub app: Option<AppLayer>,
}

impl FlowRecord {
    /// Check the record invariants that cannot be expressed in the types.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::NegativeDuration`] when duration is below zero,
    /// or [`FlowError::BadField`] when the timestamp is not finite.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.duration < 0.0 {
            return Err(FlowError::NegativeDuration(self.duration));
        }
        if !self.ts.is_finite() {
            return Err(FlowError::BadField {
                field: "ts".to_owned(),
                value: self.ts.to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ProfileId
// ---------------------------------------------------------------------------

/// Host identifier a profile is keyed by: address plus optional VLAN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileId {
    pub addr: IpAddr,
    pub vlan: Option<u16>,
}

impl ProfileId {
    #[must_use]
    pub fn new(addr: IpAddr) -> Self {
        Self { addr, vlan: None }
    }

    #[must_use]
    pub fn with_vlan(addr: IpAddr, vlan: u16) -> Self {
        Self { addr, vlan: Some(vlan) }
    }
}

impl fmt::Display for ProfileId {
    /// Rendered as the store key prefix: `profile_<addr>` or
    /// `profile_<addr>_<vlan>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.vlan {
            Some(v) => write!(f, "profile_{}_{v}", self.addr),
            None => write!(f, "profile_{}", self.addr),
        }
    }
}

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

/// Ordinal threat level of a piece of evidence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// A finding emitted by a detector, tying a profile + window to a detection.
/// Immutable once emitted; persisted append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: uuid::Uuid,
    pub profile: ProfileId,
    /// Time window index within the profile.
    pub twid: i64,
    /// Name of the detector module that produced this evidence.
    pub detector: String,
    /// Human-readable description, one line.
    pub description: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    pub threat_level: ThreatLevel,
    /// Uids of the flows that contributed to the detection.
    pub flow_uids: Vec<String>,
}

impl Evidence {
    /// Build a new evidence record. Confidence is clamped into `[0, 1]`.
    #[must_use]
    pub fn new(
        profile: ProfileId,
        twid: i64,
        detector: impl Into<String>,
        description: impl Into<String>,
        confidence: f64,
        threat_level: ThreatLevel,
        flow_uids: Vec<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            profile,
            twid,
            detector: detector.into(),
            description: description.into(),
            confidence: confidence.clamp(0.0, 1.0),
            threat_level,
            flow_uids,
        }
    }
}

// ---------------------------------------------------------------------------
// Channel envelope
// ---------------------------------------------------------------------------

/// Envelope carried on every pub/sub channel.
///
/// The target channel is explicit in the envelope so subscribers can filter
/// multiplexed streams without inspecting the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Store channel name this message was published to.
    pub channel: String,
    /// UTF-8 payload; schema is channel-specific (flows and evidence are
    /// JSON).
    pub payload: String,
    /// Identity of the publishing worker.
    pub producer: String,
    /// Per-producer, per-channel sequence number, starting at 1.
    pub seq: u64,
}

// ---------------------------------------------------------------------------
// Profiler queue items + ports
// ---------------------------------------------------------------------------

/// Declared type of a line arriving on stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineType {
    Zeek,
    Suricata,
    Argus,
}

impl LineType {
    /// Parse the CLI / config token naming a stdin line type.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "zeek" => Some(Self::Zeek),
            "suricata" => Some(Self::Suricata),
            "argus" => Some(Self::Argus),
            _ => None,
        }
    }
}

/// Payload of a stdin line: raw text, or the pre-parsed mapping for zeek
/// json lines (which are decoded before enqueueing).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StdinData {
    Text(String),
    Zeek(serde_json::Map<String, serde_json::Value>),
}

/// A typed stdin line wrapped for the profiler queue:
/// `{line: {data, line_type}, input_type: stdin}` in the wire's terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StdinLine {
    pub data: StdinData,
    pub line_type: LineType,
}

/// One item on the input -> profiler queue.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfilerMsg {
    /// A fully normalized flow record.
    Flow(Box<FlowRecord>),
    /// A typed raw line from stdin; parsed by the profiler using the
    /// declared line type.
    Line(StdinLine),
}

/// Errors that a [`FlowSink`] implementation may return.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueueError {
    /// Queue is full and the caller chose not to wait.
    #[error("queue full (capacity: {capacity})")]
    Full { capacity: usize },
    /// Queue has been closed; no further writes are accepted.
    #[error("queue closed")]
    Closed,
}

/// Hexagonal port: the write side of the input -> profiler queue.
///
/// Implementations live in the binary crate. The input stage depends
/// exclusively on this trait, never on a concrete adapter.
#[expect(
    async_fn_in_trait,
    reason = "no dyn dispatch needed; internal workspace only"
)]
pub trait FlowSink {
    /// Enqueue one item, waiting while the queue is at capacity.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] when the consumer is gone.
    async fn send(&self, msg: ProfilerMsg) -> Result<(), QueueError>;
}

/// Hexagonal port: the read side of the input -> profiler queue.
#[expect(
    async_fn_in_trait,
    reason = "no dyn dispatch needed; internal workspace only"
)]
pub trait FlowSource {
    /// Receive the next item, or `None` once the queue is closed and
    /// drained.
    async fn recv(&mut self) -> Option<ProfilerMsg>;
}

// ---------------------------------------------------------------------------
// Cross-worker signals
// ---------------------------------------------------------------------------

/// The single cooperative cancellation signal.
///
/// Set exactly once by the supervisor; read-only everywhere else. Workers
/// poll it (via `should_stop()` in the module host); cancellation is never
/// preemptive.
#[derive(Debug, Clone, Default)]
pub struct Termination(Arc<AtomicBool>);

impl Termination {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal termination. Idempotent.
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Shared count of user interrupts.
///
/// The first interrupt lets modules keep draining; at two, module drivers
/// exit immediately.
#[derive(Debug, Clone, Default)]
pub struct InterruptCounter(Arc<AtomicU8>);

impl InterruptCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one interrupt; returns the new count.
    pub fn raise(&self) -> u8 {
        self.0.fetch_add(1, Ordering::SeqCst).saturating_add(1)
    }

    #[must_use]
    pub fn count(&self) -> u8 {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
