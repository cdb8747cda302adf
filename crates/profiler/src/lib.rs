// Rust guideline compliant 2026-07-22

//! Profiler stage: aggregates the flow stream into per-host, per-time-window
//! behavioral profiles.
//!
//! For every flow: derive the host identifier (the originator endpoint;
//! `direction = all` also updates the responder's profile), look up or
//! create the profile, compute the window index from the profile's
//! reference time, fold the flow into the per-destination tuple, persist
//! the tuple to the KV store, and publish on the channel fabric
//! (`new_ip` / `new_tw` / `new_flow` plus the app-layer channels).
//!
//! Entry points: [`ProfilerConfig::builder`], [`Profiler::run`].

use domain::{
    AppLayer, Endpoint, FlowError, FlowRecord, FlowSource, LineType, ProfileId, ProfilerMsg,
    StdinData, StdinLine,
};
use output::OutputHandle;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::IpAddr;
use store::KvStore;
use store::channels;

// ---------------------------------------------------------------------------
// ProfilerError
// ---------------------------------------------------------------------------

/// Errors around profiler configuration.
#[derive(Debug, thiserror::Error)]
pub enum ProfilerError {
    /// The supplied configuration is invalid.
    #[error("invalid profiler configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Direction + HomeNetwork
// ---------------------------------------------------------------------------

/// Which endpoints of a flow update a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Only the originator endpoint owns the flow.
    #[default]
    Out,
    /// Both endpoints get a profile update (doubles the profile count).
    All,
}

impl Direction {
    /// Parse the configuration token.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "out" => Some(Self::Out),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

/// CIDR network confining profile creation to local hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HomeNetwork {
    net: IpAddr,
    prefix: u8,
}

impl HomeNetwork {
    /// Parse `a.b.c.d/nn` (or a bare address, meaning a host route).
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let (addr_part, prefix_part) = match raw.split_once('/') {
            Some((a, p)) => (a, Some(p)),
            None => (raw, None),
        };
        let net: IpAddr = addr_part.trim().parse().ok()?;
        let max = if net.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix_part {
            Some(p) => p.trim().parse().ok().filter(|&p| p <= max)?,
            None => max,
        };
        Some(Self { net, prefix })
    }

    /// Membership test; address families never match across each other.
    #[must_use]
    pub fn contains(&self, addr: IpAddr) -> bool {
        if self.prefix == 0 {
            return matches!(
                (self.net, addr),
                (IpAddr::V4(_), IpAddr::V4(_)) | (IpAddr::V6(_), IpAddr::V6(_))
            );
        }
        match (self.net, addr) {
            (IpAddr::V4(net), IpAddr::V4(a)) => {
                let shift = 32 - u32::from(self.prefix);
                (u32::from(a) >> shift) == (u32::from(net) >> shift)
            }
            (IpAddr::V6(net), IpAddr::V6(a)) => {
                let shift = 128 - u32::from(self.prefix);
                (u128::from(a) >> shift) == (u128::from(net) >> shift)
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// ProfilerConfig + builder
// ---------------------------------------------------------------------------

/// Runtime configuration for a [`Profiler`].
///
/// Construct via [`ProfilerConfig::builder`].
#[derive(Debug)]
pub struct ProfilerConfig {
    /// Time window width W, seconds.
    pub width: f64,
    pub direction: Direction,
    /// When set, only hosts inside this network get profiles.
    pub home_network: Option<HomeNetwork>,
    /// Minimum flows in a destination tuple before it is reported
    /// (`-1` disables the threshold).
    pub min_flows: i64,
}

/// Builder for [`ProfilerConfig`].
#[derive(Debug)]
pub struct ProfilerConfigBuilder {
    width: f64,
    direction: Direction,
    home_network: Option<HomeNetwork>,
    min_flows: i64,
}

impl ProfilerConfig {
    /// Create a builder. `width` is the only required parameter.
    ///
    /// Defaults: `direction = out`, no home network, threshold disabled.
    #[must_use]
    pub fn builder(width: f64) -> ProfilerConfigBuilder {
        ProfilerConfigBuilder {
            width,
            direction: Direction::Out,
            home_network: None,
            min_flows: -1,
        }
    }
}

impl ProfilerConfigBuilder {
    /// Select which endpoints update profiles.
    #[must_use]
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Confine profile creation to `net`.
    #[must_use]
    pub fn home_network(mut self, net: HomeNetwork) -> Self {
        self.home_network = Some(net);
        self
    }

    /// Set the tuple reporting threshold.
    #[must_use]
    pub fn min_flows(mut self, min_flows: i64) -> Self {
        self.min_flows = min_flows;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProfilerError::InvalidConfig`] when the width is not a
    /// positive finite number.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<ProfilerConfig, ProfilerError> {
        if !(self.width.is_finite() && self.width > 0.0) {
            return Err(ProfilerError::InvalidConfig {
                reason: "time window width must be a positive number of seconds".to_owned(),
            });
        }
        Ok(ProfilerConfig {
            width: self.width,
            direction: self.direction,
            home_network: self.home_network,
            min_flows: self.min_flows,
        })
    }
}

// ---------------------------------------------------------------------------
// Profile state
// ---------------------------------------------------------------------------

/// Per-destination aggregate inside one time window.
#[derive(Debug, Default, Clone, Serialize)]
pub struct DstTuple {
    pub flows: u64,
    pub pkts: u64,
    pub bytes: u64,
    pub total_duration: f64,
    pub dst_ports: BTreeSet<u16>,
}

#[derive(Debug, Default)]
struct WindowState {
    tuples: HashMap<String, DstTuple>,
    first_ts: Option<f64>,
    last_ts: Option<f64>,
}

#[derive(Debug)]
struct ProfileState {
    /// Reference time t0: timestamp of the first flow seen for this host.
    t0: f64,
    windows: BTreeMap<i64, WindowState>,
}

/// Counters reported when the profiler drains and exits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProfilerSummary {
    /// Flows folded into profiles.
    pub processed: u64,
    /// Records skipped over validation or stdin parse errors.
    pub skipped: u64,
}

// ---------------------------------------------------------------------------
// Profiler
// ---------------------------------------------------------------------------

/// The profiler stage worker.
#[derive(Debug)]
pub struct Profiler {
    config: ProfilerConfig,
    kv: KvStore,
    output: OutputHandle,
    profiles: HashMap<ProfileId, ProfileState>,
    summary: ProfilerSummary,
}

impl Profiler {
    #[must_use]
    pub fn new(config: ProfilerConfig, kv: KvStore, output: OutputHandle) -> Self {
        Self {
            config,
            kv,
            output,
            profiles: HashMap::new(),
            summary: ProfilerSummary::default(),
        }
    }

    /// Consume the flow queue until it closes, then report totals.
    pub async fn run<R: FlowSource>(&mut self, source: &mut R) -> ProfilerSummary {
        self.report_width();
        while let Some(msg) = source.recv().await {
            match msg {
                ProfilerMsg::Flow(flow) => self.process_flow(&flow),
                ProfilerMsg::Line(line) => match parse_stdin_line(&line) {
                    Ok(Some(flow)) => self.process_flow(&flow),
                    Ok(None) => {}
                    Err(e) => {
                        self.summary.skipped += 1;
                        self.output
                            .send(0, 2, "profiler", format!("skipping stdin line: {e}"));
                    }
                },
            }
        }
        self.output.send(
            2,
            0,
            "profiler",
            format!(
                "Profiled {} flows into {} profiles ({} skipped)",
                self.summary.processed,
                self.profiles.len(),
                self.summary.skipped
            ),
        );
        log::info!(
            "profiler.run.stopped: processed={} profiles={}",
            self.summary.processed,
            self.profiles.len()
        );
        self.summary
    }

    /// Announce the configured window width, in days once it spans them.
    fn report_width(&self) {
        let days = (self.config.width / 86_400.0).floor();
        let text = if days >= 1.0 {
            format!(
                "Time window width: {} seconds, reporting activity in the last {days:.0} days",
                self.config.width
            )
        } else {
            format!("Time window width: {} seconds", self.config.width)
        };
        self.output.send(1, 0, "profiler", text);
    }

    fn process_flow(&mut self, flow: &FlowRecord) {
        if let Err(e) = flow.validate() {
            self.summary.skipped += 1;
            self.output
                .send(0, 2, "profiler", format!("skipping flow {}: {e}", flow.uid));
            return;
        }

        self.update_profile(flow.orig.addr, flow.resp, flow);
        if self.config.direction == Direction::All
            && let Some(resp) = flow.resp
        {
            self.update_profile(resp.addr, Some(flow.orig), flow);
        }

        let payload = serde_json::to_string(flow).unwrap_or_default();
        self.kv.publish("profiler", channels::NEW_FLOW, payload.clone());
        match &flow.app {
            Some(AppLayer::Dns(_)) => {
                self.kv.publish("profiler", channels::NEW_DNS, payload);
            }
            Some(AppLayer::Http(_)) => {
                self.kv.publish("profiler", channels::NEW_HTTP, payload);
            }
            Some(AppLayer::Ssl(_)) => {
                self.kv.publish("profiler", channels::NEW_SSL, payload);
            }
            _ => {}
        }
        self.summary.processed += 1;
    }

    /// Fold one flow into the profile of `host`, with `dst` as the remote
    /// side of the tuple. One-sided records fold into the `-` tuple.
    fn update_profile(&mut self, host: IpAddr, dst: Option<Endpoint>, flow: &FlowRecord) {
        if let Some(home) = &self.config.home_network
            && !home.contains(host)
        {
            return;
        }

        let pid = ProfileId::new(host);
        if !self.profiles.contains_key(&pid) {
            self.profiles.insert(
                pid,
                ProfileState {
                    t0: flow.ts,
                    windows: BTreeMap::new(),
                },
            );
            self.kv.zadd("profiles", flow.ts, &pid.to_string());
            self.kv.publish("profiler", channels::NEW_IP, pid.to_string());
        }
        // Window bookkeeping happens before the mutable tuple borrow.
        let (idx, created) = {
            let state = self.profiles.get_mut(&pid).expect("inserted above");
            let idx = window_index(flow.ts, state.t0, self.config.width);
            let created = fill_windows(&mut state.windows, idx);
            (idx, created)
        };
        for twid in created {
            let payload = serde_json::json!({ "profile": pid.to_string(), "twid": twid });
            self.kv
                .publish("profiler", channels::NEW_TW, payload.to_string());
        }

        let tuple_key = match dst {
            Some(ep) => match ep.port {
                Some(p) => format!("{}:{p}/{}", ep.addr, flow.proto),
                None => format!("{}/{}", ep.addr, flow.proto),
            },
            None => format!("-/{}", flow.proto),
        };
        let state = self.profiles.get_mut(&pid).expect("inserted above");
        let window = state.windows.get_mut(&idx).expect("filled above");
        window.first_ts = Some(window.first_ts.map_or(flow.ts, |t| t.min(flow.ts)));
        window.last_ts = Some(window.last_ts.map_or(flow.ts, |t| t.max(flow.ts)));

        let tuple = window.tuples.entry(tuple_key.clone()).or_default();
        tuple.flows += 1;
        tuple.pkts += flow.orig_pkts + flow.resp_pkts;
        tuple.bytes += flow.orig_bytes + flow.resp_bytes;
        tuple.total_duration += flow.duration;
        if let Some(p) = dst.and_then(|ep| ep.port) {
            tuple.dst_ports.insert(p);
        }
        let reached_threshold =
            self.config.min_flows > 0 && tuple.flows == self.config.min_flows.unsigned_abs();
        let tuple_json = serde_json::to_string(tuple).unwrap_or_default();
        self.kv.hset(&format!("{pid}_tw{idx}"), &tuple_key, tuple_json);

        if reached_threshold {
            self.output.send(
                3,
                0,
                "profiler",
                format!("{pid} tw{idx}: {tuple_key} reached {} flows", self.config.min_flows),
            );
        }
    }

    // -- accessors used by the supervisor and tests ----------------------

    /// Number of profiles created so far.
    #[must_use]
    pub fn profile_count(&self) -> usize {
        self.profiles.len()
    }

    /// Sum of tuple flow counters over every profile and window.
    #[must_use]
    pub fn total_window_flows(&self) -> u64 {
        self.profiles
            .values()
            .flat_map(|p| p.windows.values())
            .flat_map(|w| w.tuples.values())
            .map(|t| t.flows)
            .sum()
    }

    /// Window indices of one profile, ascending.
    #[must_use]
    pub fn windows_of(&self, pid: &ProfileId) -> Vec<i64> {
        self.profiles
            .get(pid)
            .map(|p| p.windows.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Timestamp bounds of one window, when any flow landed in it.
    #[must_use]
    pub fn window_bounds(&self, pid: &ProfileId, twid: i64) -> Option<(f64, f64)> {
        let window = self.profiles.get(pid)?.windows.get(&twid)?;
        Some((window.first_ts?, window.last_ts?))
    }
}

/// Window index of a flow at `ts` for a profile with reference time `t0`.
#[must_use]
fn window_index(ts: f64, t0: f64, width: f64) -> i64 {
    #[expect(clippy::cast_possible_truncation, reason = "window indices fit i64")]
    let idx = ((ts - t0) / width).floor() as i64;
    idx
}

/// Ensure `idx` exists and the index range stays contiguous; gaps between
/// the existing range and `idx` are filled with empty windows. Returns the
/// newly created indices, ascending.
fn fill_windows(windows: &mut BTreeMap<i64, WindowState>, idx: i64) -> Vec<i64> {
    let mut created = vec![];
    if windows.is_empty() {
        windows.insert(idx, WindowState::default());
        return vec![idx];
    }
    let min = *windows.keys().next().expect("non-empty");
    let max = *windows.keys().next_back().expect("non-empty");
    if idx > max {
        for i in (max + 1)..=idx {
            windows.insert(i, WindowState::default());
            created.push(i);
        }
    } else if idx < min {
        for i in idx..min {
            windows.insert(i, WindowState::default());
            created.push(i);
        }
    }
    created
}

/// Parse a typed stdin line by its declared line type.
fn parse_stdin_line(line: &StdinLine) -> Result<Option<FlowRecord>, FlowError> {
    match (line.line_type, &line.data) {
        (LineType::Zeek, StdinData::Zeek(map)) => {
            input::zeek::flow_from_conn_map(map).map(Some)
        }
        (LineType::Suricata, StdinData::Text(text)) => input::suricata::parse_line(text),
        (LineType::Argus, StdinData::Text(text)) => input::argus::parse_line(text),
        _ => Err(FlowError::Unparseable(
            "stdin payload does not match its declared line type".to_owned(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
