// Rust guideline compliant 2026-07-21

//! Input stage: normalizes heterogeneous record sources into the single
//! flow stream the profiler consumes.
//!
//! One [`Input`] handles exactly one descriptor `{kind, path}`. Parsed
//! kinds (zeek, binetflow, nfdump, suricata) push [`ProfilerMsg::Flow`]
//! items into the injected [`FlowSink`] port; stdin pushes typed raw lines
//! wrapped as [`ProfilerMsg::Line`]. Individual record parse errors are
//! skipped, counted, and reported through the output sink -- they never
//! abort the source.
//!
//! Entry points: [`InputConfig::builder`], [`Input::run`].

pub mod argus;
pub mod binetflow;
pub mod nfdump;
pub mod suricata;
pub mod zeek;

use domain::{
    FlowRecord, FlowSink, LineType, ProfilerMsg, QueueError, StdinData, StdinLine, Termination,
};
use output::OutputHandle;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, BufReader};

/// Poll interval while tailing growing zeek files.
const TAIL_POLL: Duration = Duration::from_millis(500);

/// Log stems read by default; overridable per configuration.
pub const DEFAULT_ACCEPTED_LOGS: &[&str] = &["conn", "dns", "http", "ssl", "ssh", "smtp", "arp"];

// ---------------------------------------------------------------------------
// InputKind
// ---------------------------------------------------------------------------

/// The eight source kinds one input descriptor can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Pcap,
    Interface,
    ZeekFolder,
    ZeekLogFile,
    Binetflow,
    Nfdump,
    Suricata,
    Stdin,
}

impl InputKind {
    /// Parse the descriptor token. Unknown tokens are a supervisor error.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "pcap" => Some(Self::Pcap),
            "interface" => Some(Self::Interface),
            "zeek_folder" => Some(Self::ZeekFolder),
            "zeek_log_file" => Some(Self::ZeekLogFile),
            "binetflow" => Some(Self::Binetflow),
            "nfdump" => Some(Self::Nfdump),
            "suricata" => Some(Self::Suricata),
            "stdin" => Some(Self::Stdin),
            _ => None,
        }
    }

    /// Infer the kind from an input path: directories are zeek folders,
    /// files map by extension, the literal `stdin` reads standard input.
    #[must_use]
    pub fn infer(path: &Path) -> Option<Self> {
        if path.as_os_str() == "stdin" {
            return Some(Self::Stdin);
        }
        if path.is_dir() {
            return Some(Self::ZeekFolder);
        }
        match path.extension()?.to_str()? {
            "pcap" => Some(Self::Pcap),
            "binetflow" | "netflow" => Some(Self::Binetflow),
            "nfdump" => Some(Self::Nfdump),
            "json" => Some(Self::Suricata),
            "log" => Some(Self::ZeekLogFile),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// InputError
// ---------------------------------------------------------------------------

/// Errors that abort an input source (individual record errors never do).
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// The supplied configuration is invalid.
    #[error("invalid input configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// The file is outside the accepted zeek log set.
    #[error("rejected log file: {}", .0.display())]
    RejectedFile(PathBuf),
    /// The source could not be read.
    #[error("input io error: {0}")]
    Io(#[from] std::io::Error),
    /// The external flow tool could not be started.
    #[error("failed to spawn '{tool}': {source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },
    /// The profiler queue went away.
    #[error("profiler queue error: {0}")]
    Queue(#[from] QueueError),
}

// ---------------------------------------------------------------------------
// InputConfig + builder
// ---------------------------------------------------------------------------

/// Runtime configuration for an [`Input`].
///
/// Construct via [`InputConfig::builder`].
#[derive(Debug)]
pub struct InputConfig {
    pub kind: InputKind,
    /// File, folder, or interface name (ignored for stdin).
    pub path: PathBuf,
    /// Declared line type; required for stdin.
    pub line_type: Option<LineType>,
    /// Where the external flow tool writes its logs (pcap/interface).
    pub zeek_dir: Option<PathBuf>,
    /// Accepted zeek log stems.
    pub accepted_logs: Vec<String>,
}

/// Builder for [`InputConfig`].
#[derive(Debug)]
pub struct InputConfigBuilder {
    kind: InputKind,
    path: PathBuf,
    line_type: Option<LineType>,
    zeek_dir: Option<PathBuf>,
    accepted_logs: Vec<String>,
}

impl InputConfig {
    /// Create a builder for `kind` over `path`.
    #[must_use]
    pub fn builder(kind: InputKind, path: impl Into<PathBuf>) -> InputConfigBuilder {
        InputConfigBuilder {
            kind,
            path: path.into(),
            line_type: None,
            zeek_dir: None,
            accepted_logs: DEFAULT_ACCEPTED_LOGS.iter().map(|s| (*s).to_owned()).collect(),
        }
    }
}

impl InputConfigBuilder {
    /// Declare the stdin line type.
    #[must_use]
    pub fn line_type(mut self, line_type: LineType) -> Self {
        self.line_type = Some(line_type);
        self
    }

    /// Set the zeek output folder for pcap/interface sources.
    #[must_use]
    pub fn zeek_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.zeek_dir = Some(dir.into());
        self
    }

    /// Override the accepted zeek log stems.
    #[must_use]
    pub fn accepted_logs(mut self, stems: Vec<String>) -> Self {
        self.accepted_logs = stems;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::InvalidConfig`] when stdin lacks a line type
    /// or a pcap/interface source lacks a zeek output folder.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<InputConfig, InputError> {
        if self.kind == InputKind::Stdin && self.line_type.is_none() {
            return Err(InputError::InvalidConfig {
                reason: "stdin input requires a declared line_type".to_owned(),
            });
        }
        if matches!(self.kind, InputKind::Pcap | InputKind::Interface)
            && self.zeek_dir.is_none()
        {
            return Err(InputError::InvalidConfig {
                reason: "pcap/interface input requires a zeek output folder".to_owned(),
            });
        }
        Ok(InputConfig {
            kind: self.kind,
            path: self.path,
            line_type: self.line_type,
            zeek_dir: self.zeek_dir,
            accepted_logs: self.accepted_logs,
        })
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Counters reported when a source is drained.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InputSummary {
    /// Items enqueued for the profiler.
    pub flows: u64,
    /// Records skipped over parse errors.
    pub skipped: u64,
}

/// The input stage worker for one source.
///
/// Generic over the [`FlowSink`] port per call for zero-cost static
/// dispatch; holds only transient buffers and counters.
#[derive(Debug)]
pub struct Input {
    config: InputConfig,
    output: OutputHandle,
    term: Termination,
    summary: InputSummary,
}

impl Input {
    #[must_use]
    pub fn new(config: InputConfig, output: OutputHandle, term: Termination) -> Self {
        Self {
            config,
            output,
            term,
            summary: InputSummary::default(),
        }
    }

    /// Drain the configured source into `sink`.
    ///
    /// On success the source is fully read (interfaces: tailed until
    /// termination). Individual record parse errors are skipped and
    /// counted, never fatal.
    ///
    /// # Errors
    ///
    /// Returns [`InputError`] when the source itself cannot be read or the
    /// profiler queue closes underneath us.
    pub async fn run<S: FlowSink>(&mut self, sink: &S) -> Result<InputSummary, InputError> {
        match self.config.kind {
            InputKind::Pcap | InputKind::Interface => {
                self.handle_pcap_and_interface(sink).await?;
            }
            InputKind::ZeekFolder => {
                let dir = self.config.path.clone();
                self.read_zeek_folder(&dir, false, sink).await?;
            }
            InputKind::ZeekLogFile => self.handle_zeek_log_file(sink).await?,
            InputKind::Binetflow => self.handle_binetflow(sink).await?,
            InputKind::Nfdump => self.handle_nfdump(sink).await?,
            InputKind::Suricata => self.handle_suricata(sink).await?,
            InputKind::Stdin => {
                let stdin = BufReader::new(tokio::io::stdin());
                self.read_stdin_lines(stdin, sink).await?;
            }
        }
        self.output.send(
            2,
            0,
            "input",
            format!(
                "Total flows read: {} (skipped {})",
                self.summary.flows, self.summary.skipped
            ),
        );
        Ok(self.summary)
    }

    async fn send_flow<S: FlowSink>(&mut self, sink: &S, flow: FlowRecord) -> Result<(), InputError> {
        sink.send(ProfilerMsg::Flow(Box::new(flow))).await?;
        self.summary.flows += 1;
        Ok(())
    }

    fn skip_record(&mut self, context: &str, err: &domain::FlowError) {
        self.summary.skipped += 1;
        self.output
            .send(0, 2, "input", format!("skipping record from {context}: {err}"));
    }

    // -- pcap / interface -------------------------------------------------

    /// Spawn the external flow tool with its logs redirected into the zeek
    /// folder, then scan that folder. Interfaces tail until termination;
    /// pcaps complete when the tool exits.
    async fn handle_pcap_and_interface<S: FlowSink>(&mut self, sink: &S) -> Result<(), InputError> {
        let zeek_dir = self
            .config
            .zeek_dir
            .clone()
            .unwrap_or_else(|| self.config.path.with_extension("zeek"));
        tokio::fs::create_dir_all(&zeek_dir).await?;

        let mut cmd = tokio::process::Command::new("zeek");
        cmd.current_dir(&zeek_dir);
        match self.config.kind {
            InputKind::Pcap => {
                let pcap = std::fs::canonicalize(&self.config.path)?;
                cmd.arg("-C").arg("-r").arg(pcap);
            }
            _ => {
                cmd.arg("-C").arg("-i").arg(&self.config.path);
            }
        }
        cmd.arg("local");
        let mut child = cmd.spawn().map_err(|source| InputError::Spawn {
            tool: "zeek".to_owned(),
            source,
        })?;

        if self.config.kind == InputKind::Pcap {
            let status = child.wait().await?;
            if !status.success() {
                self.output
                    .error("input", format!("flow tool exited with {status}"));
            }
            self.read_zeek_folder(&zeek_dir, false, sink).await?;
        } else {
            let result = self.read_zeek_folder(&zeek_dir, true, sink).await;
            // The interface run only ends on termination; reap the tool.
            drop(child.kill().await);
            result?;
        }
        Ok(())
    }

    // -- zeek folder / file ----------------------------------------------

    fn accepts_stem(&self, stem: &str) -> bool {
        zeek::ZeekLogKind::from_stem(stem).is_some()
            && self.config.accepted_logs.iter().any(|s| s == stem)
    }

    /// Enumerate `*.log` files with accepted stems. In tail mode the scan
    /// repeats so logs created later are picked up.
    fn scan_folder(&self, dir: &Path, known: &[ZeekFileReader]) -> std::io::Result<Vec<PathBuf>> {
        let mut found = vec![];
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_log = path.extension().is_some_and(|e| e == "log");
            let stem_ok = path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|s| self.accepts_stem(s));
            if is_log && stem_ok && !known.iter().any(|r| r.path == path) {
                found.push(path);
            }
        }
        found.sort();
        Ok(found)
    }

    async fn read_zeek_folder<S: FlowSink>(
        &mut self,
        dir: &Path,
        tail: bool,
        sink: &S,
    ) -> Result<(), InputError> {
        let mut readers: Vec<ZeekFileReader> = vec![];
        loop {
            for path in self.scan_folder(dir, &readers)? {
                readers.push(ZeekFileReader::open(&path).await?);
            }

            let mut progressed = false;
            for i in 0..readers.len() {
                progressed |= self.drain_reader(i, &mut readers, sink).await?;
            }

            if !tail {
                return Ok(());
            }
            if self.term.is_set() {
                return Ok(());
            }
            if !progressed {
                tokio::time::sleep(TAIL_POLL).await;
            }
        }
    }

    /// Read every currently-available line of one zeek file. Returns
    /// whether any line was consumed.
    async fn drain_reader<S: FlowSink>(
        &mut self,
        idx: usize,
        readers: &mut [ZeekFileReader],
        sink: &S,
    ) -> Result<bool, InputError> {
        let mut progressed = false;
        loop {
            let reader = &mut readers[idx];
            let mut line = String::new();
            if reader.file.read_line(&mut line).await? == 0 {
                return Ok(progressed);
            }
            progressed = true;
            let context = reader.path.display().to_string();
            match reader.parser.feed(&line) {
                Ok(Some(flow)) => self.send_flow(sink, flow).await?,
                Ok(None) => {}
                Err(e) => self.skip_record(&context, &e),
            }
        }
    }

    /// Single-file variant: reject non-`.log` extensions and stems outside
    /// the accepted set, then read the file to EOF.
    async fn handle_zeek_log_file<S: FlowSink>(&mut self, sink: &S) -> Result<(), InputError> {
        let path = self.config.path.clone();
        let extension_ok = path.extension().is_some_and(|e| e == "log");
        let stem_ok = path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|s| self.accepts_stem(s));
        if !extension_ok || !stem_ok {
            return Err(InputError::RejectedFile(path));
        }
        let mut readers = vec![ZeekFileReader::open(&path).await?];
        self.drain_reader(0, &mut readers, sink).await?;
        Ok(())
    }

    // -- line-oriented files ----------------------------------------------

    async fn handle_binetflow<S: FlowSink>(&mut self, sink: &S) -> Result<(), InputError> {
        let path = self.config.path.clone();
        let file = tokio::fs::File::open(&path).await?;
        let mut lines = BufReader::new(file).lines();
        let Some(header) = lines.next_line().await? else {
            return Ok(());
        };
        let parser = match binetflow::BinetflowParser::from_header(&header) {
            Ok(p) => p,
            Err(e) => {
                self.output
                    .error("input", format!("bad binetflow header in {}: {e}", path.display()));
                return Ok(());
            }
        };
        let context = path.display().to_string();
        while let Some(line) = lines.next_line().await? {
            match parser.parse_line(&line) {
                Ok(Some(flow)) => self.send_flow(sink, flow).await?,
                Ok(None) => {}
                Err(e) => self.skip_record(&context, &e),
            }
        }
        Ok(())
    }

    async fn handle_nfdump<S: FlowSink>(&mut self, sink: &S) -> Result<(), InputError> {
        let path = self.config.path.clone();
        let file = tokio::fs::File::open(&path).await?;
        let mut lines = BufReader::new(file).lines();
        let context = path.display().to_string();
        while let Some(line) = lines.next_line().await? {
            match nfdump::parse_line(&line) {
                Ok(Some(flow)) => self.send_flow(sink, flow).await?,
                Ok(None) => {}
                Err(e) => self.skip_record(&context, &e),
            }
        }
        Ok(())
    }

    async fn handle_suricata<S: FlowSink>(&mut self, sink: &S) -> Result<(), InputError> {
        let path = self.config.path.clone();
        let file = tokio::fs::File::open(&path).await?;
        let mut lines = BufReader::new(file).lines();
        let context = path.display().to_string();
        while let Some(line) = lines.next_line().await? {
            match suricata::parse_line(&line) {
                Ok(Some(flow)) => self.send_flow(sink, flow).await?,
                Ok(None) => {}
                Err(e) => self.skip_record(&context, &e),
            }
        }
        Ok(())
    }

    // -- stdin ------------------------------------------------------------

    /// Read typed lines until the `done` sentinel. Zeek lines are
    /// pre-parsed from JSON text before enqueueing; the rest travel as raw
    /// text for the profiler to parse by the declared type.
    async fn read_stdin_lines<R, S>(&mut self, reader: R, sink: &S) -> Result<(), InputError>
    where
        R: AsyncBufRead + Unpin,
        S: FlowSink,
    {
        // Validated at build time.
        let Some(line_type) = self.config.line_type else {
            return Err(InputError::InvalidConfig {
                reason: "stdin input requires a declared line_type".to_owned(),
            });
        };
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim() == "done" {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            let data = if line_type == LineType::Zeek {
                match serde_json::from_str(&line) {
                    Ok(map) => StdinData::Zeek(map),
                    Err(_) => {
                        self.skip_record(
                            "stdin",
                            &domain::FlowError::Unparseable(line.clone()),
                        );
                        continue;
                    }
                }
            } else {
                StdinData::Text(line)
            };
            sink.send(ProfilerMsg::Line(StdinLine { data, line_type })).await?;
            self.summary.flows += 1;
        }
        Ok(())
    }
}

/// One open zeek log file with its incremental parser.
#[derive(Debug)]
struct ZeekFileReader {
    path: PathBuf,
    file: BufReader<tokio::fs::File>,
    parser: zeek::ZeekFileParser,
}

impl ZeekFileReader {
    async fn open(path: &Path) -> std::io::Result<Self> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        // Callers only open accepted stems.
        let kind = zeek::ZeekLogKind::from_stem(stem)
            .unwrap_or(zeek::ZeekLogKind::Conn);
        let file = tokio::fs::File::open(path).await?;
        Ok(Self {
            path: path.to_owned(),
            file: BufReader::new(file),
            parser: zeek::ZeekFileParser::new(kind),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{AppLayer, FlowSink, ProfilerMsg, QueueError, Termination};
    use output::OutputConfig;
    use std::cell::RefCell;
    use std::io::Write as _;

    // ------------------------------------------------------------------
    // Test helpers
    // ------------------------------------------------------------------

    /// Sink that records everything it receives.
    struct MockSink {
        items: RefCell<Vec<ProfilerMsg>>,
    }

    impl MockSink {
        fn new() -> Self {
            Self {
                items: RefCell::new(vec![]),
            }
        }

        fn flows(&self) -> Vec<domain::FlowRecord> {
            self.items
                .borrow()
                .iter()
                .filter_map(|m| match m {
                    ProfilerMsg::Flow(f) => Some((**f).clone()),
                    ProfilerMsg::Line(_) => None,
                })
                .collect()
        }

        fn lines(&self) -> Vec<domain::StdinLine> {
            self.items
                .borrow()
                .iter()
                .filter_map(|m| match m {
                    ProfilerMsg::Line(l) => Some(l.clone()),
                    ProfilerMsg::Flow(_) => None,
                })
                .collect()
        }
    }

    impl FlowSink for MockSink {
        async fn send(&self, msg: ProfilerMsg) -> Result<(), QueueError> {
            self.items.borrow_mut().push(msg);
            Ok(())
        }
    }

    fn make_input(config: InputConfig) -> Input {
        let (handle, _sink) = output::channel(OutputConfig::builder().build().unwrap());
        Input::new(config, handle, Termination::new())
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    // ------------------------------------------------------------------
    // Kind parsing / inference
    // ------------------------------------------------------------------

    #[test]
    fn kind_from_token() {
        assert_eq!(InputKind::from_token("pcap"), Some(InputKind::Pcap));
        assert_eq!(InputKind::from_token("ZEEK_FOLDER"), Some(InputKind::ZeekFolder));
        assert_eq!(InputKind::from_token("carrier-pigeon"), None);
    }

    #[test]
    fn kind_inference_by_path() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(InputKind::infer(dir.path()), Some(InputKind::ZeekFolder));
        assert_eq!(
            InputKind::infer(Path::new("capture.pcap")),
            Some(InputKind::Pcap)
        );
        assert_eq!(
            InputKind::infer(Path::new("flows.binetflow")),
            Some(InputKind::Binetflow)
        );
        assert_eq!(
            InputKind::infer(Path::new("eve.json")),
            Some(InputKind::Suricata)
        );
        assert_eq!(
            InputKind::infer(Path::new("conn.log")),
            Some(InputKind::ZeekLogFile)
        );
        assert_eq!(InputKind::infer(Path::new("stdin")), Some(InputKind::Stdin));
        assert_eq!(InputKind::infer(Path::new("notes.txt")), None);
    }

    // ------------------------------------------------------------------
    // Config validation
    // ------------------------------------------------------------------

    #[test]
    fn stdin_config_requires_line_type() {
        let result = InputConfig::builder(InputKind::Stdin, "stdin").build();
        assert!(matches!(result, Err(InputError::InvalidConfig { .. })));
    }

    #[test]
    fn pcap_config_requires_zeek_dir() {
        let result = InputConfig::builder(InputKind::Pcap, "x.pcap").build();
        assert!(matches!(result, Err(InputError::InvalidConfig { .. })));
    }

    // ------------------------------------------------------------------
    // Binetflow source
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn binetflow_file_drains_and_counts_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "test.binetflow",
            "StartTime,Dur,Proto,SrcAddr,Sport,Dir,DstAddr,Dport,State,sTos,dTos,TotPkts,TotBytes,SrcBytes,Label\n\
             2019/04/05 16:15:09.194268,0.031142,udp,10.8.0.69,8278,  <->,8.8.8.8,53,CON,0,0,2,186,64,x\n\
             2019/04/05 16:15:10.000000,-1.0,udp,10.8.0.69,8278,  <->,8.8.8.8,53,CON,0,0,2,186,64,x\n\
             2019/04/05 16:15:11.500000,0.5,tcp,10.8.0.70,40000,  ->,1.1.1.1,443,FSA,0,0,5,500,300,x\n",
        );
        let config = InputConfig::builder(InputKind::Binetflow, path).build().unwrap();
        let mut input = make_input(config);
        let sink = MockSink::new();

        let summary = input.run(&sink).await.unwrap();
        assert_eq!(summary.flows, 2, "negative-duration row must be skipped");
        assert_eq!(summary.skipped, 1);
        let flows = sink.flows();
        assert_eq!(flows[0].resp.unwrap().port, Some(53));
        assert_eq!(flows[1].resp.unwrap().port, Some(443));
        assert!(flows[0].ts < flows[1].ts, "source order must be preserved");
    }

    // ------------------------------------------------------------------
    // Zeek log file source
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn zeek_log_file_accepts_conn_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "conn.log",
            r#"{"ts":1.0,"uid":"C1","id.orig_h":"10.0.0.1","id.orig_p":1,"id.resp_h":"10.0.0.2","id.resp_p":2,"proto":"tcp","duration":0.1,"orig_bytes":1,"resp_bytes":1,"conn_state":"SF","orig_pkts":1,"resp_pkts":1}
{"ts":2.0,"uid":"C2","id.orig_h":"10.0.0.1","id.orig_p":3,"id.resp_h":"10.0.0.3","id.resp_p":4,"proto":"udp","duration":0.2,"orig_bytes":2,"resp_bytes":2,"conn_state":"SF","orig_pkts":1,"resp_pkts":1}
"#,
        );
        let config = InputConfig::builder(InputKind::ZeekLogFile, path).build().unwrap();
        let mut input = make_input(config);
        let sink = MockSink::new();

        let summary = input.run(&sink).await.unwrap();
        assert_eq!(summary.flows, 2);
        assert_eq!(summary.skipped, 0);
    }

    #[tokio::test]
    async fn zeek_log_file_rejects_wrong_extension_and_stem() {
        let dir = tempfile::tempdir().unwrap();
        // Valid content, wrong name: "conn" has no .log extension.
        let no_ext = write_file(&dir, "conn", "{}");
        let config = InputConfig::builder(InputKind::ZeekLogFile, no_ext).build().unwrap();
        let mut input = make_input(config);
        let sink = MockSink::new();
        assert!(matches!(
            input.run(&sink).await,
            Err(InputError::RejectedFile(_))
        ));

        // x509.log is outside the accepted set.
        let x509 = write_file(&dir, "x509.log", "{}");
        let config = InputConfig::builder(InputKind::ZeekLogFile, x509).build().unwrap();
        let mut input = make_input(config);
        assert!(matches!(
            input.run(&sink).await,
            Err(InputError::RejectedFile(_))
        ));
    }

    // ------------------------------------------------------------------
    // Zeek folder source
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn zeek_folder_reads_accepted_logs_only() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            &dir,
            "conn.log",
            "#separator \\x09\n#fields\tts\tuid\tid.orig_h\tid.orig_p\tid.resp_h\tid.resp_p\tproto\tduration\torig_bytes\tresp_bytes\tconn_state\torig_pkts\tresp_pkts\n1.5\tCt1\t10.0.0.1\t1111\t10.0.0.9\t80\ttcp\t0.3\t10\t20\tSF\t2\t2\n",
        );
        write_file(
            &dir,
            "dns.log",
            r#"{"ts":2.5,"uid":"Cd1","id.orig_h":"10.0.0.1","id.orig_p":5353,"id.resp_h":"8.8.8.8","id.resp_p":53,"query":"a.example","qtype_name":"A","rcode_name":"NOERROR"}
"#,
        );
        write_file(
            &dir,
            "arp.log",
            r#"{"ts":3.5,"operation":"request","orig_h":"10.0.0.1","resp_h":"10.0.0.9"}
"#,
        );
        write_file(&dir, "x509.log", "{\"not\":\"read\"}\n");
        write_file(&dir, "notes.txt", "not a log\n");

        let config =
            InputConfig::builder(InputKind::ZeekFolder, dir.path()).build().unwrap();
        let mut input = make_input(config);
        let sink = MockSink::new();

        let summary = input.run(&sink).await.unwrap();
        assert_eq!(summary.flows, 3);
        let flows = sink.flows();
        let dns = flows
            .iter()
            .find(|f| matches!(f.app, Some(AppLayer::Dns(_))))
            .expect("dns.log flow must carry its sub-record");
        assert_eq!(dns.resp.unwrap().port, Some(53));
        let arp = flows
            .iter()
            .find(|f| f.proto == domain::Transport::Arp)
            .expect("arp.log flow must be admitted by the accepted set");
        assert_eq!(arp.orig.port, None);
        assert_eq!(arp.state, "request");
    }

    // ------------------------------------------------------------------
    // Stdin source
    // ------------------------------------------------------------------

    const STDIN_ZEEK_LINE: &str = r#"{"ts":271.102532,"uid":"CsYeNL1xflv3dW9hvb","id.orig_h":"10.0.2.15","id.orig_p":59393,"id.resp_h":"216.58.201.98","id.resp_p":443,"proto":"udp","duration":0.5936019999999758,"orig_bytes":5219,"resp_bytes":5685,"conn_state":"SF","missed_bytes":0,"history":"Dd","orig_pkts":9,"orig_ip_bytes":5471,"resp_pkts":10,"resp_ip_bytes":5965}"#;

    #[tokio::test]
    async fn stdin_zeek_lines_are_preparsed_and_wrapped() {
        let config = InputConfig::builder(InputKind::Stdin, "stdin")
            .line_type(LineType::Zeek)
            .build()
            .unwrap();
        let mut input = make_input(config);
        let sink = MockSink::new();

        let stream = format!("{STDIN_ZEEK_LINE}\ndone\nignored after sentinel\n");
        input
            .read_stdin_lines(BufReader::new(stream.as_bytes()), &sink)
            .await
            .unwrap();

        let lines = sink.lines();
        assert_eq!(lines.len(), 1, "sentinel must terminate the stream");
        assert_eq!(lines[0].line_type, LineType::Zeek);
        match &lines[0].data {
            StdinData::Zeek(map) => {
                assert_eq!(
                    map.get("uid").and_then(|v| v.as_str()),
                    Some("CsYeNL1xflv3dW9hvb")
                );
            }
            StdinData::Text(t) => panic!("zeek line must be pre-parsed, got text {t}"),
        }
    }

    #[tokio::test]
    async fn stdin_argus_lines_stay_text() {
        let config = InputConfig::builder(InputKind::Stdin, "stdin")
            .line_type(LineType::Argus)
            .build()
            .unwrap();
        let mut input = make_input(config);
        let sink = MockSink::new();

        let stream =
            "2019/04/05 16:15:09.194268,0.031142,udp,10.8.0.69,8278,  <->,8.8.8.8,53,CON,0,0,2,186,64,1,\ndone\n";
        input
            .read_stdin_lines(BufReader::new(stream.as_bytes()), &sink)
            .await
            .unwrap();

        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].line_type, LineType::Argus);
        assert!(matches!(lines[0].data, StdinData::Text(_)));
    }

    #[tokio::test]
    async fn stdin_unparseable_zeek_line_is_skipped() {
        let config = InputConfig::builder(InputKind::Stdin, "stdin")
            .line_type(LineType::Zeek)
            .build()
            .unwrap();
        let mut input = make_input(config);
        let sink = MockSink::new();

        let stream = "this is not json\ndone\n";
        input
            .read_stdin_lines(BufReader::new(stream.as_bytes()), &sink)
            .await
            .unwrap();
        assert!(sink.lines().is_empty());
        assert_eq!(input.summary.skipped, 1);
    }

    // ------------------------------------------------------------------
    // Suricata source
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn suricata_file_drains_flow_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "eve.json",
            r#"{"timestamp":"2021-06-06T15:57:37.272281+0200","flow_id":1,"event_type":"flow","src_ip":"10.0.0.1","src_port":1,"dest_ip":"10.0.0.2","dest_port":2,"proto":"TCP","flow":{"pkts_toserver":1,"pkts_toclient":1,"bytes_toserver":10,"bytes_toclient":10,"state":"closed"}}
{"timestamp":"2021-06-06T15:57:38.000000+0200","event_type":"stats","stats":{}}
"#,
        );
        let config = InputConfig::builder(InputKind::Suricata, path).build().unwrap();
        let mut input = make_input(config);
        let sink = MockSink::new();

        let summary = input.run(&sink).await.unwrap();
        assert_eq!(summary.flows, 1, "stats event is not a flow");
        assert_eq!(summary.skipped, 0);
    }
}
