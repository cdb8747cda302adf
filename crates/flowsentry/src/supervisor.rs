// Rust guideline compliant 2026-07-29

//! Supervisor: starts every stage as an independent worker, owns the
//! termination signal and the interrupt counter, and reaps all workers at
//! shutdown.
//!
//! Shutdown sequence: when the input worker drains its source (or on the
//! first interrupt), the termination flag is set; the profiler exits once
//! the flow queue closes; each module exits once its channels go quiet
//! with termination set. A second interrupt escalates to immediate module
//! exit. One worker failing never terminates the others -- failures are
//! collected and reported, and the process exit code reflects supervisor
//! failures only.

use crate::adapters::flow_queue::flow_queue;
use crate::config::Settings;
use crate::metadata;
use crate::modules::evidence::EvidenceHandler;
use domain::{InterruptCounter, Termination};
use input::{Input, InputConfig, InputKind};
use module::{ModuleCtx, ModuleExit, run_module};
use output::OutputConfig;
use profiler::{Profiler, ProfilerConfig};
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use store::{KvStore, SqliteStore};
use tokio::task::JoinHandle;

/// Capacity of the input -> profiler queue; producers wait beyond this.
const FLOW_QUEUE_CAPACITY: usize = 10_000;

/// Modules the supervisor knows how to start, in start order.
const MODULE_REGISTRY: &[&str] = &["evidence"];

// ---------------------------------------------------------------------------
// SupervisorError + report
// ---------------------------------------------------------------------------

/// Fatal supervisor-level failures; these terminate the whole process with
/// a non-zero exit code.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("no input source given; use -f <path> or -f stdin")]
    NoInput,
    #[error("unrecognized input source '{}'", .0.display())]
    UnknownInput(PathBuf),
    #[error("output setup failed: {0}")]
    Output(#[from] output::OutputError),
    #[error("input setup failed: {0}")]
    Input(#[from] input::InputError),
    #[error("profiler setup failed: {0}")]
    Profiler(#[from] profiler::ProfilerError),
    #[error("database open failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// What the run produced, reported to the caller after all workers exited.
#[derive(Debug, Default)]
pub struct SupervisorReport {
    pub profiles: usize,
    pub flows_processed: u64,
    /// Workers that did not exit cleanly, with the reason.
    pub failed_workers: Vec<String>,
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Run the whole pipeline to completion.
///
/// # Errors
///
/// Returns [`SupervisorError`] for setup-level failures (unknown input
/// kind, unopenable database, ...). Individual worker failures are
/// reported through [`SupervisorReport::failed_workers`] instead.
pub async fn run(settings: Settings) -> Result<SupervisorReport, SupervisorError> {
    let filepath = settings.filepath.clone().ok_or(SupervisorError::NoInput)?;
    let kind = InputKind::infer(&filepath)
        .ok_or_else(|| SupervisorError::UnknownInput(filepath.clone()))?;

    std::fs::create_dir_all(&settings.output_dir)?;
    if let Some(dir_name) = settings.metadata_dir.clone() {
        metadata::write_metadata(&settings, &dir_name)?;
    }

    // Output sink first: every later worker reports through it.
    let mut output_config = OutputConfig::builder()
        .verbose(settings.verbose)
        .debug(settings.debug);
    if settings.create_log_files {
        output_config = output_config.log_dir(&settings.output_dir);
    }
    let (out, sink) = output::channel(output_config.build()?);
    let sink_task = tokio::spawn(sink.run());
    out.send(2, 0, "main", "Started output sink");
    if settings.curses {
        out.send(1, 0, "main", "curses interface requested; using plain console output");
    }

    // Shared state and signals.
    let kv = KvStore::new();
    kv.set_json("disabled_modules", &settings.disabled_modules);
    let db = Arc::new(
        SqliteStore::open(
            settings.database_path(),
            &format!("flows_{}", settings.port),
        )
        .await?,
    );
    let term = Termination::new();
    let interrupts = InterruptCounter::new();
    let whitelist = load_whitelist(settings.whitelist.as_deref());

    // Profiler worker.
    let (flow_tx, mut flow_rx) = flow_queue(FLOW_QUEUE_CAPACITY);
    let mut profiler_config = ProfilerConfig::builder(settings.width)
        .direction(settings.direction)
        .min_flows(settings.amount);
    if let Some(home) = settings.home_network {
        profiler_config = profiler_config.home_network(home);
    }
    let mut prof = Profiler::new(profiler_config.build()?, kv.clone(), out.clone());
    let profiler_task = tokio::spawn(async move {
        let summary = prof.run(&mut flow_rx).await;
        (summary, prof.profile_count())
    });
    out.send(2, 0, "main", "Started profiler worker");

    // Detector modules, by registration.
    let mut module_tasks: Vec<(String, JoinHandle<ModuleExit>)> = vec![];
    for name in MODULE_REGISTRY {
        if settings.disabled_modules.iter().any(|m| m == name) {
            out.send(1, 0, "main", format!("Module {name} is disabled"));
            continue;
        }
        match *name {
            "evidence" => {
                let handler = EvidenceHandler::new(
                    settings.output_dir.join("alerts.log"),
                    Arc::clone(&db),
                    whitelist.clone(),
                    settings.disabled_detections.clone(),
                );
                let ctx = ModuleCtx::new(
                    module::Module::name(&handler),
                    &module::Module::channels(&handler),
                    kv.clone(),
                    out.clone(),
                    term.clone(),
                    interrupts.clone(),
                );
                module_tasks.push((
                    (*name).to_owned(),
                    tokio::spawn(run_module(handler, ctx)),
                ));
            }
            other => {
                out.error("main", format!("unknown module '{other}' in registry"));
                continue;
            }
        }
        out.send(2, 0, "main", format!("Started module {name}"));
    }

    // Input worker; it owns the queue's write side, so the queue closes
    // when the source is drained.
    let mut input_config = InputConfig::builder(kind, &filepath);
    if let Some(line_type) = settings.line_type {
        input_config = input_config.line_type(line_type);
    }
    if matches!(kind, InputKind::Pcap | InputKind::Interface) {
        input_config = input_config.zeek_dir(settings.output_dir.join("zeek"));
    }
    let mut inp = Input::new(input_config.build()?, out.clone(), term.clone());
    let input_task = tokio::spawn(async move { inp.run(&flow_tx).await });
    out.send(2, 0, "main", "Started input worker");

    // Interrupt escalation: first ctrl-c drains, second exits modules.
    let ctrlc_term = term.clone();
    let ctrlc_interrupts = interrupts.clone();
    let ctrlc_out = out.clone();
    let ctrlc_task = tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            let count = ctrlc_interrupts.raise();
            if count == 1 {
                ctrlc_term.set();
                ctrlc_out.send(
                    1,
                    0,
                    "main",
                    "Interrupt received, draining in-flight work; press again to stop now",
                );
            } else {
                return;
            }
        }
    });

    let mut failed: Vec<String> = vec![];

    // Input EOF is the normal shutdown trigger.
    match input_task.await {
        Ok(Ok(summary)) => out.send(
            2,
            0,
            "main",
            format!("Input drained: {} items, {} skipped", summary.flows, summary.skipped),
        ),
        Ok(Err(e)) => {
            failed.push(format!("input: {e}"));
            out.error("main", format!("input worker failed: {e}"));
        }
        Err(e) => failed.push(format!("input panicked: {e}")),
    }
    term.set();

    // Profiler exits when the queue closes behind the input worker.
    let (profiler_summary, profiles) = match profiler_task.await {
        Ok(result) => result,
        Err(e) => {
            failed.push(format!("profiler panicked: {e}"));
            (profiler::ProfilerSummary::default(), 0)
        }
    };

    // Modules drain their channels, then exit.
    for (name, task) in module_tasks {
        match task.await {
            Ok(ModuleExit::Clean) => {}
            Ok(exit) => failed.push(format!("{name}: {exit:?}")),
            Err(e) => failed.push(format!("{name} panicked: {e}")),
        }
    }

    ctrlc_task.abort();
    drop(ctrlc_task.await);

    if matches!(kind, InputKind::Pcap | InputKind::Interface) {
        archive_zeek_files(&settings, &out);
    }

    for failure in &failed {
        out.error("main", format!("worker failed: {failure}"));
    }
    out.send(
        1,
        0,
        "main",
        format!(
            "Done. {} flows into {} profiles; {} worker(s) failed",
            profiler_summary.processed,
            profiles,
            failed.len()
        ),
    );

    // Dropping the last handle lets the sink drain and exit.
    drop(out);
    match sink_task.await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => failed.push(format!("output sink: {e}")),
        Err(e) => failed.push(format!("output sink panicked: {e}")),
    }

    Ok(SupervisorReport {
        profiles,
        flows_processed: profiler_summary.processed,
        failed_workers: failed,
    })
}

/// One address per line; comments and unparseable lines are ignored.
fn load_whitelist(path: Option<&Path>) -> HashSet<IpAddr> {
    let Some(path) = path else {
        return HashSet::new();
    };
    match std::fs::read_to_string(path) {
        Ok(text) => text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .filter_map(|l| l.parse().ok())
            .collect(),
        Err(e) => {
            log::warn!("supervisor.whitelist: path={} error={e}", path.display());
            HashSet::new()
        }
    }
}

/// Apply `store_a_copy_of_zeek_files` / `delete_zeek_files` to the folder
/// the external flow tool wrote.
fn archive_zeek_files(settings: &Settings, out: &output::OutputHandle) {
    let zeek_dir = settings.output_dir.join("zeek");
    if !zeek_dir.is_dir() {
        return;
    }
    if settings.store_zeek_copy {
        let copy_dir = settings.output_dir.join("zeek_files");
        if let Err(e) = copy_dir_files(&zeek_dir, &copy_dir) {
            out.error("main", format!("could not copy zeek files: {e}"));
        }
    }
    if settings.delete_zeek_files
        && let Err(e) = std::fs::remove_dir_all(&zeek_dir)
    {
        out.error("main", format!("could not delete zeek files: {e}"));
    }
}

fn copy_dir_files(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let path = entry?.path();
        if path.is_file()
            && let Some(name) = path.file_name()
        {
            std::fs::copy(&path, to.join(name))?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::config::{RawConfig, Settings};
    use clap::Parser as _;

    fn settings_for(args: &[&str]) -> Settings {
        let mut argv = vec!["flowsentry"];
        argv.extend_from_slice(args);
        Settings::resolve(&Cli::parse_from(argv), &RawConfig::default())
    }

    const BINETFLOW: &str = "\
StartTime,Dur,Proto,SrcAddr,Sport,Dir,DstAddr,Dport,State,sTos,dTos,TotPkts,TotBytes,SrcBytes,Label\n\
2019/04/05 16:15:09.194268,0.031142,udp,10.8.0.69,8278,  <->,8.8.8.8,53,CON,0,0,2,186,64,x\n\
2019/04/05 16:15:10.500000,0.200000,tcp,10.8.0.70,40000,  ->,1.1.1.1,443,FSA,0,0,5,500,300,x\n";

    #[tokio::test]
    async fn missing_input_is_a_supervisor_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(&["-o", dir.path().to_str().unwrap()]);
        assert!(matches!(
            run(settings).await,
            Err(SupervisorError::NoInput)
        ));
    }

    #[tokio::test]
    async fn unknown_input_kind_is_a_supervisor_error() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("notes.txt");
        std::fs::write(&bogus, "hello").unwrap();
        let settings = settings_for(&[
            "-o",
            dir.path().to_str().unwrap(),
            "-f",
            bogus.to_str().unwrap(),
        ]);
        assert!(matches!(
            run(settings).await,
            Err(SupervisorError::UnknownInput(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn binetflow_pipeline_runs_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let flows = dir.path().join("test2.binetflow");
        std::fs::write(&flows, BINETFLOW).unwrap();
        let out_dir = dir.path().join("out");

        let mut settings = settings_for(&[
            "-o",
            out_dir.to_str().unwrap(),
            "-f",
            flows.to_str().unwrap(),
            "-P",
            "6664",
        ]);
        settings.metadata_dir = Some("metadata".to_owned());

        let report = run(settings).await.unwrap();
        assert!(report.failed_workers.is_empty(), "{:?}", report.failed_workers);
        assert_eq!(report.flows_processed, 2);
        assert_eq!(report.profiles, 2, "one profile per source host");

        // Persisted layout under the output directory.
        assert!(out_dir.join(output::OUTPUT_LOG).is_file());
        assert!(out_dir.join(output::ERRORS_LOG).is_file());
        assert!(out_dir.join("alerts.log").is_file());
        assert!(out_dir.join("flows_6664.sqlite").is_file());
        assert!(out_dir.join("metadata").join("info.txt").is_file());

        let sink_log = std::fs::read_to_string(out_dir.join(output::OUTPUT_LOG)).unwrap();
        assert!(sink_log.contains("Time window width"));
        assert!(sink_log.contains("Done. 2 flows into 2 profiles"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn disabled_module_is_not_started() {
        let dir = tempfile::tempdir().unwrap();
        let flows = dir.path().join("flows.binetflow");
        std::fs::write(&flows, BINETFLOW).unwrap();
        let out_dir = dir.path().join("out");

        let mut settings = settings_for(&[
            "-o",
            out_dir.to_str().unwrap(),
            "-f",
            flows.to_str().unwrap(),
            "-P",
            "6663",
        ]);
        settings.disabled_modules = vec!["evidence".to_owned()];

        let report = run(settings).await.unwrap();
        assert!(report.failed_workers.is_empty());
        assert!(
            !out_dir.join("alerts.log").exists(),
            "a disabled evidence module must not open alerts.log"
        );
    }

    #[test]
    fn whitelist_parsing_ignores_junk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("whitelist.conf");
        std::fs::write(&path, "# comment\n10.0.0.1\nnot-an-ip\n\n192.168.1.1\n").unwrap();
        let set = load_whitelist(Some(&path));
        assert_eq!(set.len(), 2);
        assert!(set.contains(&"10.0.0.1".parse::<IpAddr>().unwrap()));
    }
}
