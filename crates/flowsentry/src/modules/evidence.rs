// Rust guideline compliant 2026-07-25

//! Evidence consumer: the module that turns `evidence_added` publications
//! into the append-only record.
//!
//! Every accepted evidence lands twice: one human-readable line in
//! `alerts.log` and one row in the durable `evidence` table. Evidence from
//! whitelisted hosts and from detections the configuration disabled is
//! dropped before either.

use domain::Evidence;
use module::{Module, ModuleCtx, ModuleError};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use store::{SqlValue, SqliteStore};

const EVIDENCE_TABLE: &str = "evidence";
const EVIDENCE_SCHEMA: &str = "\
    id TEXT PRIMARY KEY, \
    profile TEXT NOT NULL, \
    twid INTEGER NOT NULL, \
    detector TEXT NOT NULL, \
    description TEXT NOT NULL, \
    confidence REAL NOT NULL, \
    threat_level TEXT NOT NULL, \
    flow_uids TEXT NOT NULL";

/// The evidence consumer module.
#[derive(Debug)]
pub struct EvidenceHandler {
    alerts_path: PathBuf,
    db: Arc<SqliteStore>,
    whitelist: HashSet<IpAddr>,
    disabled_detections: Vec<String>,
    alerts_file: Option<std::fs::File>,
    written: u64,
}

impl EvidenceHandler {
    #[must_use]
    pub fn new(
        alerts_path: PathBuf,
        db: Arc<SqliteStore>,
        whitelist: HashSet<IpAddr>,
        disabled_detections: Vec<String>,
    ) -> Self {
        Self {
            alerts_path,
            db,
            whitelist,
            disabled_detections,
            alerts_file: None,
            written: 0,
        }
    }

    fn is_disabled(&self, detector: &str) -> bool {
        self.disabled_detections
            .iter()
            .any(|d| d.eq_ignore_ascii_case(detector))
    }

    async fn handle(&mut self, payload: &str, ctx: &ModuleCtx) {
        let evidence: Evidence = match serde_json::from_str(payload) {
            Ok(e) => e,
            Err(e) => {
                ctx.output()
                    .send(0, 2, "evidence", format!("bad evidence payload: {e}"));
                return;
            }
        };
        if self.whitelist.contains(&evidence.profile.addr) {
            log::debug!(
                "evidence.whitelisted: profile={} detector={}",
                evidence.profile,
                evidence.detector
            );
            return;
        }
        if self.is_disabled(&evidence.detector) {
            log::debug!("evidence.disabled_detection: detector={}", evidence.detector);
            return;
        }

        let line = format!(
            "{} in timewindow {}: {} [detector {}, confidence {:.2}, threat level {}]",
            evidence.profile,
            evidence.twid,
            evidence.description,
            evidence.detector,
            evidence.confidence,
            evidence.threat_level,
        );
        if let Some(file) = self.alerts_file.as_mut()
            && let Err(e) = writeln!(file, "{line}")
        {
            ctx.output()
                .error("evidence", format!("alerts.log write failed: {e}"));
        }
        ctx.output().send(1, 0, "evidence", line);

        self.db
            .insert(
                EVIDENCE_TABLE,
                "id, profile, twid, detector, description, confidence, threat_level, flow_uids",
                &[
                    evidence.id.to_string().into(),
                    evidence.profile.to_string().into(),
                    SqlValue::Int(evidence.twid),
                    evidence.detector.clone().into(),
                    evidence.description.clone().into(),
                    SqlValue::Real(evidence.confidence),
                    evidence.threat_level.to_string().into(),
                    evidence.flow_uids.join(",").into(),
                ],
            )
            .await;
        self.written += 1;
    }
}

impl Module for EvidenceHandler {
    fn name(&self) -> &'static str {
        "evidence"
    }

    fn channels(&self) -> Vec<(&'static str, &'static str)> {
        vec![("evidence", store::channels::EVIDENCE_ADDED)]
    }

    async fn pre_main(&mut self, ctx: &mut ModuleCtx) -> Result<(), ModuleError> {
        self.db
            .create_table(EVIDENCE_TABLE, EVIDENCE_SCHEMA)
            .await
            .ok_or_else(|| ModuleError::new("evidence", "could not create the evidence table"))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.alerts_path)
            .map_err(|e| {
                ModuleError::new("evidence", format!("could not open alerts log: {e}"))
            })?;
        self.alerts_file = Some(file);
        let _ = ctx;
        Ok(())
    }

    async fn main(&mut self, ctx: &mut ModuleCtx) -> Result<(), ModuleError> {
        if let Some(msg) = ctx.get_msg("evidence") {
            self.handle(&msg.payload, ctx).await;
        }
        Ok(())
    }

    async fn shutdown_gracefully(&mut self, ctx: &mut ModuleCtx) {
        if let Some(file) = self.alerts_file.as_mut() {
            drop(file.flush());
        }
        ctx.output().send(
            2,
            0,
            "evidence",
            format!("{} evidence entries recorded", self.written),
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
