// Rust guideline compliant 2026-07-21

//! Nfdump CSV export line parsing.
//!
//! Expects `nfdump -o csv` rows:
//! `ts,te,td,sa,da,sp,dp,pr,flg,fwd,stos,ipkt,opkt,ibyt,obyt,...`.
//! The header row and the trailing summary block are skipped.

use chrono::NaiveDateTime;
use domain::{Endpoint, FlowError, FlowRecord, Transport};

/// Nfdump timestamps: `2019-04-05 16:15:09.194`.
const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const IDX_TS: usize = 0;
const IDX_TD: usize = 2;
const IDX_SA: usize = 3;
const IDX_DA: usize = 4;
const IDX_SP: usize = 5;
const IDX_DP: usize = 6;
const IDX_PR: usize = 7;
const IDX_FLG: usize = 8;
const IDX_IPKT: usize = 11;
const IDX_OPKT: usize = 12;
const IDX_IBYT: usize = 13;
const IDX_OBYT: usize = 14;

fn field<'a>(values: &[&'a str], idx: usize) -> Option<&'a str> {
    let v = values.get(idx)?.trim();
    if v.is_empty() { None } else { Some(v) }
}

/// Counters are non-negative by invariant: absent means zero, but a value
/// that does not parse as an unsigned integer (negatives included) fails
/// the row.
fn count_field(values: &[&str], idx: usize, name: &str) -> Result<u64, FlowError> {
    match field(values, idx) {
        None => Ok(0),
        Some(raw) => raw.parse().map_err(|_| FlowError::BadField {
            field: name.to_owned(),
            value: raw.to_owned(),
        }),
    }
}

/// Parse one nfdump CSV line. Returns `Ok(None)` for the header row, blank
/// lines, and the summary block at the end of the export.
///
/// # Errors
///
/// Returns [`FlowError`] for data rows that cannot be mapped to a flow.
pub fn parse_line(line: &str) -> Result<Option<FlowRecord>, FlowError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() || line.starts_with("ts,") {
        return Ok(None);
    }
    let values: Vec<&str> = line.split(',').collect();
    let Some(ts_raw) = field(&values, IDX_TS) else {
        return Ok(None);
    };
    // Summary rows ("Summary", "flows,bytes,...") do not start with a date.
    let Ok(dt) = NaiveDateTime::parse_from_str(ts_raw, TS_FORMAT) else {
        return Ok(None);
    };
    #[expect(clippy::cast_precision_loss, reason = "microsecond epoch fits f64")]
    let ts = dt.and_utc().timestamp_micros() as f64 / 1e6;

    let sa = field(&values, IDX_SA).ok_or_else(|| FlowError::MissingField("sa".to_owned()))?;
    let da = field(&values, IDX_DA).ok_or_else(|| FlowError::MissingField("da".to_owned()))?;
    let orig = Endpoint::new(
        sa.parse().map_err(|_| FlowError::BadField {
            field: "sa".to_owned(),
            value: sa.to_owned(),
        })?,
        field(&values, IDX_SP).and_then(|p| p.parse().ok()),
    );
    let resp = Endpoint::new(
        da.parse().map_err(|_| FlowError::BadField {
            field: "da".to_owned(),
            value: da.to_owned(),
        })?,
        field(&values, IDX_DP).and_then(|p| p.parse().ok()),
    );

    let flow = FlowRecord {
        uid: format!("{orig}-{resp}-{ts}"),
        ts,
        orig,
        resp: Some(resp),
        proto: field(&values, IDX_PR).map_or(Transport::Other, Transport::from_token),
        duration: field(&values, IDX_TD)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0),
        orig_bytes: count_field(&values, IDX_IBYT, "ibyt")?,
        resp_bytes: count_field(&values, IDX_OBYT, "obyt")?,
        orig_pkts: count_field(&values, IDX_IPKT, "ipkt")?,
        resp_pkts: count_field(&values, IDX_OPKT, "opkt")?,
        state: field(&values, IDX_FLG).unwrap_or("").to_owned(),
        app: None,
    };
    flow.validate()?;
    Ok(Some(flow))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
