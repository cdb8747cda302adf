// Rust guideline compliant 2026-07-21

//! Binetflow (argus CSV export) line parsing.
//!
//! Binetflow files open with a header line naming the columns; stdin argus
//! lines carry the same row shape without a header, so [`argus`](crate::argus)
//! reuses this parser with the default column layout.

use chrono::NaiveDateTime;
use domain::{Endpoint, FlowError, FlowRecord, Transport};
use std::collections::HashMap;

/// Column layout of header-less argus lines (the stdin `argus` line type).
const DEFAULT_COLUMNS: &[&str] = &[
    "starttime",
    "dur",
    "proto",
    "srcaddr",
    "sport",
    "dir",
    "dstaddr",
    "dport",
    "state",
    "stos",
    "dtos",
    "totpkts",
    "totbytes",
    "srcbytes",
];

/// Argus timestamps: `2019/04/05 16:15:09.194268`.
const TS_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.f";

/// Header-driven parser for binetflow rows.
#[derive(Debug)]
pub struct BinetflowParser {
    columns: HashMap<String, usize>,
}

impl BinetflowParser {
    /// Build from the file's header line (`StartTime,Dur,Proto,...`).
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Unparseable`] when the header lacks the
    /// timestamp or address columns.
    pub fn from_header(header: &str) -> Result<Self, FlowError> {
        let columns: HashMap<String, usize> = header
            .split(',')
            .enumerate()
            .map(|(i, name)| (name.trim().to_ascii_lowercase(), i))
            .collect();
        for required in ["starttime", "srcaddr", "dstaddr"] {
            if !columns.contains_key(required) {
                return Err(FlowError::Unparseable(header.to_owned()));
            }
        }
        Ok(Self { columns })
    }

    /// Parser for header-less argus rows (stdin).
    #[must_use]
    pub fn with_default_columns() -> Self {
        Self {
            columns: DEFAULT_COLUMNS
                .iter()
                .enumerate()
                .map(|(i, name)| ((*name).to_owned(), i))
                .collect(),
        }
    }

    fn field<'a>(&self, values: &[&'a str], name: &str) -> Option<&'a str> {
        let idx = *self.columns.get(name)?;
        let value = values.get(idx)?.trim();
        if value.is_empty() { None } else { Some(value) }
    }

    /// Counters are non-negative by invariant: absent means zero, but a
    /// value that does not parse as an unsigned integer (negatives
    /// included) fails the row.
    fn count_field(&self, values: &[&str], name: &str) -> Result<u64, FlowError> {
        match self.field(values, name) {
            None => Ok(0),
            Some(raw) => raw.parse().map_err(|_| FlowError::BadField {
                field: name.to_owned(),
                value: raw.to_owned(),
            }),
        }
    }

    /// Parse one data row. Returns `Ok(None)` for blank lines and repeated
    /// headers.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError`] for rows that cannot be mapped to a flow.
    pub fn parse_line(&self, line: &str) -> Result<Option<FlowRecord>, FlowError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() || line.to_ascii_lowercase().starts_with("starttime") {
            return Ok(None);
        }
        let values: Vec<&str> = line.split(',').collect();

        let ts_raw = self
            .field(&values, "starttime")
            .ok_or_else(|| FlowError::MissingField("starttime".to_owned()))?;
        let ts = parse_argus_ts(ts_raw)?;

        let saddr = self
            .field(&values, "srcaddr")
            .ok_or_else(|| FlowError::MissingField("srcaddr".to_owned()))?;
        let daddr = self
            .field(&values, "dstaddr")
            .ok_or_else(|| FlowError::MissingField("dstaddr".to_owned()))?;
        let orig = Endpoint::new(
            saddr.parse().map_err(|_| FlowError::BadField {
                field: "srcaddr".to_owned(),
                value: saddr.to_owned(),
            })?,
            self.field(&values, "sport").and_then(parse_port),
        );
        let resp = Endpoint::new(
            daddr.parse().map_err(|_| FlowError::BadField {
                field: "dstaddr".to_owned(),
                value: daddr.to_owned(),
            })?,
            self.field(&values, "dport").and_then(parse_port),
        );

        let duration = self
            .field(&values, "dur")
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);
        let tot_pkts = self.count_field(&values, "totpkts")?;
        let tot_bytes = self.count_field(&values, "totbytes")?;
        let src_bytes = self.count_field(&values, "srcbytes")?;

        let flow = FlowRecord {
            uid: format!("{orig}-{resp}-{ts}"),
            ts,
            orig,
            resp: Some(resp),
            proto: self
                .field(&values, "proto")
                .map_or(Transport::Other, Transport::from_token),
            duration,
            orig_bytes: src_bytes,
            // Argus reports totals; the remainder is attributed to the
            // responder direction.
            resp_bytes: tot_bytes.saturating_sub(src_bytes),
            orig_pkts: tot_pkts,
            resp_pkts: 0,
            state: self.field(&values, "state").unwrap_or("").to_owned(),
            app: None,
        };
        flow.validate()?;
        Ok(Some(flow))
    }
}

/// Ports are decimal, or hex (`0x0008`) for icmp type/code rows.
fn parse_port(raw: &str) -> Option<u16> {
    if let Some(hex) = raw.strip_prefix("0x") {
        return u16::from_str_radix(hex, 16).ok();
    }
    raw.parse().ok()
}

fn parse_argus_ts(raw: &str) -> Result<f64, FlowError> {
    let dt = NaiveDateTime::parse_from_str(raw, TS_FORMAT).map_err(|_| FlowError::BadField {
        field: "starttime".to_owned(),
        value: raw.to_owned(),
    })?;
    #[expect(clippy::cast_precision_loss, reason = "microsecond epoch fits f64")]
    let ts = dt.and_utc().timestamp_micros() as f64 / 1e6;
    Ok(ts)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "StartTime,Dur,Proto,SrcAddr,Sport,Dir,DstAddr,Dport,State,sTos,dTos,TotPkts,TotBytes,SrcBytes,Label";

    #[test]
    fn header_builds_column_map() {
        assert!(BinetflowParser::from_header(HEADER).is_ok());
        assert!(matches!(
            BinetflowParser::from_header("a,b,c"),
            Err(FlowError::Unparseable(_))
        ));
    }

    #[test]
    fn data_row_parses() {
        let parser = BinetflowParser::from_header(HEADER).unwrap();
        let flow = parser
            .parse_line(
                "2019/04/05 16:15:09.194268,0.031142,udp,10.8.0.69,8278,  <->,8.8.8.8,53,CON,0,0,2,186,64,flow=Normal",
            )
            .unwrap()
            .unwrap();
        assert_eq!(flow.orig.addr.to_string(), "10.8.0.69");
        assert_eq!(flow.orig.port, Some(8278));
        let resp = flow.resp.unwrap();
        assert_eq!(resp.addr.to_string(), "8.8.8.8");
        assert_eq!(resp.port, Some(53));
        assert_eq!(flow.proto, Transport::Udp);
        assert_eq!(flow.duration, 0.031142);
        assert_eq!(flow.orig_bytes, 64);
        assert_eq!(flow.resp_bytes, 122);
        assert_eq!(flow.orig_pkts, 2);
        assert_eq!(flow.state, "CON");
    }

    #[test]
    fn repeated_header_and_blank_lines_are_skipped() {
        let parser = BinetflowParser::from_header(HEADER).unwrap();
        assert_eq!(parser.parse_line(HEADER).unwrap(), None);
        assert_eq!(parser.parse_line("").unwrap(), None);
    }

    #[test]
    fn hex_icmp_port_parses() {
        assert_eq!(parse_port("0x0008"), Some(8));
        assert_eq!(parse_port("443"), Some(443));
        assert_eq!(parse_port("junk"), None);
    }

    #[test]
    fn negative_duration_row_is_rejected() {
        let parser = BinetflowParser::from_header(HEADER).unwrap();
        let result = parser.parse_line(
            "2019/04/05 16:15:09.194268,-1.0,udp,10.8.0.69,8278,  <->,8.8.8.8,53,CON,0,0,2,186,64,",
        );
        assert!(matches!(result, Err(FlowError::NegativeDuration(_))));
    }

    #[test]
    fn negative_count_row_is_rejected() {
        let parser = BinetflowParser::from_header(HEADER).unwrap();
        let result = parser.parse_line(
            "2019/04/05 16:15:09.194268,0.1,udp,10.8.0.69,8278,  <->,8.8.8.8,53,CON,0,0,-2,186,64,",
        );
        assert!(matches!(
            result,
            Err(FlowError::BadField { field, .. }) if field == "totpkts"
        ));
    }

    #[test]
    fn bad_address_is_rejected() {
        let parser = BinetflowParser::from_header(HEADER).unwrap();
        let result = parser.parse_line(
            "2019/04/05 16:15:09.194268,0.1,udp,not-an-ip,1,  <->,8.8.8.8,53,CON,0,0,1,10,5,",
        );
        assert!(matches!(result, Err(FlowError::BadField { .. })));
    }
}
