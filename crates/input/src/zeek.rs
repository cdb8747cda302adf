// Rust guideline compliant 2026-07-21

//! Zeek log parsing: tab- and json-formatted files, format detection, and
//! the per-log-kind field mapping into [`FlowRecord`]s.
//!
//! Tab-formatted logs carry `#`-prefixed header lines; the `#fields` header
//! names the columns. Json-formatted logs are one object per line. Both
//! shapes funnel through the same map-based extraction so a conn.log parses
//! identically whichever way zeek was configured.

use domain::{
    AppLayer, DnsFields, Endpoint, FlowError, FlowRecord, HttpFields, SmtpFields, SshFields,
    SslFields, Transport,
};
use serde_json::{Map, Value};
use std::net::IpAddr;
use std::path::Path;

/// Unset marker in zeek tab output.
const UNSET: &str = "-";

/// Log kinds the pipeline understands, keyed by file stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeekLogKind {
    Conn,
    Dns,
    Http,
    Ssl,
    Ssh,
    Smtp,
    Arp,
}

impl ZeekLogKind {
    /// Map a log file stem (`conn` from `conn.log`) to its kind.
    #[must_use]
    pub fn from_stem(stem: &str) -> Option<Self> {
        match stem {
            "conn" => Some(Self::Conn),
            "dns" => Some(Self::Dns),
            "http" => Some(Self::Http),
            "ssl" => Some(Self::Ssl),
            "ssh" => Some(Self::Ssh),
            "smtp" => Some(Self::Smtp),
            "arp" => Some(Self::Arp),
            _ => None,
        }
    }
}

/// Conn.log column order used when a tab file carries no `#fields` header.
const DEFAULT_CONN_FIELDS: &[&str] = &[
    "ts",
    "uid",
    "id.orig_h",
    "id.orig_p",
    "id.resp_h",
    "id.resp_p",
    "proto",
    "service",
    "duration",
    "orig_bytes",
    "resp_bytes",
    "conn_state",
    "local_orig",
    "local_resp",
    "missed_bytes",
    "history",
    "orig_pkts",
    "orig_ip_bytes",
    "resp_pkts",
    "resp_ip_bytes",
];

// ---------------------------------------------------------------------------
// Format detection
// ---------------------------------------------------------------------------

/// Decide whether a first line belongs to a tab-formatted log.
///
/// Tab files open with `#`-prefixed headers; json files open with an
/// object. An unparseable first line counts as tabs (the tab reader skips
/// what it cannot map, the json reader would error on every line).
#[must_use]
pub fn is_tabs_line(first_line: &str) -> bool {
    let trimmed = first_line.trim_start();
    if trimmed.starts_with('#') {
        return true;
    }
    !matches!(
        serde_json::from_str::<Value>(trimmed),
        Ok(Value::Object(_))
    )
}

/// Read the first line of `path` and decide tab- vs json-formatted.
///
/// # Errors
///
/// Propagates the underlying read error.
pub fn is_tabs_file(path: &Path) -> std::io::Result<bool> {
    let content = std::fs::read_to_string(path)?;
    Ok(content.lines().next().is_none_or(is_tabs_line))
}

// ---------------------------------------------------------------------------
// Stateful per-file parser
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Format {
    Unknown,
    Tabs { fields: Option<Vec<String>> },
    Json,
}

/// Incremental parser for one zeek log file.
///
/// Feed lines in order; header lines configure the tab column mapping,
/// data lines yield records. The format is fixed by the first line seen.
#[derive(Debug)]
pub struct ZeekFileParser {
    kind: ZeekLogKind,
    format: Format,
}

impl ZeekFileParser {
    #[must_use]
    pub fn new(kind: ZeekLogKind) -> Self {
        Self {
            kind,
            format: Format::Unknown,
        }
    }

    /// Consume one line. Returns `Ok(None)` for headers, separators and
    /// blank lines.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError`] when a data line cannot be mapped to a flow.
    pub fn feed(&mut self, line: &str) -> Result<Option<FlowRecord>, FlowError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Ok(None);
        }
        if let Some(header) = line.strip_prefix('#') {
            if matches!(self.format, Format::Unknown) {
                self.format = Format::Tabs { fields: None };
            }
            if let Some(rest) = header.strip_prefix("fields") {
                let fields: Vec<String> =
                    rest.split_whitespace().map(str::to_owned).collect();
                self.format = Format::Tabs {
                    fields: Some(fields),
                };
            }
            return Ok(None);
        }
        if matches!(self.format, Format::Unknown) {
            self.format = if is_tabs_line(line) {
                Format::Tabs { fields: None }
            } else {
                Format::Json
            };
        }
        match &self.format {
            Format::Json => {
                let map: Map<String, Value> = serde_json::from_str(line)
                    .map_err(|_| FlowError::Unparseable(line.to_owned()))?;
                flow_from_map(self.kind, &map).map(Some)
            }
            Format::Tabs { fields } => {
                let map = tabs_to_map(line, fields.as_deref());
                flow_from_map(self.kind, &map).map(Some)
            }
            Format::Unknown => unreachable!("format fixed above"),
        }
    }
}

/// Zip a tab-separated data line with the column names into a json-shaped
/// map, dropping unset (`-`) columns.
fn tabs_to_map(line: &str, fields: Option<&[String]>) -> Map<String, Value> {
    let mut map = Map::new();
    let values: Vec<&str> = line.split('\t').collect();
    match fields {
        Some(names) => {
            for (name, value) in names.iter().zip(&values) {
                if *value != UNSET {
                    map.insert(name.clone(), Value::String((*value).to_owned()));
                }
            }
        }
        None => {
            for (name, value) in DEFAULT_CONN_FIELDS.iter().zip(&values) {
                if *value != UNSET {
                    map.insert((*name).to_owned(), Value::String((*value).to_owned()));
                }
            }
        }
    }
    map
}

// ---------------------------------------------------------------------------
// Map -> FlowRecord extraction
// ---------------------------------------------------------------------------

fn get_str(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) if s != UNSET && s != "(empty)" => Some(s.clone()),
        Value::String(_) => None,
        other => Some(other.to_string()),
    }
}

fn get_f64(map: &Map<String, Value>, key: &str) -> Option<f64> {
    match map.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn get_u64(map: &Map<String, Value>, key: &str) -> Option<u64> {
    match map.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn get_u16(map: &Map<String, Value>, key: &str) -> Option<u16> {
    get_u64(map, key).and_then(|v| u16::try_from(v).ok())
}

/// Byte/packet counters are non-negative by invariant: an absent or unset
/// counter is zero, but a value that does not parse as an unsigned integer
/// (negative counts included) is a parse error and the record is skipped.
fn get_count(map: &Map<String, Value>, key: &str) -> Result<u64, FlowError> {
    match map.get(key) {
        None => Ok(0),
        Some(Value::String(s)) if s == UNSET => Ok(0),
        Some(Value::Number(n)) => n.as_u64().ok_or_else(|| FlowError::BadField {
            field: key.to_owned(),
            value: n.to_string(),
        }),
        Some(Value::String(s)) => s.parse().map_err(|_| FlowError::BadField {
            field: key.to_owned(),
            value: s.clone(),
        }),
        Some(other) => Err(FlowError::BadField {
            field: key.to_owned(),
            value: other.to_string(),
        }),
    }
}

fn get_bool(map: &Map<String, Value>, key: &str) -> Option<bool> {
    match map.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "T" | "true" => Some(true),
            "F" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn get_addr(map: &Map<String, Value>, key: &str) -> Result<IpAddr, FlowError> {
    let raw = get_str(map, key).ok_or_else(|| FlowError::MissingField(key.to_owned()))?;
    raw.parse().map_err(|_| FlowError::BadField {
        field: key.to_owned(),
        value: raw,
    })
}

/// First present key wins; a present-but-malformed address is an error,
/// while unset (`-`) and absent keys yield `None`.
fn get_addr_first(
    map: &Map<String, Value>,
    keys: &[&str],
) -> Result<Option<IpAddr>, FlowError> {
    for key in keys {
        if let Some(raw) = get_str(map, key) {
            return raw
                .parse()
                .map(Some)
                .map_err(|_| FlowError::BadField {
                    field: (*key).to_owned(),
                    value: raw,
                });
        }
    }
    Ok(None)
}

/// Endpoints per log kind. The id.* columns carry addresses and ports for
/// the connection-oriented logs; the arp log names its addresses
/// `orig_h`/`resp_h`, carries no ports, and may omit the responder
/// entirely (gratuitous announcements).
fn endpoints_for(
    kind: ZeekLogKind,
    map: &Map<String, Value>,
) -> Result<(Endpoint, Option<Endpoint>), FlowError> {
    if kind == ZeekLogKind::Arp {
        let orig = get_addr_first(map, &["id.orig_h", "orig_h"])?
            .ok_or_else(|| FlowError::MissingField("orig_h".to_owned()))?;
        let resp = get_addr_first(map, &["id.resp_h", "resp_h"])?;
        return Ok((
            Endpoint::new(orig, None),
            resp.map(|addr| Endpoint::new(addr, None)),
        ));
    }
    let orig = Endpoint::new(get_addr(map, "id.orig_h")?, get_u16(map, "id.orig_p"));
    let resp = Endpoint::new(get_addr(map, "id.resp_h")?, get_u16(map, "id.resp_p"));
    Ok((orig, Some(resp)))
}

fn get_answers(map: &Map<String, Value>, key: &str) -> Vec<String> {
    match map.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect(),
        Some(Value::String(s)) if s != UNSET => {
            s.split(',').map(str::to_owned).collect()
        }
        _ => vec![],
    }
}

/// Build a flow record from a zeek field map of the given log kind.
///
/// This is the single extraction path shared by json files, tab files, and
/// pre-parsed stdin zeek lines.
///
/// # Errors
///
/// Returns [`FlowError`] when a required field is missing or malformed, or
/// when the record fails validation (e.g. negative duration).
pub fn flow_from_map(kind: ZeekLogKind, map: &Map<String, Value>) -> Result<FlowRecord, FlowError> {
    let ts = get_f64(map, "ts").ok_or_else(|| FlowError::MissingField("ts".to_owned()))?;
    let (orig, resp) = endpoints_for(kind, map)?;
    let uid = get_str(map, "uid").unwrap_or_else(|| match resp {
        Some(r) => format!("{orig}-{r}-{ts}"),
        None => format!("{orig}-{ts}"),
    });

    let mut flow = FlowRecord {
        uid,
        ts,
        orig,
        resp,
        proto: Transport::Udp,
        duration: 0.0,
        orig_bytes: 0,
        resp_bytes: 0,
        orig_pkts: 0,
        resp_pkts: 0,
        state: String::new(),
        app: None,
    };

    match kind {
        ZeekLogKind::Conn => {
            flow.proto = get_str(map, "proto")
                .map_or(Transport::Other, |p| Transport::from_token(&p));
            flow.duration = get_f64(map, "duration").unwrap_or(0.0);
            flow.orig_bytes = get_count(map, "orig_bytes")?;
            flow.resp_bytes = get_count(map, "resp_bytes")?;
            flow.orig_pkts = get_count(map, "orig_pkts")?;
            flow.resp_pkts = get_count(map, "resp_pkts")?;
            flow.state = get_str(map, "conn_state").unwrap_or_default();
        }
        ZeekLogKind::Arp => {
            flow.proto = Transport::Arp;
            flow.state = get_str(map, "operation").unwrap_or_default();
        }
        ZeekLogKind::Dns => {
            flow.app = Some(AppLayer::Dns(DnsFields {
                query: get_str(map, "query"),
                qtype: get_str(map, "qtype_name"),
                rcode: get_str(map, "rcode_name"),
                answers: get_answers(map, "answers"),
            }));
        }
        ZeekLogKind::Http => {
            flow.proto = Transport::Tcp;
            flow.app = Some(AppLayer::Http(HttpFields {
                method: get_str(map, "method"),
                host: get_str(map, "host"),
                uri: get_str(map, "uri"),
                status_code: get_u16(map, "status_code"),
                user_agent: get_str(map, "user_agent"),
                response_body_len: get_u64(map, "response_body_len"),
            }));
        }
        ZeekLogKind::Ssl => {
            flow.proto = Transport::Tcp;
            flow.app = Some(AppLayer::Ssl(SslFields {
                server_name: get_str(map, "server_name"),
                subject: get_str(map, "subject"),
                issuer: get_str(map, "issuer"),
                validation_status: get_str(map, "validation_status"),
                version: get_str(map, "version"),
            }));
        }
        ZeekLogKind::Ssh => {
            flow.proto = Transport::Tcp;
            flow.app = Some(AppLayer::Ssh(SshFields {
                client: get_str(map, "client"),
                server: get_str(map, "server"),
                version: get_str(map, "version"),
                auth_success: get_bool(map, "auth_success"),
            }));
        }
        ZeekLogKind::Smtp => {
            flow.proto = Transport::Tcp;
            flow.app = Some(AppLayer::Smtp(SmtpFields {
                mail_from: get_str(map, "mailfrom"),
                rcpt_to: get_str(map, "rcptto"),
                last_reply: get_str(map, "last_reply"),
            }));
        }
    }

    flow.validate()?;
    Ok(flow)
}

/// Conn-kind extraction for pre-parsed stdin zeek lines.
///
/// # Errors
///
/// Same contract as [`flow_from_map`].
pub fn flow_from_conn_map(map: &Map<String, Value>) -> Result<FlowRecord, FlowError> {
    flow_from_map(ZeekLogKind::Conn, map)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Literal conn.log json line from a real capture.
    const CONN_JSON: &str = r#"{"ts":271.102532,"uid":"CsYeNL1xflv3dW9hvb","id.orig_h":"10.0.2.15","id.orig_p":59393,"id.resp_h":"216.58.201.98","id.resp_p":443,"proto":"udp","duration":0.5936019999999758,"orig_bytes":5219,"resp_bytes":5685,"conn_state":"SF","missed_bytes":0,"history":"Dd","orig_pkts":9,"orig_ip_bytes":5471,"resp_pkts":10,"resp_ip_bytes":5965}"#;

    #[test]
    fn detects_tabs_and_json_first_lines() {
        assert!(is_tabs_line("#separator \\x09"));
        assert!(is_tabs_line("1616859339.741\tCuid1\t10.0.0.1"));
        assert!(!is_tabs_line(CONN_JSON));
    }

    #[test]
    fn json_conn_line_parses() {
        let mut parser = ZeekFileParser::new(ZeekLogKind::Conn);
        let flow = parser.feed(CONN_JSON).unwrap().unwrap();
        assert_eq!(flow.uid, "CsYeNL1xflv3dW9hvb");
        assert_eq!(flow.orig.addr.to_string(), "10.0.2.15");
        assert_eq!(flow.orig.port, Some(59393));
        let resp = flow.resp.unwrap();
        assert_eq!(resp.addr.to_string(), "216.58.201.98");
        assert_eq!(resp.port, Some(443));
        assert_eq!(flow.proto, Transport::Udp);
        assert_eq!(flow.orig_bytes, 5219);
        assert_eq!(flow.resp_pkts, 10);
        assert_eq!(flow.state, "SF");
    }

    #[test]
    fn tabs_conn_file_parses_via_fields_header() {
        let mut parser = ZeekFileParser::new(ZeekLogKind::Conn);
        assert!(parser.feed("#separator \\x09").unwrap().is_none());
        assert!(
            parser
                .feed("#fields\tts\tuid\tid.orig_h\tid.orig_p\tid.resp_h\tid.resp_p\tproto\tduration\torig_bytes\tresp_bytes\tconn_state\torig_pkts\tresp_pkts")
                .unwrap()
                .is_none()
        );
        let flow = parser
            .feed("100.25\tC42\t192.168.1.5\t51234\t8.8.8.8\t53\tudp\t0.4\t60\t120\tSF\t1\t1")
            .unwrap()
            .unwrap();
        assert_eq!(flow.uid, "C42");
        assert_eq!(flow.ts, 100.25);
        assert_eq!(flow.resp.unwrap().port, Some(53));
        assert_eq!(flow.proto, Transport::Udp);
        assert_eq!(flow.duration, 0.4);
        assert_eq!(flow.state, "SF");
    }

    #[test]
    fn tabs_unset_markers_become_absent_fields() {
        let mut parser = ZeekFileParser::new(ZeekLogKind::Conn);
        parser.feed("#fields\tts\tuid\tid.orig_h\tid.orig_p\tid.resp_h\tid.resp_p\tproto\tduration").unwrap();
        let flow = parser
            .feed("5.0\tC1\t10.0.0.1\t-\t10.0.0.2\t-\ticmp\t-")
            .unwrap()
            .unwrap();
        assert_eq!(flow.orig.port, None);
        assert_eq!(flow.proto, Transport::Icmp);
        assert_eq!(flow.duration, 0.0);
    }

    #[test]
    fn dns_json_line_carries_app_subrecord() {
        let line = r#"{"ts":10.0,"uid":"Cdns","id.orig_h":"10.0.0.1","id.orig_p":5353,"id.resp_h":"8.8.8.8","id.resp_p":53,"query":"example.com","qtype_name":"A","rcode_name":"NOERROR","answers":["93.184.216.34"]}"#;
        let mut parser = ZeekFileParser::new(ZeekLogKind::Dns);
        let flow = parser.feed(line).unwrap().unwrap();
        match flow.app {
            Some(AppLayer::Dns(dns)) => {
                assert_eq!(dns.query.as_deref(), Some("example.com"));
                assert_eq!(dns.answers, vec!["93.184.216.34"]);
            }
            other => panic!("expected dns sub-record, got {other:?}"),
        }
    }

    #[test]
    fn ssl_json_line_carries_validation_status() {
        let line = r#"{"ts":20.0,"uid":"Cssl","id.orig_h":"10.0.0.1","id.orig_p":44444,"id.resp_h":"1.2.3.4","id.resp_p":443,"server_name":"bad.example","validation_status":"certificate is not yet valid"}"#;
        let mut parser = ZeekFileParser::new(ZeekLogKind::Ssl);
        let flow = parser.feed(line).unwrap().unwrap();
        match flow.app {
            Some(AppLayer::Ssl(ssl)) => {
                assert_eq!(
                    ssl.validation_status.as_deref(),
                    Some("certificate is not yet valid")
                );
            }
            other => panic!("expected ssl sub-record, got {other:?}"),
        }
    }

    #[test]
    fn negative_duration_is_a_parse_error() {
        let line = r#"{"ts":1.0,"uid":"Cbad","id.orig_h":"10.0.0.1","id.orig_p":1,"id.resp_h":"10.0.0.2","id.resp_p":2,"proto":"tcp","duration":-4.0}"#;
        let mut parser = ZeekFileParser::new(ZeekLogKind::Conn);
        assert_eq!(
            parser.feed(line),
            Err(FlowError::NegativeDuration(-4.0))
        );
    }

    #[test]
    fn missing_endpoint_is_a_parse_error() {
        let line = r#"{"ts":1.0,"uid":"Cbad","id.orig_p":1}"#;
        let mut parser = ZeekFileParser::new(ZeekLogKind::Conn);
        assert!(matches!(
            parser.feed(line),
            Err(FlowError::MissingField(f)) if f == "id.orig_h"
        ));
    }

    #[test]
    fn log_kind_from_stem() {
        assert_eq!(ZeekLogKind::from_stem("conn"), Some(ZeekLogKind::Conn));
        assert_eq!(ZeekLogKind::from_stem("smtp"), Some(ZeekLogKind::Smtp));
        assert_eq!(ZeekLogKind::from_stem("arp"), Some(ZeekLogKind::Arp));
        assert_eq!(ZeekLogKind::from_stem("x509"), None);
        assert_eq!(ZeekLogKind::from_stem("weird"), None);
    }

    #[test]
    fn arp_json_line_parses_without_ports() {
        let line = r#"{"ts":5.0,"operation":"request","orig_h":"192.168.1.7","resp_h":"192.168.1.1","orig_hw":"aa:bb:cc:dd:ee:ff"}"#;
        let mut parser = ZeekFileParser::new(ZeekLogKind::Arp);
        let flow = parser.feed(line).unwrap().unwrap();
        assert_eq!(flow.proto, Transport::Arp);
        assert_eq!(flow.orig.addr.to_string(), "192.168.1.7");
        assert_eq!(flow.orig.port, None);
        let resp = flow.resp.unwrap();
        assert_eq!(resp.addr.to_string(), "192.168.1.1");
        assert_eq!(resp.port, None);
        assert_eq!(flow.state, "request");
    }

    #[test]
    fn gratuitous_arp_has_no_responder() {
        let line = r#"{"ts":6.0,"operation":"announcement","orig_h":"192.168.1.7"}"#;
        let mut parser = ZeekFileParser::new(ZeekLogKind::Arp);
        let flow = parser.feed(line).unwrap().unwrap();
        assert_eq!(flow.proto, Transport::Arp);
        assert!(flow.resp.is_none());
        assert_eq!(flow.uid, "192.168.1.7-6");
    }

    #[test]
    fn negative_byte_count_is_a_parse_error() {
        let line = r#"{"ts":1.0,"uid":"Cneg","id.orig_h":"10.0.0.1","id.orig_p":1,"id.resp_h":"10.0.0.2","id.resp_p":2,"proto":"tcp","duration":0.1,"orig_bytes":-5,"resp_bytes":1}"#;
        let mut parser = ZeekFileParser::new(ZeekLogKind::Conn);
        assert!(matches!(
            parser.feed(line),
            Err(FlowError::BadField { field, .. }) if field == "orig_bytes"
        ));
    }
}
