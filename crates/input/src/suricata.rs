// Rust guideline compliant 2026-07-21

//! Suricata eve-json line parsing.
//!
//! `flow` events become full flow records with per-direction counters;
//! `http`, `dns` and `tls` events become flows carrying the matching
//! app-layer sub-record. Every other event type is skipped without error.

use chrono::DateTime;
use domain::{
    AppLayer, DnsFields, Endpoint, FlowError, FlowRecord, HttpFields, SslFields, Transport,
};
use serde_json::{Map, Value};

/// Eve timestamps: `2021-06-06T15:57:37.272281+0200`.
const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

fn parse_ts(raw: &str) -> Result<f64, FlowError> {
    let dt = DateTime::parse_from_str(raw, TS_FORMAT).map_err(|_| FlowError::BadField {
        field: "timestamp".to_owned(),
        value: raw.to_owned(),
    })?;
    #[expect(clippy::cast_precision_loss, reason = "microsecond epoch fits f64")]
    let ts = dt.timestamp_micros() as f64 / 1e6;
    Ok(ts)
}

fn str_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn u64_field(obj: &Map<String, Value>, key: &str) -> Option<u64> {
    obj.get(key).and_then(Value::as_u64)
}

fn u16_field(obj: &Map<String, Value>, key: &str) -> Option<u16> {
    u64_field(obj, key).and_then(|v| u16::try_from(v).ok())
}

/// Counters are non-negative by invariant: absent means zero, but a value
/// that is not an unsigned integer (negatives included) fails the event.
fn count_field(obj: &Map<String, Value>, key: &str) -> Result<u64, FlowError> {
    match obj.get(key) {
        None => Ok(0),
        Some(value) => value.as_u64().ok_or_else(|| FlowError::BadField {
            field: key.to_owned(),
            value: value.to_string(),
        }),
    }
}

/// Parse one eve-json line. Returns `Ok(None)` for event types the
/// pipeline does not consume (alerts, stats, ...).
///
/// # Errors
///
/// Returns [`FlowError`] when a consumed event cannot be mapped to a flow.
pub fn parse_line(line: &str) -> Result<Option<FlowRecord>, FlowError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let value: Value =
        serde_json::from_str(line).map_err(|_| FlowError::Unparseable(line.to_owned()))?;
    let obj = value
        .as_object()
        .ok_or_else(|| FlowError::Unparseable(line.to_owned()))?;

    let event_type = obj
        .get("event_type")
        .and_then(Value::as_str)
        .ok_or_else(|| FlowError::MissingField("event_type".to_owned()))?;
    let app = match event_type {
        "flow" => None,
        "http" => Some(http_subrecord(obj)),
        "dns" => Some(dns_subrecord(obj)),
        "tls" => Some(tls_subrecord(obj)),
        _ => return Ok(None),
    };

    let ts_raw = str_field(obj, "timestamp")
        .ok_or_else(|| FlowError::MissingField("timestamp".to_owned()))?;
    let ts = parse_ts(&ts_raw)?;

    let src = str_field(obj, "src_ip")
        .ok_or_else(|| FlowError::MissingField("src_ip".to_owned()))?;
    let dst = str_field(obj, "dest_ip")
        .ok_or_else(|| FlowError::MissingField("dest_ip".to_owned()))?;
    let orig = Endpoint::new(
        src.parse().map_err(|_| FlowError::BadField {
            field: "src_ip".to_owned(),
            value: src,
        })?,
        u16_field(obj, "src_port"),
    );
    let resp = Endpoint::new(
        dst.parse().map_err(|_| FlowError::BadField {
            field: "dest_ip".to_owned(),
            value: dst,
        })?,
        u16_field(obj, "dest_port"),
    );

    let uid = u64_field(obj, "flow_id")
        .map_or_else(|| format!("{orig}-{resp}-{ts}"), |id| id.to_string());
    let proto = str_field(obj, "proto").map_or(Transport::Other, |p| Transport::from_token(&p));

    let mut flow = FlowRecord {
        uid,
        ts,
        orig,
        resp: Some(resp),
        proto,
        duration: 0.0,
        orig_bytes: 0,
        resp_bytes: 0,
        orig_pkts: 0,
        resp_pkts: 0,
        state: String::new(),
        app,
    };

    if let Some(counters) = obj.get("flow").and_then(Value::as_object) {
        flow.orig_pkts = count_field(counters, "pkts_toserver")?;
        flow.resp_pkts = count_field(counters, "pkts_toclient")?;
        flow.orig_bytes = count_field(counters, "bytes_toserver")?;
        flow.resp_bytes = count_field(counters, "bytes_toclient")?;
        flow.state = str_field(counters, "state").unwrap_or_default();
        if let (Some(start), Some(end)) =
            (str_field(counters, "start"), str_field(counters, "end"))
            && let (Ok(start), Ok(end)) = (parse_ts(&start), parse_ts(&end))
        {
            flow.duration = end - start;
        }
    }

    flow.validate()?;
    Ok(Some(flow))
}

fn http_subrecord(obj: &Map<String, Value>) -> AppLayer {
    let http = obj.get("http").and_then(Value::as_object);
    AppLayer::Http(http.map_or_else(HttpFields::default, |h| HttpFields {
        method: str_field(h, "http_method"),
        host: str_field(h, "hostname"),
        uri: str_field(h, "url"),
        status_code: u16_field(h, "status"),
        user_agent: str_field(h, "http_user_agent"),
        response_body_len: u64_field(h, "length"),
    }))
}

fn dns_subrecord(obj: &Map<String, Value>) -> AppLayer {
    let dns = obj.get("dns").and_then(Value::as_object);
    AppLayer::Dns(dns.map_or_else(DnsFields::default, |d| DnsFields {
        query: str_field(d, "rrname"),
        qtype: str_field(d, "rrtype"),
        rcode: str_field(d, "rcode"),
        answers: vec![],
    }))
}

fn tls_subrecord(obj: &Map<String, Value>) -> AppLayer {
    let tls = obj.get("tls").and_then(Value::as_object);
    AppLayer::Ssl(tls.map_or_else(SslFields::default, |t| SslFields {
        server_name: str_field(t, "sni"),
        subject: str_field(t, "subject"),
        issuer: str_field(t, "issuerdn"),
        validation_status: None,
        version: str_field(t, "version"),
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::parse_line;
    use domain::{AppLayer, Transport};

    /// Literal eve flow event from a real export.
    const FLOW_EVENT: &str = r#"{"timestamp":"2021-06-06T15:57:37.272281+0200","flow_id":2054715089912378,"event_type":"flow","src_ip":"193.46.255.92","src_port":49569,"dest_ip":"192.168.1.129","dest_port":8014,"proto":"TCP","flow":{"pkts_toserver":2,"pkts_toclient":2,"bytes_toserver":120,"bytes_toclient":120,"start":"2021-06-07T15:45:48.950842+0200","end":"2021-06-07T15:45:48.951095+0200","age":0,"state":"closed","reason":"shutdown","alerted":false},"tcp":{"tcp_flags":"16","state":"closed"},"host":"stratosphere.org"}"#;

    #[test]
    fn flow_event_parses() {
        let flow = parse_line(FLOW_EVENT).unwrap().unwrap();
        assert_eq!(flow.uid, "2054715089912378");
        assert_eq!(flow.orig.addr.to_string(), "193.46.255.92");
        assert_eq!(flow.orig.port, Some(49569));
        let resp = flow.resp.unwrap();
        assert_eq!(resp.addr.to_string(), "192.168.1.129");
        assert_eq!(resp.port, Some(8014));
        assert_eq!(flow.proto, Transport::Tcp);
        assert_eq!(flow.orig_pkts, 2);
        assert_eq!(flow.resp_bytes, 120);
        assert_eq!(flow.state, "closed");
        assert!(flow.duration > 0.0);
        assert!(flow.app.is_none());
    }

    #[test]
    fn non_flow_events_are_skipped() {
        let stats = r#"{"timestamp":"2021-06-06T15:57:37.272281+0200","event_type":"stats","stats":{}}"#;
        assert_eq!(parse_line(stats).unwrap(), None);
    }

    #[test]
    fn tls_event_carries_ssl_subrecord() {
        let line = r#"{"timestamp":"2021-06-06T15:57:37.272281+0200","flow_id":1,"event_type":"tls","src_ip":"10.0.0.1","src_port":5555,"dest_ip":"1.2.3.4","dest_port":443,"proto":"TCP","tls":{"sni":"example.org","subject":"CN=example.org","issuerdn":"CN=ca","version":"TLS 1.2"}}"#;
        let flow = parse_line(line).unwrap().unwrap();
        match flow.app {
            Some(AppLayer::Ssl(ssl)) => {
                assert_eq!(ssl.server_name.as_deref(), Some("example.org"));
                assert_eq!(ssl.issuer.as_deref(), Some("CN=ca"));
            }
            other => panic!("expected ssl sub-record, got {other:?}"),
        }
    }

    #[test]
    fn garbage_line_is_an_error() {
        assert!(parse_line("not json at all").is_err());
    }

    #[test]
    fn negative_counter_is_a_parse_error() {
        let line = r#"{"timestamp":"2021-06-06T15:57:37.272281+0200","flow_id":2,"event_type":"flow","src_ip":"10.0.0.1","src_port":1,"dest_ip":"10.0.0.2","dest_port":2,"proto":"TCP","flow":{"pkts_toserver":2,"pkts_toclient":2,"bytes_toserver":-120,"bytes_toclient":120,"state":"closed"}}"#;
        assert!(matches!(
            parse_line(line),
            Err(domain::FlowError::BadField { field, .. }) if field == "bytes_toserver"
        ));
    }

    #[test]
    fn blank_line_is_skipped() {
        assert_eq!(parse_line("   ").unwrap(), None);
    }
}
