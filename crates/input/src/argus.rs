// Rust guideline compliant 2026-07-21

//! Argus stdin lines: header-less binetflow rows in the default column
//! layout.

use crate::binetflow::BinetflowParser;
use domain::{FlowError, FlowRecord};

/// Parse one header-less argus line.
///
/// # Errors
///
/// Returns [`FlowError`] for rows that cannot be mapped to a flow.
pub fn parse_line(line: &str) -> Result<Option<FlowRecord>, FlowError> {
    BinetflowParser::with_default_columns().parse_line(line)
}

#[cfg(test)]
mod tests {
    use super::parse_line;
    use domain::Transport;

    #[test]
    fn stdin_argus_line_parses() {
        // Literal line from the stdin contract.
        let flow = parse_line(
            "2019/04/05 16:15:09.194268,0.031142,udp,10.8.0.69,8278,  <->,8.8.8.8,53,CON,0,0,2,186,64,1,",
        )
        .unwrap()
        .unwrap();
        assert_eq!(flow.orig.addr.to_string(), "10.8.0.69");
        assert_eq!(flow.resp.unwrap().port, Some(53));
        assert_eq!(flow.proto, Transport::Udp);
        assert_eq!(flow.state, "CON");
        assert_eq!(flow.orig_pkts, 2);
        assert_eq!(flow.orig_bytes, 64);
    }
}
