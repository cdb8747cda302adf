// Rust guideline compliant 2026-07-18

//! Channel fabric: well-known channel names, the per-module channel
//! tracker, and the subscriber-identity filter.
//!
//! Delivery ordering is FIFO per publisher per channel; cross-channel
//! ordering is undefined. No delivery is owed across a supervisor-signaled
//! shutdown.

use domain::ChannelMessage;
use std::collections::HashMap;

// Well-known store channels.
pub const NEW_FLOW: &str = "new_flow";
pub const NEW_TW: &str = "new_tw";
pub const NEW_IP: &str = "new_ip";
pub const NEW_DNS: &str = "new_dns";
pub const NEW_HTTP: &str = "new_http";
pub const NEW_SSL: &str = "new_ssl";
pub const NEW_NOTICE: &str = "new_notice";
pub const NEW_ALERT: &str = "new_alert";
pub const EVIDENCE_ADDED: &str = "evidence_added";
pub const FINISHED_MODULES: &str = "finished_modules";
pub const CONTROL_CHANNEL: &str = "control_channel";

/// Decide whether an envelope is intended for a subscriber attached to
/// `subscriber_channel`. The target is explicit in the envelope; no payload
/// inspection.
#[must_use]
pub fn is_msg_intended_for(msg: &ChannelMessage, subscriber_channel: &str) -> bool {
    msg.channel == subscriber_channel
}

// ---------------------------------------------------------------------------
// ChannelTracker
// ---------------------------------------------------------------------------

/// Tracks, per subscribed channel, whether a message arrived in the last
/// loop iteration.
///
/// The point is the drain bias of module termination: a module keeps
/// looping as long as any one of its channels is still receiving, because
/// that channel may well receive another message, and only stops once all
/// of them were quiet for a full iteration.
#[derive(Debug, Default)]
pub struct ChannelTracker {
    received: HashMap<String, bool>,
}

impl ChannelTracker {
    /// Build a tracker for the given logical channel names, all initially
    /// marked as not having received.
    #[must_use]
    pub fn new<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            received: channels.into_iter().map(|c| (c.into(), false)).collect(),
        }
    }

    /// Record whether `channel` received a message this iteration.
    pub fn mark(&mut self, channel: &str, received: bool) {
        if let Some(flag) = self.received.get_mut(channel) {
            *flag = received;
        }
    }

    /// True when any subscribed channel received a message in the last
    /// iteration.
    #[must_use]
    pub fn any_received(&self) -> bool {
        self.received.values().any(|&r| r)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(channel: &str) -> ChannelMessage {
        ChannelMessage {
            channel: channel.to_owned(),
            payload: "{}".to_owned(),
            producer: "test".to_owned(),
            seq: 1,
        }
    }

    #[test]
    fn filter_matches_on_envelope_channel() {
        assert!(is_msg_intended_for(&envelope(NEW_FLOW), NEW_FLOW));
        assert!(!is_msg_intended_for(&envelope(NEW_FLOW), NEW_TW));
    }

    #[test]
    fn tracker_starts_quiet() {
        let tracker = ChannelTracker::new([NEW_FLOW, NEW_TW]);
        assert!(!tracker.any_received());
    }

    #[test]
    fn tracker_any_received_follows_marks() {
        let mut tracker = ChannelTracker::new([NEW_FLOW, NEW_TW]);
        tracker.mark(NEW_TW, true);
        assert!(tracker.any_received());
        tracker.mark(NEW_TW, false);
        assert!(!tracker.any_received());
    }

    #[test]
    fn tracker_ignores_undeclared_channels() {
        let mut tracker = ChannelTracker::new([NEW_FLOW]);
        tracker.mark(NEW_ALERT, true);
        assert!(!tracker.any_received());
    }
}
