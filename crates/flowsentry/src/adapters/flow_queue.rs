// Rust guideline compliant 2026-07-25

//! Bounded queue adapter between the input and profiler stages.
//!
//! Implements the `FlowSink` / `FlowSource` ports over a bounded tokio
//! channel: producers wait when the queue is at capacity (backpressure
//! instead of unbounded growth), the consumer drains until every sender is
//! gone.

use domain::{FlowSink, FlowSource, ProfilerMsg, QueueError};
use tokio::sync::mpsc;

/// Create the sender/receiver pair with the given capacity.
#[must_use]
pub fn flow_queue(capacity: usize) -> (FlowQueueSender, FlowQueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (FlowQueueSender { tx }, FlowQueueReceiver { rx })
}

/// Write side; cheap to clone, one per producing worker.
#[derive(Debug, Clone)]
pub struct FlowQueueSender {
    tx: mpsc::Sender<ProfilerMsg>,
}

impl FlowSink for FlowQueueSender {
    /// Enqueue one item, waiting while the queue is at capacity.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] when the profiler is gone.
    async fn send(&self, msg: ProfilerMsg) -> Result<(), QueueError> {
        self.tx.send(msg).await.map_err(|_| QueueError::Closed)
    }
}

/// Read side; owned by the profiler worker.
#[derive(Debug)]
pub struct FlowQueueReceiver {
    rx: mpsc::Receiver<ProfilerMsg>,
}

impl FlowSource for FlowQueueReceiver {
    async fn recv(&mut self) -> Option<ProfilerMsg> {
        self.rx.recv().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::flow_queue;
    use domain::{
        Endpoint, FlowRecord, FlowSink as _, FlowSource as _, ProfilerMsg, QueueError, Transport,
    };
    use std::time::Duration;

    fn make_msg(uid: &str) -> ProfilerMsg {
        ProfilerMsg::Flow(Box::new(FlowRecord {
            uid: uid.to_owned(),
            ts: 1.0,
            orig: Endpoint::new("10.0.0.1".parse().unwrap(), Some(1)),
            resp: Some(Endpoint::new("10.0.0.2".parse().unwrap(), Some(2))),
            proto: Transport::Tcp,
            duration: 0.0,
            orig_bytes: 0,
            resp_bytes: 0,
            orig_pkts: 0,
            resp_pkts: 0,
            state: String::new(),
            app: None,
        }))
    }

    #[tokio::test]
    async fn queue_preserves_source_order() {
        let (tx, mut rx) = flow_queue(8);
        tx.send(make_msg("a")).await.unwrap();
        tx.send(make_msg("b")).await.unwrap();
        drop(tx);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(first, ProfilerMsg::Flow(f) if f.uid == "a"));
        assert!(matches!(second, ProfilerMsg::Flow(f) if f.uid == "b"));
        assert!(rx.recv().await.is_none(), "closed after all senders drop");
    }

    #[tokio::test]
    async fn send_to_dropped_receiver_reports_closed() {
        let (tx, rx) = flow_queue(1);
        drop(rx);
        assert_eq!(tx.send(make_msg("x")).await, Err(QueueError::Closed));
    }

    #[tokio::test]
    async fn full_queue_applies_backpressure() {
        let (tx, mut rx) = flow_queue(1);
        tx.send(make_msg("first")).await.unwrap();

        // The second send must wait until the consumer makes room.
        let pending = tx.send(make_msg("second"));
        tokio::pin!(pending);
        assert!(
            tokio::time::timeout(Duration::from_millis(20), &mut pending)
                .await
                .is_err(),
            "send on a full queue must block"
        );

        rx.recv().await.unwrap();
        tokio::time::timeout(Duration::from_millis(100), pending)
            .await
            .expect("send must resume once capacity frees up")
            .unwrap();
    }
}
