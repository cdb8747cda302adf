// Rust guideline compliant 2026-07-18

//! Ephemeral key-value store for hot pipeline state.
//!
//! In-process equivalent of the redis-shaped store the pipeline was designed
//! around: typed get/set, atomic increment, hash fields, scored ordered
//! sets, lists with a blocking pop, and publish/subscribe channels. Handles
//! are cheap to clone; every worker holds its own.
//!
//! Single-writer-per-key is a caller convention (each key belongs to exactly
//! one producer stage) -- the store does not enforce it.

use domain::ChannelMessage;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Notify, broadcast};

/// Per-subscriber ring capacity. A subscriber that lags further than this
/// loses the oldest messages (best-effort channels drop oldest on lag).
const CHANNEL_CAPACITY: usize = 4096;

// ---------------------------------------------------------------------------
// Inner state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ListEntry {
    items: VecDeque<String>,
    notify: Arc<Notify>,
}

#[derive(Debug, Default)]
struct KvInner {
    strings: Mutex<HashMap<String, String>>,
    hashes: Mutex<HashMap<String, HashMap<String, String>>>,
    /// Ordered sets: members sorted by (score, member).
    zsets: Mutex<HashMap<String, Vec<(f64, String)>>>,
    lists: Mutex<HashMap<String, ListEntry>>,
    channels: Mutex<HashMap<String, broadcast::Sender<ChannelMessage>>>,
    /// (producer, channel) -> last assigned sequence number.
    seqs: Mutex<HashMap<(String, String), u64>>,
}

// ---------------------------------------------------------------------------
// KvStore
// ---------------------------------------------------------------------------

/// Cheap-to-clone handle to the shared ephemeral store.
#[derive(Debug, Clone, Default)]
pub struct KvStore {
    inner: Arc<KvInner>,
}

impl KvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -- strings ---------------------------------------------------------

    pub fn set(&self, key: &str, value: impl Into<String>) {
        self.inner.strings.lock().insert(key.to_owned(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.strings.lock().get(key).cloned()
    }

    /// Serialize `value` as JSON and store it under `key`.
    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(s) => self.set(key, s),
            Err(e) => log::error!("kv.set_json: key={key} error={e}"),
        }
    }

    /// Fetch `key` and deserialize it from JSON. `None` when the key is
    /// absent or the stored value does not decode as `T`.
    #[must_use]
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        serde_json::from_str(&raw).ok()
    }

    /// Atomically add `by` to the integer at `key` (missing key counts as
    /// zero) and return the new value. `None` when the existing value is
    /// not an integer.
    pub fn incr(&self, key: &str, by: i64) -> Option<i64> {
        let mut strings = self.inner.strings.lock();
        let current = match strings.get(key) {
            Some(raw) => raw.parse::<i64>().ok()?,
            None => 0,
        };
        let next = current + by;
        strings.insert(key.to_owned(), next.to_string());
        Some(next)
    }

    // -- hashes ----------------------------------------------------------

    pub fn hset(&self, key: &str, field: &str, value: impl Into<String>) {
        self.inner
            .hashes
            .lock()
            .entry(key.to_owned())
            .or_default()
            .insert(field.to_owned(), value.into());
    }

    #[must_use]
    pub fn hget(&self, key: &str, field: &str) -> Option<String> {
        self.inner.hashes.lock().get(key)?.get(field).cloned()
    }

    #[must_use]
    pub fn hgetall(&self, key: &str) -> HashMap<String, String> {
        self.inner.hashes.lock().get(key).cloned().unwrap_or_default()
    }

    // -- ordered sets ----------------------------------------------------

    /// Insert `member` with `score`, or update its score if already
    /// present. Returns true when the member was newly added.
    pub fn zadd(&self, key: &str, score: f64, member: &str) -> bool {
        let mut zsets = self.inner.zsets.lock();
        let set = zsets.entry(key.to_owned()).or_default();
        let added = match set.iter().position(|(_, m)| m == member) {
            Some(i) => {
                set.remove(i);
                false
            }
            None => true,
        };
        let at = set
            .binary_search_by(|(s, m)| {
                s.total_cmp(&score).then_with(|| m.as_str().cmp(member))
            })
            .unwrap_or_else(|i| i);
        set.insert(at, (score, member.to_owned()));
        added
    }

    /// Number of members in the ordered set at `key`.
    #[must_use]
    pub fn zcard(&self, key: &str) -> usize {
        self.inner.zsets.lock().get(key).map_or(0, Vec::len)
    }

    /// All members of the ordered set at `key`, in score order.
    #[must_use]
    pub fn zmembers(&self, key: &str) -> Vec<String> {
        self.inner
            .zsets
            .lock()
            .get(key)
            .map(|set| set.iter().map(|(_, m)| m.clone()).collect())
            .unwrap_or_default()
    }

    // -- lists -----------------------------------------------------------

    /// Append `value` to the list at `key` and wake one blocked popper.
    pub fn rpush(&self, key: &str, value: impl Into<String>) {
        let notify = {
            let mut lists = self.inner.lists.lock();
            let entry = lists.entry(key.to_owned()).or_default();
            entry.items.push_back(value.into());
            Arc::clone(&entry.notify)
        };
        notify.notify_one();
    }

    /// Pop the head of the list at `key` without blocking.
    #[must_use]
    pub fn lpop(&self, key: &str) -> Option<String> {
        self.inner.lists.lock().get_mut(key)?.items.pop_front()
    }

    /// Pop the head of the list at `key`, waiting until an item arrives.
    pub async fn blpop(&self, key: &str) -> String {
        loop {
            let notify = {
                let mut lists = self.inner.lists.lock();
                Arc::clone(&lists.entry(key.to_owned()).or_default().notify)
            };
            // Register interest before the emptiness check so a push
            // between check and await leaves a stored permit.
            let notified = notify.notified();
            if let Some(v) = self.lpop(key) {
                return v;
            }
            notified.await;
        }
    }

    // -- publish/subscribe ----------------------------------------------

    /// Publish `payload` on `channel` as `producer`.
    ///
    /// Delivered at least once to every currently-subscribed consumer, in
    /// FIFO order per publisher per channel. Returns the assigned
    /// per-producer sequence number. With no subscribers the message is
    /// dropped.
    pub fn publish(&self, producer: &str, channel: &str, payload: impl Into<String>) -> u64 {
        let seq = {
            let mut seqs = self.inner.seqs.lock();
            let entry = seqs
                .entry((producer.to_owned(), channel.to_owned()))
                .or_insert(0);
            *entry += 1;
            *entry
        };
        let msg = ChannelMessage {
            channel: channel.to_owned(),
            payload: payload.into(),
            producer: producer.to_owned(),
            seq,
        };
        let sender = {
            let mut channels = self.inner.channels.lock();
            channels
                .entry(channel.to_owned())
                .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
                .clone()
        };
        // A send error only means no subscriber exists right now.
        drop(sender.send(msg));
        seq
    }

    /// Subscribe to `channel`. Messages published after this call are
    /// delivered to the returned handle.
    #[must_use]
    pub fn subscribe(&self, channel: &str) -> Subscription {
        let rx = {
            let mut channels = self.inner.channels.lock();
            channels
                .entry(channel.to_owned())
                .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
                .subscribe()
        };
        Subscription {
            channel: channel.to_owned(),
            rx,
        }
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Receive side of one channel subscription.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    rx: broadcast::Receiver<ChannelMessage>,
}

impl Subscription {
    /// Store channel name this subscription is attached to.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Pop the next pending message without waiting. Skips over lag gaps
    /// (dropped-oldest messages are logged and lost, not an error).
    pub fn try_next(&mut self) -> Option<ChannelMessage> {
        loop {
            match self.rx.try_recv() {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    log::warn!(
                        "kv.subscription.lagged: channel={} dropped={n}",
                        self.channel
                    );
                }
                Err(_) => return None,
            }
        }
    }

    /// Wait for the next message. `None` once the channel has no publisher
    /// side left and the ring is drained.
    pub async fn next(&mut self) -> Option<ChannelMessage> {
        loop {
            match self.rx.recv().await {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!(
                        "kv.subscription.lagged: channel={} dropped={n}",
                        self.channel
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::KvStore;
    use std::time::Duration;

    #[test]
    fn string_set_get() {
        let kv = KvStore::new();
        assert_eq!(kv.get("k"), None);
        kv.set("k", "v");
        assert_eq!(kv.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn json_roundtrip_and_decode_failure() {
        let kv = KvStore::new();
        kv.set_json("nums", &vec![1u32, 2, 3]);
        assert_eq!(kv.get_json::<Vec<u32>>("nums"), Some(vec![1, 2, 3]));
        kv.set("broken", "not json");
        assert_eq!(kv.get_json::<Vec<u32>>("broken"), None);
    }

    #[test]
    fn incr_from_missing_and_existing() {
        let kv = KvStore::new();
        assert_eq!(kv.incr("c", 1), Some(1));
        assert_eq!(kv.incr("c", 4), Some(5));
        kv.set("c", "oops");
        assert_eq!(kv.incr("c", 1), None);
    }

    #[test]
    fn hash_fields() {
        let kv = KvStore::new();
        kv.hset("h", "a", "1");
        kv.hset("h", "b", "2");
        kv.hset("h", "a", "3");
        assert_eq!(kv.hget("h", "a").as_deref(), Some("3"));
        let all = kv.hgetall("h");
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("b").map(String::as_str), Some("2"));
    }

    #[test]
    fn zadd_orders_by_score_and_deduplicates() {
        let kv = KvStore::new();
        assert!(kv.zadd("z", 2.0, "b"));
        assert!(kv.zadd("z", 1.0, "a"));
        assert!(kv.zadd("z", 3.0, "c"));
        // Updating an existing member must not grow the set.
        assert!(!kv.zadd("z", 0.5, "c"));
        assert_eq!(kv.zcard("z"), 3);
        assert_eq!(kv.zmembers("z"), vec!["c", "a", "b"]);
    }

    #[test]
    fn list_push_pop_fifo() {
        let kv = KvStore::new();
        kv.rpush("l", "1");
        kv.rpush("l", "2");
        assert_eq!(kv.lpop("l").as_deref(), Some("1"));
        assert_eq!(kv.lpop("l").as_deref(), Some("2"));
        assert_eq!(kv.lpop("l"), None);
    }

    #[tokio::test]
    async fn blpop_waits_for_push() {
        let kv = KvStore::new();
        let pusher = kv.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            pusher.rpush("q", "item");
        });
        let got = kv.blpop("q").await;
        assert_eq!(got, "item");
        handle.await.unwrap();
    }

    #[test]
    fn publish_subscribe_fifo_per_publisher() {
        let kv = KvStore::new();
        let mut sub = kv.subscribe("c1");
        kv.publish("p1", "c1", "m1");
        kv.publish("p1", "c1", "m2");
        kv.publish("p1", "c1", "m3");

        let mut seen = vec![];
        while let Some(msg) = sub.try_next() {
            assert_eq!(msg.channel, "c1");
            assert_eq!(msg.producer, "p1");
            seen.push((msg.seq, msg.payload));
        }
        assert_eq!(
            seen,
            vec![
                (1, "m1".to_owned()),
                (2, "m2".to_owned()),
                (3, "m3".to_owned())
            ]
        );
    }

    #[test]
    fn every_subscriber_sees_every_message() {
        let kv = KvStore::new();
        let mut sub_a = kv.subscribe("c");
        let mut sub_b = kv.subscribe("c");
        kv.publish("p", "c", "x");
        kv.publish("p", "c", "y");

        for sub in [&mut sub_a, &mut sub_b] {
            assert_eq!(sub.try_next().unwrap().payload, "x");
            assert_eq!(sub.try_next().unwrap().payload, "y");
            assert!(sub.try_next().is_none());
        }
    }

    #[test]
    fn sequence_numbers_are_per_producer_per_channel() {
        let kv = KvStore::new();
        let mut sub = kv.subscribe("c");
        kv.publish("p1", "c", "a");
        kv.publish("p2", "c", "b");
        kv.publish("p1", "c", "c");
        kv.publish("p1", "other", "d");

        let msgs: Vec<_> = std::iter::from_fn(|| sub.try_next()).collect();
        assert_eq!(msgs.len(), 3);
        assert_eq!((msgs[0].producer.as_str(), msgs[0].seq), ("p1", 1));
        assert_eq!((msgs[1].producer.as_str(), msgs[1].seq), ("p2", 1));
        assert_eq!((msgs[2].producer.as_str(), msgs[2].seq), ("p1", 2));
    }

    #[test]
    fn messages_before_subscribe_are_not_delivered() {
        let kv = KvStore::new();
        kv.publish("p", "c", "early");
        let mut sub = kv.subscribe("c");
        assert!(sub.try_next().is_none());
        kv.publish("p", "c", "late");
        assert_eq!(sub.try_next().unwrap().payload, "late");
    }
}
