// Rust guideline compliant 2026-07-18

//! Shared Store: one facade over the two sub-stores every worker talks to.
//!
//! [`kv`] is the ephemeral key-value store carrying hot state and the
//! pub/sub channels; [`sqlite`] is the durable tabular store with the
//! per-connection and per-database locking contract; [`channels`] is the
//! channel fabric built on the KV store's publish/subscribe primitive.
//!
//! Entry points: [`KvStore`], [`SqliteStore`], [`ChannelTracker`].

pub mod channels;
pub mod kv;
pub mod sqlite;

pub use channels::{ChannelTracker, is_msg_intended_for};
pub use kv::{KvStore, Subscription};
pub use sqlite::{SqlValue, SqliteStore};
