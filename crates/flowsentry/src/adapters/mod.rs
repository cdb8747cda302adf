// Rust guideline compliant 2026-07-25

//! Adapters (secondary ports) for the flowsentry binary.
//!
//! Each sub-module implements one or more hexagonal port traits defined in
//! the `domain` crate.

pub mod flow_queue;
