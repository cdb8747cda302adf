// Rust guideline compliant 2026-07-25

//! Built-in modules riding on the module host.

pub mod evidence;
