//! The HTTP skin and environment-configuration loading around
//! [`counter_core`]. Kept as a library (in addition to the `main.rs`
//! binary) so integration tests can drive the router directly.

pub mod api;
pub mod config;
