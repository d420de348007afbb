//! Fleet Telemetry Server Library
//!
//! Provides the HTTP and bootstrap components for testing and reuse.

pub mod api;
pub mod config;
pub mod engine;
