//! Observability module
//!
//! Provides the metrics registry shared by all pipeline components. Logging
//! goes through `tracing`; the binary decides where it ends up.

pub mod metrics;

pub use metrics::{names, Counter, Histogram, HistogramSummary, Metrics, MetricsCollector, MetricsSnapshot};
