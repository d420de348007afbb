//! Metrics collection and reporting
//!
//! Counters back the operational signals of the pipeline: dropped samples,
//! failed batches, partner delivery failures and clamped score anomalies.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Observations retained per histogram
const HISTOGRAM_WINDOW: usize = 4096;

/// Well-known metric names
pub mod names {
    pub const INGESTION_ENQUEUED: &str = "ingestion.enqueued";
    pub const INGESTION_REJECTED: &str = "ingestion.rejected";
    pub const INGESTION_DROPPED: &str = "ingestion.dropped";
    pub const INGESTION_BATCHES_FLUSHED: &str = "ingestion.batches_flushed";
    pub const INGESTION_SAMPLES_FLUSHED: &str = "ingestion.samples_flushed";
    pub const INGESTION_BATCH_FAILURES: &str = "ingestion.batch_failures";
    pub const INGESTION_FLUSH: &str = "ingestion.flush";

    pub const STATE_STALE_SAMPLES: &str = "state.stale_samples";

    pub const DETECTOR_JOBS_DROPPED: &str = "detectors.jobs_dropped";
    pub const DETECTOR_FAILURES: &str = "detectors.failures";
    pub const DETECTOR_EVENTS: &str = "detectors.events";
    pub const DETECTOR_SINK_FAILURES: &str = "detectors.sink_failures";
    pub const DETECTOR_RUN: &str = "detectors.run";

    pub const GEOFENCE_REFRESH_FAILURES: &str = "geofences.refresh_failures";

    pub const FRAUD_SCORED: &str = "fraud.scored";
    pub const FRAUD_ANOMALIES: &str = "fraud.anomalies";
    pub const FRAUD_ALERTS: &str = "fraud.alerts";

    pub const ADAPTER_DROPPED: &str = "adapter.dropped";
    pub const ADAPTER_UNCLASSIFIED: &str = "adapter.unclassified";
    pub const ADAPTER_DELIVERED: &str = "adapter.delivered";
    pub const ADAPTER_DELIVERY_FAILURES: &str = "adapter.delivery_failures";
    pub const ADAPTER_RATE_LIMITED: &str = "adapter.rate_limited";

    pub const TRANSPORT_PUBLISH_FAILURES: &str = "transport.publish_failures";
}

/// Monotonic counter metric
#[derive(Debug)]
pub struct Counter {
    name: String,
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Increment the counter
    pub fn inc(&self) {
        self.add(1);
    }

    /// Add a value to the counter
    pub fn add(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    /// Get the current value
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Reset the counter
    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}

/// Histogram over a sliding window of recent observations
#[derive(Debug)]
pub struct Histogram {
    name: String,
    values: RwLock<VecDeque<f64>>,
    total_count: AtomicU64,
}

impl Histogram {
    /// Create a new histogram
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: RwLock::new(VecDeque::with_capacity(64)),
            total_count: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Observe a value
    pub fn observe(&self, value: f64) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        if values.len() == HISTOGRAM_WINDOW {
            values.pop_front();
        }
        values.push_back(value);
        self.total_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Observe a duration in milliseconds
    pub fn observe_duration(&self, duration: Duration) {
        self.observe(duration.as_secs_f64() * 1000.0);
    }

    /// Observations ever recorded, including those evicted from the window
    pub fn count(&self) -> u64 {
        self.total_count.load(Ordering::Relaxed)
    }

    /// Average over the window
    pub fn avg(&self) -> f64 {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    }

    /// Percentile (0-100) over the window
    pub fn percentile(&self, p: f64) -> f64 {
        let mut values: Vec<f64> = self
            .values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .copied()
            .collect();
        if values.is_empty() {
            return 0.0;
        }

        values.sort_by(|a, b| a.total_cmp(b));
        let index = ((p.clamp(0.0, 100.0) / 100.0) * (values.len() - 1) as f64).round() as usize;
        values[index]
    }

    /// Reset the histogram
    pub fn reset(&self) {
        self.values.write().unwrap_or_else(|e| e.into_inner()).clear();
        self.total_count.store(0, Ordering::Relaxed);
    }
}

/// Summary of a histogram at snapshot time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramSummary {
    pub count: u64,
    pub avg: f64,
    pub p50: f64,
    pub p99: f64,
}

/// Point-in-time view of every metric
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub histograms: BTreeMap<String, HistogramSummary>,
}

/// Metrics trait
pub trait Metrics: Send + Sync {
    /// Get or create a counter
    fn counter(&self, name: &str) -> Arc<Counter>;

    /// Get or create a histogram
    fn histogram(&self, name: &str) -> Arc<Histogram>;

    /// Record how long an operation took
    fn record_duration(&self, operation: &str, duration: Duration) {
        self.histogram(operation).observe_duration(duration);
    }

    /// Increment a named counter
    fn incr(&self, name: &str) {
        self.counter(name).inc();
    }
}

/// Metrics collector shared by every component
#[derive(Default)]
pub struct MetricsCollector {
    counters: RwLock<HashMap<String, Arc<Counter>>>,
    histograms: RwLock<HashMap<String, Arc<Histogram>>>,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter, 0 if it was never touched
    pub fn counter_value(&self, name: &str) -> u64 {
        self.counters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map(|c| c.get())
            .unwrap_or(0)
    }

    /// Snapshot all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self
            .counters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(name, counter)| (name.clone(), counter.get()))
            .collect();

        let histograms = self
            .histograms
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(name, hist)| {
                (
                    name.clone(),
                    HistogramSummary {
                        count: hist.count(),
                        avg: hist.avg(),
                        p50: hist.percentile(50.0),
                        p99: hist.percentile(99.0),
                    },
                )
            })
            .collect();

        MetricsSnapshot { counters, histograms }
    }

    /// Reset all metrics
    pub fn reset_all(&self) {
        for counter in self.counters.read().unwrap_or_else(|e| e.into_inner()).values() {
            counter.reset();
        }
        for histogram in self.histograms.read().unwrap_or_else(|e| e.into_inner()).values() {
            histogram.reset();
        }
    }
}

impl Metrics for MetricsCollector {
    fn counter(&self, name: &str) -> Arc<Counter> {
        if let Some(counter) = self.counters.read().unwrap_or_else(|e| e.into_inner()).get(name) {
            return counter.clone();
        }
        self.counters
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Counter::new(name)))
            .clone()
    }

    fn histogram(&self, name: &str) -> Arc<Histogram> {
        if let Some(hist) = self.histograms.read().unwrap_or_else(|e| e.into_inner()).get(name) {
            return hist.clone();
        }
        self.histograms
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Histogram::new(name)))
            .clone()
    }
}
