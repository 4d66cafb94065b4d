//! Per-operation aggregates and the point-in-time view built from them.

use hdrhistogram::Histogram;
use serde::Serialize;
use std::borrow::Cow;
use std::time::Duration;
use tenantload_core::{Error, Result, Timestamp};

use crate::timing::TimingEvent;

/// Percentiles reported for every operation, as quantiles.
pub const PERCENTILES: [f64; 10] = [0.50, 0.66, 0.75, 0.80, 0.90, 0.95, 0.98, 0.99, 0.999, 1.0];

/// Kind label of the aggregated row.
pub const AGGREGATED_KIND: &str = "";

/// Name label of the aggregated row.
pub const AGGREGATED_NAME: &str = "Aggregated";

/// Highest trackable latency: one minute, in microseconds.
const HISTOGRAM_MAX_US: u64 = 60_000_000;

/// Running aggregate of one (kind, name) pair
#[derive(Debug, Clone)]
pub struct OperationStats {
    histogram: Histogram<u64>,
    count: u64,
    failures: u64,
    total_us: u128,
    min: Option<Duration>,
    max: Duration,
    total_response_size: u64,
}

impl OperationStats {
    /// Empty aggregate.
    ///
    /// # Errors
    /// Returns [`Error::Internal`] if the histogram cannot be allocated.
    pub fn new() -> Result<Self> {
        let histogram = Histogram::<u64>::new_with_bounds(1, HISTOGRAM_MAX_US, 3)
            .map_err(|e| Error::internal(format!("histogram allocation failed: {e}")))?;
        Ok(Self {
            histogram,
            count: 0,
            failures: 0,
            total_us: 0,
            min: None,
            max: Duration::ZERO,
            total_response_size: 0,
        })
    }

    /// Fold one event into the aggregate.
    pub fn record(&mut self, event: &TimingEvent) {
        let micros = u64::try_from(event.duration.as_micros()).unwrap_or(u64::MAX);
        self.histogram.saturating_record(micros.clamp(1, HISTOGRAM_MAX_US));
        self.count += 1;
        if !event.success {
            self.failures += 1;
        }
        self.total_us += event.duration.as_micros();
        self.min = Some(self.min.map_or(event.duration, |min| min.min(event.duration)));
        self.max = self.max.max(event.duration);
        self.total_response_size = self.total_response_size.saturating_add(event.response_size);
    }

    /// Fold another aggregate into this one.
    pub fn merge(&mut self, other: &Self) {
        // Both histograms share the same bounds, so adding cannot overflow them.
        let _ = self.histogram.add(&other.histogram);
        self.count += other.count;
        self.failures += other.failures;
        self.total_us += other.total_us;
        self.min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max = self.max.max(other.max);
        self.total_response_size = self.total_response_size.saturating_add(other.total_response_size);
    }

    /// Number of recorded operations.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Summarize as a snapshot row; `elapsed` is the observation window.
    #[must_use]
    pub fn summarize(&self, kind: &str, name: &str, elapsed: Duration) -> EntrySnapshot {
        let secs = elapsed.as_secs_f64();
        let per_sec = |n: u64| if secs > 0.0 { n as f64 / secs } else { 0.0 };
        let mean_ms = if self.count == 0 {
            0.0
        } else {
            self.total_us as f64 / self.count as f64 / 1_000.0
        };
        let avg_response_size = if self.count == 0 {
            0.0
        } else {
            self.total_response_size as f64 / self.count as f64
        };
        let percentiles_ms = PERCENTILES
            .iter()
            .map(|q| {
                if self.count == 0 {
                    0.0
                } else {
                    self.histogram.value_at_quantile(*q) as f64 / 1_000.0
                }
            })
            .collect();

        EntrySnapshot {
            kind: kind.to_string(),
            name: name.to_string(),
            count: self.count,
            failures: self.failures,
            mean_ms,
            min_ms: self.min.map_or(0.0, |min| min.as_secs_f64() * 1_000.0),
            max_ms: self.max.as_secs_f64() * 1_000.0,
            percentiles_ms,
            avg_response_size,
            total_response_size: self.total_response_size,
            requests_per_sec: per_sec(self.count),
            failures_per_sec: per_sec(self.failures),
        }
    }
}

/// Statistics of one operation at snapshot time. Times are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntrySnapshot {
    /// Operation kind
    pub kind: String,
    /// Operation name
    pub name: String,
    /// Operations recorded
    pub count: u64,
    /// Operations that failed
    pub failures: u64,
    /// Mean latency
    pub mean_ms: f64,
    /// Fastest observation
    pub min_ms: f64,
    /// Slowest observation
    pub max_ms: f64,
    /// Latency at each of [`PERCENTILES`], in the same order
    pub percentiles_ms: Vec<f64>,
    /// Mean response size
    pub avg_response_size: f64,
    /// Sum of response sizes
    pub total_response_size: u64,
    /// Operations per second over the observation window
    pub requests_per_sec: f64,
    /// Failures per second over the observation window
    pub failures_per_sec: f64,
}

impl EntrySnapshot {
    /// Latency at quantile `q`, if `q` is one of [`PERCENTILES`].
    #[must_use]
    pub fn percentile(&self, q: f64) -> Option<f64> {
        PERCENTILES
            .iter()
            .position(|p| (p - q).abs() < f64::EPSILON)
            .and_then(|idx| self.percentiles_ms.get(idx).copied())
    }

    /// Median latency.
    #[must_use]
    pub fn median_ms(&self) -> f64 {
        self.percentiles_ms.first().copied().unwrap_or_default()
    }

    /// Whether this is the aggregated row.
    #[must_use]
    pub fn is_aggregated(&self) -> bool {
        self.kind == AGGREGATED_KIND && self.name == AGGREGATED_NAME
    }
}

/// Occurrences of one distinct error text for an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    /// Operation kind
    pub kind: String,
    /// Operation name
    pub name: String,
    /// Error text
    pub error: String,
    /// Times it occurred
    pub occurrences: u64,
}

/// Consistent point-in-time view of all statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// When the snapshot was taken
    pub taken_at: Timestamp,
    /// Observation window the rates are computed over
    pub elapsed: Duration,
    /// One row per (kind, name), sorted
    pub entries: Vec<EntrySnapshot>,
    /// All operations combined
    pub total: EntrySnapshot,
    /// Distinct errors, most frequent first
    pub errors: Vec<ErrorEntry>,
    /// Events lost to a full or closed queue
    pub dropped_events: u64,
}

impl StatsSnapshot {
    /// Row for the given operation.
    #[must_use]
    pub fn entry(&self, kind: &str, name: &str) -> Option<&EntrySnapshot> {
        self.entries.iter().find(|entry| entry.kind == kind && entry.name == name)
    }

    /// Total operations across all rows.
    #[must_use]
    pub const fn total_count(&self) -> u64 {
        self.total.count
    }

    /// Rows followed by the aggregated row.
    pub fn rows(&self) -> impl Iterator<Item = &EntrySnapshot> {
        self.entries.iter().chain(std::iter::once(&self.total))
    }
}

/// Key of an aggregate entry.
pub(crate) type EntryKey = (Cow<'static, str>, Cow<'static, str>);
