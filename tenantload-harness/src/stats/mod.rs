//! Statistics sink.
//!
//! Producers hand [`TimingEvent`]s to [`StatsSink::record`], which never
//! blocks: events go into a bounded queue and are dropped (and counted) when
//! the queue is full. A single aggregator task drains the queue into per
//! operation aggregates. Snapshots can be taken at any time, including while
//! a run is in progress, without pausing producers.

pub mod export;
pub mod snapshot;

pub use export::{format_table, ContinuousExport, CsvExporter, StatsExporter, SummaryLogger};
pub use snapshot::{
    EntrySnapshot, ErrorEntry, OperationStats, StatsSnapshot, AGGREGATED_KIND, AGGREGATED_NAME,
    PERCENTILES,
};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::timing::TimingEvent;
use snapshot::EntryKey;

/// Minimum time between two warnings about dropped events.
const DROP_WARNING_INTERVAL: Duration = Duration::from_secs(5);

enum SinkMessage {
    Event(TimingEvent),
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ErrorKey {
    kind: String,
    name: String,
    error: String,
}

struct SinkShared {
    entries: DashMap<EntryKey, Mutex<OperationStats>>,
    errors: DashMap<ErrorKey, u64>,
    dropped: AtomicU64,
    last_drop_warning: Mutex<Option<Instant>>,
    started: Instant,
}

impl SinkShared {
    fn new() -> Self {
        Self {
            entries: DashMap::new(),
            errors: DashMap::new(),
            dropped: AtomicU64::new(0),
            last_drop_warning: Mutex::new(None),
            started: Instant::now(),
        }
    }

    fn apply(&self, event: TimingEvent) {
        if let Some(error) = &event.error {
            let key = ErrorKey {
                kind: event.kind.to_string(),
                name: event.name.to_string(),
                error: error.clone(),
            };
            *self.errors.entry(key).or_insert(0) += 1;
        }

        let key: EntryKey = (event.kind.clone(), event.name.clone());
        if let Some(slot) = self.entries.get(&key) {
            slot.lock().record(&event);
            return;
        }
        match self.entries.entry(key).or_try_insert_with(|| OperationStats::new().map(Mutex::new)) {
            Ok(slot) => slot.lock().record(&event),
            Err(err) => warn!("Discarding event for {}/{}: {}", event.kind, event.name, err),
        }
    }

    fn note_dropped(&self) {
        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        let mut last = self.last_drop_warning.lock();
        let due = last.map_or(true, |at| at.elapsed() >= DROP_WARNING_INTERVAL);
        if due {
            *last = Some(Instant::now());
            warn!("Statistics queue full or closed, {} event(s) dropped so far", dropped);
        }
    }
}

/// Cloneable handle to the statistics aggregator
#[derive(Clone)]
pub struct StatsSink {
    tx: mpsc::Sender<SinkMessage>,
    shared: Arc<SinkShared>,
}

impl fmt::Debug for StatsSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsSink")
            .field("operations", &self.shared.entries.len())
            .field("dropped_events", &self.dropped_events())
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl StatsSink {
    /// Create a sink and spawn its aggregator task on the current runtime.
    ///
    /// The aggregator exits once every handle has been dropped.
    #[must_use]
    pub fn spawn(capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel(capacity.max(1));
        let shared = Arc::new(SinkShared::new());

        let aggregator = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    SinkMessage::Event(event) => aggregator.apply(event),
                    SinkMessage::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("Statistics aggregator stopped");
        });

        Self { tx, shared }
    }

    /// A sink with no aggregator; every event is dropped and counted.
    #[must_use]
    pub fn closed() -> Self {
        let (tx, _) = mpsc::channel(1);
        Self { tx, shared: Arc::new(SinkShared::new()) }
    }

    /// Queue an event for aggregation without waiting.
    pub fn record(&self, event: TimingEvent) {
        if self.tx.try_send(SinkMessage::Event(event)).is_err() {
            self.shared.note_dropped();
        }
    }

    /// Wait until every event queued before this call has been aggregated.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(SinkMessage::Flush(done)).await.is_ok() {
            let _ = wait.await;
        }
    }

    /// Events lost to a full or closed queue.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Time since the sink was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.shared.started.elapsed()
    }

    /// Current statistics of every operation, plus the aggregated row.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let elapsed = self.elapsed();
        let mut total = OperationStats::new().ok();
        let mut entries = Vec::with_capacity(self.shared.entries.len());

        for item in self.shared.entries.iter() {
            let (kind, name) = item.key();
            let stats = item.value().lock();
            if let Some(total) = total.as_mut() {
                total.merge(&stats);
            }
            entries.push(stats.summarize(kind, name, elapsed));
        }
        entries.sort_by(|a, b| (&a.kind, &a.name).cmp(&(&b.kind, &b.name)));

        let total = total.map_or_else(
            || EntrySnapshot {
                kind: AGGREGATED_KIND.to_string(),
                name: AGGREGATED_NAME.to_string(),
                count: entries.iter().map(|e| e.count).sum(),
                failures: entries.iter().map(|e| e.failures).sum(),
                mean_ms: 0.0,
                min_ms: 0.0,
                max_ms: 0.0,
                percentiles_ms: vec![0.0; PERCENTILES.len()],
                avg_response_size: 0.0,
                total_response_size: entries.iter().map(|e| e.total_response_size).sum(),
                requests_per_sec: 0.0,
                failures_per_sec: 0.0,
            },
            |total| total.summarize(AGGREGATED_KIND, AGGREGATED_NAME, elapsed),
        );

        let mut errors: Vec<ErrorEntry> = self
            .shared
            .errors
            .iter()
            .map(|item| ErrorEntry {
                kind: item.key().kind.clone(),
                name: item.key().name.clone(),
                error: item.key().error.clone(),
                occurrences: *item.value(),
            })
            .collect();
        errors.sort_by(|a, b| b.occurrences.cmp(&a.occurrences).then_with(|| a.error.cmp(&b.error)));

        StatsSnapshot {
            taken_at: Utc::now(),
            elapsed,
            entries,
            total,
            errors,
            dropped_events: self.dropped_events(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::OperationDescriptor;

    const CONNECT: OperationDescriptor = OperationDescriptor::new("connect", "connect");
    const INSERT: OperationDescriptor = OperationDescriptor::new("insert", "insert_row");

    #[tokio::test]
    async fn test_flush_makes_all_events_visible() {
        let sink = StatsSink::spawn(1_024);
        for ms in 0..500 {
            sink.record(TimingEvent::success(&INSERT, Duration::from_millis(ms % 7), 1));
        }
        sink.flush().await;
        let snapshot = sink.snapshot();
        assert_eq!(snapshot.entry("insert", "insert_row").unwrap().count, 500);
        assert_eq!(snapshot.total_count(), 500);
        assert_eq!(snapshot.dropped_events, 0);
    }

    #[tokio::test]
    async fn test_entries_sorted_and_aggregated() {
        let sink = StatsSink::spawn(64);
        sink.record(TimingEvent::success(&INSERT, Duration::from_millis(3), 1));
        sink.record(TimingEvent::success(&CONNECT, Duration::from_millis(9), 0));
        sink.record(TimingEvent::failure(&CONNECT, Duration::from_millis(1), "refused"));
        sink.flush().await;

        let snapshot = sink.snapshot();
        let names: Vec<_> = snapshot.entries.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(names, vec!["connect", "insert"]);
        assert_eq!(snapshot.total.count, 3);
        assert_eq!(snapshot.total.failures, 1);
        assert_eq!(snapshot.errors[0].error, "refused");
        assert_eq!(snapshot.rows().count(), 3);
    }

    #[tokio::test]
    async fn test_overflow_is_counted_not_blocking() {
        let sink = StatsSink::spawn(1);
        for _ in 0..10_000 {
            sink.record(TimingEvent::success(&INSERT, Duration::from_micros(10), 0));
        }
        sink.flush().await;
        let snapshot = sink.snapshot();
        assert_eq!(snapshot.total_count() + snapshot.dropped_events, 10_000);
    }

    #[tokio::test]
    async fn test_closed_sink_flush_returns() {
        let sink = StatsSink::closed();
        sink.record(TimingEvent::success(&INSERT, Duration::from_micros(10), 0));
        sink.flush().await;
        assert_eq!(sink.dropped_events(), 1);
        assert_eq!(sink.snapshot().total_count(), 0);
    }
}
