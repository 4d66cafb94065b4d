//! Snapshot destinations and periodic export.

use csv::Writer;
use std::ffi::OsString;
use std::fmt::Write as _;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tenantload_core::{Error, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::snapshot::{EntrySnapshot, StatsSnapshot};
use super::StatsSink;

const PERCENTILE_HEADERS: [&str; 10] = ["50%", "66%", "75%", "80%", "90%", "95%", "98%", "99%", "99.9%", "100%"];

/// Destination for statistics snapshots
pub trait StatsExporter: Send + 'static {
    /// Record an intermediate snapshot taken during a run.
    ///
    /// # Errors
    /// Returns [`Error::Export`] when the destination cannot be written.
    fn write_snapshot(&mut self, snapshot: &StatsSnapshot) -> Result<()>;

    /// Record the final snapshot of a run.
    ///
    /// # Errors
    /// Returns [`Error::Export`] when the destination cannot be written.
    fn finish(&mut self, snapshot: &StatsSnapshot) -> Result<()>;
}

/// Writes `<base>_stats.csv`, `<base>_stats_history.csv` and
/// `<base>_failures.csv`
#[derive(Debug)]
pub struct CsvExporter {
    base: PathBuf,
    history: Option<Writer<File>>,
}

impl CsvExporter {
    /// Exporter writing next to `base`.
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into(), history: None }
    }

    /// Path of the final per-operation statistics.
    #[must_use]
    pub fn stats_path(&self) -> PathBuf {
        self.with_suffix("_stats.csv")
    }

    /// Path of the periodic history rows.
    #[must_use]
    pub fn history_path(&self) -> PathBuf {
        self.with_suffix("_stats_history.csv")
    }

    /// Path of the error summary.
    #[must_use]
    pub fn failures_path(&self) -> PathBuf {
        self.with_suffix("_failures.csv")
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut path = OsString::from(self.base.as_os_str());
        path.push(suffix);
        PathBuf::from(path)
    }

    fn history_writer(&mut self) -> Result<&mut Writer<File>> {
        if self.history.is_none() {
            let mut writer = Writer::from_path(self.history_path())?;
            let mut header = vec!["Timestamp"];
            header.extend(stats_header());
            writer.write_record(&header)?;
            self.history = Some(writer);
        }
        self.history.as_mut().ok_or_else(|| Error::internal("history writer missing"))
    }

    fn write_stats(&self, path: &Path, snapshot: &StatsSnapshot) -> Result<()> {
        let mut writer = Writer::from_path(path)?;
        writer.write_record(stats_header())?;
        for row in snapshot.rows() {
            writer.write_record(stats_fields(row))?;
        }
        writer.flush()?;
        Ok(())
    }

    fn write_failures(&self, path: &Path, snapshot: &StatsSnapshot) -> Result<()> {
        let mut writer = Writer::from_path(path)?;
        writer.write_record(["Type", "Name", "Error", "Occurrences"])?;
        for error in &snapshot.errors {
            writer.write_record([
                error.kind.as_str(),
                error.name.as_str(),
                error.error.as_str(),
                error.occurrences.to_string().as_str(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl StatsExporter for CsvExporter {
    fn write_snapshot(&mut self, snapshot: &StatsSnapshot) -> Result<()> {
        let timestamp = snapshot.taken_at.timestamp().to_string();
        let writer = self.history_writer()?;
        for row in snapshot.rows() {
            let mut record = vec![timestamp.clone()];
            record.extend(stats_fields(row));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn finish(&mut self, snapshot: &StatsSnapshot) -> Result<()> {
        self.write_snapshot(snapshot)?;
        self.write_stats(&self.stats_path(), snapshot)?;
        self.write_failures(&self.failures_path(), snapshot)?;
        info!("Statistics written to {}", self.stats_path().display());
        Ok(())
    }
}

fn stats_header() -> Vec<&'static str> {
    let mut header = vec![
        "Type",
        "Name",
        "Request Count",
        "Failure Count",
        "Median Response Time",
        "Average Response Time",
        "Min Response Time",
        "Max Response Time",
        "Average Content Size",
        "Requests/s",
        "Failures/s",
    ];
    header.extend(PERCENTILE_HEADERS);
    header
}

fn stats_fields(row: &EntrySnapshot) -> Vec<String> {
    let mut fields = vec![
        row.kind.clone(),
        row.name.clone(),
        row.count.to_string(),
        row.failures.to_string(),
        format!("{:.2}", row.median_ms()),
        format!("{:.2}", row.mean_ms),
        format!("{:.2}", row.min_ms),
        format!("{:.2}", row.max_ms),
        format!("{:.2}", row.avg_response_size),
        format!("{:.2}", row.requests_per_sec),
        format!("{:.2}", row.failures_per_sec),
    ];
    fields.extend(row.percentiles_ms.iter().map(|p| format!("{p:.2}")));
    fields
}

/// Logs a one-line summary of every snapshot
#[derive(Debug, Default, Clone, Copy)]
pub struct SummaryLogger;

impl StatsExporter for SummaryLogger {
    fn write_snapshot(&mut self, snapshot: &StatsSnapshot) -> Result<()> {
        let total = &snapshot.total;
        info!(
            "{} requests, {} failures, {:.1} req/s, p50 {:.1} ms, p99 {:.1} ms, {} dropped",
            total.count,
            total.failures,
            total.requests_per_sec,
            total.median_ms(),
            total.percentile(0.99).unwrap_or_default(),
            snapshot.dropped_events
        );
        Ok(())
    }

    fn finish(&mut self, snapshot: &StatsSnapshot) -> Result<()> {
        for line in format_table(snapshot).lines() {
            info!("{}", line);
        }
        Ok(())
    }
}

/// Render a snapshot as a fixed-width table.
#[must_use]
pub fn format_table(snapshot: &StatsSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<10} {:<28} {:>9} {:>8} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9}",
        "Type", "Name", "# reqs", "# fails", "Avg", "Min", "Max", "Med", "p99", "req/s"
    );
    let _ = writeln!(out, "{}", "-".repeat(118));
    for row in snapshot.rows() {
        if row.is_aggregated() {
            let _ = writeln!(out, "{}", "-".repeat(118));
        }
        let _ = writeln!(
            out,
            "{:<10} {:<28} {:>9} {:>8} {:>9.1} {:>9.1} {:>9.1} {:>9.1} {:>9.1} {:>9.2}",
            row.kind,
            row.name,
            row.count,
            row.failures,
            row.mean_ms,
            row.min_ms,
            row.max_ms,
            row.median_ms(),
            row.percentile(0.99).unwrap_or_default(),
            row.requests_per_sec
        );
    }
    if !snapshot.errors.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{:>11}  Error", "Occurrences");
        for error in &snapshot.errors {
            let _ = writeln!(out, "{:>11}  {} {}: {}", error.occurrences, error.kind, error.name, error.error);
        }
    }
    if snapshot.dropped_events > 0 {
        let _ = writeln!(out, "{} event(s) dropped by the statistics queue", snapshot.dropped_events);
    }
    out
}

/// Handle to a background export task
#[derive(Debug)]
pub struct ContinuousExport<E> {
    stop: watch::Sender<bool>,
    handle: JoinHandle<E>,
}

impl<E> ContinuousExport<E> {
    /// Stop exporting and hand back the exporter.
    ///
    /// # Errors
    /// Returns [`Error::Internal`] if the export task panicked.
    pub async fn stop(self) -> Result<E> {
        let _ = self.stop.send(true);
        self.handle.await.map_err(|e| Error::internal(format!("export task failed: {e}")))
    }
}

impl StatsSink {
    /// Write a snapshot to `exporter` every `interval` until stopped.
    ///
    /// Write failures are logged and exporting continues.
    #[must_use]
    pub fn export_continuous<E: StatsExporter>(&self, mut exporter: E, interval: Duration) -> ContinuousExport<E> {
        let (stop, mut stopped) = watch::channel(false);
        let sink = self.clone();
        let period = interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = exporter.write_snapshot(&sink.snapshot()) {
                            warn!("Statistics export failed: {}", err);
                        }
                    }
                    _ = stopped.changed() => break,
                }
            }
            debug!("Continuous export stopped");
            exporter
        });

        ContinuousExport { stop, handle }
    }
}
