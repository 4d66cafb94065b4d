//! Latency instrumentation.
//!
//! [`OperationTimer::time`] runs one operation, measures it with the
//! monotonic clock and reports exactly one [`TimingEvent`] to the
//! [`StatsSink`], whether the operation succeeds or fails. Errors are
//! observed and handed back to the caller unchanged.

use chrono::Utc;
use serde::Serialize;
use std::borrow::Cow;
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};
use tenantload_core::{Timestamp, UserId};

use crate::backend::Connection;
use crate::stats::StatsSink;

/// Label pair identifying an instrumented operation in the statistics
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct OperationDescriptor {
    /// Operation kind, e.g. `connect` or `select`
    pub kind: Cow<'static, str>,
    /// Operation name within its kind
    pub name: Cow<'static, str>,
}

impl OperationDescriptor {
    /// Descriptor with static labels.
    #[must_use]
    pub const fn new(kind: &'static str, name: &'static str) -> Self {
        Self { kind: Cow::Borrowed(kind), name: Cow::Borrowed(name) }
    }

    /// Descriptor with owned labels.
    #[must_use]
    pub fn owned(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self { kind: Cow::Owned(kind.into()), name: Cow::Owned(name.into()) }
    }
}

/// One observation of an instrumented operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingEvent {
    /// Operation kind
    pub kind: Cow<'static, str>,
    /// Operation name
    pub name: Cow<'static, str>,
    /// Wall-clock time the operation started
    pub started_at: Timestamp,
    /// Monotonic duration of the operation
    pub duration: Duration,
    /// Whether the operation succeeded
    pub success: bool,
    /// Error text for failed operations
    pub error: Option<String>,
    /// Rows returned or affected
    pub response_size: u64,
    /// Virtual user that issued the operation
    pub user: Option<UserId>,
}

impl TimingEvent {
    /// A successful observation.
    #[must_use]
    pub fn success(descriptor: &OperationDescriptor, duration: Duration, response_size: u64) -> Self {
        Self {
            kind: descriptor.kind.clone(),
            name: descriptor.name.clone(),
            started_at: Utc::now(),
            duration,
            success: true,
            error: None,
            response_size,
            user: None,
        }
    }

    /// A failed observation.
    #[must_use]
    pub fn failure(descriptor: &OperationDescriptor, duration: Duration, error: impl Into<String>) -> Self {
        Self {
            kind: descriptor.kind.clone(),
            name: descriptor.name.clone(),
            started_at: Utc::now(),
            duration,
            success: false,
            error: Some(error.into()),
            response_size: 0,
            user: None,
        }
    }

    /// Duration in fractional milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1_000.0
    }
}

/// Size of an operation's result as reported in statistics
pub trait ResponseSize {
    /// Rows returned or affected.
    fn response_size(&self) -> u64;
}

impl ResponseSize for () {
    fn response_size(&self) -> u64 {
        0
    }
}

impl ResponseSize for u64 {
    fn response_size(&self) -> u64 {
        *self
    }
}

/// A scalar query returns one row.
impl ResponseSize for i64 {
    fn response_size(&self) -> u64 {
        1
    }
}

impl ResponseSize for Box<dyn Connection> {
    fn response_size(&self) -> u64 {
        0
    }
}

/// Times operations and reports them to the statistics sink
#[derive(Debug, Clone)]
pub struct OperationTimer {
    sink: StatsSink,
    user: Option<UserId>,
}

impl OperationTimer {
    /// Timer reporting to `sink`.
    #[must_use]
    pub const fn new(sink: StatsSink) -> Self {
        Self { sink, user: None }
    }

    /// Copy of this timer that tags events with `user`.
    #[must_use]
    pub fn for_user(&self, user: UserId) -> Self {
        Self { sink: self.sink.clone(), user: Some(user) }
    }

    /// Sink events are reported to.
    #[must_use]
    pub const fn sink(&self) -> &StatsSink {
        &self.sink
    }

    /// Run `action`, returning its value and elapsed time.
    ///
    /// The clock covers only the awaited action. Reporting happens afterwards
    /// and never blocks or fails the call.
    ///
    /// # Errors
    /// Returns the action's own error after recording a failed event.
    pub async fn time<T, E, F, Fut>(
        &self,
        descriptor: &OperationDescriptor,
        action: F,
    ) -> Result<(T, Duration), E>
    where
        T: ResponseSize,
        E: Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started_at = Utc::now();
        let start = Instant::now();
        let outcome = action().await;
        let elapsed = start.elapsed();

        let mut event = match &outcome {
            Ok(value) => TimingEvent::success(descriptor, elapsed, value.response_size()),
            Err(err) => TimingEvent::failure(descriptor, elapsed, err.to_string()),
        };
        event.started_at = started_at;
        event.user = self.user;
        self.sink.record(event);

        outcome.map(|value| (value, elapsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::StatsSink;
    use tenantload_core::Error;

    const SELECT: OperationDescriptor = OperationDescriptor::new("select", "read_row");

    #[tokio::test]
    async fn test_success_records_one_event() {
        let sink = StatsSink::spawn(16);
        let timer = OperationTimer::new(sink.clone()).for_user(UserId(4));

        let (value, elapsed) = timer
            .time(&SELECT, || async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<u64, Error>(3)
            })
            .await
            .unwrap();
        assert_eq!(value, 3);
        assert!(elapsed >= Duration::from_millis(5));

        sink.flush().await;
        let snapshot = sink.snapshot();
        let entry = snapshot.entry("select", "read_row").unwrap();
        assert_eq!(entry.count, 1);
        assert_eq!(entry.failures, 0);
        assert_eq!(entry.total_response_size, 3);
    }

    #[tokio::test]
    async fn test_failure_records_and_forwards_error() {
        let sink = StatsSink::spawn(16);
        let timer = OperationTimer::new(sink.clone());

        let err = timer
            .time(&SELECT, || async {
                Err::<u64, Error>(Error::Query { statement: "SELECT".into(), message: "relation missing".into() })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Query { .. }));

        sink.flush().await;
        let snapshot = sink.snapshot();
        let entry = snapshot.entry("select", "read_row").unwrap();
        assert_eq!(entry.count, 1);
        assert_eq!(entry.failures, 1);
        assert_eq!(snapshot.errors.len(), 1);
        assert!(snapshot.errors[0].error.contains("relation missing"));
    }

    #[tokio::test]
    async fn test_full_sink_does_not_fail_operation() {
        let sink = StatsSink::closed();
        let timer = OperationTimer::new(sink.clone());
        let result = timer.time(&SELECT, || async { Ok::<(), Error>(()) }).await;
        assert!(result.is_ok());
        assert_eq!(sink.dropped_events(), 1);
    }
}
