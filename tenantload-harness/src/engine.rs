//! Execution engine: ramp-up, steady state and shutdown of a user population.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tenantload_core::{ConfigValidator, Error, Result, RunConfiguration, UserId};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::backend::Backend;
use crate::context::WorkloadContext;
use crate::stats::StatsSink;
use crate::timing::OperationTimer;
use crate::user::{PopulationTracker, UserState, UserSummary, VirtualUser, WorkloadProfile};

/// Stand-in deadline for durations too long to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Outcome of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Users spawned
    pub spawned: u64,
    /// Users that could not connect and never ran a task
    pub spawn_failures: u64,
    /// Highest number of simultaneously active users
    pub peak_active: u64,
    /// Users in the stopped state when the run returned
    pub stopped: u64,
    /// Tasks that returned an error
    pub task_failures: u64,
    /// Tasks executed
    pub tasks_run: u64,
    /// Wall time from entry to return
    pub elapsed: Duration,
    /// Timing events lost to a full statistics queue
    pub dropped_events: u64,
}

/// Cancels a run from outside the engine
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    /// Stop the run; users finish their current task and disconnect.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    /// Whether an abort has been requested.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Spawns, runs and stops virtual users
///
/// An engine drives a single run; its population counters describe that run.
pub struct ExecutionEngine {
    context: Arc<WorkloadContext>,
    backend: Arc<dyn Backend>,
    profile: WorkloadProfile,
    sink: StatsSink,
    timer: OperationTimer,
    tracker: Arc<PopulationTracker>,
    abort: Arc<watch::Sender<bool>>,
    seed: Option<u64>,
    started: AtomicBool,
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("context", &self.context)
            .field("workload", &self.profile.name)
            .field("population", &self.tracker.snapshot())
            .finish_non_exhaustive()
    }
}

impl ExecutionEngine {
    /// Create an engine for one workload against one topology.
    #[must_use]
    pub fn new(
        context: Arc<WorkloadContext>,
        backend: Arc<dyn Backend>,
        profile: WorkloadProfile,
        sink: StatsSink,
    ) -> Self {
        let (abort, _) = watch::channel(false);
        Self {
            context,
            backend,
            profile,
            timer: OperationTimer::new(sink.clone()),
            sink,
            tracker: Arc::new(PopulationTracker::new()),
            abort: Arc::new(abort),
            seed: None,
            started: AtomicBool::new(false),
        }
    }

    /// Derive every user's random generator from `seed`.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Handle that cancels the run. An abort before [`Self::execute`] makes
    /// the run return immediately.
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle { tx: Arc::clone(&self.abort) }
    }

    /// Live per-state user counts.
    #[must_use]
    pub fn population(&self) -> Arc<PopulationTracker> {
        Arc::clone(&self.tracker)
    }

    /// The statistics sink users report to.
    #[must_use]
    pub const fn sink(&self) -> &StatsSink {
        &self.sink
    }

    /// Run `target_population` users, spawned at `spawn_rate` per second,
    /// until `duration` has elapsed since entry or the run is aborted.
    ///
    /// Returns once every user has stopped and the statistics sink has
    /// aggregated every event.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTopology`] when there is nothing to run
    /// against, or [`Error::Configuration`] for a non-positive spawn rate or
    /// when this engine has already run; in every case nothing is spawned.
    pub async fn execute(
        &self,
        target_population: usize,
        spawn_rate: f64,
        duration: Duration,
    ) -> Result<RunReport> {
        let started = Instant::now();
        let deadline_at = started.checked_add(duration).unwrap_or(started + FAR_FUTURE);
        let deadline = tokio::time::sleep_until(deadline_at);
        tokio::pin!(deadline);

        self.context.validate()?;
        let run = RunConfiguration::new(target_population, spawn_rate, duration.as_secs());
        ConfigValidator::validate_run(&run)?;
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(Error::configuration("execution engine has already run; create a new engine per run"));
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut abort_rx = self.abort.subscribe();
        let mut users: JoinSet<Result<UserSummary>> = JoinSet::new();
        let mut totals = UserSummary::default();
        let mut spawned = 0usize;

        let mut ticker = tokio::time::interval(run.spawn_interval().unwrap_or(Duration::from_secs(1)));

        info!(
            "Starting {} workload: {} users at {} users/s for {:?}",
            self.profile.name, target_population, spawn_rate, duration
        );

        if *abort_rx.borrow_and_update() {
            info!("Run aborted before start");
        } else {
            loop {
                tokio::select! {
                    () = &mut deadline => {
                        info!("Run time of {:?} elapsed, stopping users", duration);
                        break;
                    }
                    changed = abort_rx.changed() => {
                        if changed.is_err() || *abort_rx.borrow() {
                            info!("Run aborted, stopping users");
                            break;
                        }
                    }
                    _ = ticker.tick(), if spawned < target_population => {
                        spawned += 1;
                        self.spawn_user(&mut users, spawned as u64, stop_rx.clone());
                        if spawned == target_population {
                            info!("All {} users spawned in {:?}", spawned, started.elapsed());
                        }
                    }
                    Some(joined) = users.join_next(), if !users.is_empty() => {
                        self.absorb(joined, &mut totals);
                    }
                }
            }
        }

        let _ = stop_tx.send(true);
        debug!("Waiting for {} users to stop", users.len());
        while let Some(joined) = users.join_next().await {
            self.absorb(joined, &mut totals);
        }
        self.sink.flush().await;

        let report = RunReport {
            spawned: spawned as u64,
            spawn_failures: self.tracker.spawn_failures(),
            peak_active: self.tracker.peak_active(),
            stopped: self.tracker.count(UserState::Stopped),
            task_failures: totals.task_failures,
            tasks_run: totals.tasks_run,
            elapsed: started.elapsed(),
            dropped_events: self.sink.dropped_events(),
        };
        info!(
            "Run finished: {} users spawned ({} failed to start), peak {} active, {} tasks ({} failed) in {:?}",
            report.spawned,
            report.spawn_failures,
            report.peak_active,
            report.tasks_run,
            report.task_failures,
            report.elapsed
        );
        if report.dropped_events > 0 {
            warn!("{} timing events were dropped", report.dropped_events);
        }
        Ok(report)
    }

    fn spawn_user(
        &self,
        users: &mut JoinSet<Result<UserSummary>>,
        id: u64,
        shutdown: watch::Receiver<bool>,
    ) {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id)),
            None => StdRng::from_entropy(),
        };
        let user = VirtualUser::new(
            UserId(id),
            Arc::clone(&self.context),
            Arc::clone(&self.backend),
            &self.profile,
            &self.timer,
            Arc::clone(&self.tracker),
            rng,
        );
        debug!("Spawning {}", user.id());
        users.spawn(user.run(shutdown));
    }

    fn absorb(&self, joined: std::result::Result<Result<UserSummary>, JoinError>, totals: &mut UserSummary) {
        match joined {
            Ok(Ok(summary)) => {
                totals.tasks_run += summary.tasks_run;
                totals.task_failures += summary.task_failures;
            }
            Ok(Err(_)) => self.tracker.spawn_failed(),
            Err(err) => error!("{}", Error::internal(format!("virtual user task failed: {err}"))),
        }
    }
}
