//! Virtual users.
//!
//! A [`VirtualUser`] owns one connection at a time and cycles through a
//! weighted [`TaskTable`] until the run is cancelled:
//!
//! ```text
//! Stopped -> Connecting -> Active -> (SelectingTask -> RunningTask -> Active)* -> Stopping -> Stopped
//! ```
//!
//! The think-time pause after each task is the point where cancellation is
//! observed; a task that is already running always completes.

pub mod population;
pub mod session;
pub mod tasks;

pub use population::{PopulationSnapshot, PopulationTracker, UserState};
pub use session::{ConnectionHandle, UserSession};
pub use tasks::{
    InsertRow, Noop, ReadRow, SwitchTenant, TaskAction, TaskDescriptor, TaskTable, INSERT_ROW,
    READ_ROW,
};

use rand::rngs::StdRng;
use std::sync::Arc;
use tenantload_core::{Result, ThinkTime, UserId};
use tokio::sync::watch;
use tracing::{error, info};
use uuid::Uuid;

use crate::backend::Backend;
use crate::context::WorkloadContext;
use crate::timing::{OperationDescriptor, OperationTimer};

/// Operation recorded when a user connects.
pub const CONNECT: OperationDescriptor = OperationDescriptor::new("connect", "connect");

/// Tasks, pacing and connect label shared by all users of a workload
#[derive(Debug, Clone)]
pub struct WorkloadProfile {
    /// Workload name used in logs
    pub name: String,
    /// Weighted tasks
    pub tasks: Arc<TaskTable>,
    /// Pause between two tasks
    pub think_time: ThinkTime,
    /// Label of the timed connect operation
    pub connect: OperationDescriptor,
}

impl WorkloadProfile {
    /// Profile with the default connect label.
    #[must_use]
    pub fn new(name: impl Into<String>, tasks: TaskTable, think_time: ThinkTime) -> Self {
        Self { name: name.into(), tasks: Arc::new(tasks), think_time, connect: CONNECT }
    }

    /// Use a different label for the timed connect.
    #[must_use]
    pub fn with_connect_operation(mut self, connect: OperationDescriptor) -> Self {
        self.connect = connect;
        self
    }
}

/// Totals of one finished user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserSummary {
    /// Tasks executed, failed ones included
    pub tasks_run: u64,
    /// Tasks that returned an error
    pub task_failures: u64,
}

/// One simulated client
#[derive(Debug)]
pub struct VirtualUser {
    session: UserSession,
    tasks: Arc<TaskTable>,
    think_time: ThinkTime,
    tracker: Arc<PopulationTracker>,
    state: UserState,
}

impl VirtualUser {
    /// Create a stopped user and register it with `tracker`.
    #[must_use]
    pub fn new(
        id: UserId,
        context: Arc<WorkloadContext>,
        backend: Arc<dyn Backend>,
        profile: &WorkloadProfile,
        timer: &OperationTimer,
        tracker: Arc<PopulationTracker>,
        rng: StdRng,
    ) -> Self {
        tracker.register();
        let session = UserSession::new(
            id,
            context,
            backend,
            timer.for_user(id),
            profile.connect.clone(),
            Arc::clone(&tracker),
            rng,
        );
        Self {
            session,
            tasks: Arc::clone(&profile.tasks),
            think_time: profile.think_time,
            tracker,
            state: UserState::Stopped,
        }
    }

    /// Identity of this user.
    #[must_use]
    pub const fn id(&self) -> UserId {
        self.session.user_id()
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> UserState {
        self.state
    }

    /// Identity of the open connection, if any.
    #[must_use]
    pub fn connection_id(&self) -> Option<Uuid> {
        self.session.connection_id()
    }

    /// The user's session.
    #[must_use]
    pub const fn session(&self) -> &UserSession {
        &self.session
    }

    fn set_state(&mut self, next: UserState) {
        self.tracker.transition(self.state, next);
        self.state = next;
    }

    /// Connect, then run tasks until `shutdown` turns true or its sender
    /// is dropped; finally release the connection.
    ///
    /// # Errors
    /// Returns the connect error when the user cannot start; no retry is
    /// attempted and the user ends in [`UserState::Stopped`].
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<UserSummary> {
        let id = self.id();
        self.set_state(UserState::Connecting);
        if let Err(err) = self.session.connect_random().await {
            error!("{} failed to start: {}", id, err);
            self.set_state(UserState::Stopped);
            return Err(err);
        }
        self.set_state(UserState::Active);
        info!("Spawned connection #{} ({})", self.tracker.open_connections(), id);

        let mut summary = UserSummary::default();
        loop {
            if *shutdown.borrow() {
                break;
            }

            self.set_state(UserState::SelectingTask);
            let task = self.tasks.choose(self.session.rng()).clone();

            self.set_state(UserState::RunningTask);
            summary.tasks_run += 1;
            if let Err(err) = task.action.run(&mut self.session).await {
                error!("{} task {} failed: {}", id, task.name, err);
                summary.task_failures += 1;
                self.tracker.task_failed();
            }
            self.set_state(UserState::Active);

            let pause = self.think_time.sample(self.session.rng());
            tokio::select! {
                () = tokio::time::sleep(pause) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.set_state(UserState::Stopping);
        self.session.release().await;
        self.set_state(UserState::Stopped);
        info!("Closed connection ({}), {} still open", id, self.tracker.open_connections());

        Ok(summary)
    }
}
