//! Live counts of virtual users per state.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle state of a virtual user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UserState {
    /// Not running: not yet started, or finished
    Stopped,
    /// Acquiring the initial connection
    Connecting,
    /// Connected and between tasks
    Active,
    /// Drawing the next task
    SelectingTask,
    /// Executing a task
    RunningTask,
    /// Releasing the connection after cancellation
    Stopping,
}

impl UserState {
    const ALL: [Self; 6] = [
        Self::Stopped,
        Self::Connecting,
        Self::Active,
        Self::SelectingTask,
        Self::RunningTask,
        Self::Stopping,
    ];

    const fn index(self) -> usize {
        match self {
            Self::Stopped => 0,
            Self::Connecting => 1,
            Self::Active => 2,
            Self::SelectingTask => 3,
            Self::RunningTask => 4,
            Self::Stopping => 5,
        }
    }

    /// Whether the user holds a connection and is cycling through tasks.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active | Self::SelectingTask | Self::RunningTask)
    }
}

impl fmt::Display for UserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::SelectingTask => "selecting_task",
            Self::RunningTask => "running_task",
            Self::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Run-wide user counters, shared by the engine and every user
#[derive(Debug, Default)]
pub struct PopulationTracker {
    states: [AtomicU64; 6],
    active: AtomicU64,
    peak_active: AtomicU64,
    open_connections: AtomicU64,
    peak_connections: AtomicU64,
    task_failures: AtomicU64,
    spawn_failures: AtomicU64,
}

impl PopulationTracker {
    /// Empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a newly created user in [`UserState::Stopped`].
    pub fn register(&self) {
        self.states[UserState::Stopped.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Move one user from `from` to `to`.
    pub fn transition(&self, from: UserState, to: UserState) {
        if from == to {
            return;
        }
        self.states[to.index()].fetch_add(1, Ordering::Relaxed);
        self.states[from.index()].fetch_sub(1, Ordering::Relaxed);

        match (from.is_active(), to.is_active()) {
            (false, true) => {
                let now = self.active.fetch_add(1, Ordering::Relaxed) + 1;
                self.peak_active.fetch_max(now, Ordering::Relaxed);
            }
            (true, false) => {
                self.active.fetch_sub(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    /// A connection was opened; returns the number now open.
    pub fn connection_opened(&self) -> u64 {
        let now = self.open_connections.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_connections.fetch_max(now, Ordering::Relaxed);
        now
    }

    /// A connection was released; returns the number still open.
    pub fn connection_closed(&self) -> u64 {
        self.open_connections.fetch_sub(1, Ordering::Relaxed).saturating_sub(1)
    }

    /// Count a failed task.
    pub fn task_failed(&self) {
        self.task_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a user that could not start.
    pub fn spawn_failed(&self) {
        self.spawn_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Users currently in `state`.
    #[must_use]
    pub fn count(&self, state: UserState) -> u64 {
        self.states[state.index()].load(Ordering::Relaxed)
    }

    /// Users currently connected and running tasks.
    #[must_use]
    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    /// Highest number of simultaneously active users.
    #[must_use]
    pub fn peak_active(&self) -> u64 {
        self.peak_active.load(Ordering::Relaxed)
    }

    /// Connections currently held by users.
    #[must_use]
    pub fn open_connections(&self) -> u64 {
        self.open_connections.load(Ordering::Relaxed)
    }

    /// Tasks that failed so far.
    #[must_use]
    pub fn task_failures(&self) -> u64 {
        self.task_failures.load(Ordering::Relaxed)
    }

    /// Users that could not start so far.
    #[must_use]
    pub fn spawn_failures(&self) -> u64 {
        self.spawn_failures.load(Ordering::Relaxed)
    }

    /// Current counts of every state.
    #[must_use]
    pub fn snapshot(&self) -> PopulationSnapshot {
        PopulationSnapshot {
            states: UserState::ALL.map(|state| (state, self.count(state))),
            active: self.active(),
            peak_active: self.peak_active(),
            open_connections: self.open_connections(),
            peak_connections: self.peak_connections.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a [`PopulationTracker`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopulationSnapshot {
    /// Users per state
    pub states: [(UserState, u64); 6],
    /// Users connected and running tasks
    pub active: u64,
    /// Highest number of simultaneously active users
    pub peak_active: u64,
    /// Connections currently open
    pub open_connections: u64,
    /// Highest number of simultaneously open connections
    pub peak_connections: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_counts() {
        let tracker = PopulationTracker::new();
        tracker.register();
        tracker.register();
        assert_eq!(tracker.count(UserState::Stopped), 2);

        tracker.transition(UserState::Stopped, UserState::Connecting);
        tracker.transition(UserState::Connecting, UserState::Active);
        tracker.transition(UserState::Active, UserState::RunningTask);
        assert_eq!(tracker.count(UserState::RunningTask), 1);
        assert_eq!(tracker.active(), 1);

        tracker.transition(UserState::Stopped, UserState::Connecting);
        tracker.transition(UserState::Connecting, UserState::Active);
        assert_eq!(tracker.peak_active(), 2);

        tracker.transition(UserState::RunningTask, UserState::Stopping);
        tracker.transition(UserState::Stopping, UserState::Stopped);
        assert_eq!(tracker.active(), 1);
        assert_eq!(tracker.peak_active(), 2);
        assert_eq!(tracker.count(UserState::Stopped), 1);
    }

    #[test]
    fn test_connection_gauge() {
        let tracker = PopulationTracker::new();
        assert_eq!(tracker.connection_opened(), 1);
        assert_eq!(tracker.connection_opened(), 2);
        assert_eq!(tracker.connection_closed(), 1);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.open_connections, 1);
        assert_eq!(snapshot.peak_connections, 2);
    }
}
