//! Built-in workloads.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tenantload_core::{Error, Result, ThinkTime};

use crate::timing::OperationDescriptor;
use crate::user::{
    InsertRow, Noop, ReadRow, SwitchTenant, TaskDescriptor, TaskTable, WorkloadProfile,
};

/// Connect label of idle users.
pub const IDLE_CONNECT: OperationDescriptor = OperationDescriptor::new("idle_connection", "connect");

/// Workloads selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Workload {
    /// Open a connection and hold it
    IdleConnections,
    /// Almost only reads, occasionally moving to another tenant
    ReadMostly,
    /// Mixed inserts and reads, occasionally moving to another tenant
    Simple,
}

impl Workload {
    /// Every workload, in display order.
    pub const ALL: [Self; 3] = [Self::IdleConnections, Self::ReadMostly, Self::Simple];

    /// Command-line name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::IdleConnections => "idle_connections",
            Self::ReadMostly => "read_mostly",
            Self::Simple => "simple",
        }
    }

    /// Pause between two tasks.
    #[must_use]
    pub fn think_time(self) -> ThinkTime {
        match self {
            Self::IdleConnections => ThinkTime::constant(Duration::from_secs(1)),
            Self::ReadMostly => ThinkTime::between(Duration::from_millis(100), Duration::from_millis(500)),
            Self::Simple => ThinkTime::between(Duration::from_millis(500), Duration::from_secs(2)),
        }
    }

    /// Weighted tasks of the workload.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the table is invalid.
    pub fn tasks(self) -> Result<TaskTable> {
        let tasks = match self {
            Self::IdleConnections => vec![TaskDescriptor::new("noop", 1, Noop)],
            Self::ReadMostly => vec![
                TaskDescriptor::new("read_row", 99, ReadRow),
                TaskDescriptor::new("switch_tenant", 1, SwitchTenant),
            ],
            Self::Simple => vec![
                TaskDescriptor::new("insert_row", 40, InsertRow),
                TaskDescriptor::new("read_row", 60, ReadRow),
                TaskDescriptor::new("switch_tenant", 1, SwitchTenant),
            ],
        };
        TaskTable::new(tasks)
    }

    /// Everything a user needs to run this workload.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the task table is invalid.
    pub fn profile(self) -> Result<WorkloadProfile> {
        let profile = WorkloadProfile::new(self.name(), self.tasks()?, self.think_time());
        Ok(match self {
            Self::IdleConnections => profile.with_connect_operation(IDLE_CONNECT),
            Self::ReadMostly | Self::Simple => profile,
        })
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Workload {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL.into_iter().find(|workload| workload.name() == s).ok_or_else(|| {
            let known: Vec<_> = Self::ALL.iter().map(|w| w.name()).collect();
            Error::configuration(format!("Unknown workload {s:?}, expected one of {}", known.join(", ")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for workload in Workload::ALL {
            assert_eq!(workload.to_string().parse::<Workload>().unwrap(), workload);
        }
        assert!("select".parse::<Workload>().is_err());
    }

    #[test]
    fn test_task_weights() {
        let weights = |w: Workload| -> Vec<(String, u32)> {
            w.tasks().unwrap().tasks().iter().map(|t| (t.name.to_string(), t.weight)).collect()
        };
        assert_eq!(weights(Workload::IdleConnections), vec![("noop".into(), 1)]);
        assert_eq!(
            weights(Workload::ReadMostly),
            vec![("read_row".into(), 99), ("switch_tenant".into(), 1)]
        );
        assert_eq!(Workload::Simple.tasks().unwrap().total_weight(), 101);
    }

    #[test]
    fn test_think_times() {
        assert_eq!(Workload::IdleConnections.think_time(), ThinkTime { min_ms: 1_000, max_ms: 1_000 });
        assert_eq!(Workload::ReadMostly.think_time(), ThinkTime { min_ms: 100, max_ms: 500 });
        assert_eq!(Workload::Simple.think_time(), ThinkTime { min_ms: 500, max_ms: 2_000 });
    }

    #[test]
    fn test_idle_profile_uses_idle_connect_label() {
        assert_eq!(Workload::IdleConnections.profile().unwrap().connect, IDLE_CONNECT);
        assert_eq!(Workload::Simple.profile().unwrap().connect.kind, "connect");
    }
}
