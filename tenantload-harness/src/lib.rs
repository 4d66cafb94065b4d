//! # tenantload Harness
//!
//! Workload execution for multi-tenant database load tests.
//!
//! The harness ramps up a population of independent virtual users. Each user
//! holds one connection to a randomly chosen tenant, repeatedly runs weighted
//! random tasks against that tenant's resources and occasionally moves to
//! another tenant. Every database operation is timed and reported to a
//! statistics sink that can be queried or exported while the run is in
//! progress.
//!
//! ## Architecture
//!
//! - [`directory`]: tenant and resource naming and random selection
//! - [`context`]: topology counts shared read-only by all users
//! - [`backend`]: traits the database adapter implements
//! - [`timing`]: latency instrumentation of individual operations
//! - [`user`]: the virtual-user state machine and its tasks
//! - [`workloads`]: the built-in task mixes
//! - [`engine`]: ramp-up, run duration and shutdown
//! - [`stats`]: aggregation, snapshots and export
//! - [`provision`]: topology setup and cleanup
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tenantload_harness::prelude::*;
//!
//! async fn run<C>(cluster: C) -> tenantload_core::Result<()>
//! where
//!     C: Backend + TopologySource,
//! {
//!     let context = WorkloadContext::discover(&cluster, TenantDirectory::default()).await?;
//!     let sink = StatsSink::spawn(65_536);
//!     let engine = ExecutionEngine::new(context, Arc::new(cluster), Workload::Simple.profile()?, sink.clone());
//!
//!     let report = engine.execute(100, 10.0, Duration::from_secs(60)).await?;
//!     println!("{} users, {} requests", report.spawned, sink.snapshot().total_count());
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod context;
pub mod directory;
pub mod engine;
pub mod provision;
pub mod stats;
pub mod timing;
pub mod user;
pub mod workloads;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use backend::{Backend, Connection, TopologySource};
pub use context::WorkloadContext;
pub use directory::TenantDirectory;
pub use engine::{AbortHandle, ExecutionEngine, RunReport};
pub use provision::{CleanupReport, ClusterAdmin, Provisioner, SetupReport};
pub use stats::{CsvExporter, StatsExporter, StatsSink, StatsSnapshot, SummaryLogger};
pub use timing::{OperationDescriptor, OperationTimer, ResponseSize, TimingEvent};
pub use user::{PopulationTracker, UserState, VirtualUser, WorkloadProfile};
pub use workloads::Workload;

/// Common imports for driving a run
pub mod prelude {
    pub use crate::backend::{Backend, Connection, TopologySource};
    pub use crate::context::WorkloadContext;
    pub use crate::directory::TenantDirectory;
    pub use crate::engine::{AbortHandle, ExecutionEngine, RunReport};
    pub use crate::provision::{ClusterAdmin, Provisioner};
    pub use crate::stats::{CsvExporter, StatsExporter, StatsSink, StatsSnapshot, SummaryLogger};
    pub use crate::timing::{OperationDescriptor, OperationTimer};
    pub use crate::user::{TaskDescriptor, TaskTable, WorkloadProfile};
    pub use crate::workloads::Workload;
}
