//! # tenantload PostgreSQL backend
//!
//! Binds the harness traits to a YugabyteDB YSQL cluster through `sqlx`.
//!
//! Running workloads and cleanup only use standard PostgreSQL statements, but
//! `setup` creates databases with the YSQL `colocated` option, which plain
//! PostgreSQL rejects.
//!
//! This crate provides:
//! - [`PgBackend`]: one `PgConnection` per virtual user, bound to a tenant
//!   database
//! - [`PostgresCluster`]: catalog queries for topology discovery, plus
//!   database/table creation and removal for the provisioner
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use tenantload_core::ConnectionConfig;
//! use tenantload_harness::{TenantDirectory, WorkloadContext};
//! use tenantload_postgres::{PgBackend, PostgresCluster};
//!
//! # async fn example() -> tenantload_core::Result<()> {
//! let config = ConnectionConfig::default();
//! let cluster = PostgresCluster::new(&config)?;
//! let context = WorkloadContext::discover(&cluster, TenantDirectory::default()).await?;
//! let backend = Arc::new(PgBackend::new(config));
//! # let _ = (context, backend);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cluster;
pub mod connection;
mod error;

pub use cluster::PostgresCluster;
pub use connection::{PgBackend, PgSession};
pub use tenantload_core::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{PgBackend, PgSession, PostgresCluster};
    pub use tenantload_core::prelude::*;
}
