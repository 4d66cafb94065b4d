//! Backend traits: the seams between the harness and the database.
//!
//! The harness never speaks a wire protocol itself. A [`Backend`] opens
//! tenant-bound [`Connection`]s for virtual users, and a [`TopologySource`]
//! reports how many tenants and resources are provisioned. Both are external
//! collaborators; `tenantload-postgres` provides the PostgreSQL versions and
//! [`crate::test_utils`] provides in-memory ones.

use async_trait::async_trait;
use std::fmt;
use tenantload_core::{Result, TenantId};

use crate::directory::TenantDirectory;

/// Factory of tenant-bound connections
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Open a new connection bound to the named tenant.
    ///
    /// # Errors
    /// Returns [`tenantload_core::Error::Connection`] when the tenant cannot be
    /// reached.
    async fn connect(&self, tenant: &str) -> Result<Box<dyn Connection>>;
}

/// A single open connection, owned by exactly one virtual user
#[async_trait]
pub trait Connection: fmt::Debug + Send + 'static {
    /// Name of the tenant this connection is bound to.
    fn tenant(&self) -> &str;

    /// Run a statement that returns no rows; yields the affected row count.
    ///
    /// # Errors
    /// Returns [`tenantload_core::Error::Query`] when the statement fails.
    async fn execute(&mut self, statement: &str) -> Result<u64>;

    /// Run a statement returning a single integer value.
    ///
    /// # Errors
    /// Returns [`tenantload_core::Error::Query`] when the statement fails or
    /// returns no row.
    async fn query_scalar(&mut self, statement: &str) -> Result<i64>;

    /// Close the connection.
    ///
    /// # Errors
    /// Returns an error if the server-side close fails; the connection is
    /// gone either way.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Source of the provisioned topology's size
#[async_trait]
pub trait TopologySource: Send + Sync {
    /// Number of provisioned tenants.
    ///
    /// # Errors
    /// Returns [`tenantload_core::Error::DirectoryUnavailable`] when the
    /// metadata query cannot complete.
    async fn tenant_count(&self, directory: &TenantDirectory) -> Result<u64>;

    /// Number of resources provisioned inside one tenant.
    ///
    /// # Errors
    /// Returns [`tenantload_core::Error::DirectoryUnavailable`] when the
    /// metadata query cannot complete.
    async fn resource_count(&self, directory: &TenantDirectory, tenant: TenantId) -> Result<u64>;
}
