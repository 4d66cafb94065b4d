//! Shared, read-only workload context.
//!
//! Built once before any virtual user starts and handed to every user and to
//! the engine as an `Arc<WorkloadContext>`. Nothing in it changes during a
//! run, so it is shared without locking.

use std::sync::Arc;
use tenantload_core::{Error, Result, TenantId};
use tracing::info;

use crate::backend::TopologySource;
use crate::directory::TenantDirectory;

/// Topology counts and naming rules for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadContext {
    directory: TenantDirectory,
    tenant_count: u64,
    resource_count: u64,
}

impl WorkloadContext {
    /// Create a context from known counts.
    #[must_use]
    pub const fn new(directory: TenantDirectory, tenant_count: u64, resource_count: u64) -> Self {
        Self { directory, tenant_count, resource_count }
    }

    /// Query the topology once and freeze the counts.
    ///
    /// The resource count is read from the first tenant; every tenant is
    /// provisioned with the same number of resources. With no tenants the
    /// resource count is reported as zero without querying.
    ///
    /// # Errors
    /// Propagates [`Error::DirectoryUnavailable`] from the source.
    pub async fn discover(
        source: &dyn TopologySource,
        directory: TenantDirectory,
    ) -> Result<Arc<Self>> {
        let tenant_count = source.tenant_count(&directory).await?;
        let resource_count = if tenant_count == 0 {
            0
        } else {
            source.resource_count(&directory, TenantId::new(1)).await?
        };

        info!("Number of tenants: {}, number of resources: {}", tenant_count, resource_count);

        Ok(Arc::new(Self::new(directory, tenant_count, resource_count)))
    }

    /// Naming and selection rules.
    #[must_use]
    pub const fn directory(&self) -> &TenantDirectory {
        &self.directory
    }

    /// Number of provisioned tenants.
    #[must_use]
    pub const fn tenant_count(&self) -> u64 {
        self.tenant_count
    }

    /// Number of resources per tenant.
    #[must_use]
    pub const fn resource_count(&self) -> u64 {
        self.resource_count
    }

    /// Tenant count as the signed range accepted by the directory.
    #[must_use]
    pub fn tenant_range(&self) -> i64 {
        i64::try_from(self.tenant_count).unwrap_or(i64::MAX)
    }

    /// Resource count as the signed range accepted by the directory.
    #[must_use]
    pub fn resource_range(&self) -> i64 {
        i64::try_from(self.resource_count).unwrap_or(i64::MAX)
    }

    /// Check that a workload can run against this topology.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTopology`] if there are no tenants or no
    /// resources.
    pub fn validate(&self) -> Result<()> {
        if self.tenant_count < 1 || self.resource_count < 1 {
            return Err(Error::InvalidTopology {
                tenants: self.tenant_count,
                resources: self.resource_count,
            });
        }
        Ok(())
    }
}
