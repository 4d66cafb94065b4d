//! Creating and removing the tenant topology.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tenantload_core::{ConfigValidator, Error, ProvisionConfig, ResourceId, Result, TenantId};
use tracing::{info, warn};

use crate::directory::TenantDirectory;

/// Administrative operations on the cluster
#[async_trait]
pub trait ClusterAdmin: Send + Sync {
    /// Whether a tenant with this name exists.
    async fn tenant_exists(&self, tenant: &str) -> Result<bool>;

    /// Create a tenant, optionally colocated.
    async fn create_tenant(&self, tenant: &str, colocated: bool) -> Result<()>;

    /// Create a resource and its index inside a tenant if they are absent.
    async fn create_resource(&self, tenant: &str, resource: &str) -> Result<()>;

    /// Names of existing tenants starting with `prefix`.
    async fn list_tenants(&self, prefix: &str) -> Result<Vec<String>>;

    /// Drop a tenant.
    async fn drop_tenant(&self, tenant: &str) -> Result<()>;
}

/// What `setup` did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SetupReport {
    /// Tenants created
    pub created: Vec<String>,
    /// Tenants that already existed
    pub skipped: Vec<String>,
    /// Resources ensured across all tenants
    pub resources: u64,
}

/// What `cleanup` did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Tenants dropped, in order
    pub dropped: Vec<String>,
    /// Tenants that could not be dropped, with the reason
    pub failed: Vec<(String, String)>,
}

impl CleanupReport {
    /// Whether every attempted drop succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Drives a [`ClusterAdmin`] to build or tear down the topology
pub struct Provisioner {
    admin: Arc<dyn ClusterAdmin>,
    directory: TenantDirectory,
}

impl Provisioner {
    /// Create a provisioner.
    #[must_use]
    pub fn new(admin: Arc<dyn ClusterAdmin>, directory: TenantDirectory) -> Self {
        Self { admin, directory }
    }

    /// Create tenants `1..=num_tenants`, then resources `1..=num_resources`
    /// in each. Existing tenants and resources are kept, so the operation can
    /// be repeated.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for zero counts, or
    /// [`Error::Provisioning`] naming the object that failed. Work done before
    /// the failure is not undone.
    pub async fn setup(&self, config: &ProvisionConfig) -> Result<SetupReport> {
        ConfigValidator::validate_provision(config)?;
        let mut report = SetupReport::default();

        for id in 1..=config.num_tenants {
            let tenant = self.directory.name_of_tenant(TenantId::new(id));
            let exists = self
                .admin
                .tenant_exists(&tenant)
                .await
                .map_err(|e| context(e, format!("checking database {tenant}")))?;
            if exists {
                info!("Skipping creation of database {} because it already exists", tenant);
                report.skipped.push(tenant);
                continue;
            }
            self.admin
                .create_tenant(&tenant, config.colocated)
                .await
                .map_err(|e| context(e, format!("creating database {tenant}")))?;
            info!("Created database {}", tenant);
            report.created.push(tenant);
        }

        for id in 1..=config.num_tenants {
            let tenant = self.directory.name_of_tenant(TenantId::new(id));
            for resource_id in 1..=config.num_resources {
                let resource = self.directory.name_of_resource(ResourceId::new(resource_id));
                self.admin
                    .create_resource(&tenant, &resource)
                    .await
                    .map_err(|e| context(e, format!("creating table {resource} on database {tenant}")))?;
                report.resources += 1;
            }
            info!("Created {} tables on database {}", config.num_resources, tenant);
        }

        Ok(report)
    }

    /// Drop every catalogued tenant in ascending id order, continuing past
    /// failures.
    ///
    /// # Errors
    /// Returns [`Error::Provisioning`] only when the catalog cannot be
    /// listed; individual drop failures are reported in the result.
    pub async fn cleanup(&self) -> Result<CleanupReport> {
        let names = self
            .admin
            .list_tenants(self.directory.tenant_prefix())
            .await
            .map_err(|e| context(e, "listing databases".to_string()))?;

        let mut ids: Vec<TenantId> = names.iter().filter_map(|name| self.directory.parse_tenant(name)).collect();
        ids.sort_unstable();
        ids.dedup();

        let mut report = CleanupReport::default();
        for id in ids {
            let tenant = self.directory.name_of_tenant(id);
            match self.admin.drop_tenant(&tenant).await {
                Ok(()) => {
                    info!("Dropped database {}", tenant);
                    report.dropped.push(tenant);
                }
                Err(err) => {
                    warn!("Failed to drop database {}: {}", tenant, err);
                    report.failed.push((tenant, err.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// Drop tenants 1, 2, ... until the first drop fails.
    ///
    /// The failing tenant ends the sweep and is not reported as a failure;
    /// tenants after a gap are left in place.
    ///
    /// # Errors
    /// Never fails; the signature matches [`Self::cleanup`].
    pub async fn cleanup_probe(&self) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();
        for id in 1.. {
            let tenant = self.directory.name_of_tenant(TenantId::new(id));
            if let Err(err) = self.admin.drop_tenant(&tenant).await {
                info!("Stopping cleanup at {}: {}", tenant, err);
                break;
            }
            info!("Dropped database {}", tenant);
            report.dropped.push(tenant);
        }
        Ok(report)
    }
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner").field("directory", &self.directory).finish_non_exhaustive()
    }
}

fn context(err: Error, action: String) -> Error {
    match err {
        Error::Provisioning { message } => Error::provisioning(format!("{action}: {message}")),
        other => Error::provisioning(format!("{action}: {other}")),
    }
}
