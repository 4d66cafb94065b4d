//! Tenant directory: deterministic naming and random selection of tenants
//! and their resources.
//!
//! Names are a pure function of the id (`<prefix><id>`). Random selection is
//! uniform over `[1, count]`. Counts themselves come from a
//! [`TopologySource`](crate::backend::TopologySource) and are held by the
//! [`WorkloadContext`](crate::context::WorkloadContext) for the whole run.

use rand::Rng;
use tenantload_core::{Error, NamingConfig, ResourceId, Result, TenantId};

/// Naming and selection rules for tenants and resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantDirectory {
    naming: NamingConfig,
}

impl Default for TenantDirectory {
    fn default() -> Self {
        Self::new(NamingConfig::default())
    }
}

impl TenantDirectory {
    /// Create a directory with the given name prefixes.
    #[must_use]
    pub const fn new(naming: NamingConfig) -> Self {
        Self { naming }
    }

    /// Prefix shared by all tenant names.
    #[must_use]
    pub fn tenant_prefix(&self) -> &str {
        &self.naming.tenant_prefix
    }

    /// Prefix shared by all resource names.
    #[must_use]
    pub fn resource_prefix(&self) -> &str {
        &self.naming.resource_prefix
    }

    /// Name of the tenant with the given id.
    #[must_use]
    pub fn name_of_tenant(&self, id: TenantId) -> String {
        format!("{}{}", self.naming.tenant_prefix, id.value())
    }

    /// Name of the resource with the given id.
    #[must_use]
    pub fn name_of_resource(&self, id: ResourceId) -> String {
        format!("{}{}", self.naming.resource_prefix, id.value())
    }

    /// Parse a tenant name back into its id, `None` for foreign names.
    #[must_use]
    pub fn parse_tenant(&self, name: &str) -> Option<TenantId> {
        name.strip_prefix(self.naming.tenant_prefix.as_str())
            .and_then(|suffix| suffix.parse::<u64>().ok())
            .filter(|id| *id >= 1)
            .map(TenantId::new)
    }

    /// Uniformly random tenant id in `[1, count]`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidRange`] if `count < 1`.
    pub fn random_tenant(&self, count: i64) -> Result<TenantId> {
        self.random_tenant_with(&mut rand::thread_rng(), count)
    }

    /// Uniformly random resource id in `[1, count]`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidRange`] if `count < 1`.
    pub fn random_resource(&self, count: i64) -> Result<ResourceId> {
        self.random_resource_with(&mut rand::thread_rng(), count)
    }

    /// [`Self::random_tenant`] drawing from a caller-owned generator.
    ///
    /// # Errors
    /// Returns [`Error::InvalidRange`] if `count < 1`.
    pub fn random_tenant_with<R: Rng + ?Sized>(&self, rng: &mut R, count: i64) -> Result<TenantId> {
        draw(rng, count).map(TenantId::new)
    }

    /// [`Self::random_resource`] drawing from a caller-owned generator.
    ///
    /// # Errors
    /// Returns [`Error::InvalidRange`] if `count < 1`.
    pub fn random_resource_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        count: i64,
    ) -> Result<ResourceId> {
        draw(rng, count).map(ResourceId::new)
    }
}

fn draw<R: Rng + ?Sized>(rng: &mut R, count: i64) -> Result<u64> {
    if count < 1 {
        return Err(Error::InvalidRange { count });
    }
    Ok(rng.gen_range(1..=count as u64))
}
