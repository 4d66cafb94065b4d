//! In-memory cluster for tests.
//!
//! [`MockCluster`] implements [`Backend`], [`TopologySource`] and
//! [`ClusterAdmin`] over a catalog held in memory, with configurable latency,
//! failure injection and connection accounting.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tenantload_core::{Error, ResourceId, Result, TenantId};

use crate::backend::{Backend, Connection, TopologySource};
use crate::directory::TenantDirectory;
use crate::provision::ClusterAdmin;

#[derive(Debug, Default)]
struct MockState {
    catalog: Mutex<BTreeMap<String, BTreeSet<String>>>,
    undroppable: Mutex<HashSet<String>>,
    latency: Mutex<Duration>,
    catalog_available: AtomicBool,
    fail_connects: AtomicBool,
    fail_queries: AtomicBool,
    open: AtomicU64,
    peak_open: AtomicU64,
    connects: AtomicU64,
    statements: AtomicU64,
}

/// Cloneable in-memory cluster
#[derive(Debug, Clone)]
pub struct MockCluster {
    state: Arc<MockState>,
    directory: TenantDirectory,
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCluster {
    /// Empty cluster with the default naming.
    #[must_use]
    pub fn new() -> Self {
        let state = MockState::default();
        state.catalog_available.store(true, Ordering::Relaxed);
        Self { state: Arc::new(state), directory: TenantDirectory::default() }
    }

    /// Cluster with `tenants` tenants of `resources` resources each.
    #[must_use]
    pub fn with_topology(tenants: u64, resources: u64) -> Self {
        let cluster = Self::new();
        {
            let mut catalog = cluster.state.catalog.lock();
            for tenant in 1..=tenants {
                let names = (1..=resources)
                    .map(|id| cluster.directory.name_of_resource(ResourceId::new(id)))
                    .collect();
                catalog.insert(cluster.directory.name_of_tenant(TenantId::new(tenant)), names);
            }
        }
        cluster
    }

    /// Delay applied to every connect and statement.
    pub fn set_latency(&self, latency: Duration) {
        *self.state.latency.lock() = latency;
    }

    /// Make catalog queries fail.
    pub fn set_catalog_available(&self, available: bool) {
        self.state.catalog_available.store(available, Ordering::Relaxed);
    }

    /// Make every connect fail.
    pub fn set_fail_connects(&self, fail: bool) {
        self.state.fail_connects.store(fail, Ordering::Relaxed);
    }

    /// Make every statement fail.
    pub fn set_fail_queries(&self, fail: bool) {
        self.state.fail_queries.store(fail, Ordering::Relaxed);
    }

    /// Make dropping the given tenant fail.
    pub fn set_undroppable(&self, tenant: TenantId) {
        self.state.undroppable.lock().insert(self.directory.name_of_tenant(tenant));
    }

    /// Tenants currently in the catalog.
    #[must_use]
    pub fn tenants(&self) -> Vec<String> {
        self.state.catalog.lock().keys().cloned().collect()
    }

    /// Resources of one tenant.
    #[must_use]
    pub fn resources(&self, tenant: &str) -> Vec<String> {
        self.state.catalog.lock().get(tenant).map(|r| r.iter().cloned().collect()).unwrap_or_default()
    }

    /// Connections open right now.
    #[must_use]
    pub fn open_connections(&self) -> u64 {
        self.state.open.load(Ordering::Relaxed)
    }

    /// Highest number of simultaneously open connections.
    #[must_use]
    pub fn peak_open_connections(&self) -> u64 {
        self.state.peak_open.load(Ordering::Relaxed)
    }

    /// Successful connects so far.
    #[must_use]
    pub fn connects(&self) -> u64 {
        self.state.connects.load(Ordering::Relaxed)
    }

    /// Statements executed so far, failed ones included.
    #[must_use]
    pub fn statements(&self) -> u64 {
        self.state.statements.load(Ordering::Relaxed)
    }

    async fn delay(&self) {
        let latency = *self.state.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_catalog(&self) -> Result<()> {
        if self.state.catalog_available.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(Error::DirectoryUnavailable { message: "catalog offline".to_string() })
        }
    }
}

#[async_trait]
impl Backend for MockCluster {
    async fn connect(&self, tenant: &str) -> Result<Box<dyn Connection>> {
        self.delay().await;
        let refused = |message: &str| Error::Connection { tenant: tenant.to_string(), message: message.to_string() };
        if self.state.fail_connects.load(Ordering::Relaxed) {
            return Err(refused("connection refused"));
        }
        if !self.state.catalog.lock().contains_key(tenant) {
            return Err(refused("database does not exist"));
        }

        let open = self.state.open.fetch_add(1, Ordering::Relaxed) + 1;
        self.state.peak_open.fetch_max(open, Ordering::Relaxed);
        self.state.connects.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MockConnection { cluster: self.clone(), tenant: tenant.to_string() }))
    }
}

#[async_trait]
impl TopologySource for MockCluster {
    async fn tenant_count(&self, directory: &TenantDirectory) -> Result<u64> {
        self.check_catalog()?;
        let catalog = self.state.catalog.lock();
        Ok(catalog.keys().filter(|name| name.starts_with(directory.tenant_prefix())).count() as u64)
    }

    async fn resource_count(&self, directory: &TenantDirectory, tenant: TenantId) -> Result<u64> {
        self.check_catalog()?;
        let catalog = self.state.catalog.lock();
        let resources = catalog.get(&directory.name_of_tenant(tenant)).ok_or_else(|| {
            Error::DirectoryUnavailable { message: format!("database {} does not exist", directory.name_of_tenant(tenant)) }
        })?;
        Ok(resources.iter().filter(|name| name.starts_with(directory.resource_prefix())).count() as u64)
    }
}

#[async_trait]
impl ClusterAdmin for MockCluster {
    async fn tenant_exists(&self, tenant: &str) -> Result<bool> {
        self.check_catalog()?;
        Ok(self.state.catalog.lock().contains_key(tenant))
    }

    async fn create_tenant(&self, tenant: &str, _colocated: bool) -> Result<()> {
        let mut catalog = self.state.catalog.lock();
        if catalog.contains_key(tenant) {
            return Err(Error::provisioning(format!("database \"{tenant}\" already exists")));
        }
        catalog.insert(tenant.to_string(), BTreeSet::new());
        Ok(())
    }

    async fn create_resource(&self, tenant: &str, resource: &str) -> Result<()> {
        let mut catalog = self.state.catalog.lock();
        let resources = catalog
            .get_mut(tenant)
            .ok_or_else(|| Error::provisioning(format!("database \"{tenant}\" does not exist")))?;
        resources.insert(resource.to_string());
        Ok(())
    }

    async fn list_tenants(&self, prefix: &str) -> Result<Vec<String>> {
        self.check_catalog()?;
        Ok(self.state.catalog.lock().keys().filter(|name| name.starts_with(prefix)).cloned().collect())
    }

    async fn drop_tenant(&self, tenant: &str) -> Result<()> {
        if self.state.undroppable.lock().contains(tenant) {
            return Err(Error::provisioning(format!("database \"{tenant}\" is being accessed by other users")));
        }
        if self.state.catalog.lock().remove(tenant).is_none() {
            return Err(Error::provisioning(format!("database \"{tenant}\" does not exist")));
        }
        Ok(())
    }
}

/// Connection handed out by [`MockCluster`]
#[derive(Debug)]
pub struct MockConnection {
    cluster: MockCluster,
    tenant: String,
}

impl MockConnection {
    async fn statement(&self, statement: &str) -> Result<()> {
        self.cluster.delay().await;
        self.cluster.state.statements.fetch_add(1, Ordering::Relaxed);
        if self.cluster.state.fail_queries.load(Ordering::Relaxed) {
            return Err(Error::Query { statement: statement.to_string(), message: "injected failure".to_string() });
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn tenant(&self) -> &str {
        &self.tenant
    }

    async fn execute(&mut self, statement: &str) -> Result<u64> {
        self.statement(statement).await?;
        Ok(u64::from(statement.starts_with("INSERT")))
    }

    async fn query_scalar(&mut self, statement: &str) -> Result<i64> {
        self.statement(statement).await?;
        Ok(0)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.cluster.state.open.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }
}
