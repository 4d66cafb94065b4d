//! Per-user mutable state that tasks act on.

use rand::rngs::StdRng;
use std::sync::Arc;
use tenantload_core::{Error, Result, TenantId, UserId};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::{Backend, Connection};
use crate::context::WorkloadContext;
use crate::timing::{OperationDescriptor, OperationTimer};

use super::population::PopulationTracker;

/// The single open connection of a user
pub struct ConnectionHandle {
    id: Uuid,
    tenant: TenantId,
    conn: Box<dyn Connection>,
}

impl ConnectionHandle {
    /// Local identity of this connection.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Tenant the connection is bound to.
    #[must_use]
    pub const fn tenant(&self) -> TenantId {
        self.tenant
    }

    /// Name of the bound tenant.
    #[must_use]
    pub fn tenant_name(&self) -> &str {
        self.conn.tenant()
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("tenant", &self.tenant)
            .finish_non_exhaustive()
    }
}

/// Everything a task may touch: connection, randomness, timer and context
pub struct UserSession {
    user_id: UserId,
    context: Arc<WorkloadContext>,
    backend: Arc<dyn Backend>,
    timer: OperationTimer,
    connect_op: OperationDescriptor,
    tracker: Arc<PopulationTracker>,
    rng: StdRng,
    connection: Option<ConnectionHandle>,
}

impl UserSession {
    /// Create a session with no connection.
    #[must_use]
    pub fn new(
        user_id: UserId,
        context: Arc<WorkloadContext>,
        backend: Arc<dyn Backend>,
        timer: OperationTimer,
        connect_op: OperationDescriptor,
        tracker: Arc<PopulationTracker>,
        rng: StdRng,
    ) -> Self {
        Self { user_id, context, backend, timer, connect_op, tracker, rng, connection: None }
    }

    /// Identity of the owning user.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Shared topology.
    #[must_use]
    pub fn context(&self) -> &WorkloadContext {
        &self.context
    }

    /// The user's own random generator.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Identity of the open connection, if any.
    #[must_use]
    pub fn connection_id(&self) -> Option<Uuid> {
        self.connection.as_ref().map(ConnectionHandle::id)
    }

    /// The open connection, if any.
    #[must_use]
    pub const fn connection(&self) -> Option<&ConnectionHandle> {
        self.connection.as_ref()
    }

    /// Whether a connection is open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Connect to a uniformly random tenant, timing the attempt.
    ///
    /// Any connection still held is released first.
    ///
    /// # Errors
    /// Returns [`Error::InvalidRange`] for an empty topology or
    /// [`Error::Connection`] when the backend refuses; the session is left
    /// without a connection.
    pub async fn connect_random(&mut self) -> Result<()> {
        self.release().await;

        let directory = self.context.directory();
        let tenant = directory.random_tenant_with(&mut self.rng, self.context.tenant_range())?;
        let name = directory.name_of_tenant(tenant);

        let backend = Arc::clone(&self.backend);
        let (conn, elapsed) = self.timer.time(&self.connect_op, || backend.connect(&name)).await?;

        let handle = ConnectionHandle { id: Uuid::new_v4(), tenant, conn };
        let open = self.tracker.connection_opened();
        debug!(
            "{} connected to {} in {:?} ({} open connections)",
            self.user_id, name, elapsed, open
        );
        self.connection = Some(handle);
        Ok(())
    }

    /// Close the held connection, if any. Close errors are logged.
    pub async fn release(&mut self) {
        if let Some(handle) = self.connection.take() {
            let tenant = handle.tenant_name().to_string();
            let open = self.tracker.connection_closed();
            if let Err(err) = handle.conn.close().await {
                warn!("{} failed to close connection to {}: {}", self.user_id, tenant, err);
            }
            debug!("{} released connection to {} ({} open connections)", self.user_id, tenant, open);
        }
    }

    /// Run a timed statement on the held connection.
    ///
    /// # Errors
    /// Returns [`Error::NotConnected`] without timing anything when no
    /// connection is held, or the statement's own error.
    pub async fn execute(&mut self, op: &OperationDescriptor, statement: &str) -> Result<u64> {
        let handle = self.connection.as_mut().ok_or(Error::NotConnected)?;
        let (rows, _) = self.timer.time(op, || handle.conn.execute(statement)).await?;
        Ok(rows)
    }

    /// Run a timed scalar query on the held connection.
    ///
    /// # Errors
    /// Returns [`Error::NotConnected`] without timing anything when no
    /// connection is held, or the query's own error.
    pub async fn query_scalar(&mut self, op: &OperationDescriptor, statement: &str) -> Result<i64> {
        let handle = self.connection.as_mut().ok_or(Error::NotConnected)?;
        let (value, _) = self.timer.time(op, || handle.conn.query_scalar(statement)).await?;
        Ok(value)
    }

    /// Name of a uniformly random resource of the bound tenant.
    ///
    /// # Errors
    /// Returns [`Error::InvalidRange`] when the tenant has no resources.
    pub fn random_resource_name(&mut self) -> Result<String> {
        let directory = self.context.directory();
        let resource = directory.random_resource_with(&mut self.rng, self.context.resource_range())?;
        Ok(directory.name_of_resource(resource))
    }
}

impl std::fmt::Debug for UserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSession")
            .field("user_id", &self.user_id)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}
