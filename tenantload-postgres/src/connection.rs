//! Tenant-bound connections for virtual users.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection as _, Executor};
use tenantload_core::{ConnectionConfig, Error, Result};
use tenantload_harness::{Backend, Connection};
use tracing::debug;

use crate::error;

/// Connect options for one database of the cluster.
pub(crate) fn connect_options(config: &ConnectionConfig, database: &str) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(database)
}

/// Open a single connection to `database`, bounded by the configured timeout.
pub(crate) async fn open(config: &ConnectionConfig, database: &str) -> Result<PgConnection> {
    let options = connect_options(config, database);
    match tokio::time::timeout(config.connect_timeout, PgConnection::connect_with(&options)).await {
        Ok(Ok(conn)) => Ok(conn),
        Ok(Err(err)) => Err(error::connection(database, &err)),
        Err(_) => Err(Error::Connection {
            tenant: database.to_string(),
            message: format!("timed out after {:?}", config.connect_timeout),
        }),
    }
}

/// Opens one connection per virtual user, without pooling
#[derive(Debug, Clone)]
pub struct PgBackend {
    config: ConnectionConfig,
}

impl PgBackend {
    /// Create a backend for the given cluster.
    #[must_use]
    pub const fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    /// Connection settings in use.
    #[must_use]
    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

#[async_trait]
impl Backend for PgBackend {
    async fn connect(&self, tenant: &str) -> Result<Box<dyn Connection>> {
        let conn = open(&self.config, tenant).await?;
        debug!("Connected to {}:{}/{}", self.config.host, self.config.port, tenant);
        Ok(Box::new(PgSession { tenant: tenant.to_string(), conn }))
    }
}

/// A connection owned by one virtual user
#[derive(Debug)]
pub struct PgSession {
    tenant: String,
    conn: PgConnection,
}

#[async_trait]
impl Connection for PgSession {
    fn tenant(&self) -> &str {
        &self.tenant
    }

    async fn execute(&mut self, statement: &str) -> Result<u64> {
        // No bind arguments, so the simple query protocol is used and nothing
        // lands in the prepared statement cache.
        let result = self.conn.execute(statement).await.map_err(|e| error::query(statement, &e))?;
        Ok(result.rows_affected())
    }

    async fn query_scalar(&mut self, statement: &str) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(statement)
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| error::query(statement, &e))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let Self { tenant, conn } = *self;
        conn.close().await.map_err(|e| error::connection(&tenant, &e))
    }
}
