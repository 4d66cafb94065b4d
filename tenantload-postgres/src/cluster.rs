//! Catalog queries and DDL against the cluster.
//!
//! Catalog queries and database-level DDL run on the initial database
//! through a small lazily-connected pool. Table DDL and table counts need a
//! connection to the tenant database itself, which is opened per call.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Connection as _, Executor};
use tenantload_core::{ConfigValidator, ConnectionConfig, Error, Result, TenantId};
use tenantload_harness::{ClusterAdmin, TenantDirectory, TopologySource};
use tracing::{debug, warn};

use crate::connection::{connect_options, open};
use crate::error::{self, identifier};

const ADMIN_POOL_SIZE: u32 = 2;

/// Administrative access to a YugabyteDB YSQL cluster
#[derive(Debug, Clone)]
pub struct PostgresCluster {
    config: ConnectionConfig,
    pool: PgPool,
}

impl PostgresCluster {
    /// Create a handle; no connection is made until the first query. Must be
    /// called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns [`tenantload_core::Error::Configuration`] when the connection
    /// settings do not validate.
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        ConfigValidator::validate_connection(config)?;
        let pool = PgPoolOptions::new()
            .max_connections(ADMIN_POOL_SIZE)
            .acquire_timeout(config.connect_timeout)
            .connect_lazy_with(connect_options(config, &config.initial_database));
        Ok(Self { config: config.clone(), pool })
    }

    async fn run_on_tenant(&self, tenant: &str, statements: &[String]) -> Result<()> {
        let mut conn = open(&self.config, tenant).await.map_err(|e| Error::provisioning(e.to_string()))?;
        let mut outcome = Ok(());
        for statement in statements {
            debug!("{}: {}", tenant, statement);
            if let Err(err) = conn.execute(statement.as_str()).await {
                outcome = Err(error::admin(statement, &err));
                break;
            }
        }
        if let Err(err) = conn.close().await {
            warn!("Failed to close connection to {}: {}", tenant, err);
        }
        outcome
    }
}

/// YSQL `CREATE DATABASE` with an explicit colocation choice.
fn create_database(tenant: &str, colocated: bool) -> Result<String> {
    Ok(format!("CREATE DATABASE {} WITH colocated = {colocated}", identifier(tenant)?))
}

#[async_trait]
impl TopologySource for PostgresCluster {
    async fn tenant_count(&self, directory: &TenantDirectory) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pg_catalog.pg_database WHERE datname LIKE $1")
            .bind(format!("{}%", directory.tenant_prefix()))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| error::catalog("counting databases", &e))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn resource_count(&self, directory: &TenantDirectory, tenant: TenantId) -> Result<u64> {
        let database = directory.name_of_tenant(tenant);
        let mut conn = open(&self.config, &database)
            .await
            .map_err(|e| Error::DirectoryUnavailable { message: e.to_string() })?;
        let counted: std::result::Result<i64, sqlx::Error> =
            sqlx::query_scalar("SELECT COUNT(*) FROM information_schema.tables WHERE table_name LIKE $1")
                .bind(format!("{}%", directory.resource_prefix()))
                .fetch_one(&mut conn)
                .await;
        if let Err(err) = conn.close().await {
            warn!("Failed to close connection to {}: {}", database, err);
        }
        let count = counted.map_err(|e| error::catalog(&format!("counting tables of {database}"), &e))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

#[async_trait]
impl ClusterAdmin for PostgresCluster {
    async fn tenant_exists(&self, tenant: &str) -> Result<bool> {
        let found: Option<i32> = sqlx::query_scalar("SELECT 1 FROM pg_catalog.pg_database WHERE datname = $1")
            .bind(tenant)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| error::catalog("looking up database", &e))?;
        Ok(found.is_some())
    }

    async fn create_tenant(&self, tenant: &str, colocated: bool) -> Result<()> {
        let statement = create_database(tenant, colocated)?;
        self.pool.execute(statement.as_str()).await.map_err(|e| error::admin(&statement, &e))?;
        Ok(())
    }

    async fn create_resource(&self, tenant: &str, resource: &str) -> Result<()> {
        let table = identifier(resource)?;
        let statements = [
            format!("CREATE TABLE IF NOT EXISTS {table} (k SERIAL PRIMARY KEY, v1 VARCHAR, v2 INT, v3 TEXT)"),
            format!("CREATE INDEX IF NOT EXISTS {table}_v1_idx ON {table} (v1)"),
        ];
        self.run_on_tenant(identifier(tenant)?, &statements).await
    }

    async fn list_tenants(&self, prefix: &str) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT datname FROM pg_catalog.pg_database WHERE datname LIKE $1")
            .bind(format!("{prefix}%"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| error::catalog("listing databases", &e))
    }

    async fn drop_tenant(&self, tenant: &str) -> Result<()> {
        let statement = format!("DROP DATABASE {}", identifier(tenant)?);
        self.pool.execute(statement.as_str()).await.map_err(|e| error::admin(&statement, &e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_database_states_colocation() {
        assert_eq!(
            create_database("md_scalability_db_1", true).unwrap(),
            "CREATE DATABASE md_scalability_db_1 WITH colocated = true"
        );
        assert_eq!(
            create_database("md_scalability_db_2", false).unwrap(),
            "CREATE DATABASE md_scalability_db_2 WITH colocated = false"
        );
        assert!(create_database("db; DROP DATABASE yugabyte", true).is_err());
    }
}
