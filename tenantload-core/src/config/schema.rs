//! Configuration schema definitions for tenantload
//!
//! All configuration structures use serde for serialization and validator for
//! field-level validation. Cross-field rules live in [`super::validator`].
//! Every structure is built once before a run starts and is read-only
//! afterwards.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::net::{ToSocketAddrs, UdpSocket};
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Default tenant (database) name prefix.
pub const DEFAULT_TENANT_PREFIX: &str = "md_scalability_db_";

/// Default resource (table) name prefix.
pub const DEFAULT_RESOURCE_PREFIX: &str = "md_scalability_table_";

/// Default YSQL port.
pub const DEFAULT_PORT: u16 = 5433;

const MIN_SPAWN_INTERVAL: Duration = Duration::from_micros(1);
const MAX_SPAWN_INTERVAL: Duration = Duration::from_secs(86_400);

/// Connection settings shared by provisioning and every virtual user
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConnectionConfig {
    /// Host name or address of the cluster
    #[validate(length(min = 1))]
    pub host: String,

    /// Port number of the SQL endpoint
    #[validate(range(min = 1))]
    pub port: u16,

    /// User to connect as
    #[validate(length(min = 1))]
    pub user: String,

    /// Password for `user`
    #[serde(skip_serializing)]
    pub password: String,

    /// Whether the cluster is reached over IPv6
    pub ipv6: bool,

    /// Database used for catalog queries and DDL on tenants
    #[validate(length(min = 1))]
    pub initial_database: String,

    /// Connection establishment timeout in milliseconds
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
}

impl ConnectionConfig {
    /// Build a configuration, resolving the host to the local address when
    /// none is given.
    #[must_use]
    pub fn new(host: Option<String>, port: Option<u16>, user: String, password: String, ipv6: bool) -> Self {
        Self {
            host: host.unwrap_or_else(|| local_address(ipv6)),
            port: port.unwrap_or(DEFAULT_PORT),
            user,
            password,
            ipv6,
            initial_database: "yugabyte".to_string(),
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Override the initial database (lower-cased, as the server folds
    /// unquoted identifiers).
    #[must_use]
    pub fn with_initial_database(mut self, database: &str) -> Self {
        self.initial_database = database.to_lowercase();
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(None, None, "yugabyte".to_string(), "yugabyte".to_string(), false)
    }
}

/// Address this host uses to reach the network, used when no host is given.
///
/// The machine's hostname is resolved through a UDP socket of the requested
/// family. Connecting a UDP socket sends nothing; it only makes the OS
/// choose a source address.
#[must_use]
pub fn local_address(ipv6: bool) -> String {
    let fallback = if ipv6 { "::1" } else { "127.0.0.1" };
    let probe = || -> std::io::Result<String> {
        let socket = UdpSocket::bind(if ipv6 { "[::]:0" } else { "0.0.0.0:0" })?;
        let hostname = hostname::get()?.into_string().unwrap_or_else(|_| "localhost".to_string());
        let target = (hostname.as_str(), 1)
            .to_socket_addrs()?
            .find(|addr| addr.is_ipv6() == ipv6)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no address of the requested family"))?;
        socket.connect(target)?;
        Ok(socket.local_addr()?.ip().to_string())
    };
    probe().unwrap_or_else(|_| fallback.to_string())
}

/// Prefixes used to derive tenant and resource names from their ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NamingConfig {
    /// Prefix of tenant (database) names
    #[validate(length(min = 1))]
    pub tenant_prefix: String,

    /// Prefix of resource (table) names
    #[validate(length(min = 1))]
    pub resource_prefix: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            tenant_prefix: DEFAULT_TENANT_PREFIX.to_string(),
            resource_prefix: DEFAULT_RESOURCE_PREFIX.to_string(),
        }
    }
}

/// Bounded pause a virtual user takes between two tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_think_time"))]
pub struct ThinkTime {
    /// Lower bound in milliseconds (inclusive)
    pub min_ms: u64,
    /// Upper bound in milliseconds (inclusive)
    pub max_ms: u64,
}

impl ThinkTime {
    /// Uniform think time between `min` and `max`.
    #[must_use]
    pub fn between(min: Duration, max: Duration) -> Self {
        Self { min_ms: min.as_millis() as u64, max_ms: max.as_millis() as u64 }
    }

    /// Fixed think time.
    #[must_use]
    pub fn constant(value: Duration) -> Self {
        Self::between(value, value)
    }

    /// No pause between tasks.
    #[must_use]
    pub const fn none() -> Self {
        Self { min_ms: 0, max_ms: 0 }
    }

    /// Draw a think time from the interval.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rng.gen_range(self.min_ms..=self.max_ms))
    }
}

fn validate_think_time(think_time: &ThinkTime) -> Result<(), ValidationError> {
    if think_time.min_ms > think_time.max_ms {
        return Err(ValidationError::new("think_time_min_exceeds_max"));
    }
    Ok(())
}

/// Parameters of one execution run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RunConfiguration {
    /// Number of virtual users to reach
    pub target_population: usize,

    /// Users spawned per second during ramp-up
    #[validate(range(min = 0.0))]
    pub spawn_rate: f64,

    /// Total run time in seconds, ramp-up included
    pub duration_secs: u64,
}

impl RunConfiguration {
    /// Create a run configuration.
    #[must_use]
    pub const fn new(target_population: usize, spawn_rate: f64, duration_secs: u64) -> Self {
        Self { target_population, spawn_rate, duration_secs }
    }

    /// Run duration.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Delay between two consecutive spawns, `None` when nothing is spawned.
    ///
    /// Extreme rates are clamped to `[1µs, 1 day]` between spawns.
    #[must_use]
    pub fn spawn_interval(&self) -> Option<Duration> {
        if self.target_population == 0 || !(self.spawn_rate > 0.0) {
            return None;
        }
        let interval = Duration::try_from_secs_f64(1.0 / self.spawn_rate).unwrap_or(MAX_SPAWN_INTERVAL);
        Some(interval.clamp(MIN_SPAWN_INTERVAL, MAX_SPAWN_INTERVAL))
    }
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self::new(100, 10.0, 600)
    }
}

/// Statistics sink and reporting settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct StatsConfig {
    /// Capacity of the event queue between producers and the aggregator
    #[validate(range(min = 1))]
    pub queue_capacity: usize,

    /// Interval of the periodic summary log line, in seconds (0 disables)
    pub report_interval_secs: u64,

    /// Interval of history rows appended by continuous export, in seconds
    #[validate(range(min = 1))]
    pub history_interval_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self { queue_capacity: 65_536, report_interval_secs: 10, history_interval_secs: 1 }
    }
}

/// Topology to create during setup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ProvisionConfig {
    /// Number of tenants (databases)
    #[validate(range(min = 1))]
    pub num_tenants: u64,

    /// Number of resources (tables) per tenant
    #[validate(range(min = 1))]
    pub num_resources: u64,

    /// Create tenants as colocated databases
    pub colocated: bool,
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
