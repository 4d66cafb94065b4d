//! Command-line arguments.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tenantload_core::config::DEFAULT_PORT;
use tenantload_core::telemetry::{LogFormat, LoggingConfig};
use tenantload_core::{ConnectionConfig, ProvisionConfig};
use tenantload_harness::Workload;

/// Provision a multi-tenant topology and drive it with virtual users
#[derive(Debug, Parser)]
#[command(name = "tenantload", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormatArg::Text, global = true)]
    pub log_format: LogFormatArg,

    #[command(subcommand)]
    pub command: Command,
}

/// Where and how to reach the cluster
#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    /// Cluster host (defaults to this machine's address)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// SQL port
    #[arg(long, default_value_t = DEFAULT_PORT, global = true)]
    pub port: u16,

    /// Database user
    #[arg(long, default_value = "yugabyte", global = true)]
    pub dbuser: String,

    /// Database password
    #[arg(long, default_value = "yugabyte", global = true)]
    pub dbpass: String,

    /// Reach the cluster over IPv6
    #[arg(long, global = true)]
    pub ipv6: bool,

    /// Database used for catalog queries and DDL
    #[arg(long, default_value = "yugabyte", global = true)]
    pub initialdb: String,
}

impl ConnectionArgs {
    pub fn to_config(&self) -> ConnectionConfig {
        ConnectionConfig::new(self.host.clone(), Some(self.port), self.dbuser.clone(), self.dbpass.clone(), self.ipv6)
            .with_initial_database(&self.initialdb)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

impl LogFormatArg {
    pub fn logging(self) -> LoggingConfig {
        let format = match self {
            Self::Text => LogFormat::Text,
            Self::Json => LogFormat::Json,
        };
        LoggingConfig { format, ..LoggingConfig::default() }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the tenant databases and their tables
    Setup(SetupArgs),
    /// Drop the tenant databases
    Cleanup(CleanupArgs),
    /// Run a workload against the provisioned tenants
    Execute(ExecuteArgs),
}

#[derive(Debug, Clone, Args)]
pub struct SetupArgs {
    /// Number of databases to create
    #[arg(long = "num_databases")]
    pub num_databases: u64,

    /// Number of tables per database
    #[arg(long = "num_tables")]
    pub num_tables: u64,

    /// Create databases without colocation
    #[arg(long)]
    pub no_colocation: bool,
}

impl SetupArgs {
    pub const fn to_config(&self) -> ProvisionConfig {
        ProvisionConfig {
            num_tenants: self.num_databases,
            num_resources: self.num_tables,
            colocated: !self.no_colocation,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct CleanupArgs {
    /// Drop databases 1, 2, ... until the first failure instead of every
    /// catalogued database
    #[arg(long)]
    pub probe: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ExecuteArgs {
    /// Workload to run
    #[arg(long)]
    pub workload: Workload,

    /// Number of virtual users
    #[arg(long = "num_users", default_value_t = 100)]
    pub num_users: usize,

    /// Users started per second
    #[arg(long = "spawn_rate", default_value_t = 10.0)]
    pub spawn_rate: f64,

    /// Run time in seconds, ramp-up included
    #[arg(long = "execution_time", default_value_t = 600)]
    pub execution_time: u64,

    /// Write `<BASE>_stats.csv`, `<BASE>_stats_history.csv` and
    /// `<BASE>_failures.csv`
    #[arg(long, value_name = "BASE")]
    pub csv: Option<PathBuf>,

    /// Seconds between summary log lines (0 disables)
    #[arg(long, default_value_t = 10)]
    pub stats_interval: u64,

    /// Write the run report as JSON
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}
