//! `tenantload` binary: provision tenants, run workloads, clean up.

mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tenantload_core::telemetry::init_logging;
use tenantload_core::{ConfigValidator, ConnectionConfig, StatsConfig};
use tenantload_harness::{
    stats::format_table, CsvExporter, ExecutionEngine, Provisioner, RunReport, StatsExporter, StatsSink,
    SummaryLogger, TenantDirectory, WorkloadContext,
};
use tenantload_postgres::{PgBackend, PostgresCluster};
use tracing::{error, info, warn};

use crate::cli::{CleanupArgs, Cli, Command, ConnectionArgs, ExecuteArgs, SetupArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_format.logging());

    match cli.command {
        Command::Setup(args) => setup(&cli.connection, &args).await,
        Command::Cleanup(args) => cleanup(&cli.connection, &args).await,
        Command::Execute(args) => execute(&cli.connection, &args).await,
    }
}

fn cluster(config: &ConnectionConfig) -> Result<PostgresCluster> {
    info!("Using cluster {}:{} (initial database {})", config.host, config.port, config.initial_database);
    PostgresCluster::new(config).context("invalid connection settings")
}

async fn setup(connection: &ConnectionArgs, args: &SetupArgs) -> Result<()> {
    let provisioner = Provisioner::new(Arc::new(cluster(&connection.to_config())?), TenantDirectory::default());
    let report = provisioner.setup(&args.to_config()).await.context("setup failed")?;
    info!(
        "Setup complete: {} database(s) created, {} already present, {} table(s) ensured",
        report.created.len(),
        report.skipped.len(),
        report.resources
    );
    Ok(())
}

async fn cleanup(connection: &ConnectionArgs, args: &CleanupArgs) -> Result<()> {
    let provisioner = Provisioner::new(Arc::new(cluster(&connection.to_config())?), TenantDirectory::default());
    let report = if args.probe {
        provisioner.cleanup_probe().await
    } else {
        provisioner.cleanup().await
    }
    .context("cleanup failed")?;

    info!("Cleanup dropped {} database(s)", report.dropped.len());
    if !report.is_complete() {
        for (tenant, reason) in &report.failed {
            error!("Could not drop {}: {}", tenant, reason);
        }
        bail!("{} database(s) could not be dropped", report.failed.len());
    }
    Ok(())
}

async fn execute(connection: &ConnectionArgs, args: &ExecuteArgs) -> Result<()> {
    let stats_config = StatsConfig { report_interval_secs: args.stats_interval, ..StatsConfig::default() };
    ConfigValidator::validate_stats(&stats_config)?;

    let config = connection.to_config();
    let cluster = cluster(&config)?;
    let context = WorkloadContext::discover(&cluster, TenantDirectory::default())
        .await
        .context("could not read the tenant topology")?;
    let profile = args.workload.profile()?;

    let sink = StatsSink::spawn(stats_config.queue_capacity);
    let backend = Arc::new(PgBackend::new(config));
    let engine = ExecutionEngine::new(context, backend, profile, sink.clone());

    let abort = engine.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping virtual users");
            abort.abort();
        }
    });

    let summary = (stats_config.report_interval_secs > 0).then(|| {
        sink.export_continuous(SummaryLogger, Duration::from_secs(stats_config.report_interval_secs))
    });
    let history = args.csv.as_ref().map(|base| {
        sink.export_continuous(CsvExporter::new(base), Duration::from_secs(stats_config.history_interval_secs))
    });

    let outcome = engine
        .execute(args.num_users, args.spawn_rate, Duration::from_secs(args.execution_time))
        .await;

    if let Some(summary) = summary {
        summary.stop().await?;
    }
    let history = match history {
        Some(history) => Some(history.stop().await?),
        None => None,
    };
    let report = outcome.context("run failed")?;

    let snapshot = sink.snapshot();
    if let Some(mut exporter) = history {
        exporter.finish(&snapshot).context("writing CSV statistics")?;
    }
    println!("{}", format_table(&snapshot));
    info!(
        "Run finished after {:.1}s: {} users spawned ({} failed to connect), peak {} active, {} tasks ({} failed)",
        report.elapsed.as_secs_f64(),
        report.spawned,
        report.spawn_failures,
        report.peak_active,
        report.tasks_run,
        report.task_failures
    );

    if let Some(path) = &args.report {
        write_report(path, &report)?;
    }
    Ok(())
}

fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).with_context(|| format!("writing run report to {}", path.display()))?;
    info!("Run report written to {}", path.display());
    Ok(())
}
