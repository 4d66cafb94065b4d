//! Execution engine runs against the in-memory cluster

use std::sync::Arc;
use std::time::Duration;
use tenantload_core::{Error, ThinkTime};
use tenantload_harness::test_utils::MockCluster;
use tenantload_harness::user::{Noop, ReadRow, SwitchTenant, TaskDescriptor, TaskTable};
use tenantload_harness::{
    ExecutionEngine, StatsSink, TenantDirectory, UserState, Workload, WorkloadContext, WorkloadProfile,
};

async fn engine(cluster: &MockCluster, profile: WorkloadProfile) -> (ExecutionEngine, StatsSink) {
    let context = WorkloadContext::discover(cluster, TenantDirectory::default()).await.unwrap();
    let sink = StatsSink::spawn(1 << 20);
    let engine = ExecutionEngine::new(context, Arc::new(cluster.clone()), profile, sink.clone()).with_seed(17);
    (engine, sink)
}

fn quick_profile() -> WorkloadProfile {
    WorkloadProfile::new(
        "quick",
        TaskTable::new(vec![
            TaskDescriptor::new("read_row", 20, ReadRow),
            TaskDescriptor::new("switch_tenant", 1, SwitchTenant),
        ])
        .unwrap(),
        ThinkTime::between(Duration::from_millis(100), Duration::from_millis(300)),
    )
}

#[tokio::test]
async fn test_empty_population_waits_out_the_duration() {
    let cluster = MockCluster::with_topology(2, 2);
    let (engine, sink) = engine(&cluster, Workload::Simple.profile().unwrap()).await;

    let report = engine.execute(0, 5.0, Duration::from_millis(300)).await.unwrap();

    assert_eq!(report.spawned, 0);
    assert!(report.elapsed >= Duration::from_millis(300));
    assert!(report.elapsed < Duration::from_secs(2));
    assert_eq!(sink.snapshot().total_count(), 0);
    assert_eq!(cluster.connects(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_full_ramp_and_clean_shutdown() {
    let cluster = MockCluster::with_topology(4, 8);
    let (engine, sink) = engine(&cluster, quick_profile()).await;
    let population = engine.population();

    let probe = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        population.active()
    });

    let report = engine.execute(100, 100.0, Duration::from_secs(5)).await.unwrap();
    let active_after_ramp = probe.await.unwrap();

    assert_eq!(active_after_ramp, 100);
    assert_eq!(report.spawned, 100);
    assert_eq!(report.spawn_failures, 0);
    assert_eq!(report.peak_active, 100);
    assert_eq!(report.stopped, 100);
    assert!(report.elapsed >= Duration::from_secs(5));
    assert!(report.elapsed < Duration::from_secs(6));

    let population = engine.population();
    assert_eq!(population.active(), 0);
    assert_eq!(population.count(UserState::Stopped), 100);
    assert_eq!(cluster.open_connections(), 0);

    let snapshot = sink.snapshot();
    assert_eq!(snapshot.entry("connect", "connect").unwrap().failures, 0);
    assert!(snapshot.entry("select", "read_row").unwrap().count > 100);
    assert_eq!(snapshot.dropped_events, 0);
    assert_eq!(snapshot.entry("connect", "connect").unwrap().count, cluster.connects());
    assert_eq!(snapshot.total.count, snapshot.entries.iter().map(|e| e.count).sum::<u64>());
}

#[tokio::test]
async fn test_invalid_topology_spawns_nothing() {
    let cluster = MockCluster::with_topology(0, 0);
    let (engine, _sink) = engine(&cluster, quick_profile()).await;

    let err = engine.execute(10, 10.0, Duration::from_secs(1)).await.unwrap_err();
    assert_eq!(err, Error::InvalidTopology { tenants: 0, resources: 0 });
    assert_eq!(cluster.connects(), 0);
}

#[tokio::test]
async fn test_tenants_without_resources_rejected() {
    let cluster = MockCluster::with_topology(3, 0);
    let (engine, _sink) = engine(&cluster, quick_profile()).await;

    let err = engine.execute(1, 1.0, Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTopology { tenants: 3, resources: 0 }));
}

#[tokio::test]
async fn test_zero_spawn_rate_rejected() {
    let cluster = MockCluster::with_topology(1, 1);
    let (engine, _sink) = engine(&cluster, quick_profile()).await;

    let err = engine.execute(5, 0.0, Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    assert_eq!(cluster.connects(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_abort_stops_run_early() {
    let cluster = MockCluster::with_topology(2, 2);
    let (engine, _sink) = engine(&cluster, quick_profile()).await;
    let abort = engine.abort_handle();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        abort.abort();
    });

    let report = engine.execute(10, 100.0, Duration::from_secs(600)).await.unwrap();
    assert!(report.elapsed < Duration::from_secs(2));
    assert_eq!(report.spawned, 10);
    assert_eq!(report.stopped, 10);
    assert_eq!(cluster.open_connections(), 0);
}

#[tokio::test]
async fn test_abort_before_execute_returns_immediately() {
    let cluster = MockCluster::with_topology(2, 2);
    let (engine, _sink) = engine(&cluster, quick_profile()).await;
    let abort = engine.abort_handle();
    abort.abort();
    assert!(abort.is_aborted());

    let report = engine.execute(10, 10.0, Duration::from_secs(600)).await.unwrap();
    assert_eq!(report.spawned, 0);
    assert!(report.elapsed < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_spawn_failures_are_counted() {
    let cluster = MockCluster::with_topology(2, 2);
    cluster.set_fail_connects(true);
    let (engine, sink) = engine(&cluster, quick_profile()).await;

    let report = engine.execute(5, 50.0, Duration::from_secs(1)).await.unwrap();

    assert_eq!(report.spawned, 5);
    assert_eq!(report.spawn_failures, 5);
    assert_eq!(report.peak_active, 0);
    assert_eq!(report.stopped, 5);
    let connects = sink.snapshot();
    let connects = connects.entry("connect", "connect").unwrap();
    assert_eq!(connects.count, 5);
    assert_eq!(connects.failures, 5);
}

#[tokio::test(start_paused = true)]
async fn test_idle_workload_holds_one_connection_per_user() {
    let cluster = MockCluster::with_topology(3, 1);
    let (engine, sink) = engine(&cluster, Workload::IdleConnections.profile().unwrap()).await;

    let report = engine.execute(20, 20.0, Duration::from_secs(3)).await.unwrap();

    assert_eq!(report.spawned, 20);
    assert_eq!(cluster.peak_open_connections(), 20);
    assert_eq!(cluster.connects(), 20);
    assert_eq!(cluster.open_connections(), 0);
    assert_eq!(cluster.statements(), 0);
    let snapshot = sink.snapshot();
    assert_eq!(snapshot.entry("idle_connection", "connect").unwrap().count, 20);
    assert!(snapshot.entry("connect", "connect").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_noop_only_users_never_touch_the_database() {
    let cluster = MockCluster::with_topology(1, 1);
    let profile = WorkloadProfile::new(
        "noop",
        TaskTable::new(vec![TaskDescriptor::new("noop", 1, Noop)]).unwrap(),
        ThinkTime::constant(Duration::from_millis(10)),
    );
    let (engine, _sink) = engine(&cluster, profile).await;

    let report = engine.execute(3, 10.0, Duration::from_secs(1)).await.unwrap();
    assert!(report.tasks_run > 3);
    assert_eq!(report.task_failures, 0);
    assert_eq!(cluster.statements(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_engine_runs_only_once() {
    let cluster = MockCluster::with_topology(2, 2);
    let (engine, _sink) = engine(&cluster, quick_profile()).await;

    let first = engine.execute(5, 50.0, Duration::from_secs(1)).await.unwrap();
    assert_eq!(first.spawned, 5);
    assert_eq!(first.stopped, 5);
    let connects = cluster.connects();

    let err = engine.execute(5, 50.0, Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    assert_eq!(cluster.connects(), connects);
    assert_eq!(engine.population().count(UserState::Stopped), 5);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_configuration_leaves_engine_usable() {
    let cluster = MockCluster::with_topology(2, 2);
    let (engine, _sink) = engine(&cluster, quick_profile()).await;

    assert!(engine.execute(5, 0.0, Duration::from_secs(1)).await.is_err());
    let report = engine.execute(5, 50.0, Duration::from_secs(1)).await.unwrap();
    assert_eq!(report.spawned, 5);
    assert_eq!(report.stopped, 5);
}

#[tokio::test(start_paused = true)]
async fn test_switching_users_hold_at_most_one_connection_each() {
    let cluster = MockCluster::with_topology(5, 1);
    let profile = WorkloadProfile::new(
        "switch_only",
        TaskTable::new(vec![TaskDescriptor::new("switch_tenant", 1, SwitchTenant)]).unwrap(),
        ThinkTime::constant(Duration::from_millis(5)),
    );
    let (engine, _sink) = engine(&cluster, profile).await;

    let report = engine.execute(8, 100.0, Duration::from_secs(2)).await.unwrap();

    assert_eq!(report.spawned, 8);
    assert!(cluster.connects() > 8);
    assert!(cluster.peak_open_connections() <= 8);
    assert_eq!(cluster.open_connections(), 0);
}
