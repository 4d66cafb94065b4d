//! Virtual user behaviour against the in-memory cluster

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tenantload_core::{Error, ThinkTime, UserId};
use tenantload_harness::test_utils::MockCluster;
use tenantload_harness::user::{
    InsertRow, Noop, PopulationTracker, ReadRow, SwitchTenant, TaskAction, TaskDescriptor, TaskTable,
    UserSession, UserState, VirtualUser, WorkloadProfile, CONNECT,
};
use tenantload_harness::{OperationTimer, StatsSink, TenantDirectory, WorkloadContext};
use tokio::sync::watch;

async fn session(cluster: &MockCluster, sink: &StatsSink, seed: u64) -> UserSession {
    let context = WorkloadContext::discover(cluster, TenantDirectory::default()).await.unwrap();
    UserSession::new(
        UserId(1),
        context,
        Arc::new(cluster.clone()),
        OperationTimer::new(sink.clone()),
        CONNECT,
        Arc::new(PopulationTracker::new()),
        StdRng::seed_from_u64(seed),
    )
}

#[test]
fn test_weights_converge_to_share_of_total() {
    let table = TaskTable::new(vec![
        TaskDescriptor::new("insert", 40, Noop),
        TaskDescriptor::new("read", 60, Noop),
        TaskDescriptor::new("switch", 1, Noop),
    ])
    .unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    let draws = 202_000;
    let mut counts = [0u64; 3];
    for _ in 0..draws {
        match table.choose(&mut rng).name.as_ref() {
            "insert" => counts[0] += 1,
            "read" => counts[1] += 1,
            _ => counts[2] += 1,
        }
    }

    for (count, weight) in counts.iter().zip([40.0, 60.0, 1.0]) {
        let observed = *count as f64 / draws as f64;
        let expected = weight / 101.0;
        assert!((observed - expected).abs() < 0.005, "observed {observed}, expected {expected}");
    }
}

#[tokio::test]
async fn test_switch_with_single_tenant_keeps_connection() {
    let cluster = MockCluster::with_topology(1, 3);
    let sink = StatsSink::spawn(64);
    let mut session = session(&cluster, &sink, 1).await;

    session.connect_random().await.unwrap();
    let first = session.connection_id().unwrap();
    for _ in 0..10 {
        SwitchTenant.run(&mut session).await.unwrap();
    }

    assert_eq!(session.connection_id(), Some(first));
    assert_eq!(cluster.connects(), 1);
    session.release().await;
    assert_eq!(cluster.open_connections(), 0);
}

#[tokio::test]
async fn test_switch_releases_before_reconnecting() {
    let cluster = MockCluster::with_topology(5, 1);
    let sink = StatsSink::spawn(1_024);
    let mut session = session(&cluster, &sink, 7).await;

    session.connect_random().await.unwrap();
    let mut ids = vec![session.connection_id().unwrap()];
    for _ in 0..50 {
        SwitchTenant.run(&mut session).await.unwrap();
        ids.push(session.connection_id().unwrap());
        assert_eq!(cluster.open_connections(), 1);
    }
    session.release().await;

    ids.dedup();
    assert_eq!(ids.len(), 51);
    assert_eq!(cluster.peak_open_connections(), 1);
    assert_eq!(cluster.open_connections(), 0);

    sink.flush().await;
    assert_eq!(sink.snapshot().entry("connect", "connect").unwrap().count, 51);
}

#[tokio::test]
async fn test_failed_switch_leaves_user_disconnected() {
    let cluster = MockCluster::with_topology(3, 2);
    let sink = StatsSink::spawn(64);
    let mut session = session(&cluster, &sink, 3).await;
    session.connect_random().await.unwrap();

    cluster.set_fail_connects(true);
    let err = SwitchTenant.run(&mut session).await.unwrap_err();
    assert!(matches!(err, Error::Connection { .. }));
    assert!(!session.is_connected());
    assert_eq!(cluster.open_connections(), 0);

    assert_eq!(ReadRow.run(&mut session).await.unwrap_err(), Error::NotConnected);
    assert_eq!(InsertRow.run(&mut session).await.unwrap_err(), Error::NotConnected);

    cluster.set_fail_connects(false);
    SwitchTenant.run(&mut session).await.unwrap();
    assert!(session.is_connected());
    session.release().await;

    sink.flush().await;
    let snapshot = sink.snapshot();
    let connects = snapshot.entry("connect", "connect").unwrap();
    assert_eq!(connects.count, 3);
    assert_eq!(connects.failures, 1);
    // Fail-fast tasks are not timed.
    assert!(snapshot.entry("select", "read_row").is_none());
}

#[tokio::test]
async fn test_tasks_record_their_operations() {
    let cluster = MockCluster::with_topology(2, 4);
    let sink = StatsSink::spawn(64);
    let mut session = session(&cluster, &sink, 11).await;
    session.connect_random().await.unwrap();

    ReadRow.run(&mut session).await.unwrap();
    InsertRow.run(&mut session).await.unwrap();
    InsertRow.run(&mut session).await.unwrap();
    session.release().await;

    sink.flush().await;
    let snapshot = sink.snapshot();
    assert_eq!(snapshot.entry("select", "read_row").unwrap().count, 1);
    let inserts = snapshot.entry("insert", "insert_row").unwrap();
    assert_eq!(inserts.count, 2);
    assert_eq!(inserts.total_response_size, 2);
    assert_eq!(cluster.statements(), 3);
}

#[tokio::test]
async fn test_query_failures_are_counted_and_loop_continues() {
    let cluster = MockCluster::with_topology(1, 1);
    cluster.set_fail_queries(true);
    let sink = StatsSink::spawn(1_024);
    let context = WorkloadContext::discover(&cluster, TenantDirectory::default()).await.unwrap();
    let tracker = Arc::new(PopulationTracker::new());
    let profile = WorkloadProfile::new(
        "reads",
        TaskTable::new(vec![TaskDescriptor::new("read_row", 1, ReadRow)]).unwrap(),
        ThinkTime::constant(Duration::from_millis(5)),
    );
    let user = VirtualUser::new(
        UserId(1),
        context,
        Arc::new(cluster.clone()),
        &profile,
        &OperationTimer::new(sink.clone()),
        Arc::clone(&tracker),
        StdRng::seed_from_u64(5),
    );

    let (stop, shutdown) = watch::channel(false);
    let handle = tokio::spawn(user.run(shutdown));
    tokio::time::sleep(Duration::from_millis(100)).await;
    stop.send(true).unwrap();
    let summary = handle.await.unwrap().unwrap();

    assert!(summary.tasks_run > 1);
    assert_eq!(summary.task_failures, summary.tasks_run);
    assert_eq!(tracker.task_failures(), summary.tasks_run);
    assert_eq!(tracker.count(UserState::Stopped), 1);
    assert_eq!(cluster.open_connections(), 0);
}

#[tokio::test]
async fn test_user_that_cannot_connect_stops() {
    let cluster = MockCluster::with_topology(2, 2);
    cluster.set_fail_connects(true);
    let sink = StatsSink::spawn(64);
    let context = WorkloadContext::discover(&cluster, TenantDirectory::default()).await.unwrap();
    let tracker = Arc::new(PopulationTracker::new());
    let profile = WorkloadProfile::new(
        "idle",
        TaskTable::new(vec![TaskDescriptor::new("noop", 1, Noop)]).unwrap(),
        ThinkTime::none(),
    );
    let user = VirtualUser::new(
        UserId(9),
        context,
        Arc::new(cluster.clone()),
        &profile,
        &OperationTimer::new(sink),
        Arc::clone(&tracker),
        StdRng::seed_from_u64(9),
    );
    assert_eq!(user.state(), UserState::Stopped);
    assert!(user.connection_id().is_none());

    let (_stop, shutdown) = watch::channel(false);
    let err = user.run(shutdown).await.unwrap_err();
    assert!(matches!(err, Error::Connection { .. }));
    assert_eq!(tracker.count(UserState::Stopped), 1);
    assert_eq!(tracker.peak_active(), 0);
}

#[tokio::test]
async fn test_cancellation_interrupts_think_time() {
    let cluster = MockCluster::with_topology(1, 1);
    let sink = StatsSink::spawn(64);
    let context = WorkloadContext::discover(&cluster, TenantDirectory::default()).await.unwrap();
    let profile = WorkloadProfile::new(
        "slow",
        TaskTable::new(vec![TaskDescriptor::new("noop", 1, Noop)]).unwrap(),
        ThinkTime::constant(Duration::from_secs(3_600)),
    );
    let user = VirtualUser::new(
        UserId(2),
        context,
        Arc::new(cluster.clone()),
        &profile,
        &OperationTimer::new(sink),
        Arc::new(PopulationTracker::new()),
        StdRng::seed_from_u64(2),
    );

    let (stop, shutdown) = watch::channel(false);
    let handle = tokio::spawn(user.run(shutdown));
    tokio::time::sleep(Duration::from_millis(50)).await;
    stop.send(true).unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap().unwrap();
    assert_eq!(summary.tasks_run, 1);
    assert_eq!(cluster.open_connections(), 0);
}
