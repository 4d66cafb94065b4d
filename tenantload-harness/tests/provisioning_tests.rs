//! Topology setup and cleanup

use std::sync::Arc;
use tenantload_core::{Error, ProvisionConfig, TenantId};
use tenantload_harness::test_utils::MockCluster;
use tenantload_harness::{Provisioner, TenantDirectory, TopologySource};

fn provisioner(cluster: &MockCluster) -> Provisioner {
    Provisioner::new(Arc::new(cluster.clone()), TenantDirectory::default())
}

fn names(ids: &[u64]) -> Vec<String> {
    ids.iter().map(|id| format!("md_scalability_db_{id}")).collect()
}

#[tokio::test]
async fn test_setup_creates_topology() {
    let cluster = MockCluster::new();
    let config = ProvisionConfig { num_tenants: 3, num_resources: 4, colocated: true };

    let report = provisioner(&cluster).setup(&config).await.unwrap();

    assert_eq!(report.created, names(&[1, 2, 3]));
    assert!(report.skipped.is_empty());
    assert_eq!(report.resources, 12);
    assert_eq!(cluster.tenants().len(), 3);
    assert_eq!(
        cluster.resources("md_scalability_db_2"),
        vec![
            "md_scalability_table_1",
            "md_scalability_table_2",
            "md_scalability_table_3",
            "md_scalability_table_4"
        ]
    );

    let directory = TenantDirectory::default();
    assert_eq!(cluster.tenant_count(&directory).await.unwrap(), 3);
    assert_eq!(cluster.resource_count(&directory, TenantId::new(1)).await.unwrap(), 4);
}

#[tokio::test]
async fn test_setup_is_idempotent() {
    let cluster = MockCluster::with_topology(2, 2);
    let config = ProvisionConfig { num_tenants: 3, num_resources: 2, colocated: false };

    let report = provisioner(&cluster).setup(&config).await.unwrap();
    assert_eq!(report.skipped, names(&[1, 2]));
    assert_eq!(report.created, names(&[3]));

    let again = provisioner(&cluster).setup(&config).await.unwrap();
    assert_eq!(again.skipped, names(&[1, 2, 3]));
    assert!(again.created.is_empty());
    assert_eq!(cluster.resources("md_scalability_db_1").len(), 2);
}

#[tokio::test]
async fn test_setup_rejects_empty_topology() {
    let cluster = MockCluster::new();
    let config = ProvisionConfig { num_tenants: 0, num_resources: 1, colocated: true };
    let err = provisioner(&cluster).setup(&config).await.unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    assert!(cluster.tenants().is_empty());
}

#[tokio::test]
async fn test_setup_failure_names_the_step() {
    let cluster = MockCluster::new();
    cluster.set_catalog_available(false);
    let config = ProvisionConfig { num_tenants: 1, num_resources: 1, colocated: true };
    let err = provisioner(&cluster).setup(&config).await.unwrap_err();
    match err {
        Error::Provisioning { message } => assert!(message.starts_with("checking database md_scalability_db_1")),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_probe_cleanup_stops_at_first_failure() {
    let cluster = MockCluster::with_topology(5, 1);
    cluster.set_undroppable(TenantId::new(3));

    let report = provisioner(&cluster).cleanup_probe().await.unwrap();

    assert_eq!(report.dropped, names(&[1, 2]));
    assert!(report.failed.is_empty());
    assert_eq!(cluster.tenants(), names(&[3, 4, 5]));
}

#[tokio::test]
async fn test_catalog_cleanup_continues_past_failures() {
    let cluster = MockCluster::with_topology(5, 1);
    cluster.set_undroppable(TenantId::new(3));

    let report = provisioner(&cluster).cleanup().await.unwrap();

    assert_eq!(report.dropped, names(&[1, 2, 4, 5]));
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "md_scalability_db_3");
    assert!(!report.is_complete());
    assert_eq!(cluster.tenants(), names(&[3]));
}

#[tokio::test]
async fn test_catalog_cleanup_drops_in_numeric_order() {
    let cluster = MockCluster::with_topology(12, 1);
    cluster.set_undroppable(TenantId::new(4));

    let report = provisioner(&cluster).cleanup().await.unwrap();

    let mut expected = names(&(1..=12).collect::<Vec<_>>());
    expected.retain(|name| name != "md_scalability_db_4");
    assert_eq!(report.dropped, expected);
    assert_eq!(cluster.tenants(), names(&[4]));
}

#[tokio::test]
async fn test_cleanup_requires_catalog() {
    let cluster = MockCluster::with_topology(2, 1);
    cluster.set_catalog_available(false);
    let err = provisioner(&cluster).cleanup().await.unwrap_err();
    assert!(matches!(err, Error::Provisioning { .. }));
    assert_eq!(cluster.tenants().len(), 2);
}
