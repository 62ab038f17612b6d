//! Integration tests for persisting driver state and replaying it after a
//! restart.

use std::sync::Arc;

use noipam::{
    CreateEndpointRequest, CreateNetworkRequest, Driver, DriverConfig, Endpoint, EndpointState,
    FileStore, NetworkCreation, RecordKind, RestoreReport, Store, StoreKey, StoreRecord,
};
use noipam_common::ObjectId;
use noipam_network::{LinkBackend, LinkKind, MacAddress, MemoryLinks};
use tempfile::{TempDir, tempdir};

fn file_driver(root: &TempDir, links: &Arc<MemoryLinks>) -> (Driver, Arc<FileStore>) {
    let store = Arc::new(FileStore::new(root.path().join("store")));
    let config = DriverConfig::default().with_root(root.path());
    (Driver::new(config, links.clone(), store.clone()), store)
}

fn populate(driver: &Driver) {
    driver
        .create_network(&CreateNetworkRequest::new("net1").with_option("parent", "eth0.10"))
        .unwrap();
    driver
        .create_endpoint(&CreateEndpointRequest::new("net1", "ep1"))
        .unwrap();
    driver
        .create_endpoint(&CreateEndpointRequest::new("net1", "ep2").with_mac("02:42:ac:11:00:02"))
        .unwrap();
    driver.join("net1", "ep1").unwrap();
}

#[test_log::test]
fn restart_replays_networks_and_endpoints() {
    let root = tempdir().unwrap();
    let links = Arc::new(MemoryLinks::with_physical(["eth0"]));

    let (first, store) = file_driver(&root, &links);
    populate(&first);
    let joined = first.endpoint_info("net1", "ep1").unwrap();
    drop(first);

    assert_eq!(store.list(RecordKind::Network).unwrap().len(), 1);
    assert_eq!(store.list(RecordKind::Endpoint).unwrap().len(), 2);

    let (second, _) = file_driver(&root, &links);
    let report = second.restore().unwrap();
    assert_eq!(
        report,
        RestoreReport {
            networks: 1,
            endpoints: 2,
            orphans_removed: 0,
        }
    );

    let networks = second.networks();
    let config = &networks[0];
    assert_eq!(config.parent, "eth0.10");
    assert!(config.created_slave_link);

    let ep1 = second.endpoint_info("net1", "ep1").unwrap();
    assert_eq!(ep1, joined);
    assert_eq!(ep1.state, EndpointState::Joined);
    let ep2 = second.endpoint_info("net1", "ep2").unwrap();
    assert_eq!(ep2.mac, "02:42:ac:11:00:02");
    assert_eq!(ep2.state, EndpointState::Created);

    // The runtime replays its own create after a restart.
    let mutations = links.mutations();
    let replay = second
        .create_network(&CreateNetworkRequest::new("net1").with_option("parent", "eth0.10"))
        .unwrap();
    assert_eq!(replay, NetworkCreation::Restored);
    assert_eq!(links.mutations(), mutations);
}

#[test]
fn restore_is_idempotent() {
    let root = tempdir().unwrap();
    let links = Arc::new(MemoryLinks::with_physical(["eth0"]));
    let (driver, _) = file_driver(&root, &links);
    populate(&driver);

    assert_eq!(driver.restore().unwrap(), RestoreReport::default());
    assert_eq!(driver.networks().len(), 1);
    assert_eq!(driver.network("net1").unwrap().endpoints().len(), 2);
}

#[test]
fn restore_recreates_missing_owned_parent() {
    let root = tempdir().unwrap();
    let links = Arc::new(MemoryLinks::with_physical(["eth0"]));
    let (first, _) = file_driver(&root, &links);
    first
        .create_network(&CreateNetworkRequest::new("net1").with_option("parent", "eth0.20"))
        .unwrap();
    first.create_network(&CreateNetworkRequest::new("net2")).unwrap();
    drop(first);

    // A reboot loses every virtual link.
    links.remove_out_of_band("eth0.20");
    links.remove_out_of_band("dm-net2");

    let (second, _) = file_driver(&root, &links);
    assert_eq!(second.restore().unwrap().networks, 2);
    assert!(matches!(links.kind("eth0.20"), Some(LinkKind::Vlan { vlan_id: 20, .. })));
    assert_eq!(links.kind("dm-net2"), Some(LinkKind::Dummy));
}

#[test]
fn restore_leaves_foreign_parents_alone() {
    let root = tempdir().unwrap();
    let links = Arc::new(MemoryLinks::with_physical(["eth0", "eth1"]));
    let (first, _) = file_driver(&root, &links);
    first
        .create_network(&CreateNetworkRequest::new("net1").with_option("parent", "eth1"))
        .unwrap();
    drop(first);

    links.remove_out_of_band("eth1");
    let (second, _) = file_driver(&root, &links);
    assert_eq!(second.restore().unwrap().networks, 1);
    assert!(!links.link_exists("eth1"));
}

#[test]
fn restore_removes_orphaned_endpoints() {
    let root = tempdir().unwrap();
    let links = Arc::new(MemoryLinks::with_physical(["eth0"]));
    let (driver, store) = file_driver(&root, &links);

    let orphan = StoreRecord::Endpoint(Endpoint::new(
        ObjectId::new("ep9").unwrap(),
        ObjectId::new("gone").unwrap(),
        MacAddress::new([0x02, 0, 0, 0, 0, 9]),
    ));
    store.put(&orphan.key(), &orphan).unwrap();

    let report = driver.restore().unwrap();
    assert_eq!(report.orphans_removed, 1);
    assert_eq!(store.get(&StoreKey::endpoint("gone", "ep9")).unwrap(), None);
}

#[test]
fn restore_skips_unreadable_and_conflicting_records() {
    let root = tempdir().unwrap();
    let links = Arc::new(MemoryLinks::with_physical(["eth0"]));
    let (first, store) = file_driver(&root, &links);
    first
        .create_network(&CreateNetworkRequest::new("net1").with_option("parent", "eth0"))
        .unwrap();
    drop(first);

    // A second record claiming the same parent, and a corrupt file.
    let mut clash = match store.get(&StoreKey::network("net1")).unwrap() {
        Some(StoreRecord::Network(config)) => config,
        other => panic!("unexpected record: {other:?}"),
    };
    clash.id = ObjectId::new("net2").unwrap();
    let clash = StoreRecord::Network(clash);
    store.put(&clash.key(), &clash).unwrap();
    std::fs::write(root.path().join("store/network/broken.json"), "not json").unwrap();

    let (second, _) = file_driver(&root, &links);
    let report = second.restore().unwrap();
    assert_eq!(report.networks, 1);
    assert_eq!(second.networks()[0].id.as_str(), "net1");
}

#[test]
fn deleted_state_is_not_replayed() {
    let root = tempdir().unwrap();
    let links = Arc::new(MemoryLinks::with_physical(["eth0"]));
    let (first, _) = file_driver(&root, &links);
    populate(&first);
    first.delete_endpoint("net1", "ep2").unwrap();
    first.delete_network("net1").unwrap();
    drop(first);

    let (second, _) = file_driver(&root, &links);
    assert_eq!(second.restore().unwrap(), RestoreReport::default());
    assert!(second.networks().is_empty());
    assert_eq!(links.names(), vec!["eth0".to_string(), "lo".to_string()]);
}

#[test]
fn same_endpoint_id_in_two_networks_survives_restart() {
    let root = tempdir().unwrap();
    let links = Arc::new(MemoryLinks::with_physical(["eth0"]));
    let (first, store) = file_driver(&root, &links);
    first
        .create_network(&CreateNetworkRequest::new("net1").with_option("parent", "eth0.10"))
        .unwrap();
    first
        .create_network(&CreateNetworkRequest::new("net2").with_option("parent", "eth0.20"))
        .unwrap();
    first
        .create_endpoint(&CreateEndpointRequest::new("net1", "ep1"))
        .unwrap();
    first
        .create_endpoint(&CreateEndpointRequest::new("net2", "ep1"))
        .unwrap();
    assert_eq!(store.list(RecordKind::Endpoint).unwrap().len(), 2);

    first.delete_endpoint("net2", "ep1").unwrap();
    assert!(store.get(&StoreKey::endpoint("net1", "ep1")).unwrap().is_some());
    assert_eq!(store.get(&StoreKey::endpoint("net2", "ep1")).unwrap(), None);
    let kept = first.endpoint_info("net1", "ep1").unwrap();
    drop(first);

    let (second, _) = file_driver(&root, &links);
    let report = second.restore().unwrap();
    assert_eq!(report.networks, 2);
    assert_eq!(report.endpoints, 1);
    assert_eq!(second.endpoint_info("net1", "ep1").unwrap(), kept);
}
