//! Connection caching and failure propagation.

mod common;

use common::{arp_config, driver, session_config, FakeHypervisor, FakeNeighbors};
use std::sync::Arc;
use virtlane_core::{ConnectionManager, CoreError, MachineId};

#[tokio::test]
async fn test_primary_connection_is_cached() {
    let hv = FakeHypervisor::new();
    let manager = ConnectionManager::new(Arc::new(hv.clone()), &arp_config());

    let first = manager.connection().await.unwrap();
    let second = manager.connection().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(hv.connects(), 1);
}

#[tokio::test]
async fn test_read_only_connection_is_a_separate_slot() {
    let hv = FakeHypervisor::new();
    let manager = ConnectionManager::new(Arc::new(hv.clone()), &session_config());

    let primary = manager.connection().await.unwrap();
    let read_only = manager.read_only_connection().await.unwrap();
    let again = manager.read_only_connection().await.unwrap();

    assert!(!Arc::ptr_eq(&primary, &read_only));
    assert!(Arc::ptr_eq(&read_only, &again));
    assert_eq!(primary.uri(), "qemu:///session");
    assert_eq!(read_only.uri(), "qemu:///system");
    assert_eq!(hv.connects(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_use_connects_once() {
    let hv = FakeHypervisor::new();
    let manager = Arc::new(ConnectionManager::new(Arc::new(hv.clone()), &arp_config()));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.connection().await.map(|_| ()) })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(hv.connects(), 1);
}

#[tokio::test]
async fn test_failed_connect_is_reported_and_not_cached() {
    let hv = FakeHypervisor::new();
    hv.state().connect_failure = true;
    let manager = ConnectionManager::new(Arc::new(hv.clone()), &arp_config());

    let err = manager.connection().await.err().unwrap();
    assert!(
        matches!(err, CoreError::Connection { ref uri, .. } if uri == "qemu:///system"),
        "got {err:?}"
    );

    hv.state().connect_failure = false;
    manager.connection().await.unwrap();
    assert_eq!(hv.connects(), 1);
}

#[tokio::test]
async fn test_state_propagates_connection_failure() {
    let hv = FakeHypervisor::new();
    hv.state().connect_failure = true;
    let driver = driver(arp_config(), &hv, Arc::new(FakeNeighbors::default()));

    let err = driver.state(&MachineId::from("vm-1")).await.unwrap_err();
    assert!(matches!(err, CoreError::Connection { .. }), "got {err:?}");
}
