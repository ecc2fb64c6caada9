//! Registry lifecycle tests: registration, lookup, supersession and the
//! guarded eviction that keeps a stale socket from removing its replacement.

use std::time::Duration;

use relay_service::models::{ClientClass, Identity, Purpose};
use relay_service::websocket::{
    ConnectionHandle, ConnectionKey, ConnectionRegistry, ConnectionState, PushError, ServerEvent,
};

fn messaging_key(class: ClientClass, id: &str) -> ConnectionKey {
    ConnectionKey::new(Purpose::Messaging, Identity::new(class, id))
}

fn registry() -> ConnectionRegistry {
    ConnectionRegistry::new(Duration::from_secs(60))
}

#[tokio::test]
async fn register_and_lookup_roundtrip() {
    let registry = registry();
    let key = messaging_key(ClientClass::Installers, "inst-1");

    let (handle, mut rx) = ConnectionHandle::open(key.clone());
    assert_eq!(handle.state(), ConnectionState::Connecting);

    registry.register(handle.clone()).await;
    assert_eq!(handle.state(), ConnectionState::Active);

    let found = registry
        .lookup(Purpose::Messaging, &key.identity)
        .await
        .expect("registered connection should be found");
    assert_eq!(found.id(), handle.id());

    found.push(&ServerEvent::ping()).expect("push to live connection");
    let frame = rx.recv().await.expect("frame should arrive");
    assert!(frame.contains("\"ping\""));
}

#[tokio::test]
async fn newer_socket_supersedes_without_closing_the_old_one() {
    let registry = registry();
    let key = messaging_key(ClientClass::Customers, "cust-7");

    let (old, mut old_rx) = ConnectionHandle::open(key.clone());
    registry.register(old.clone()).await;

    let (new, _new_rx) = ConnectionHandle::open(key.clone());
    registry.register(new.clone()).await;

    // Routing goes to the replacement.
    let found = registry.lookup_key(&key).await.expect("key still registered");
    assert_eq!(found.id(), new.id());

    // The superseded socket stays usable for its own replies.
    assert!(old.is_live());
    old.push(&ServerEvent::ping()).expect("old socket still accepts pushes");
    assert!(old_rx.recv().await.is_some());
}

#[tokio::test]
async fn stale_socket_cannot_evict_its_replacement() {
    let registry = registry();
    let key = messaging_key(ClientClass::Admins, "admin-1");

    let (old, _old_rx) = ConnectionHandle::open(key.clone());
    registry.register(old.clone()).await;
    let (new, _new_rx) = ConnectionHandle::open(key.clone());
    registry.register(new.clone()).await;

    // The old socket disconnects and tries to clean up after itself.
    assert!(!registry.evict_if(&key, old.id()).await);
    assert!(registry.lookup_key(&key).await.is_some());

    // The owner can.
    assert!(registry.evict_if(&key, new.id()).await);
    assert!(registry.lookup_key(&key).await.is_none());
    assert_eq!(new.state(), ConnectionState::Evicted);
}

#[tokio::test]
async fn eviction_is_terminal_for_pushes() {
    let registry = registry();
    let key = messaging_key(ClientClass::Installers, "inst-9");

    let (handle, _rx) = ConnectionHandle::open(key.clone());
    registry.register(handle.clone()).await;

    let evicted = registry.evict(&key).await.expect("entry existed");
    assert_eq!(evicted.id(), handle.id());
    assert_eq!(handle.state(), ConnectionState::Evicted);

    match handle.push(&ServerEvent::ping()) {
        Err(PushError::Closed) => {}
        other => panic!("expected Closed, got {other:?}"),
    }
}

#[tokio::test]
async fn snapshot_filters_by_purpose_class_and_liveness() {
    let registry = registry();

    let (inst, _rx1) = ConnectionHandle::open(messaging_key(ClientClass::Installers, "i1"));
    registry.register(inst.clone()).await;
    let (cust, _rx2) = ConnectionHandle::open(messaging_key(ClientClass::Customers, "c1"));
    registry.register(cust.clone()).await;
    let (notif, _rx3) = ConnectionHandle::open(ConnectionKey::new(
        Purpose::Notifications,
        Identity::new(ClientClass::Installers, "i1"),
    ));
    registry.register(notif).await;

    let live = registry.snapshot(Purpose::Messaging, ClientClass::Installers).await;
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id(), inst.id());

    cust.set_state(ConnectionState::Closed);
    let none_left = registry.snapshot(Purpose::Messaging, ClientClass::Customers).await;
    assert!(none_left.is_empty());
}

#[tokio::test]
async fn active_users_groups_and_sorts_ids() {
    let registry = registry();
    for id in ["b-2", "a-1"] {
        let (handle, _rx) = ConnectionHandle::open(messaging_key(ClientClass::Customers, id));
        registry.register(handle).await;
    }
    let (admin, _rx) = ConnectionHandle::open(ConnectionKey::new(
        Purpose::Notifications,
        Identity::new(ClientClass::Admins, "root"),
    ));
    registry.register(admin).await;

    let all = registry.active_users(None, None).await;
    assert_eq!(
        all.get("messaging:customers"),
        Some(&vec!["a-1".to_string(), "b-2".to_string()])
    );
    assert_eq!(all.get("notifications:admins"), Some(&vec!["root".to_string()]));

    let only_messaging = registry.active_users(Some(Purpose::Messaging), None).await;
    assert!(only_messaging.contains_key("messaging:customers"));
    assert!(!only_messaging.contains_key("notifications:admins"));

    let only_admins = registry.active_users(None, Some(ClientClass::Admins)).await;
    assert_eq!(only_admins.len(), 1);
}

#[tokio::test]
async fn stats_reports_all_buckets_even_when_empty() {
    let registry = registry();

    let empty = registry.stats().await;
    assert_eq!(empty.total_connections, 0);
    assert_eq!(empty.by_purpose.get("messaging"), Some(&0));
    assert_eq!(empty.by_purpose.get("notifications"), Some(&0));
    assert_eq!(empty.by_client_class.len(), 3);

    let (handle, _rx) = ConnectionHandle::open(messaging_key(ClientClass::Installers, "i1"));
    registry.register(handle).await;

    let stats = registry.stats().await;
    assert_eq!(stats.total_connections, 1);
    assert_eq!(stats.by_purpose.get("messaging"), Some(&1));
    assert_eq!(stats.by_client_class.get("installers"), Some(&1));
    assert_eq!(stats.active_heartbeats, 1);
}
