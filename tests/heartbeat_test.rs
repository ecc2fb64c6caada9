//! Heartbeat tests. Run under paused time so a 60s ping interval costs
//! nothing; tokio advances the clock whenever every task is parked on it.

use std::time::Duration;

use relay_service::models::{ClientClass, Identity, Purpose};
use relay_service::websocket::{ConnectionHandle, ConnectionKey, ConnectionRegistry};

const INTERVAL: Duration = Duration::from_secs(60);

fn key(id: &str) -> ConnectionKey {
    ConnectionKey::new(
        Purpose::Notifications,
        Identity::new(ClientClass::Customers, id),
    )
}

#[tokio::test(start_paused = true)]
async fn ping_arrives_once_per_interval() {
    let registry = ConnectionRegistry::new(INTERVAL);
    let (handle, mut rx) = ConnectionHandle::open(key("u1"));
    registry.register(handle).await;

    let frame = tokio::time::timeout(INTERVAL + Duration::from_secs(1), rx.recv())
        .await
        .expect("ping should arrive within one interval")
        .expect("channel should stay open");
    let parsed: serde_json::Value = serde_json::from_str(&frame).expect("ping is JSON");
    assert_eq!(parsed["type"], "ping");
    assert!(parsed["timestamp"].is_string());

    let second = tokio::time::timeout(INTERVAL + Duration::from_secs(1), rx.recv())
        .await
        .expect("second ping should follow")
        .expect("channel should stay open");
    assert!(second.contains("\"ping\""));
}

#[tokio::test(start_paused = true)]
async fn failed_ping_evicts_the_connection() {
    let registry = ConnectionRegistry::new(INTERVAL);
    let (handle, rx) = ConnectionHandle::open(key("u2"));
    registry.register(handle.clone()).await;

    // Transport gone: the next ping cannot be delivered.
    drop(rx);

    tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
    tokio::task::yield_now().await;

    assert!(registry.lookup_key(handle.key()).await.is_none());
    assert!(!handle.is_live());
}

#[tokio::test(start_paused = true)]
async fn superseded_connection_stops_receiving_pings() {
    let registry = ConnectionRegistry::new(INTERVAL);
    let (old, mut old_rx) = ConnectionHandle::open(key("u3"));
    registry.register(old).await;
    let (new, mut new_rx) = ConnectionHandle::open(key("u3"));
    registry.register(new).await;

    tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
    tokio::task::yield_now().await;

    assert!(
        new_rx.try_recv().is_ok(),
        "replacement should be pinged on schedule"
    );
    assert!(
        old_rx.try_recv().is_err(),
        "superseded socket should no longer be pinged"
    );

    let stats = registry.stats().await;
    assert_eq!(stats.total_connections, 1);
    assert_eq!(stats.active_heartbeats, 1);
}

#[tokio::test(start_paused = true)]
async fn eviction_stops_the_heartbeat() {
    let registry = ConnectionRegistry::new(INTERVAL);
    let (handle, mut rx) = ConnectionHandle::open(key("u4"));
    registry.register(handle.clone()).await;

    registry.evict(handle.key()).await;
    tokio::time::sleep(INTERVAL * 2).await;
    tokio::task::yield_now().await;

    assert!(rx.try_recv().is_err(), "no pings after eviction");
    assert_eq!(registry.stats().await.active_heartbeats, 0);
}
