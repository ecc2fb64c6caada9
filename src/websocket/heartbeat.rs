//! Server-side keepalive. Each registered connection gets one task that
//! pushes a JSON ping every interval and evicts the entry when the push
//! fails. Dead sockets are discovered here, not by the OS.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

use crate::metrics::HEARTBEAT_FAILURES;
use crate::websocket::{ConnectionKey, ConnectionRegistry, ConnectionState, ServerEvent};

pub fn spawn_heartbeat(
    registry: ConnectionRegistry,
    key: ConnectionKey,
    connection_id: Uuid,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;

            let Some(handle) = registry.lookup_key(&key).await else {
                break;
            };
            if handle.id() != connection_id {
                // Superseded between ticks. The replacement has its own task.
                break;
            }
            if !handle.is_live() {
                registry.evict_if(&key, connection_id).await;
                break;
            }

            if handle.push(&ServerEvent::ping()).is_err() {
                HEARTBEAT_FAILURES.inc();
                handle.set_state(ConnectionState::PingFailed);
                warn!(
                    key = %key,
                    connection_id = %connection_id,
                    "heartbeat ping failed, evicting connection"
                );
                registry.evict_if(&key, connection_id).await;
                break;
            }
        }
    })
}
