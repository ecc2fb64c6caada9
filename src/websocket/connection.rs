use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::models::{Identity, Purpose};
use crate::websocket::events::ServerEvent;

/// Registry key: one live connection per (purpose, identity).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub purpose: Purpose,
    pub identity: Identity,
}

impl ConnectionKey {
    pub fn new(purpose: Purpose, identity: Identity) -> Self {
        Self { purpose, identity }
    }
}

impl std::fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.purpose.as_str(), self.identity)
    }
}

/// Lifecycle of a single connection. Only `Connecting` and `Active` accept
/// pushes; the terminal state is always `Evicted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Active = 1,
    PingFailed = 2,
    Closed = 3,
    IdleTimeout = 4,
    Evicted = 5,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Active,
            2 => ConnectionState::PingFailed,
            3 => ConnectionState::Closed,
            4 => ConnectionState::IdleTimeout,
            _ => ConnectionState::Evicted,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Active => "active",
            ConnectionState::PingFailed => "ping_failed",
            ConnectionState::Closed => "closed",
            ConnectionState::IdleTimeout => "idle_timeout",
            ConnectionState::Evicted => "evicted",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("connection is closed")]
    Closed,
    #[error("failed to encode frame: {0}")]
    Encode(String),
}

struct ConnectionInner {
    id: Uuid,
    key: ConnectionKey,
    tx: UnboundedSender<String>,
    connected_at: DateTime<Utc>,
    last_activity_ms: AtomicI64,
    messages_pushed: AtomicU64,
    state: AtomicU8,
}

/// Cheap-to-clone handle to one live connection. Frames pushed here travel a
/// per-connection FIFO channel into the transport actor, so push order is
/// delivery order.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<ConnectionInner>,
}

impl ConnectionHandle {
    /// Creates the handle and the receiver end its transport actor drains.
    pub fn open(key: ConnectionKey) -> (Self, UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            inner: Arc::new(ConnectionInner {
                id: Uuid::new_v4(),
                key,
                tx,
                connected_at: Utc::now(),
                last_activity_ms: AtomicI64::new(Utc::now().timestamp_millis()),
                messages_pushed: AtomicU64::new(0),
                state: AtomicU8::new(ConnectionState::Connecting as u8),
            }),
        };
        (handle, rx)
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.inner.key
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.inner.connected_at
    }

    pub fn last_activity_ms(&self) -> i64 {
        self.inner.last_activity_ms.load(Ordering::Relaxed)
    }

    pub fn messages_pushed(&self) -> u64 {
        self.inner.messages_pushed.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.state.load(Ordering::Relaxed))
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.inner.state.store(state as u8, Ordering::Relaxed);
    }

    pub fn is_live(&self) -> bool {
        self.state().is_live()
    }

    /// Pushes a typed event. Failure means the transport is gone; the handle
    /// marks itself closed so later pushes short-circuit.
    pub fn push(&self, event: &ServerEvent) -> Result<(), PushError> {
        let text = serde_json::to_string(event).map_err(|e| PushError::Encode(e.to_string()))?;
        self.push_text(text)
    }

    /// Pushes a raw JSON value (frame replies built outside the event enum).
    pub fn push_json(&self, value: &serde_json::Value) -> Result<(), PushError> {
        let text = serde_json::to_string(value).map_err(|e| PushError::Encode(e.to_string()))?;
        self.push_text(text)
    }

    fn push_text(&self, text: String) -> Result<(), PushError> {
        if !self.is_live() {
            return Err(PushError::Closed);
        }
        self.inner.tx.send(text).map_err(|_| {
            self.set_state(ConnectionState::Closed);
            PushError::Closed
        })?;
        self.inner
            .last_activity_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        self.inner.messages_pushed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClientClass;

    fn key() -> ConnectionKey {
        ConnectionKey::new(
            Purpose::Messaging,
            Identity::new(ClientClass::Installers, "u1"),
        )
    }

    #[tokio::test]
    async fn push_delivers_in_order_and_counts() {
        let (handle, mut rx) = ConnectionHandle::open(key());
        handle.push(&ServerEvent::ping()).unwrap();
        handle
            .push_json(&serde_json::json!({ "status": "sent", "message_id": "m-1" }))
            .unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(first.contains("\"ping\""));
        assert!(second.contains("m-1"));
        assert_eq!(handle.messages_pushed(), 2);
    }

    #[tokio::test]
    async fn push_after_receiver_drop_fails_and_closes() {
        let (handle, rx) = ConnectionHandle::open(key());
        drop(rx);
        assert!(handle.push(&ServerEvent::ping()).is_err());
        assert_eq!(handle.state(), ConnectionState::Closed);
        // short-circuits once closed
        assert!(matches!(
            handle.push(&ServerEvent::ping()),
            Err(PushError::Closed)
        ));
    }

    #[test]
    fn state_machine_live_states() {
        assert!(ConnectionState::Connecting.is_live());
        assert!(ConnectionState::Active.is_live());
        assert!(!ConnectionState::PingFailed.is_live());
        assert!(!ConnectionState::Closed.is_live());
        assert!(!ConnectionState::IdleTimeout.is_live());
        assert!(!ConnectionState::Evicted.is_live());
    }

    #[test]
    fn state_round_trips_through_u8() {
        for state in [
            ConnectionState::Connecting,
            ConnectionState::Active,
            ConnectionState::PingFailed,
            ConnectionState::Closed,
            ConnectionState::IdleTimeout,
            ConnectionState::Evicted,
        ] {
            assert_eq!(ConnectionState::from_u8(state as u8), state);
        }
    }
}
