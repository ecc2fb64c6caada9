//! Connection tracking for the websocket layer.
//!
//! Every accepted socket registers a [`ConnectionHandle`] under its
//! [`ConnectionKey`]. At most one handle is registered per key: a newer
//! socket for the same user and purpose replaces the older one in the
//! registry while the older socket is left open for its own replies.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::metrics::ACTIVE_CONNECTIONS;
use crate::models::{ClientClass, Identity, Purpose};

pub mod connection;
pub mod events;
pub mod frames;
pub mod heartbeat;
pub mod pubsub;
pub mod session;

pub use connection::{ConnectionHandle, ConnectionKey, ConnectionState, PushError};
pub use events::{ControlAction, ServerEvent};

struct RegistryEntry {
    handle: ConnectionHandle,
    heartbeat: JoinHandle<()>,
}

/// Snapshot of the registry for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total_connections: usize,
    pub by_purpose: BTreeMap<String, usize>,
    pub by_client_class: BTreeMap<String, usize>,
    pub active_heartbeats: usize,
}

#[derive(Clone)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<ConnectionKey, RegistryEntry>>>,
    heartbeat_interval: Duration,
}

impl ConnectionRegistry {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            heartbeat_interval,
        }
    }

    /// Registers a pre-opened handle under its key and starts its heartbeat.
    /// The handle is opened separately so callers can replay backlog into its
    /// channel before any live send can find it here.
    ///
    /// If the key was already registered, the previous entry is dropped from
    /// the registry and its heartbeat stopped. The previous socket is not
    /// closed; it keeps working for direct replies until it disconnects.
    pub async fn register(&self, handle: ConnectionHandle) {
        handle.set_state(ConnectionState::Active);
        let key = handle.key().clone();

        let heartbeat = heartbeat::spawn_heartbeat(
            self.clone(),
            key.clone(),
            handle.id(),
            self.heartbeat_interval,
        );
        let entry = RegistryEntry {
            handle: handle.clone(),
            heartbeat,
        };

        let previous = self.connections.write().await.insert(key.clone(), entry);
        match previous {
            Some(old) => {
                old.heartbeat.abort();
                debug!(
                    key = %key,
                    superseded = %old.handle.id(),
                    replacement = %handle.id(),
                    "connection superseded by newer socket"
                );
            }
            None => {
                ACTIVE_CONNECTIONS
                    .with_label_values(&[key.purpose.as_str(), key.identity.class.as_str()])
                    .inc();
                debug!(key = %key, connection_id = %handle.id(), "connection registered");
            }
        }
    }

    pub async fn lookup(&self, purpose: Purpose, identity: &Identity) -> Option<ConnectionHandle> {
        self.lookup_key(&ConnectionKey::new(purpose, identity.clone()))
            .await
    }

    pub async fn lookup_key(&self, key: &ConnectionKey) -> Option<ConnectionHandle> {
        self.connections
            .read()
            .await
            .get(key)
            .map(|entry| entry.handle.clone())
    }

    /// Removes the entry for `key` regardless of which socket owns it.
    pub async fn evict(&self, key: &ConnectionKey) -> Option<ConnectionHandle> {
        let entry = self.connections.write().await.remove(key)?;
        let handle = entry.handle.clone();
        self.retire(key, entry);
        Some(handle)
    }

    /// Removes the entry for `key` only while it still belongs to
    /// `connection_id`. A stale socket cannot evict its replacement.
    pub async fn evict_if(&self, key: &ConnectionKey, connection_id: Uuid) -> bool {
        let mut connections = self.connections.write().await;
        let owned = connections
            .get(key)
            .map(|entry| entry.handle.id() == connection_id)
            .unwrap_or(false);
        if !owned {
            return false;
        }
        if let Some(entry) = connections.remove(key) {
            drop(connections);
            self.retire(key, entry);
        }
        true
    }

    fn retire(&self, key: &ConnectionKey, entry: RegistryEntry) {
        entry.heartbeat.abort();
        entry.handle.set_state(ConnectionState::Evicted);
        ACTIVE_CONNECTIONS
            .with_label_values(&[key.purpose.as_str(), key.identity.class.as_str()])
            .dec();
        debug!(
            key = %key,
            connection_id = %entry.handle.id(),
            age_secs = (chrono::Utc::now() - entry.handle.connected_at()).num_seconds(),
            last_activity_ms = entry.handle.last_activity_ms(),
            messages_pushed = entry.handle.messages_pushed(),
            "connection evicted"
        );
    }

    /// Live handles for one purpose and client class, for fan-out.
    pub async fn snapshot(&self, purpose: Purpose, class: ClientClass) -> Vec<ConnectionHandle> {
        self.connections
            .read()
            .await
            .iter()
            .filter(|(key, entry)| {
                key.purpose == purpose && key.identity.class == class && entry.handle.is_live()
            })
            .map(|(_, entry)| entry.handle.clone())
            .collect()
    }

    /// Connected user ids grouped by `purpose:class`, optionally filtered.
    pub async fn active_users(
        &self,
        purpose: Option<Purpose>,
        class: Option<ClientClass>,
    ) -> BTreeMap<String, Vec<String>> {
        let connections = self.connections.read().await;
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for key in connections.keys() {
            if purpose.is_some_and(|p| p != key.purpose) {
                continue;
            }
            if class.is_some_and(|c| c != key.identity.class) {
                continue;
            }
            groups
                .entry(format!("{}:{}", key.purpose, key.identity.class))
                .or_default()
                .push(key.identity.id.clone());
        }
        for ids in groups.values_mut() {
            ids.sort();
        }
        groups
    }

    pub async fn stats(&self) -> RegistryStats {
        let connections = self.connections.read().await;

        let mut by_purpose: BTreeMap<String, usize> = Purpose::ALL
            .iter()
            .map(|p| (p.as_str().to_string(), 0))
            .collect();
        let mut by_client_class: BTreeMap<String, usize> = ClientClass::ALL
            .iter()
            .map(|c| (c.as_str().to_string(), 0))
            .collect();
        let mut active_heartbeats = 0;

        for (key, entry) in connections.iter() {
            *by_purpose.entry(key.purpose.as_str().to_string()).or_default() += 1;
            *by_client_class
                .entry(key.identity.class.as_str().to_string())
                .or_default() += 1;
            if !entry.heartbeat.is_finished() {
                active_heartbeats += 1;
            }
        }

        RegistryStats {
            total_connections: connections.len(),
            by_purpose,
            by_client_class,
            active_heartbeats,
        }
    }
}
