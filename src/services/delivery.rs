//! Message and notification delivery. Every operation persists first and
//! pushes second; a dead connection never fails the triggering operation,
//! it only gets evicted.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::{Pool, Postgres};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::metrics::{
    MESSAGES_DELIVERED_LIVE, MESSAGES_PERSISTED, MESSAGES_REPLAYED, NOTIFICATIONS_DELIVERED,
    NOTIFICATIONS_QUEUED,
};
use crate::models::{ChatMessage, ClientClass, Identity, Purpose, Urgency};
use crate::services::SessionTracker;
use crate::store::{MessageStore, NewMessage, NewNotification, NotificationStore, SessionStore};
use crate::websocket::pubsub::ChatEventPublisher;
use crate::websocket::{
    ConnectionHandle, ConnectionKey, ConnectionRegistry, ConnectionState, ServerEvent,
};

/// A send as requested by a client, before persistence.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub from: Identity,
    pub to: Identity,
    pub from_name: Option<String>,
    pub text: Option<String>,
    pub media_type: Option<String>,
    pub media_url: Option<String>,
    /// Client-supplied idempotency key. Assigned server-side when absent.
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendReceipt {
    pub message_id: String,
    pub delivered_live: bool,
    pub duplicate: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotifyReceipt {
    pub notification_id: String,
    pub delivered_live: bool,
}

#[derive(Clone)]
pub struct DeliveryEngine {
    db: Pool<Postgres>,
    registry: ConnectionRegistry,
    sessions: SessionTracker,
    publisher: ChatEventPublisher,
    notification_ttl_days: i64,
}

impl DeliveryEngine {
    pub fn new(
        db: Pool<Postgres>,
        registry: ConnectionRegistry,
        sessions: SessionTracker,
        publisher: ChatEventPublisher,
        notification_ttl_days: i64,
    ) -> Self {
        Self {
            db,
            registry,
            sessions,
            publisher,
            notification_ttl_days,
        }
    }

    /// Opens a connection for `key`, replays its offline backlog into the
    /// outbound channel and only then registers it. Nothing can find the
    /// handle before registration, so replayed frames always precede live
    /// pushes in channel order.
    pub async fn register_connection(
        &self,
        key: ConnectionKey,
    ) -> (ConnectionHandle, UnboundedReceiver<String>) {
        let (handle, rx) = ConnectionHandle::open(key.clone());

        let replayed = match key.purpose {
            Purpose::Messaging => self.replay_messages(&handle).await,
            Purpose::Notifications => self.replay_notifications(&handle).await,
        };
        match replayed {
            Ok(0) => {}
            Ok(count) => info!(key = %key, count, "offline backlog replayed"),
            Err(error) => warn!(%error, key = %key, "offline backlog replay failed"),
        }

        self.registry.register(handle.clone()).await;
        (handle, rx)
    }

    /// Called when a socket's actor stops. Only removes the registry entry
    /// while this connection still owns it.
    pub async fn drop_connection(&self, handle: &ConnectionHandle) {
        if handle.is_live() {
            handle.set_state(ConnectionState::Closed);
        }
        self.registry.evict_if(handle.key(), handle.id()).await;
    }

    /// Persists a message and delivers it live when the recipient has a
    /// MESSAGING connection. A resent `message_id` is a no-op.
    pub async fn send(&self, outgoing: OutgoingMessage) -> AppResult<SendReceipt> {
        validate_body(&outgoing)?;
        let message_id = outgoing
            .message_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let new = NewMessage {
            message_id: &message_id,
            from: &outgoing.from,
            from_name: outgoing.from_name.as_deref(),
            to: &outgoing.to,
            text: outgoing.text.as_deref(),
            media_type: outgoing.media_type.as_deref(),
            media_url: outgoing.media_url.as_deref(),
        };
        let Some(stored) = MessageStore::insert(&self.db, &new).await? else {
            debug!(message_id = %message_id, "duplicate send ignored");
            return Ok(SendReceipt {
                message_id,
                delivered_live: false,
                duplicate: true,
            });
        };
        MESSAGES_PERSISTED.inc();

        SessionStore::touch_on_message(&self.db, &outgoing.from, &outgoing.to).await?;
        self.sessions.link(&outgoing.from, &outgoing.to).await;

        let mut delivered_live = false;
        if let Some(handle) = self.registry.lookup(Purpose::Messaging, &outgoing.to).await {
            let event = ServerEvent::messaging(&stored, false);
            if self.push_or_evict(&handle, &event).await {
                // The push was accepted; a mark failure means this message is
                // replayed once more on reconnect, which at-least-once allows.
                if let Err(error) =
                    MessageStore::mark_delivered(&self.db, &stored.message_id).await
                {
                    warn!(%error, message_id = %stored.message_id, "could not mark live-delivered message");
                }
                MESSAGES_DELIVERED_LIVE.inc();
                delivered_live = true;
                self.publisher.publish(&outgoing.to, &event).await;
            }
        }

        Ok(SendReceipt {
            message_id: stored.message_id,
            delivered_live,
            duplicate: false,
        })
    }

    /// Sender-only edit. `false` for missing, foreign or deleted messages.
    pub async fn edit(
        &self,
        message_id: &str,
        requester: &Identity,
        new_text: &str,
    ) -> AppResult<bool> {
        let Some(message) = MessageStore::fetch(&self.db, message_id).await? else {
            return Ok(false);
        };
        if &message.from != requester || message.is_deleted {
            return Ok(false);
        }
        let Some(edited_at) = MessageStore::set_text(&self.db, message_id, new_text).await? else {
            return Ok(false);
        };
        self.push_control(&message.to, ServerEvent::edited(message_id, new_text, edited_at))
            .await;
        Ok(true)
    }

    /// Sender-only soft delete. The row stays; its text renders masked.
    pub async fn delete(&self, message_id: &str, requester: &Identity) -> AppResult<bool> {
        let Some(message) = MessageStore::fetch(&self.db, message_id).await? else {
            return Ok(false);
        };
        if &message.from != requester {
            return Ok(false);
        }
        if !MessageStore::mark_deleted(&self.db, message_id).await? {
            return Ok(false);
        }
        self.push_control(&message.to, ServerEvent::deleted(message_id))
            .await;
        Ok(true)
    }

    /// Adds `symbol` under the actor's key. Re-reacting is idempotent but
    /// still persists and notifies, matching client expectations.
    pub async fn react(
        &self,
        message_id: &str,
        actor: &Identity,
        symbol: &str,
    ) -> AppResult<bool> {
        let Some(mut message) = MessageStore::fetch(&self.db, message_id).await? else {
            return Ok(false);
        };
        message.reactions.add(symbol, &actor.key());
        MessageStore::set_reactions(&self.db, message_id, &message.reactions).await?;
        let event = ServerEvent::reaction_changed(message_id, symbol, &actor.key(), false);
        self.notify_participants(&message, actor, &event).await;
        Ok(true)
    }

    /// Removes the actor's reaction. Removing one that is not there succeeds
    /// without persisting or notifying anyone.
    pub async fn unreact(
        &self,
        message_id: &str,
        actor: &Identity,
        symbol: &str,
    ) -> AppResult<bool> {
        let Some(mut message) = MessageStore::fetch(&self.db, message_id).await? else {
            return Ok(false);
        };
        if message.reactions.remove(symbol, &actor.key()) {
            MessageStore::set_reactions(&self.db, message_id, &message.reactions).await?;
            let event = ServerEvent::reaction_changed(message_id, symbol, &actor.key(), true);
            self.notify_participants(&message, actor, &event).await;
        }
        Ok(true)
    }

    /// Delivers live or queues durably. Anything short of a confirmed push,
    /// recipient offline or push failure alike, lands in the offline queue.
    pub async fn notify(
        &self,
        to: &Identity,
        title: &str,
        body: &str,
        data: serde_json::Value,
        urgency: Urgency,
    ) -> AppResult<NotifyReceipt> {
        if title.trim().is_empty() || body.trim().is_empty() {
            return Err(AppError::Validation(
                "notification needs a title and a body".into(),
            ));
        }
        let notification_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        if let Some(handle) = self.registry.lookup(Purpose::Notifications, to).await {
            let event =
                ServerEvent::notification(&notification_id, title, body, &data, urgency, now, false);
            if self.push_or_evict(&handle, &event).await {
                NOTIFICATIONS_DELIVERED.inc();
                return Ok(NotifyReceipt {
                    notification_id,
                    delivered_live: true,
                });
            }
        }

        let new = NewNotification {
            notification_id: &notification_id,
            to,
            title,
            body,
            data: &data,
            urgency,
            expires_at: now + Duration::days(self.notification_ttl_days),
        };
        NotificationStore::insert(&self.db, &new).await?;
        NOTIFICATIONS_QUEUED.inc();
        debug!(to = %to, notification_id = %notification_id, "notification queued for offline delivery");

        Ok(NotifyReceipt {
            notification_id,
            delivered_live: false,
        })
    }

    /// Live-only fanout to every connection of one purpose and class.
    /// Returns `user_id → delivered`; failed handles are evicted.
    pub async fn broadcast(
        &self,
        purpose: Purpose,
        class: ClientClass,
        event: &ServerEvent,
    ) -> HashMap<String, bool> {
        let handles = self.registry.snapshot(purpose, class).await;
        let mut results = HashMap::with_capacity(handles.len());
        for handle in handles {
            let delivered = self.push_or_evict(&handle, event).await;
            if delivered && purpose == Purpose::Notifications {
                NOTIFICATIONS_DELIVERED.inc();
            }
            results.insert(handle.key().identity.id.clone(), delivered);
        }
        results
    }

    async fn replay_messages(&self, handle: &ConnectionHandle) -> AppResult<usize> {
        let backlog = MessageStore::undelivered_for(&self.db, &handle.key().identity).await?;
        let mut replayed = 0;
        for message in &backlog {
            let event = ServerEvent::messaging(message, true);
            if !self.push_or_evict(handle, &event).await {
                warn!(
                    key = %handle.key(),
                    replayed,
                    pending = backlog.len() - replayed,
                    "message replay stopped by dead connection"
                );
                break;
            }
            MessageStore::mark_delivered(&self.db, &message.message_id).await?;
            MESSAGES_REPLAYED.inc();
            replayed += 1;
        }
        Ok(replayed)
    }

    async fn replay_notifications(&self, handle: &ConnectionHandle) -> AppResult<usize> {
        let backlog = NotificationStore::undelivered_for(&self.db, &handle.key().identity).await?;
        let mut replayed = 0;
        for notification in &backlog {
            let event = ServerEvent::stored_notification(notification);
            if !self.push_or_evict(handle, &event).await {
                warn!(
                    key = %handle.key(),
                    replayed,
                    pending = backlog.len() - replayed,
                    "notification replay stopped by dead connection"
                );
                break;
            }
            NotificationStore::mark_delivered(&self.db, &notification.notification_id).await?;
            NOTIFICATIONS_DELIVERED.inc();
            replayed += 1;
        }
        Ok(replayed)
    }

    /// Pushes one event; a failed push evicts the stale entry (guarded, so a
    /// superseded socket cannot take down its replacement).
    async fn push_or_evict(&self, handle: &ConnectionHandle, event: &ServerEvent) -> bool {
        match handle.push(event) {
            Ok(()) => true,
            Err(error) => {
                debug!(
                    %error,
                    key = %handle.key(),
                    connection_id = %handle.id(),
                    event = event.event_type(),
                    "push failed, evicting stale connection"
                );
                self.registry.evict_if(handle.key(), handle.id()).await;
                false
            }
        }
    }

    /// Control events go to whichever participants are live on MESSAGING,
    /// except the actor who caused them.
    async fn notify_participants(
        &self,
        message: &ChatMessage,
        actor: &Identity,
        event: &ServerEvent,
    ) {
        for participant in [&message.from, &message.to] {
            if *participant != *actor {
                self.push_control(participant, event.clone()).await;
            }
        }
    }

    async fn push_control(&self, to: &Identity, event: ServerEvent) {
        if let Some(handle) = self.registry.lookup(Purpose::Messaging, to).await {
            if self.push_or_evict(&handle, &event).await {
                self.publisher.publish(to, &event).await;
            }
        }
    }
}

fn validate_body(outgoing: &OutgoingMessage) -> AppResult<()> {
    let has_body = outgoing
        .text
        .as_deref()
        .is_some_and(|t| !t.trim().is_empty())
        || outgoing
            .media_url
            .as_deref()
            .is_some_and(|u| !u.is_empty());
    if outgoing.to.id.is_empty() || !has_body {
        return Err(AppError::Validation(
            "message needs a recipient and text or a media reference".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClientClass;

    fn outgoing(text: Option<&str>, media_url: Option<&str>) -> OutgoingMessage {
        OutgoingMessage {
            from: Identity::new(ClientClass::Installers, "1"),
            to: Identity::new(ClientClass::Customers, "2"),
            from_name: None,
            text: text.map(str::to_string),
            media_type: None,
            media_url: media_url.map(str::to_string),
            message_id: None,
        }
    }

    #[test]
    fn body_validation_requires_text_or_media() {
        assert!(validate_body(&outgoing(Some("hi"), None)).is_ok());
        assert!(validate_body(&outgoing(None, Some("https://cdn/x.png"))).is_ok());
        assert!(validate_body(&outgoing(None, None)).is_err());
        assert!(validate_body(&outgoing(Some("   "), None)).is_err());
    }

    #[test]
    fn body_validation_requires_a_recipient() {
        let mut msg = outgoing(Some("hi"), None);
        msg.to.id = String::new();
        assert!(validate_body(&msg).is_err());
    }
}
