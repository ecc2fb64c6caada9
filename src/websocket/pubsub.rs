//! Best-effort mirror of delivered chat events onto Redis pub/sub so other
//! services can observe traffic. Delivery never depends on Redis being up.

use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::models::Identity;
use crate::websocket::ServerEvent;

fn chat_channel(recipient: &Identity) -> String {
    format!("chat:{}:{}", recipient.class, recipient.id)
}

#[derive(Clone)]
pub struct ChatEventPublisher {
    client: Client,
    // Connected on first publish so the service starts without Redis.
    connection: Arc<OnceCell<ConnectionManager>>,
}

impl ChatEventPublisher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            connection: Arc::new(OnceCell::new()),
        }
    }

    /// Publishes `event` on the recipient's channel. Failures are logged at
    /// debug level and otherwise ignored.
    pub async fn publish(&self, recipient: &Identity, event: &ServerEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(error) => {
                debug!(%error, "failed to encode chat event for mirror");
                return;
            }
        };
        let channel = chat_channel(recipient);

        let manager = match self
            .connection
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await
        {
            Ok(manager) => manager,
            Err(error) => {
                debug!(%error, channel = %channel, "redis mirror unavailable");
                return;
            }
        };

        let mut conn = manager.clone();
        match conn.publish::<_, _, i64>(&channel, payload).await {
            Ok(subscribers) => {
                debug!(channel = %channel, subscribers, event = event.event_type(), "chat event mirrored");
            }
            Err(error) => {
                debug!(%error, channel = %channel, "chat event mirror failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClientClass;

    #[test]
    fn channel_is_keyed_by_recipient() {
        let recipient = Identity::new(ClientClass::Customers, "7");
        assert_eq!(chat_channel(&recipient), "chat:customers:7");
    }
}
