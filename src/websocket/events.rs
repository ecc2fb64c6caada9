//! Outbound frame types. Everything the server writes to a socket is one of
//! these, serialized with a `"type"` tag.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::models::{ChatMessage, ClientClass, OfflineNotification, ReactionMap, Urgency};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    Edit,
    Delete,
    React,
    RemoveReact,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// A direct message, live or replayed from the offline backlog.
    #[serde(rename = "messaging")]
    Messaging {
        from_type: ClientClass,
        from_id: String,
        from_name: Option<String>,
        text: String,
        message_id: String,
        timestamp: String,
        edited_at: Option<String>,
        is_deleted: bool,
        reactions: ReactionMap,
        media_type: Option<String>,
        media_url: Option<String>,
        is_offline_message: bool,
    },

    /// Lifecycle change to an already-delivered message.
    #[serde(rename = "control")]
    Control {
        action: ControlAction,
        message_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        new_text: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        edited_at: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reaction: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        user: Option<String>,
    },

    #[serde(rename = "notifications")]
    Notification {
        notification_id: String,
        title: String,
        body: String,
        data: Value,
        urgency: Urgency,
        timestamp: String,
        is_offline_notification: bool,
    },

    #[serde(rename = "ping")]
    Ping { timestamp: String },
}

impl ServerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::Messaging { .. } => "messaging",
            ServerEvent::Control { .. } => "control",
            ServerEvent::Notification { .. } => "notifications",
            ServerEvent::Ping { .. } => "ping",
        }
    }

    /// Builds the wire form of a stored message. Deleted text is masked here
    /// so no path can leak it.
    pub fn messaging(msg: &ChatMessage, offline: bool) -> Self {
        ServerEvent::Messaging {
            from_type: msg.from.class,
            from_id: msg.from.id.clone(),
            from_name: msg.from_name.clone(),
            text: msg.display_text(),
            message_id: msg.message_id.clone(),
            timestamp: msg.created_at.to_rfc3339(),
            edited_at: msg.edited_at.map(|t| t.to_rfc3339()),
            is_deleted: msg.is_deleted,
            reactions: msg.reactions.clone(),
            media_type: msg.media_type.clone(),
            media_url: msg.media_url.clone(),
            is_offline_message: offline,
        }
    }

    pub fn edited(message_id: &str, new_text: &str, edited_at: DateTime<Utc>) -> Self {
        ServerEvent::Control {
            action: ControlAction::Edit,
            message_id: message_id.to_string(),
            new_text: Some(new_text.to_string()),
            edited_at: Some(edited_at.to_rfc3339()),
            reaction: None,
            user: None,
        }
    }

    pub fn deleted(message_id: &str) -> Self {
        ServerEvent::Control {
            action: ControlAction::Delete,
            message_id: message_id.to_string(),
            new_text: None,
            edited_at: None,
            reaction: None,
            user: None,
        }
    }

    pub fn reaction_changed(message_id: &str, reaction: &str, user_key: &str, removed: bool) -> Self {
        ServerEvent::Control {
            action: if removed {
                ControlAction::RemoveReact
            } else {
                ControlAction::React
            },
            message_id: message_id.to_string(),
            new_text: None,
            edited_at: None,
            reaction: Some(reaction.to_string()),
            user: Some(user_key.to_string()),
        }
    }

    pub fn notification(
        notification_id: &str,
        title: &str,
        body: &str,
        data: &Value,
        urgency: Urgency,
        at: DateTime<Utc>,
        offline: bool,
    ) -> Self {
        ServerEvent::Notification {
            notification_id: notification_id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            data: data.clone(),
            urgency,
            timestamp: at.to_rfc3339(),
            is_offline_notification: offline,
        }
    }

    pub fn stored_notification(n: &OfflineNotification) -> Self {
        Self::notification(
            &n.notification_id,
            &n.title,
            &n.body,
            &n.data,
            n.urgency,
            n.created_at,
            true,
        )
    }

    pub fn ping() -> Self {
        ServerEvent::Ping {
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Identity;

    fn sample_message(deleted: bool) -> ChatMessage {
        ChatMessage {
            id: 1,
            message_id: "m-42".to_string(),
            from: Identity::new(ClientClass::Installers, "a"),
            from_name: Some("Alice".to_string()),
            to: Identity::new(ClientClass::Customers, "b"),
            text: Some("hi there".to_string()),
            media_type: None,
            media_url: None,
            reactions: ReactionMap::default(),
            is_read: false,
            is_delivered: false,
            is_deleted: deleted,
            created_at: Utc::now(),
            edited_at: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn event_type_naming() {
        assert_eq!(ServerEvent::ping().event_type(), "ping");
        assert_eq!(
            ServerEvent::messaging(&sample_message(false), false).event_type(),
            "messaging"
        );
        assert_eq!(ServerEvent::deleted("m-1").event_type(), "control");
    }

    #[test]
    fn messaging_event_carries_offline_flag_and_type_tag() {
        let event = ServerEvent::messaging(&sample_message(false), true);
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "messaging");
        assert_eq!(v["from_type"], "installers");
        assert_eq!(v["message_id"], "m-42");
        assert_eq!(v["is_offline_message"], true);
        assert_eq!(v["text"], "hi there");
    }

    #[test]
    fn deleted_messages_are_masked_in_events() {
        let event = ServerEvent::messaging(&sample_message(true), true);
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["text"], crate::models::DELETED_PLACEHOLDER);
        assert_eq!(v["is_deleted"], true);
    }

    #[test]
    fn delete_control_omits_edit_and_reaction_fields() {
        let v = serde_json::to_value(ServerEvent::deleted("m-1")).unwrap();
        assert_eq!(v["type"], "control");
        assert_eq!(v["action"], "delete");
        assert_eq!(v["message_id"], "m-1");
        assert!(v.get("new_text").is_none());
        assert!(v.get("reaction").is_none());
    }

    #[test]
    fn reaction_control_names_the_reacting_user() {
        let v = serde_json::to_value(ServerEvent::reaction_changed("m-1", "👍", "admins:9", false))
            .unwrap();
        assert_eq!(v["action"], "react");
        assert_eq!(v["reaction"], "👍");
        assert_eq!(v["user"], "admins:9");

        let v = serde_json::to_value(ServerEvent::reaction_changed("m-1", "👍", "admins:9", true))
            .unwrap();
        assert_eq!(v["action"], "remove_react");
    }

    #[test]
    fn notification_event_shape() {
        let data = serde_json::json!({ "order_id": "12345" });
        let event = ServerEvent::notification(
            "n-1",
            "Order Update",
            "Your order has been accepted",
            &data,
            Urgency::Normal,
            Utc::now(),
            false,
        );
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "notifications");
        assert_eq!(v["urgency"], "normal");
        assert_eq!(v["data"]["order_id"], "12345");
        assert_eq!(v["is_offline_notification"], false);
    }

    #[test]
    fn ping_carries_a_timestamp() {
        let v = serde_json::to_value(ServerEvent::ping()).unwrap();
        assert_eq!(v["type"], "ping");
        assert!(v["timestamp"].is_string());
    }
}
