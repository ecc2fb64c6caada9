use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Identity;

/// Fixed placeholder served in place of soft-deleted message text.
pub const DELETED_PLACEHOLDER: &str = "This message was deleted";

/// Reaction symbol -> keys of reacting users (`class:id`). Adding is
/// idempotent; removing the last reactor prunes the symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReactionMap(pub BTreeMap<String, Vec<String>>);

impl ReactionMap {
    /// Returns true when the map changed.
    pub fn add(&mut self, reaction: &str, user_key: &str) -> bool {
        let reactors = self.0.entry(reaction.to_string()).or_default();
        if reactors.iter().any(|k| k == user_key) {
            return false;
        }
        reactors.push(user_key.to_string());
        true
    }

    /// Returns true when the map changed.
    pub fn remove(&mut self, reaction: &str, user_key: &str) -> bool {
        let Some(reactors) = self.0.get_mut(reaction) else {
            return false;
        };
        let before = reactors.len();
        reactors.retain(|k| k != user_key);
        let changed = reactors.len() != before;
        if reactors.is_empty() {
            self.0.remove(reaction);
        }
        changed
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One stored direct message.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: i64,
    pub message_id: String,
    pub from: Identity,
    pub from_name: Option<String>,
    pub to: Identity,
    pub text: Option<String>,
    pub media_type: Option<String>,
    pub media_url: Option<String>,
    pub reactions: ReactionMap,
    pub is_read: bool,
    pub is_delivered: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Text as it should be served: deleted messages render the placeholder.
    pub fn display_text(&self) -> String {
        if self.is_deleted {
            DELETED_PLACEHOLDER.to_string()
        } else {
            self.text.clone().unwrap_or_default()
        }
    }
}

/// Read-side projection of a message for history responses.
#[derive(Debug, Serialize)]
pub struct MessageView {
    pub message_id: String,
    pub from_type: super::ClientClass,
    pub from_id: String,
    pub from_name: Option<String>,
    pub to_type: super::ClientClass,
    pub to_id: String,
    pub text: String,
    pub timestamp: String,
    pub edited_at: Option<String>,
    pub is_deleted: bool,
    pub reactions: ReactionMap,
    pub media_type: Option<String>,
    pub media_url: Option<String>,
    pub is_read: bool,
}

impl MessageView {
    pub fn from_message(msg: &ChatMessage) -> Self {
        Self {
            message_id: msg.message_id.clone(),
            from_type: msg.from.class,
            from_id: msg.from.id.clone(),
            from_name: msg.from_name.clone(),
            to_type: msg.to.class,
            to_id: msg.to.id.clone(),
            text: msg.display_text(),
            timestamp: msg.created_at.to_rfc3339(),
            edited_at: msg.edited_at.map(|t| t.to_rfc3339()),
            is_deleted: msg.is_deleted,
            reactions: msg.reactions.clone(),
            media_type: msg.media_type.clone(),
            media_url: msg.media_url.clone(),
            is_read: msg.is_read,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClientClass;

    fn message(text: Option<&str>, deleted: bool) -> ChatMessage {
        ChatMessage {
            id: 1,
            message_id: "m-1".to_string(),
            from: Identity::new(ClientClass::Installers, "a"),
            from_name: None,
            to: Identity::new(ClientClass::Customers, "b"),
            text: text.map(str::to_string),
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
    fn adding_a_reaction_twice_is_idempotent() {
        let mut map = ReactionMap::default();
        assert!(map.add("👍", "installers:1"));
        assert!(!map.add("👍", "installers:1"));
        assert!(map.add("👍", "customers:2"));
        assert_eq!(map.0["👍"], vec!["installers:1", "customers:2"]);
    }

    #[test]
    fn removing_the_last_reactor_prunes_the_symbol() {
        let mut map = ReactionMap::default();
        map.add("🔥", "installers:1");
        assert!(map.remove("🔥", "installers:1"));
        assert!(map.is_empty());
        assert!(!map.remove("🔥", "installers:1"));
    }

    #[test]
    fn reaction_map_serializes_as_plain_object() {
        let mut map = ReactionMap::default();
        map.add("👍", "admins:9");
        let v = serde_json::to_value(&map).unwrap();
        assert_eq!(v, serde_json::json!({ "👍": ["admins:9"] }));
    }

    #[test]
    fn deleted_messages_render_the_placeholder() {
        assert_eq!(message(Some("hello"), false).display_text(), "hello");
        assert_eq!(message(Some("hello"), true).display_text(), DELETED_PLACEHOLDER);
    }

    #[test]
    fn history_view_masks_deleted_text() {
        let view = MessageView::from_message(&message(Some("secret"), true));
        assert_eq!(view.text, DELETED_PLACEHOLDER);
        assert!(view.is_deleted);
    }
}
