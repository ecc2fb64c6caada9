use std::fmt;

use serde::{Deserialize, Serialize};

pub mod message;
pub mod notification;
pub mod session;

pub use message::{ChatMessage, MessageView, ReactionMap, DELETED_PLACEHOLDER};
pub use notification::{OfflineNotification, Urgency};
pub use session::{ChatPartner, ChatSession};

/// What a connection is for. Each purpose is a separate endpoint and a
/// separate registry partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Messaging,
    Notifications,
}

impl Purpose {
    pub const ALL: [Purpose; 2] = [Purpose::Messaging, Purpose::Notifications];

    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Messaging => "messaging",
            Purpose::Notifications => "notifications",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "messaging" => Some(Purpose::Messaging),
            "notifications" => Some(Purpose::Notifications),
            _ => None,
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of client populations this service talks to. Checked once
/// at the connection boundary; invalid values never reach the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientClass {
    Installers,
    Customers,
    Admins,
}

impl ClientClass {
    pub const ALL: [ClientClass; 3] =
        [ClientClass::Installers, ClientClass::Customers, ClientClass::Admins];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClientClass::Installers => "installers",
            ClientClass::Customers => "customers",
            ClientClass::Admins => "admins",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "installers" => Some(ClientClass::Installers),
            "customers" => Some(ClientClass::Customers),
            "admins" => Some(ClientClass::Admins),
            _ => None,
        }
    }
}

impl fmt::Display for ClientClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user as the rest of the system sees one: class plus opaque id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "client_type")]
    pub class: ClientClass,
    #[serde(rename = "user_id")]
    pub id: String,
}

impl Identity {
    pub fn new(class: ClientClass, id: impl Into<String>) -> Self {
        Self { class, id: id.into() }
    }

    /// Canonical textual form, e.g. `installers:42`. Used as the reacting-user
    /// key inside reaction maps.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class.as_str(), self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_class_round_trips_through_strings() {
        for class in ClientClass::ALL {
            assert_eq!(ClientClass::parse(class.as_str()), Some(class));
        }
        assert_eq!(ClientClass::parse("resellers"), None);
        assert_eq!(ClientClass::parse("Installers"), None);
    }

    #[test]
    fn purpose_round_trips_through_strings() {
        for purpose in Purpose::ALL {
            assert_eq!(Purpose::parse(purpose.as_str()), Some(purpose));
        }
        assert_eq!(Purpose::parse("telemetry"), None);
    }

    #[test]
    fn enums_serialize_lowercase() {
        assert_eq!(
            serde_json::to_value(ClientClass::Installers).unwrap(),
            serde_json::json!("installers")
        );
        assert_eq!(
            serde_json::to_value(Purpose::Notifications).unwrap(),
            serde_json::json!("notifications")
        );
    }

    #[test]
    fn identity_key_is_class_colon_id() {
        let id = Identity::new(ClientClass::Customers, "7");
        assert_eq!(id.key(), "customers:7");
        assert_eq!(id.to_string(), "customers:7");
    }

    #[test]
    fn identity_serializes_with_wire_field_names() {
        let id = Identity::new(ClientClass::Admins, "ops-1");
        let v = serde_json::to_value(&id).unwrap();
        assert_eq!(v["client_type"], "admins");
        assert_eq!(v["user_id"], "ops-1");
    }
}
