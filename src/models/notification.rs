use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Identity;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Normal => "normal",
            Urgency::High => "high",
            Urgency::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Urgency::Low),
            "normal" => Some(Urgency::Normal),
            "high" => Some(Urgency::High),
            "critical" => Some(Urgency::Critical),
            _ => None,
        }
    }
}

/// A notification that could not be delivered live and waits for the next
/// NOTIFICATIONS connection. Expired rows are skipped at replay; purging them
/// is an external concern.
#[derive(Debug, Clone)]
pub struct OfflineNotification {
    pub id: i64,
    pub notification_id: String,
    pub to: Identity,
    pub title: String,
    pub body: String,
    pub data: Value,
    pub urgency: Urgency,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgency_defaults_to_normal() {
        assert_eq!(Urgency::default(), Urgency::Normal);
    }

    #[test]
    fn urgency_round_trips_through_strings() {
        for urgency in [Urgency::Low, Urgency::Normal, Urgency::High, Urgency::Critical] {
            assert_eq!(Urgency::parse(urgency.as_str()), Some(urgency));
        }
        assert_eq!(Urgency::parse("urgent"), None);
    }

    #[test]
    fn urgency_deserializes_lowercase() {
        let u: Urgency = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(u, Urgency::Critical);
    }
}
