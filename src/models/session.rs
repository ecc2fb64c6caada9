use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{ClientClass, Identity};

/// One active-or-ended chat relationship between two identities. At most one
/// row exists per unordered pair.
#[derive(Debug, Clone, Serialize)]
pub struct ChatSession {
    pub id: i64,
    pub user1: Identity,
    pub user2: Identity,
    pub is_active: bool,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ChatSession {
    /// The side of the pair that is not `me`, if `me` participates at all.
    pub fn partner_of(&self, me: &Identity) -> Option<&Identity> {
        if &self.user1 == me {
            Some(&self.user2)
        } else if &self.user2 == me {
            Some(&self.user1)
        } else {
            None
        }
    }
}

/// Partner entry served by the chat-partners listing, newest activity first.
#[derive(Debug, Clone, Serialize)]
pub struct ChatPartner {
    pub client_type: ClientClass,
    pub user_id: String,
    pub last_message_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partner_of_returns_the_other_side() {
        let a = Identity::new(ClientClass::Installers, "1");
        let b = Identity::new(ClientClass::Customers, "2");
        let session = ChatSession {
            id: 1,
            user1: a.clone(),
            user2: b.clone(),
            is_active: true,
            last_message_at: None,
            created_at: Utc::now(),
            ended_at: None,
        };
        assert_eq!(session.partner_of(&a), Some(&b));
        assert_eq!(session.partner_of(&b), Some(&a));
        assert_eq!(session.partner_of(&Identity::new(ClientClass::Admins, "3")), None);
    }
}
