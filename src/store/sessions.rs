use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

use crate::error::{AppError, AppResult};
use crate::models::{ChatPartner, ChatSession, ClientClass, Identity};

/// Orders a pair so the same two identities always land in the same columns.
/// The UNIQUE constraint on `chat_sessions` only holds because every read and
/// write goes through this.
fn canonical<'a>(a: &'a Identity, b: &'a Identity) -> (&'a Identity, &'a Identity) {
    if (a.class.as_str(), a.id.as_str()) <= (b.class.as_str(), b.id.as_str()) {
        (a, b)
    } else {
        (b, a)
    }
}

pub struct SessionStore;

impl SessionStore {
    /// Creates or reactivates the session row for a pair.
    pub async fn activate_pair(
        db: &Pool<Postgres>,
        a: &Identity,
        b: &Identity,
    ) -> AppResult<ChatSession> {
        let (first, second) = canonical(a, b);
        let row = sqlx::query(
            "INSERT INTO chat_sessions (user1_type, user1_id, user2_type, user2_id, is_active) \
             VALUES ($1, $2, $3, $4, TRUE) \
             ON CONFLICT (user1_type, user1_id, user2_type, user2_id) \
             DO UPDATE SET is_active = TRUE, ended_at = NULL, updated_at = NOW() \
             RETURNING *",
        )
        .bind(first.class.as_str())
        .bind(&first.id)
        .bind(second.class.as_str())
        .bind(&second.id)
        .fetch_one(db)
        .await?;
        row_to_session(&row)
    }

    /// Like [`activate_pair`](Self::activate_pair) but also bumps
    /// `last_message_at`. Called on every persisted send.
    pub async fn touch_on_message(
        db: &Pool<Postgres>,
        a: &Identity,
        b: &Identity,
    ) -> AppResult<ChatSession> {
        let (first, second) = canonical(a, b);
        let row = sqlx::query(
            "INSERT INTO chat_sessions \
                (user1_type, user1_id, user2_type, user2_id, is_active, last_message_at) \
             VALUES ($1, $2, $3, $4, TRUE, NOW()) \
             ON CONFLICT (user1_type, user1_id, user2_type, user2_id) \
             DO UPDATE SET is_active = TRUE, ended_at = NULL, last_message_at = NOW(), \
                           updated_at = NOW() \
             RETURNING *",
        )
        .bind(first.class.as_str())
        .bind(&first.id)
        .bind(second.class.as_str())
        .bind(&second.id)
        .fetch_one(db)
        .await?;
        row_to_session(&row)
    }

    /// Deactivates an active session. `None` when the pair has no active row.
    pub async fn deactivate_pair(
        db: &Pool<Postgres>,
        a: &Identity,
        b: &Identity,
    ) -> AppResult<Option<ChatSession>> {
        let (first, second) = canonical(a, b);
        let row = sqlx::query(
            "UPDATE chat_sessions \
             SET is_active = FALSE, ended_at = NOW(), updated_at = NOW() \
             WHERE user1_type = $1 AND user1_id = $2 \
               AND user2_type = $3 AND user2_id = $4 \
               AND is_active = TRUE \
             RETURNING *",
        )
        .bind(first.class.as_str())
        .bind(&first.id)
        .bind(second.class.as_str())
        .bind(&second.id)
        .fetch_optional(db)
        .await?;
        row.map(|r| row_to_session(&r)).transpose()
    }

    pub async fn find_active(
        db: &Pool<Postgres>,
        a: &Identity,
        b: &Identity,
    ) -> AppResult<Option<ChatSession>> {
        let (first, second) = canonical(a, b);
        let row = sqlx::query(
            "SELECT * FROM chat_sessions \
             WHERE user1_type = $1 AND user1_id = $2 \
               AND user2_type = $3 AND user2_id = $4 \
               AND is_active = TRUE",
        )
        .bind(first.class.as_str())
        .bind(&first.id)
        .bind(second.class.as_str())
        .bind(&second.id)
        .fetch_optional(db)
        .await?;
        row.map(|r| row_to_session(&r)).transpose()
    }

    /// Active chat partners of `me`, most recent message first.
    pub async fn partners_of(db: &Pool<Postgres>, me: &Identity) -> AppResult<Vec<ChatPartner>> {
        let rows = sqlx::query(
            "SELECT * FROM chat_sessions \
             WHERE is_active = TRUE \
               AND ((user1_type = $1 AND user1_id = $2) \
                 OR (user2_type = $1 AND user2_id = $2)) \
             ORDER BY last_message_at DESC NULLS LAST",
        )
        .bind(me.class.as_str())
        .bind(&me.id)
        .fetch_all(db)
        .await?;

        let mut partners = Vec::with_capacity(rows.len());
        for row in &rows {
            let session = row_to_session(row)?;
            if let Some(partner) = session.partner_of(me) {
                partners.push(ChatPartner {
                    client_type: partner.class,
                    user_id: partner.id.clone(),
                    last_message_at: session.last_message_at,
                });
            }
        }
        Ok(partners)
    }
}

fn row_to_session(row: &PgRow) -> AppResult<ChatSession> {
    let user1_type: String = row.try_get("user1_type")?;
    let user2_type: String = row.try_get("user2_type")?;
    let user1_class = ClientClass::parse(&user1_type)
        .ok_or_else(|| AppError::Internal(format!("unknown client class in store: {user1_type}")))?;
    let user2_class = ClientClass::parse(&user2_type)
        .ok_or_else(|| AppError::Internal(format!("unknown client class in store: {user2_type}")))?;

    Ok(ChatSession {
        id: row.try_get("id")?,
        user1: Identity::new(user1_class, row.try_get::<String, _>("user1_id")?),
        user2: Identity::new(user2_class, row.try_get::<String, _>("user2_id")?),
        is_active: row.try_get("is_active")?,
        last_message_at: row.try_get("last_message_at")?,
        created_at: row.try_get("created_at")?,
        ended_at: row.try_get("ended_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_order_ignores_argument_order() {
        let a = Identity::new(ClientClass::Installers, "9");
        let b = Identity::new(ClientClass::Customers, "1");
        assert_eq!(canonical(&a, &b), canonical(&b, &a));
        // "customers" sorts before "installers"
        assert_eq!(canonical(&a, &b).0, &b);
    }

    #[test]
    fn canonical_order_breaks_class_ties_by_id() {
        let a = Identity::new(ClientClass::Admins, "20");
        let b = Identity::new(ClientClass::Admins, "3");
        // lexicographic, not numeric
        assert_eq!(canonical(&a, &b).0, &a);
    }

    #[test]
    fn canonical_handles_identical_sides() {
        let a = Identity::new(ClientClass::Admins, "1");
        let (first, second) = canonical(&a, &a);
        assert_eq!(first, second);
    }
}
