use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

use crate::error::{AppError, AppResult};
use crate::models::{ChatMessage, ClientClass, Identity, ReactionMap};

/// Fields for a message that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub message_id: &'a str,
    pub from: &'a Identity,
    pub from_name: Option<&'a str>,
    pub to: &'a Identity,
    pub text: Option<&'a str>,
    pub media_type: Option<&'a str>,
    pub media_url: Option<&'a str>,
}

pub struct MessageStore;

impl MessageStore {
    /// Inserts a message, keeping `is_delivered = false` until a live push
    /// succeeds. Returns `None` when `message_id` already exists; the table
    /// never gains a second row for a resent id.
    pub async fn insert(
        db: &Pool<Postgres>,
        new: &NewMessage<'_>,
    ) -> AppResult<Option<ChatMessage>> {
        let row = sqlx::query(
            "INSERT INTO chat_messages \
                (message_id, from_type, from_id, from_name, to_type, to_id, text, media_type, media_url) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (message_id) DO NOTHING \
             RETURNING *",
        )
        .bind(new.message_id)
        .bind(new.from.class.as_str())
        .bind(&new.from.id)
        .bind(new.from_name)
        .bind(new.to.class.as_str())
        .bind(&new.to.id)
        .bind(new.text)
        .bind(new.media_type)
        .bind(new.media_url)
        .fetch_optional(db)
        .await?;

        row.map(|r| row_to_message(&r)).transpose()
    }

    pub async fn fetch(db: &Pool<Postgres>, message_id: &str) -> AppResult<Option<ChatMessage>> {
        let row = sqlx::query("SELECT * FROM chat_messages WHERE message_id = $1")
            .bind(message_id)
            .fetch_optional(db)
            .await?;
        row.map(|r| row_to_message(&r)).transpose()
    }

    /// Undelivered backlog for a recipient, oldest first. Soft-deleted rows
    /// are included; their text is masked at serialization time.
    pub async fn undelivered_for(
        db: &Pool<Postgres>,
        to: &Identity,
    ) -> AppResult<Vec<ChatMessage>> {
        let rows = sqlx::query(
            "SELECT * FROM chat_messages \
             WHERE to_type = $1 AND to_id = $2 AND is_delivered = FALSE \
             ORDER BY created_at ASC",
        )
        .bind(to.class.as_str())
        .bind(&to.id)
        .fetch_all(db)
        .await?;
        rows.iter().map(row_to_message).collect()
    }

    pub async fn mark_delivered(db: &Pool<Postgres>, message_id: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE chat_messages SET is_delivered = TRUE, updated_at = NOW() \
             WHERE message_id = $1",
        )
        .bind(message_id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Replaces the text and stamps `edited_at`. Returns the new stamp, or
    /// `None` when the message is gone.
    pub async fn set_text(
        db: &Pool<Postgres>,
        message_id: &str,
        new_text: &str,
    ) -> AppResult<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "UPDATE chat_messages \
             SET text = $2, edited_at = NOW(), updated_at = NOW() \
             WHERE message_id = $1 \
             RETURNING edited_at",
        )
        .bind(message_id)
        .bind(new_text)
        .fetch_optional(db)
        .await?;
        Ok(row.map(|r| r.get("edited_at")))
    }

    pub async fn mark_deleted(db: &Pool<Postgres>, message_id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE chat_messages SET is_deleted = TRUE, updated_at = NOW() \
             WHERE message_id = $1",
        )
        .bind(message_id)
        .execute(db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_reactions(
        db: &Pool<Postgres>,
        message_id: &str,
        reactions: &ReactionMap,
    ) -> AppResult<()> {
        let payload = serde_json::to_value(reactions)
            .map_err(|e| AppError::Internal(format!("encode reactions: {e}")))?;
        sqlx::query(
            "UPDATE chat_messages SET reactions = $2, updated_at = NOW() \
             WHERE message_id = $1",
        )
        .bind(message_id)
        .bind(payload)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Both directions of a pair's conversation, newest first.
    pub async fn history_between(
        db: &Pool<Postgres>,
        a: &Identity,
        b: &Identity,
        limit: i64,
    ) -> AppResult<Vec<ChatMessage>> {
        let rows = sqlx::query(
            "SELECT * FROM chat_messages \
             WHERE (from_type = $1 AND from_id = $2 AND to_type = $3 AND to_id = $4) \
                OR (from_type = $3 AND from_id = $4 AND to_type = $1 AND to_id = $2) \
             ORDER BY created_at DESC \
             LIMIT $5",
        )
        .bind(a.class.as_str())
        .bind(&a.id)
        .bind(b.class.as_str())
        .bind(&b.id)
        .bind(limit)
        .fetch_all(db)
        .await?;
        rows.iter().map(row_to_message).collect()
    }

    /// Unread, not-deleted messages addressed to `to`.
    pub async fn unread_count(db: &Pool<Postgres>, to: &Identity) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chat_messages \
             WHERE to_type = $1 AND to_id = $2 AND is_read = FALSE AND is_deleted = FALSE",
        )
        .bind(to.class.as_str())
        .bind(&to.id)
        .fetch_one(db)
        .await?;
        Ok(count)
    }

    /// Marks the `from` → `to` direction read; returns how many rows changed.
    pub async fn mark_read(
        db: &Pool<Postgres>,
        to: &Identity,
        from: &Identity,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE chat_messages SET is_read = TRUE, updated_at = NOW() \
             WHERE to_type = $1 AND to_id = $2 AND from_type = $3 AND from_id = $4 \
               AND is_read = FALSE",
        )
        .bind(to.class.as_str())
        .bind(&to.id)
        .bind(from.class.as_str())
        .bind(&from.id)
        .execute(db)
        .await?;
        Ok(result.rows_affected())
    }
}

fn row_to_message(row: &PgRow) -> AppResult<ChatMessage> {
    let from_type: String = row.try_get("from_type")?;
    let to_type: String = row.try_get("to_type")?;
    let from_class = ClientClass::parse(&from_type)
        .ok_or_else(|| AppError::Internal(format!("unknown client class in store: {from_type}")))?;
    let to_class = ClientClass::parse(&to_type)
        .ok_or_else(|| AppError::Internal(format!("unknown client class in store: {to_type}")))?;

    let reactions: serde_json::Value = row.try_get("reactions")?;
    let reactions: ReactionMap = serde_json::from_value(reactions).unwrap_or_default();

    Ok(ChatMessage {
        id: row.try_get("id")?,
        message_id: row.try_get("message_id")?,
        from: Identity::new(from_class, row.try_get::<String, _>("from_id")?),
        from_name: row.try_get("from_name")?,
        to: Identity::new(to_class, row.try_get::<String, _>("to_id")?),
        text: row.try_get("text")?,
        media_type: row.try_get("media_type")?,
        media_url: row.try_get("media_url")?,
        reactions,
        is_read: row.try_get("is_read")?,
        is_delivered: row.try_get("is_delivered")?,
        is_deleted: row.try_get("is_deleted")?,
        created_at: row.try_get("created_at")?,
        edited_at: row.try_get("edited_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
