use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

use crate::error::{AppError, AppResult};
use crate::models::{ClientClass, Identity, OfflineNotification, Urgency};

#[derive(Debug, Clone)]
pub struct NewNotification<'a> {
    pub notification_id: &'a str,
    pub to: &'a Identity,
    pub title: &'a str,
    pub body: &'a str,
    pub data: &'a Value,
    pub urgency: Urgency,
    pub expires_at: DateTime<Utc>,
}

pub struct NotificationStore;

impl NotificationStore {
    pub async fn insert(
        db: &Pool<Postgres>,
        new: &NewNotification<'_>,
    ) -> AppResult<Option<OfflineNotification>> {
        let row = sqlx::query(
            "INSERT INTO offline_notifications \
                (notification_id, to_type, to_id, title, body, data, urgency, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (notification_id) DO NOTHING \
             RETURNING *",
        )
        .bind(new.notification_id)
        .bind(new.to.class.as_str())
        .bind(&new.to.id)
        .bind(new.title)
        .bind(new.body)
        .bind(new.data)
        .bind(new.urgency.as_str())
        .bind(new.expires_at)
        .fetch_optional(db)
        .await?;
        row.map(|r| row_to_notification(&r)).transpose()
    }

    /// Pending backlog for a recipient, oldest first. Rows past their expiry
    /// are left for the external purge and never replayed.
    pub async fn undelivered_for(
        db: &Pool<Postgres>,
        to: &Identity,
    ) -> AppResult<Vec<OfflineNotification>> {
        let rows = sqlx::query(
            "SELECT * FROM offline_notifications \
             WHERE to_type = $1 AND to_id = $2 AND is_delivered = FALSE \
               AND expires_at > NOW() \
             ORDER BY created_at ASC",
        )
        .bind(to.class.as_str())
        .bind(&to.id)
        .fetch_all(db)
        .await?;
        rows.iter().map(row_to_notification).collect()
    }

    pub async fn mark_delivered(db: &Pool<Postgres>, notification_id: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE offline_notifications \
             SET is_delivered = TRUE, delivered_at = NOW() \
             WHERE notification_id = $1",
        )
        .bind(notification_id)
        .execute(db)
        .await?;
        Ok(())
    }
}

fn row_to_notification(row: &PgRow) -> AppResult<OfflineNotification> {
    let to_type: String = row.try_get("to_type")?;
    let to_class = ClientClass::parse(&to_type)
        .ok_or_else(|| AppError::Internal(format!("unknown client class in store: {to_type}")))?;
    let urgency: String = row.try_get("urgency")?;

    Ok(OfflineNotification {
        id: row.try_get("id")?,
        notification_id: row.try_get("notification_id")?,
        to: Identity::new(to_class, row.try_get::<String, _>("to_id")?),
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        data: row.try_get("data")?,
        urgency: Urgency::parse(&urgency).unwrap_or_default(),
        is_delivered: row.try_get("is_delivered")?,
        delivered_at: row.try_get("delivered_at")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}
