use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};

use crate::{
    db::DbPool,
    error::{AppError, Result},
    models::{
        notification::{NewNotification, Notification, Recipient},
        user::Role,
    },
};

/// Persisted notifications; `dedup_key` keeps each one unique across restarts
#[derive(Clone)]
pub struct NotificationStore {
    pool: DbPool,
}

impl NotificationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Returns `None` when a notification with the same key already exists.
    pub async fn insert(&self, new: &NewNotification) -> Result<Option<Notification>> {
        let (user_id, role) = match new.recipient {
            Recipient::User(id) => (Some(id), None),
            Recipient::Role(role) => (None, Some(role)),
        };
        let (entity_type, entity_id) = match new.entity {
            Some((kind, id)) => (Some(kind), Some(id)),
            None => (None, None),
        };

        let result = sqlx::query(
            r#"
            INSERT INTO notifications (
                dedup_key, kind, title, message, recipient_user_id, recipient_role,
                entity_type, entity_id, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(dedup_key) DO NOTHING
            "#,
        )
        .bind(&new.dedup_key)
        .bind(new.kind)
        .bind(&new.title)
        .bind(&new.message)
        .bind(user_id)
        .bind(role)
        .bind(entity_type)
        .bind(entity_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let notification = sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = ?")
            .bind(result.last_insert_rowid())
            .fetch_one(&self.pool)
            .await?;
        Ok(Some(notification))
    }

    /// Notifications addressed to the user directly or to their role, newest first
    pub async fn list_for(&self, user_id: i64, role: Role, unread_only: bool) -> Result<Vec<Notification>> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT * FROM notifications WHERE (recipient_user_id = ",
        );
        query
            .push_bind(user_id)
            .push(" OR recipient_role = ")
            .push_bind(role)
            .push(")");
        if unread_only {
            query.push(" AND read_at IS NULL");
        }
        query.push(" ORDER BY created_at DESC, id DESC LIMIT 200");

        let notifications = query
            .build_query_as::<Notification>()
            .fetch_all(&self.pool)
            .await?;
        Ok(notifications)
    }

    pub async fn mark_read(&self, id: i64, user_id: i64, role: Role) -> Result<Notification> {
        let notification = sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .filter(|n| n.is_for(user_id, role))
            .ok_or_else(|| AppError::not_found("Notification", id))?;

        if notification.read_at.is_some() {
            return Ok(notification);
        }

        sqlx::query("UPDATE notifications SET read_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        let updated = sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(updated)
    }

    /// Returns how many notifications were marked
    pub async fn mark_all_read(&self, user_id: i64, role: Role) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE notifications SET read_at = ?
            WHERE read_at IS NULL AND (recipient_user_id = ? OR recipient_role = ?)
            "#,
        )
        .bind(Utc::now())
        .bind(user_id)
        .bind(role)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
