use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::user::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum NotificationKind {
    FollowUpDue,
    InvoiceOverdue,
    DailyPendingDigest,
    WeeklySummary,
    QuotationSubmitted,
    QuotationDecided,
}

/// Stored dashboard notification
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: i64,
    pub dedup_key: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub recipient_user_id: Option<i64>,
    pub recipient_role: Option<Role>,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn is_for(&self, user_id: i64, role: Role) -> bool {
        self.recipient_user_id == Some(user_id) || self.recipient_role == Some(role)
    }
}

/// Who should see a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    User(i64),
    Role(Role),
}

/// Notification candidate, written at most once per `dedup_key`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub dedup_key: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub recipient: Recipient,
    pub entity: Option<(&'static str, i64)>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationFilter {
    #[serde(default)]
    pub unread_only: bool,
}
