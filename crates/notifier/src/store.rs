//! Notification store: the system of record for per-contestant notifications.
//!
//! Identifiers come from a `BIGSERIAL` column, so they increase in insertion
//! order and double as the poll watermark for the read API.

use async_trait::async_trait;
use sqlx::PgPool;

use portal_common::error::AppError;
use portal_common::types::Notification;

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist a notification and return the row with its assigned id and timestamps.
    async fn insert(
        &self,
        contestant_id: &str,
        encoded_message: &str,
    ) -> Result<Notification, AppError>;

    /// Return the contestant's unread notifications with `id > after_id` in
    /// ascending id order, marking each returned row as read.
    async fn list_unread_after(
        &self,
        contestant_id: &str,
        after_id: i64,
    ) -> Result<Vec<Notification>, AppError>;

    /// Number of notifications the contestant has not polled yet.
    async fn count_unread(&self, contestant_id: &str) -> Result<i64, AppError>;
}

/// PostgreSQL-backed notification store.
#[derive(Clone)]
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn insert(
        &self,
        contestant_id: &str,
        encoded_message: &str,
    ) -> Result<Notification, AppError> {
        let notification: Notification = sqlx::query_as(
            r#"
            INSERT INTO notifications (contestant_id, encoded_message, read, created_at, updated_at)
            VALUES ($1, $2, FALSE, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(contestant_id)
        .bind(encoded_message)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(
            notification_id = notification.id,
            contestant_id = %contestant_id,
            "Notification stored"
        );

        Ok(notification)
    }

    async fn list_unread_after(
        &self,
        contestant_id: &str,
        after_id: i64,
    ) -> Result<Vec<Notification>, AppError> {
        // Marking and reading in one statement keeps two concurrent polls
        // from both receiving the same rows.
        let notifications: Vec<Notification> = sqlx::query_as(
            r#"
            WITH marked AS (
                UPDATE notifications
                SET read = TRUE, updated_at = NOW()
                WHERE contestant_id = $1
                  AND id > $2
                  AND read = FALSE
                RETURNING *
            )
            SELECT * FROM marked ORDER BY id ASC
            "#,
        )
        .bind(contestant_id)
        .bind(after_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(notifications)
    }

    async fn count_unread(&self, contestant_id: &str) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notifications WHERE contestant_id = $1 AND read = FALSE",
        )
        .bind(contestant_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
