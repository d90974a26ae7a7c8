//! Subscription registry: maps contestants to their browser push endpoints.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;

use portal_common::error::AppError;
use portal_common::types::PushSubscription;

#[async_trait]
pub trait SubscriptionRegistry: Send + Sync {
    /// Batched lookup of every subscription owned by the given contestants.
    ///
    /// Contestants without subscriptions are absent from the returned map.
    async fn list_by_contestants(
        &self,
        contestant_ids: &[String],
    ) -> Result<HashMap<String, Vec<PushSubscription>>, AppError>;
}

/// PostgreSQL-backed subscription registry.
#[derive(Clone)]
pub struct PgSubscriptionRegistry {
    pool: PgPool,
}

impl PgSubscriptionRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register a browser push endpoint for a contestant.
    ///
    /// Endpoints are unique: re-registering an endpoint replaces its keys and
    /// moves it to the new owner.
    pub async fn register(
        &self,
        contestant_id: &str,
        endpoint: &str,
        p256dh: &str,
        auth: &str,
    ) -> Result<PushSubscription, AppError> {
        if endpoint.is_empty() || p256dh.is_empty() || auth.is_empty() {
            return Err(AppError::Validation(
                "endpoint, p256dh and auth are required".to_string(),
            ));
        }

        let subscription: PushSubscription = sqlx::query_as(
            r#"
            INSERT INTO push_subscriptions (contestant_id, endpoint, p256dh, auth, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            ON CONFLICT (endpoint) DO UPDATE
            SET contestant_id = EXCLUDED.contestant_id,
                p256dh = EXCLUDED.p256dh,
                auth = EXCLUDED.auth,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(contestant_id)
        .bind(endpoint)
        .bind(p256dh)
        .bind(auth)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            subscription_id = subscription.id,
            contestant_id = %contestant_id,
            "Push subscription registered"
        );

        Ok(subscription)
    }

    /// Remove a contestant's endpoint. Returns true if it was deleted.
    pub async fn unregister(&self, contestant_id: &str, endpoint: &str) -> Result<bool, AppError> {
        let result =
            sqlx::query("DELETE FROM push_subscriptions WHERE contestant_id = $1 AND endpoint = $2")
                .bind(contestant_id)
                .bind(endpoint)
                .execute(&self.pool)
                .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            tracing::info!(contestant_id = %contestant_id, "Push subscription removed");
        }

        Ok(deleted)
    }
}

#[async_trait]
impl SubscriptionRegistry for PgSubscriptionRegistry {
    async fn list_by_contestants(
        &self,
        contestant_ids: &[String],
    ) -> Result<HashMap<String, Vec<PushSubscription>>, AppError> {
        if contestant_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let subscriptions: Vec<PushSubscription> = sqlx::query_as(
            "SELECT * FROM push_subscriptions WHERE contestant_id = ANY($1) ORDER BY id",
        )
        .bind(contestant_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(group_by_contestant(subscriptions))
    }
}

pub(crate) fn group_by_contestant(
    subscriptions: Vec<PushSubscription>,
) -> HashMap<String, Vec<PushSubscription>> {
    let mut grouped: HashMap<String, Vec<PushSubscription>> = HashMap::new();
    for subscription in subscriptions {
        grouped
            .entry(subscription.contestant_id.clone())
            .or_default()
            .push(subscription);
    }
    grouped
}
