//! Shared application state for the Axum API server.

use std::sync::Arc;
use std::time::Duration;

use portal_common::config::AppConfig;
use portal_notifier::Notifier;
use portal_notifier::audience::{EventLookup, PgContestantDirectory};
use portal_notifier::keys::KeyManager;
use portal_notifier::push::{WebPushClient, WebPushConfig};
use portal_notifier::registry::PgSubscriptionRegistry;
use portal_notifier::store::PgNotificationStore;
use sqlx::PgPool;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub notifications: PgNotificationStore,
    pub subscriptions: PgSubscriptionRegistry,
    pub events: EventLookup,
    pub keys: Arc<KeyManager>,
    pub notifier: Arc<Notifier>,
}

impl AppState {
    /// Wire the notifier and its Postgres collaborators from one pool.
    pub fn new(pool: PgPool, config: AppConfig) -> anyhow::Result<Self> {
        let notifications = PgNotificationStore::new(pool.clone());
        let subscriptions = PgSubscriptionRegistry::new(pool.clone());
        let keys = Arc::new(KeyManager::new(config.vapid_private_key_path.clone()));

        let push = WebPushClient::new(WebPushConfig {
            subject: config.webpush_subject.clone(),
            timeout: Duration::from_millis(config.webpush_timeout_ms),
            ttl_seconds: config.webpush_ttl_seconds,
        })?;

        let notifier = Notifier::new(
            Arc::new(PgContestantDirectory::new(pool.clone())),
            Arc::new(notifications.clone()),
            Arc::new(subscriptions.clone()),
            Arc::new(push),
            keys.clone(),
        );

        Ok(Self {
            events: EventLookup::new(pool),
            config,
            notifications,
            subscriptions,
            keys,
            notifier: Arc::new(notifier),
        })
    }
}
