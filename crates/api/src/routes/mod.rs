pub mod events;
pub mod health;
pub mod notifications;
pub mod push_subscriptions;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(notifications::router())
        .merge(push_subscriptions::router())
        .merge(events::router())
        .with_state(state)
}
