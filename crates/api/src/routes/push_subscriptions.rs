//! Push subscription routes: browser registration and the VAPID public key.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use portal_common::error::AppError;
use portal_common::types::PushSubscription;

use crate::middleware::auth::AuthContestant;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/contestant/push_subscriptions",
            post(create_push_subscription).delete(delete_push_subscription),
        )
        .route(
            "/api/contestant/push_subscriptions/vapid_key",
            get(vapid_public_key),
        )
}

#[derive(Debug, Deserialize)]
pub struct CreatePushSubscriptionRequest {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Deserialize)]
pub struct DeletePushSubscriptionRequest {
    pub endpoint: String,
}

#[derive(Debug, Serialize)]
pub struct VapidKeyResponse {
    pub public_key: String,
}

/// GET /api/contestant/push_subscriptions/vapid_key: The `applicationServerKey`
/// browsers subscribe with. 404 while push delivery is disabled.
async fn vapid_public_key(
    State(state): State<AppState>,
    _auth: AuthContestant,
) -> Result<Json<VapidKeyResponse>, AppError> {
    let public_key = state
        .keys
        .public_key()
        .await
        .ok_or_else(|| AppError::NotFound("Web push is not configured".to_string()))?;
    Ok(Json(VapidKeyResponse { public_key }))
}

/// POST /api/contestant/push_subscriptions: Register a browser endpoint.
async fn create_push_subscription(
    State(state): State<AppState>,
    auth: AuthContestant,
    Json(req): Json<CreatePushSubscriptionRequest>,
) -> Result<Json<PushSubscription>, AppError> {
    let subscription = state
        .subscriptions
        .register(&auth.contestant_id, &req.endpoint, &req.p256dh, &req.auth)
        .await?;
    Ok(Json(subscription))
}

/// DELETE /api/contestant/push_subscriptions: Remove a browser endpoint.
async fn delete_push_subscription(
    State(state): State<AppState>,
    auth: AuthContestant,
    Json(req): Json<DeletePushSubscriptionRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = state
        .subscriptions
        .unregister(&auth.contestant_id, &req.endpoint)
        .await?;
    if deleted {
        Ok(Json(serde_json::json!({"deleted": true})))
    } else {
        Err(AppError::NotFound("Push subscription not found".to_string()))
    }
}
