//! Notification poll route.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use portal_common::error::AppError;
use portal_common::types::{Notification, NotificationMessage};
use portal_notifier::store::NotificationStore;

use crate::middleware::auth::AuthContestant;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/contestant/notifications", get(list_notifications))
}

#[derive(Debug, Deserialize)]
pub struct PollQuery {
    /// Last notification id the client has already seen
    #[serde(default)]
    pub after: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationView {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub read: bool,
    pub message: NotificationMessage,
}

impl TryFrom<Notification> for NotificationView {
    type Error = AppError;

    fn try_from(row: Notification) -> Result<Self, Self::Error> {
        let message =
            NotificationMessage::decode(&row.encoded_message)?.stamped(row.id, row.created_at);
        Ok(Self {
            id: row.id,
            created_at: row.created_at,
            read: row.read,
            message,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PollResponse {
    pub notifications: Vec<NotificationView>,
    /// Unread notifications left after this poll
    pub unread_count: i64,
}

/// GET /api/contestant/notifications?after=<id>: New notifications in ascending
/// id order. Returned rows are marked read. Rows whose payload cannot be
/// decoded are logged and left out.
async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthContestant,
    Query(query): Query<PollQuery>,
) -> Result<Json<PollResponse>, AppError> {
    let rows = state
        .notifications
        .list_unread_after(&auth.contestant_id, query.after)
        .await?;
    let unread_count = state.notifications.count_unread(&auth.contestant_id).await?;

    // Rows are already marked read. A bad payload is dropped, never fatal.
    let notifications = rows
        .into_iter()
        .filter_map(|row| {
            let notification_id = row.id;
            match NotificationView::try_from(row) {
                Ok(view) => Some(view),
                Err(e) => {
                    tracing::warn!(
                        notification_id,
                        contestant_id = %auth.contestant_id,
                        error = %e,
                        "Skipping undecodable notification"
                    );
                    None
                }
            }
        })
        .collect();

    Ok(Json(PollResponse {
        notifications,
        unread_count,
    }))
}
