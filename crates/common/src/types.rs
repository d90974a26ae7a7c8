use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A contestant resolved as a recipient of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AudienceMember {
    pub id: String,
    pub team_id: i64,
}

/// A clarification request, as recorded by the contest portal.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Clarification {
    pub id: i64,
    /// The team that asked the question
    pub team_id: i64,
    /// NULL until an admin decides; only `Some(true)` broadcasts the answer
    pub disclosed: Option<bool>,
    pub question: Option<String>,
    pub answer: Option<String>,
    pub answered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Clarification {
    pub fn is_disclosed(&self) -> bool {
        self.disclosed == Some(true)
    }
}

/// A benchmark job, as recorded by the job scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BenchmarkJob {
    pub id: i64,
    pub team_id: i64,
    pub status: String,
    pub score_raw: Option<i64>,
    pub score_deduction: Option<i64>,
    pub passed: Option<bool>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted per-contestant notification.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: i64,
    pub contestant_id: String,
    /// Output of [`NotificationMessage::encode`]
    pub encoded_message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A browser push endpoint registered by a contestant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PushSubscription {
    pub id: i64,
    pub contestant_id: String,
    /// Push service endpoint URL
    pub endpoint: String,
    /// Browser's P-256 ECDH public key (base64url)
    pub p256dh: String,
    /// Shared auth secret (base64url)
    pub auth: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload of a clarification-answered notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationMessage {
    pub clarification_id: i64,
    /// True when the recipient's team asked the question
    pub owned: bool,
    /// True when an existing answer was edited rather than answered for the first time
    pub updated: bool,
}

/// Payload of a benchmark-job-finished notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkJobMessage {
    pub benchmark_job_id: i64,
}

/// The kinds of content a notification can carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationContent {
    Clarification(ClarificationMessage),
    BenchmarkJob(BenchmarkJobMessage),
}

impl std::fmt::Display for NotificationContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationContent::Clarification(_) => write!(f, "clarification"),
            NotificationContent::BenchmarkJob(_) => write!(f, "benchmark_job"),
        }
    }
}

/// The message rendered by clients, both from the poll API and from push.
///
/// `id` and `created_at` are unset until the notification is persisted; the
/// stored envelope therefore carries only the content, while the pushed one
/// carries the row's identifying metadata too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub content: NotificationContent,
}

impl NotificationMessage {
    pub fn new(content: NotificationContent) -> Self {
        Self {
            id: None,
            created_at: None,
            content,
        }
    }

    /// Copy of this message carrying a persisted row's id and creation time.
    pub fn stamped(&self, id: i64, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Some(id),
            created_at: Some(created_at),
            content: self.content.clone(),
        }
    }

    /// Serialize into the opaque envelope: JSON, then standard base64.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(BASE64.encode(json))
    }

    pub fn decode(encoded: &str) -> Result<Self, AppError> {
        let json = BASE64
            .decode(encoded)
            .map_err(|e| AppError::Decode(format!("Invalid notification envelope: {}", e)))?;
        serde_json::from_slice(&json)
            .map_err(|e| AppError::Decode(format!("Invalid notification message: {}", e)))
    }
}
