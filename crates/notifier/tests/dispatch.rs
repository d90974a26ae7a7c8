//! Notifier behavior against in-memory collaborators.
//!
//! Every trait seam is faked; the key manager is real and reads a PEM file
//! written to a temp directory.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use p256::SecretKey;
use p256::pkcs8::LineEnding;
use rand_core::OsRng;

use portal_common::error::AppError;
use portal_common::types::{
    AudienceMember, BenchmarkJob, Clarification, Notification, NotificationContent,
    NotificationMessage, PushSubscription,
};
use portal_notifier::audience::ContestantDirectory;
use portal_notifier::keys::{KeyManager, VapidKeypair};
use portal_notifier::push::{DeliveryOutcome, PushSender};
use portal_notifier::registry::SubscriptionRegistry;
use portal_notifier::store::NotificationStore;
use portal_notifier::{Notifier, NotifyError};

// ============================================================
// Fakes
// ============================================================

#[derive(Default)]
struct FakeDirectory {
    members: Vec<AudienceMember>,
    fail: bool,
}

#[async_trait]
impl ContestantDirectory for FakeDirectory {
    async fn list_teamed(&self) -> Result<Vec<AudienceMember>, AppError> {
        if self.fail {
            return Err(AppError::Internal("contestants unavailable".to_string()));
        }
        Ok(self.members.clone())
    }

    async fn list_by_team(&self, team_id: i64) -> Result<Vec<AudienceMember>, AppError> {
        if self.fail {
            return Err(AppError::Internal("contestants unavailable".to_string()));
        }
        Ok(self
            .members
            .iter()
            .filter(|m| m.team_id == team_id)
            .cloned()
            .collect())
    }
}

/// Store that assigns increasing ids and can fail the n-th insert (0-based).
#[derive(Default)]
struct RecordingStore {
    rows: Mutex<Vec<Notification>>,
    fail_on_insert: Option<usize>,
}

impl RecordingStore {
    fn failing_on(n: usize) -> Self {
        Self {
            fail_on_insert: Some(n),
            ..Default::default()
        }
    }

    fn rows(&self) -> Vec<Notification> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationStore for RecordingStore {
    async fn insert(
        &self,
        contestant_id: &str,
        encoded_message: &str,
    ) -> Result<Notification, AppError> {
        let mut rows = self.rows.lock().unwrap();
        if self.fail_on_insert == Some(rows.len()) {
            return Err(AppError::Internal("write rejected".to_string()));
        }
        let now = Utc::now() - Duration::minutes(5);
        let notification = Notification {
            id: rows.len() as i64 + 100,
            contestant_id: contestant_id.to_string(),
            encoded_message: encoded_message.to_string(),
            read: false,
            created_at: now,
            updated_at: now,
        };
        rows.push(notification.clone());
        Ok(notification)
    }

    async fn list_unread_after(
        &self,
        _contestant_id: &str,
        _after_id: i64,
    ) -> Result<Vec<Notification>, AppError> {
        unimplemented!("the notifier never reads")
    }

    async fn count_unread(&self, _contestant_id: &str) -> Result<i64, AppError> {
        unimplemented!("the notifier never reads")
    }
}

#[derive(Default)]
struct FakeRegistry {
    subscriptions: HashMap<String, Vec<PushSubscription>>,
    fail: bool,
    lookups: AtomicUsize,
}

#[async_trait]
impl SubscriptionRegistry for FakeRegistry {
    async fn list_by_contestants(
        &self,
        contestant_ids: &[String],
    ) -> Result<HashMap<String, Vec<PushSubscription>>, AppError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AppError::Internal("registry unavailable".to_string()));
        }
        Ok(contestant_ids
            .iter()
            .filter_map(|id| {
                self.subscriptions
                    .get(id)
                    .map(|subs| (id.clone(), subs.clone()))
            })
            .collect())
    }
}

/// Push sender with per-endpoint scripted outcomes; defaults to `Delivered`.
#[derive(Default)]
struct ScriptedPush {
    outcomes: HashMap<String, DeliveryOutcome>,
    sent: Mutex<Vec<(String, NotificationMessage)>>,
}

impl ScriptedPush {
    fn sent(&self) -> Vec<(String, NotificationMessage)> {
        self.sent.lock().unwrap().clone()
    }

    fn endpoints(&self) -> Vec<String> {
        self.sent().into_iter().map(|(endpoint, _)| endpoint).collect()
    }
}

#[async_trait]
impl PushSender for ScriptedPush {
    async fn send(
        &self,
        _keypair: &VapidKeypair,
        message: &NotificationMessage,
        subscription: &PushSubscription,
    ) -> DeliveryOutcome {
        self.sent
            .lock()
            .unwrap()
            .push((subscription.endpoint.clone(), message.clone()));
        self.outcomes
            .get(&subscription.endpoint)
            .cloned()
            .unwrap_or(DeliveryOutcome::Delivered)
    }
}

// ============================================================
// Helpers
// ============================================================

fn member(id: &str, team_id: i64) -> AudienceMember {
    AudienceMember {
        id: id.to_string(),
        team_id,
    }
}

/// Team 1: alice, bob, carol. Team 2: dave, erin.
fn roster() -> Vec<AudienceMember> {
    vec![
        member("alice", 1),
        member("bob", 1),
        member("carol", 1),
        member("dave", 2),
        member("erin", 2),
    ]
}

fn subscription(contestant_id: &str, device: u32) -> PushSubscription {
    PushSubscription {
        id: i64::from(device),
        contestant_id: contestant_id.to_string(),
        endpoint: endpoint(contestant_id, device),
        p256dh: "p256dh".to_string(),
        auth: "auth".to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn endpoint(contestant_id: &str, device: u32) -> String {
    format!("https://push.example.com/{}/{}", contestant_id, device)
}

/// One device per contestant in the roster.
fn one_device_each() -> HashMap<String, Vec<PushSubscription>> {
    roster()
        .into_iter()
        .map(|m| {
            let subs = vec![subscription(&m.id, 1)];
            (m.id, subs)
        })
        .collect()
}

fn clarification(team_id: i64, disclosed: Option<bool>) -> Clarification {
    Clarification {
        id: 7,
        team_id,
        disclosed,
        question: Some("Can we cache the leaderboard?".to_string()),
        answer: Some("Yes.".to_string()),
        answered_at: Some(Utc::now()),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn benchmark_job(id: i64, team_id: i64) -> BenchmarkJob {
    BenchmarkJob {
        id,
        team_id,
        status: "finished".to_string(),
        score_raw: Some(12_000),
        score_deduction: Some(0),
        passed: Some(true),
        finished_at: Some(Utc::now()),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// A key manager backed by a freshly generated PEM file.
fn available_keys() -> (tempfile::TempDir, Arc<KeyManager>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vapid_private.pem");
    let pem = SecretKey::random(&mut OsRng)
        .to_sec1_pem(LineEnding::LF)
        .unwrap();
    std::fs::write(&path, pem.as_bytes()).unwrap();
    (dir, Arc::new(KeyManager::new(path)))
}

fn unavailable_keys() -> Arc<KeyManager> {
    Arc::new(KeyManager::new(PathBuf::from(
        "/nonexistent/portal-notifier/vapid_private.pem",
    )))
}

struct Harness {
    store: Arc<RecordingStore>,
    registry: Arc<FakeRegistry>,
    push: Arc<ScriptedPush>,
    notifier: Notifier,
    _key_dir: Option<tempfile::TempDir>,
}

impl Harness {
    fn new(
        directory: FakeDirectory,
        store: RecordingStore,
        registry: FakeRegistry,
        push: ScriptedPush,
        keys_available: bool,
    ) -> Self {
        let (key_dir, keys) = if keys_available {
            let (dir, keys) = available_keys();
            (Some(dir), keys)
        } else {
            (None, unavailable_keys())
        };
        let store = Arc::new(store);
        let registry = Arc::new(registry);
        let push = Arc::new(push);
        let notifier = Notifier::new(
            Arc::new(directory),
            store.clone(),
            registry.clone(),
            push.clone(),
            keys,
        );
        Self {
            store,
            registry,
            push,
            notifier,
            _key_dir: key_dir,
        }
    }

    /// Full roster, one device each, keys available, every push delivered.
    fn standard() -> Self {
        Self::new(
            FakeDirectory {
                members: roster(),
                fail: false,
            },
            RecordingStore::default(),
            FakeRegistry {
                subscriptions: one_device_each(),
                ..Default::default()
            },
            ScriptedPush::default(),
            true,
        )
    }

    /// Decoded stored content per recipient, in insertion order.
    fn stored(&self) -> Vec<(String, NotificationContent)> {
        self.store
            .rows()
            .into_iter()
            .map(|row| {
                let message = NotificationMessage::decode(&row.encoded_message).unwrap();
                (row.contestant_id, message.content)
            })
            .collect()
    }
}

fn owned_flag(content: &NotificationContent) -> bool {
    match content {
        NotificationContent::Clarification(message) => message.owned,
        other => panic!("expected clarification content, got {}", other),
    }
}

// ============================================================
// Audience resolution
// ============================================================

#[tokio::test]
async fn test_disclosed_clarification_broadcasts_with_owned_flag() {
    let h = Harness::standard();

    let report = h
        .notifier
        .notify_clarification_answered(&clarification(1, Some(true)), false)
        .await
        .unwrap();

    assert_eq!(report.recipients, 5);
    assert_eq!(report.persisted, 5);
    assert_eq!(report.delivered, 5);

    let stored = h.stored();
    assert_eq!(stored.len(), 5);
    for (contestant_id, content) in &stored {
        let expected_owned = matches!(contestant_id.as_str(), "alice" | "bob" | "carol");
        assert_eq!(owned_flag(content), expected_owned, "owned flag for {}", contestant_id);
    }
}

#[tokio::test]
async fn test_undisclosed_clarification_reaches_only_asking_team() {
    let h = Harness::standard();

    let report = h
        .notifier
        .notify_clarification_answered(&clarification(2, Some(false)), true)
        .await
        .unwrap();

    assert_eq!(report.recipients, 2);
    let stored = h.stored();
    let recipients: Vec<&str> = stored.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(recipients, vec!["dave", "erin"]);
    for (_, content) in &stored {
        match content {
            NotificationContent::Clarification(message) => {
                assert!(message.owned);
                assert!(message.updated);
                assert_eq!(message.clarification_id, 7);
            }
            other => panic!("unexpected content {}", other),
        }
    }
}

#[tokio::test]
async fn test_undecided_disclosure_is_private() {
    let h = Harness::standard();

    let report = h
        .notifier
        .notify_clarification_answered(&clarification(1, None), false)
        .await
        .unwrap();

    assert_eq!(report.persisted, 3);
    assert!(h.stored().iter().all(|(_, content)| owned_flag(content)));
}

#[tokio::test]
async fn test_benchmark_job_notifies_owning_team() {
    let h = Harness::standard();

    let report = h
        .notifier
        .notify_benchmark_job_finished(&benchmark_job(31, 2))
        .await
        .unwrap();

    assert_eq!(report.persisted, 2);
    for (contestant_id, content) in h.stored() {
        assert!(contestant_id == "dave" || contestant_id == "erin");
        assert_eq!(
            content,
            NotificationContent::BenchmarkJob(portal_common::types::BenchmarkJobMessage {
                benchmark_job_id: 31,
            })
        );
    }
}

#[tokio::test]
async fn test_one_row_per_recipient() {
    let h = Harness::standard();

    h.notifier
        .notify_clarification_answered(&clarification(1, Some(true)), false)
        .await
        .unwrap();

    let mut recipients: Vec<String> = h.store.rows().into_iter().map(|r| r.contestant_id).collect();
    recipients.sort();
    let before = recipients.len();
    recipients.dedup();
    assert_eq!(before, recipients.len());
    assert_eq!(recipients.len(), roster().len());
}

#[tokio::test]
async fn test_empty_team_is_a_no_op() {
    let h = Harness::standard();

    let report = h
        .notifier
        .notify_benchmark_job_finished(&benchmark_job(1, 99))
        .await
        .unwrap();

    assert_eq!(report.recipients, 0);
    assert!(h.store.rows().is_empty());
    assert!(h.push.sent().is_empty());
}

// ============================================================
// Delivery
// ============================================================

#[tokio::test]
async fn test_pushed_message_carries_stored_id_and_time() {
    let h = Harness::standard();

    h.notifier
        .notify_benchmark_job_finished(&benchmark_job(5, 1))
        .await
        .unwrap();

    let rows = h.store.rows();
    let sent = h.push.sent();
    assert_eq!(sent.len(), rows.len());
    for (row, (endpoint_sent, message)) in rows.iter().zip(sent.iter()) {
        assert_eq!(endpoint_sent, &endpoint(&row.contestant_id, 1));
        assert_eq!(message.id, Some(row.id));
        assert_eq!(message.created_at, Some(row.created_at));

        // The stored envelope is content only.
        let stored = NotificationMessage::decode(&row.encoded_message).unwrap();
        assert_eq!(stored.id, None);
        assert_eq!(stored.content, message.content);
    }
}

#[tokio::test]
async fn test_expired_subscription_does_not_stop_the_batch() {
    let mut push = ScriptedPush::default();
    push.outcomes
        .insert(endpoint("alice", 1), DeliveryOutcome::Expired);
    let h = Harness::new(
        FakeDirectory {
            members: roster(),
            fail: false,
        },
        RecordingStore::default(),
        FakeRegistry {
            subscriptions: one_device_each(),
            ..Default::default()
        },
        push,
        true,
    );

    let report = h
        .notifier
        .notify_benchmark_job_finished(&benchmark_job(3, 1))
        .await
        .unwrap();

    assert_eq!(report.persisted, 3);
    assert_eq!(report.expired, 1);
    assert_eq!(report.delivered, 2);
    assert_eq!(
        h.push.endpoints(),
        vec![endpoint("alice", 1), endpoint("bob", 1), endpoint("carol", 1)]
    );
}

#[tokio::test]
async fn test_every_device_is_attempted_despite_failures() {
    let mut subscriptions = HashMap::new();
    subscriptions.insert(
        "alice".to_string(),
        vec![
            subscription("alice", 1),
            subscription("alice", 2),
            subscription("alice", 3),
        ],
    );
    let mut push = ScriptedPush::default();
    push.outcomes.insert(
        endpoint("alice", 1),
        DeliveryOutcome::TransportError("timed out".to_string()),
    );
    push.outcomes
        .insert(endpoint("alice", 2), DeliveryOutcome::Invalid);
    let h = Harness::new(
        FakeDirectory {
            members: roster(),
            fail: false,
        },
        RecordingStore::default(),
        FakeRegistry {
            subscriptions,
            ..Default::default()
        },
        push,
        true,
    );

    let report = h
        .notifier
        .notify_clarification_answered(&clarification(1, Some(false)), false)
        .await
        .unwrap();

    // bob and carol have no devices: stored, never pushed.
    assert_eq!(report.persisted, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(report.invalid, 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(h.push.sent().len(), 3);
    assert!(!report.delivery_skipped);
}

#[tokio::test]
async fn test_unavailable_keypair_persists_without_pushing() {
    let h = Harness::new(
        FakeDirectory {
            members: roster(),
            fail: false,
        },
        RecordingStore::default(),
        FakeRegistry {
            subscriptions: one_device_each(),
            ..Default::default()
        },
        ScriptedPush::default(),
        false,
    );

    let report = h
        .notifier
        .notify_clarification_answered(&clarification(1, Some(true)), false)
        .await
        .unwrap();

    assert_eq!(report.persisted, 5);
    assert!(report.delivery_skipped);
    assert!(h.push.sent().is_empty());
    assert_eq!(h.registry.lookups.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_subscription_lookup_is_batched() {
    let h = Harness::standard();

    h.notifier
        .notify_clarification_answered(&clarification(1, Some(true)), false)
        .await
        .unwrap();

    assert_eq!(h.registry.lookups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_subscription_lookup_failure_skips_delivery_only() {
    let h = Harness::new(
        FakeDirectory {
            members: roster(),
            fail: false,
        },
        RecordingStore::default(),
        FakeRegistry {
            subscriptions: one_device_each(),
            fail: true,
            ..Default::default()
        },
        ScriptedPush::default(),
        true,
    );

    let report = h
        .notifier
        .notify_benchmark_job_finished(&benchmark_job(8, 1))
        .await
        .unwrap();

    assert_eq!(report.persisted, 3);
    assert!(report.delivery_skipped);
    assert!(h.push.sent().is_empty());
}

// ============================================================
// Fatal errors
// ============================================================

#[tokio::test]
async fn test_persistence_failure_aborts_remaining_recipients() {
    let h = Harness::new(
        FakeDirectory {
            members: roster(),
            fail: false,
        },
        RecordingStore::failing_on(1),
        FakeRegistry {
            subscriptions: one_device_each(),
            ..Default::default()
        },
        ScriptedPush::default(),
        true,
    );

    let result = h
        .notifier
        .notify_clarification_answered(&clarification(1, Some(true)), false)
        .await;

    assert!(matches!(result, Err(NotifyError::Persistence(_))));
    assert_eq!(h.store.rows().len(), 1);
    // Only the recipient persisted before the failure was pushed.
    assert_eq!(h.push.endpoints(), vec![endpoint("alice", 1)]);
}

#[tokio::test]
async fn test_audience_failure_is_fatal_and_writes_nothing() {
    let h = Harness::new(
        FakeDirectory {
            members: roster(),
            fail: true,
        },
        RecordingStore::default(),
        FakeRegistry::default(),
        ScriptedPush::default(),
        true,
    );

    let result = h
        .notifier
        .notify_benchmark_job_finished(&benchmark_job(1, 1))
        .await;

    assert!(matches!(result, Err(NotifyError::AudienceResolution(_))));
    assert!(h.store.rows().is_empty());
    assert!(h.push.sent().is_empty());
}
