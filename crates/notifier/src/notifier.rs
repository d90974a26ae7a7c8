//! Notifier: turns contest events into stored notifications and push messages.
//!
//! For each event:
//! 1. Resolve the audience (broadcast or one team)
//! 2. Resolve the VAPID keypair once for the batch
//! 3. Batch-fetch push subscriptions for the whole audience
//! 4. Per recipient: persist the notification, then push it to every subscription
//!
//! Persistence failures abort the batch. Delivery failures are logged, counted
//! in the [`DispatchReport`], and never leave the recipient's iteration.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use portal_common::error::AppError;
use portal_common::types::{
    AudienceMember, BenchmarkJob, BenchmarkJobMessage, Clarification, ClarificationMessage,
    NotificationContent, NotificationMessage, PushSubscription,
};

use crate::audience::ContestantDirectory;
use crate::keys::{KeyManager, VapidKeypair};
use crate::push::{DeliveryOutcome, PushSender};
use crate::registry::SubscriptionRegistry;
use crate::store::NotificationStore;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("audience resolution failed: {0}")]
    AudienceResolution(#[source] AppError),

    #[error("notification persistence failed: {0}")]
    Persistence(#[source] AppError),

    #[error("notification encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl From<NotifyError> for AppError {
    fn from(err: NotifyError) -> Self {
        match err {
            NotifyError::AudienceResolution(inner) | NotifyError::Persistence(inner) => inner,
            NotifyError::Encoding(e) => AppError::Internal(format!("Notification encoding: {}", e)),
        }
    }
}

/// Summary of one dispatched event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Contestants in the resolved audience
    pub recipients: usize,
    /// Notification rows written
    pub persisted: usize,
    pub delivered: usize,
    pub expired: usize,
    pub invalid: usize,
    /// Transport errors and timeouts
    pub failed: usize,
    /// True when no push was attempted for the batch (keypair or subscriptions unavailable)
    pub delivery_skipped: bool,
}

impl DispatchReport {
    fn record(&mut self, outcome: &DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Delivered => self.delivered += 1,
            DeliveryOutcome::Expired => self.expired += 1,
            DeliveryOutcome::Invalid => self.invalid += 1,
            DeliveryOutcome::TransportError(_) => self.failed += 1,
        }
    }
}

/// Orchestrates audience resolution, persistence and push fan-out.
pub struct Notifier {
    directory: Arc<dyn ContestantDirectory>,
    store: Arc<dyn NotificationStore>,
    registry: Arc<dyn SubscriptionRegistry>,
    push: Arc<dyn PushSender>,
    keys: Arc<KeyManager>,
}

impl Notifier {
    pub fn new(
        directory: Arc<dyn ContestantDirectory>,
        store: Arc<dyn NotificationStore>,
        registry: Arc<dyn SubscriptionRegistry>,
        push: Arc<dyn PushSender>,
        keys: Arc<KeyManager>,
    ) -> Self {
        Self {
            directory,
            store,
            registry,
            push,
            keys,
        }
    }

    /// Notify contestants that a clarification was answered.
    ///
    /// Disclosed answers go to every teamed contestant, others only to the
    /// asking team. `owned` is set per recipient.
    pub async fn notify_clarification_answered(
        &self,
        clarification: &Clarification,
        updated: bool,
    ) -> Result<DispatchReport, NotifyError> {
        let audience = if clarification.is_disclosed() {
            self.directory.list_teamed().await
        } else {
            self.directory.list_by_team(clarification.team_id).await
        }
        .map_err(NotifyError::AudienceResolution)?;

        tracing::debug!(
            clarification_id = clarification.id,
            team_id = clarification.team_id,
            disclosed = clarification.is_disclosed(),
            recipients = audience.len(),
            "Dispatching clarification answer"
        );

        let report = self
            .dispatch(&audience, |member| {
                NotificationContent::Clarification(ClarificationMessage {
                    clarification_id: clarification.id,
                    owned: member.team_id == clarification.team_id,
                    updated,
                })
            })
            .await?;

        tracing::info!(
            clarification_id = clarification.id,
            recipients = report.recipients,
            delivered = report.delivered,
            expired = report.expired,
            invalid = report.invalid,
            failed = report.failed,
            "Clarification notifications dispatched"
        );

        Ok(report)
    }

    /// Notify a team that one of its benchmark jobs finished.
    pub async fn notify_benchmark_job_finished(
        &self,
        job: &BenchmarkJob,
    ) -> Result<DispatchReport, NotifyError> {
        let audience = self
            .directory
            .list_by_team(job.team_id)
            .await
            .map_err(NotifyError::AudienceResolution)?;

        let report = self
            .dispatch(&audience, |_| {
                NotificationContent::BenchmarkJob(BenchmarkJobMessage {
                    benchmark_job_id: job.id,
                })
            })
            .await?;

        tracing::info!(
            benchmark_job_id = job.id,
            team_id = job.team_id,
            recipients = report.recipients,
            delivered = report.delivered,
            expired = report.expired,
            invalid = report.invalid,
            failed = report.failed,
            "Benchmark job notifications dispatched"
        );

        Ok(report)
    }

    async fn dispatch<F>(
        &self,
        audience: &[AudienceMember],
        build_content: F,
    ) -> Result<DispatchReport, NotifyError>
    where
        F: Fn(&AudienceMember) -> NotificationContent,
    {
        let mut report = DispatchReport {
            recipients: audience.len(),
            ..Default::default()
        };
        if audience.is_empty() {
            return Ok(report);
        }

        let keypair = self.keys.keypair().await;
        let subscriptions = match keypair {
            Some(_) => self.subscriptions_for(audience).await,
            None => None,
        };
        let delivery = keypair.as_deref().zip(subscriptions.as_ref());
        report.delivery_skipped = delivery.is_none();

        for member in audience {
            let message = NotificationMessage::new(build_content(member));
            let notification = self
                .store
                .insert(&member.id, &message.encode()?)
                .await
                .map_err(NotifyError::Persistence)?;
            report.persisted += 1;

            let Some((keypair, subscriptions)) = delivery else {
                continue;
            };
            let Some(targets) = subscriptions.get(&member.id) else {
                continue;
            };

            let stamped = message.stamped(notification.id, notification.created_at);
            for subscription in targets {
                let outcome = self.deliver(keypair, &stamped, subscription).await;
                report.record(&outcome);
            }
        }

        Ok(report)
    }

    /// Batch subscription lookup. `None` disables delivery for the batch.
    async fn subscriptions_for(
        &self,
        audience: &[AudienceMember],
    ) -> Option<HashMap<String, Vec<PushSubscription>>> {
        let ids: Vec<String> = audience.iter().map(|member| member.id.clone()).collect();
        match self.registry.list_by_contestants(&ids).await {
            Ok(subscriptions) => Some(subscriptions),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    recipients = ids.len(),
                    "Push subscription lookup failed, skipping delivery for this batch"
                );
                None
            }
        }
    }

    async fn deliver(
        &self,
        keypair: &VapidKeypair,
        message: &NotificationMessage,
        subscription: &PushSubscription,
    ) -> DeliveryOutcome {
        let outcome = self.push.send(keypair, message, subscription).await;

        match &outcome {
            DeliveryOutcome::Delivered => tracing::debug!(
                notification_id = ?message.id,
                contestant_id = %subscription.contestant_id,
                subscription_id = subscription.id,
                "Push delivered"
            ),
            DeliveryOutcome::Expired | DeliveryOutcome::Invalid => tracing::info!(
                notification_id = ?message.id,
                contestant_id = %subscription.contestant_id,
                subscription_id = subscription.id,
                endpoint = %subscription.endpoint,
                outcome = %outcome,
                "Push subscription rejected by push service"
            ),
            DeliveryOutcome::TransportError(reason) => tracing::warn!(
                notification_id = ?message.id,
                contestant_id = %subscription.contestant_id,
                subscription_id = subscription.id,
                error = %reason,
                "Push delivery failed"
            ),
        }

        outcome
    }
}
