//! Web push delivery (RFC 8030) with VAPID authentication (RFC 8292).
//!
//! Payloads are encrypted with the `web-push` crate (RFC 8291, aes128gcm) and
//! sent through a shared `reqwest::Client`. Each send is classified into a
//! [`DeliveryOutcome`]; nothing is retried here.

use std::time::Duration;

use async_trait::async_trait;
use web_push::{
    ContentEncoding, SubscriptionInfo, VapidSignatureBuilder, WebPushMessage,
    WebPushMessageBuilder,
};

use portal_common::types::{NotificationMessage, PushSubscription};

use crate::keys::VapidKeypair;

/// Terminal result of one delivery attempt to one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// 410 Gone: the browser dropped the subscription.
    Expired,
    /// 404 Not Found: unknown or malformed endpoint.
    Invalid,
    /// Network failure, timeout, or any other status. Safe to retry later.
    TransportError(String),
}

impl DeliveryOutcome {
    /// Map a push service HTTP status onto an outcome.
    pub fn classify_status(status: u16) -> Self {
        match status {
            200..=299 => DeliveryOutcome::Delivered,
            410 => DeliveryOutcome::Expired,
            404 => DeliveryOutcome::Invalid,
            _ => DeliveryOutcome::TransportError(format!("push service returned HTTP {}", status)),
        }
    }
}

impl std::fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryOutcome::Delivered => write!(f, "delivered"),
            DeliveryOutcome::Expired => write!(f, "expired"),
            DeliveryOutcome::Invalid => write!(f, "invalid"),
            DeliveryOutcome::TransportError(reason) => write!(f, "transport error: {}", reason),
        }
    }
}

#[async_trait]
pub trait PushSender: Send + Sync {
    /// Deliver one message to one subscription.
    async fn send(
        &self,
        keypair: &VapidKeypair,
        message: &NotificationMessage,
        subscription: &PushSubscription,
    ) -> DeliveryOutcome;
}

/// Settings for [`WebPushClient`].
#[derive(Debug, Clone)]
pub struct WebPushConfig {
    /// VAPID `sub` claim
    pub subject: String,
    /// Bound on a single delivery request
    pub timeout: Duration,
    /// How long the push service may hold an undelivered message, in seconds
    pub ttl_seconds: u32,
}

/// Web push sender over HTTP.
#[derive(Debug, Clone)]
pub struct WebPushClient {
    http: reqwest::Client,
    config: WebPushConfig,
}

impl WebPushClient {
    pub fn new(config: WebPushConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    /// Encrypt and sign a message for one subscription.
    fn build_message(
        &self,
        keypair: &VapidKeypair,
        payload: &[u8],
        subscription: &PushSubscription,
    ) -> Result<WebPushMessage, web_push::WebPushError> {
        let sub_info =
            SubscriptionInfo::new(&subscription.endpoint, &subscription.p256dh, &subscription.auth);

        let mut sig_builder =
            VapidSignatureBuilder::from_base64(keypair.private_key_base64url(), &sub_info)?;
        sig_builder.add_claim("sub", self.config.subject.as_str());
        let signature = sig_builder.build()?;

        let mut builder = WebPushMessageBuilder::new(&sub_info);
        builder.set_payload(ContentEncoding::Aes128Gcm, payload);
        builder.set_vapid_signature(signature);
        builder.set_ttl(self.config.ttl_seconds);
        builder.build()
    }

    async fn post(&self, message: WebPushMessage) -> Result<u16, reqwest::Error> {
        let mut request = self
            .http
            .post(message.endpoint.to_string())
            .header("TTL", message.ttl.to_string());

        if let Some(urgency) = message.urgency {
            request = request.header("Urgency", urgency.to_string());
        }

        if let Some(topic) = message.topic {
            request = request.header("Topic", topic);
        }

        if let Some(push_payload) = message.payload {
            request = request
                .header("Content-Encoding", push_payload.content_encoding.to_str())
                .header("Content-Type", "application/octet-stream");

            for (key, value) in &push_payload.crypto_headers {
                request = request.header(*key, value.as_str());
            }

            request = request.body(push_payload.content);
        }

        let response = request.send().await?;
        Ok(response.status().as_u16())
    }
}

#[async_trait]
impl PushSender for WebPushClient {
    async fn send(
        &self,
        keypair: &VapidKeypair,
        message: &NotificationMessage,
        subscription: &PushSubscription,
    ) -> DeliveryOutcome {
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(e) => return DeliveryOutcome::TransportError(format!("encode message: {}", e)),
        };

        // Bad subscriber keys surface here, before anything goes on the wire.
        let push_message = match self.build_message(keypair, payload.as_bytes(), subscription) {
            Ok(push_message) => push_message,
            Err(e) => return DeliveryOutcome::TransportError(format!("build message: {}", e)),
        };

        match self.post(push_message).await {
            Ok(status) => DeliveryOutcome::classify_status(status),
            Err(e) if e.is_timeout() => DeliveryOutcome::TransportError("timed out".to_string()),
            Err(e) => DeliveryOutcome::TransportError(e.to_string()),
        }
    }
}
