// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Minimal Stripe REST client and webhook signature verification.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::time::Duration;
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};
use crate::services::payments::{CreateIntent, PaymentIntent, PaymentProcessor, Refund};

type HmacSha256 = Hmac<Sha256>;

const API_BASE: &str = "https://api.stripe.com/v1";

/// Maximum accepted age of a webhook signature timestamp.
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

/// Stripe API client built on reqwest (form-encoded requests, bearer auth).
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    #[serde(rename = "type")]
    type_: Option<String>,
    code: Option<String>,
    message: Option<String>,
}

impl StripeClient {
    pub fn new(secret_key: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self { http, secret_key })
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        form: &[(String, String)],
        idempotency_key: Option<&str>,
        context: &str,
    ) -> Result<T> {
        let mut request = self
            .http
            .post(format!("{}/{}", API_BASE, path))
            .bearer_auth(&self.secret_key)
            .form(form);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::upstream("stripe", format!("{}: {}", context, e)))?;

        Self::parse_response(response, context).await
    }

    async fn parse_response<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
        context: &str,
    ) -> Result<T> {
        if response.status().is_success() {
            return response.json().await.map_err(|e| {
                AppError::upstream("stripe", format!("{}: JSON parse error: {}", context, e))
            });
        }

        let status = response.status();
        let request_id = response
            .headers()
            .get("request-id")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        let body = response.text().await.unwrap_or_default();

        let details = serde_json::from_str::<StripeErrorEnvelope>(&body)
            .ok()
            .map(|envelope| envelope.error);

        tracing::error!(
            status = %status,
            stripe_request_id = ?request_id,
            stripe_error_type = ?details.as_ref().and_then(|d| d.type_.as_deref()),
            stripe_error_code = ?details.as_ref().and_then(|d| d.code.as_deref()),
            context,
            "Stripe API request failed"
        );

        if status.as_u16() == 404 {
            return Err(AppError::NotFound(context.to_string()));
        }

        let message = details
            .and_then(|d| d.message)
            .unwrap_or_else(|| format!("HTTP {}", status));
        Err(AppError::upstream(
            "stripe",
            format!("{}: {}", context, message),
        ))
    }
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    async fn create_customer(
        &self,
        user_id: &str,
        email: Option<&str>,
        name: Option<&str>,
    ) -> Result<String> {
        let mut form = vec![("metadata[userId]".to_string(), user_id.to_string())];
        if let Some(email) = email {
            form.push(("email".to_string(), email.to_string()));
        }
        if let Some(name) = name {
            form.push(("name".to_string(), name.to_string()));
        }

        #[derive(Deserialize)]
        struct CustomerResp {
            id: String,
        }

        // Retried creations for the same user collapse into one customer
        let idempotency_key = format!("customer-{}", user_id);
        let customer: CustomerResp = self
            .post_form("customers", &form, Some(&idempotency_key), "create customer")
            .await?;
        Ok(customer.id)
    }

    async fn create_intent(&self, params: &CreateIntent) -> Result<PaymentIntent> {
        let mut form = vec![
            ("amount".to_string(), params.amount_cents.to_string()),
            ("currency".to_string(), params.currency.clone()),
            ("description".to_string(), params.description.clone()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        if let Some(customer) = &params.customer_id {
            form.push(("customer".to_string(), customer.clone()));
        }
        for (key, value) in &params.metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
        }

        self.post_form("payment_intents", &form, None, "create payment intent")
            .await
    }

    async fn retrieve_intent(&self, payment_intent_id: &str) -> Result<PaymentIntent> {
        let response = self
            .http
            .get(format!(
                "{}/payment_intents/{}",
                API_BASE,
                urlencoding::encode(payment_intent_id)
            ))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| AppError::upstream("stripe", format!("retrieve payment intent: {}", e)))?;

        Self::parse_response(response, "retrieve payment intent").await
    }

    async fn create_refund(
        &self,
        payment_intent_id: &str,
        amount_cents: Option<i64>,
    ) -> Result<Refund> {
        let mut form = vec![(
            "payment_intent".to_string(),
            payment_intent_id.to_string(),
        )];
        if let Some(amount) = amount_cents {
            form.push(("amount".to_string(), amount.to_string()));
        }

        self.post_form("refunds", &form, None, "create refund").await
    }
}

// ─── Webhooks ────────────────────────────────────────────────────────────────

/// Verified webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// Object carried by `payment_intent.*` events.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPaymentIntent {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum WebhookError {
    #[error("missing or malformed signature header")]
    MalformedHeader,

    #[error("signature timestamp outside tolerance")]
    TimestampOutOfTolerance,

    #[error("no matching signature")]
    SignatureMismatch,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl From<WebhookError> for AppError {
    fn from(e: WebhookError) -> Self {
        AppError::InvalidSignature(e.to_string())
    }
}

/// Verify a `Stripe-Signature` header and parse the event.
///
/// The header looks like `t=1492774577,v1=5257a8...,v0=...`. The signed
/// message is `"{t}.{payload}"`; any `v1` entry may match. The payload is
/// only parsed after the signature checks out.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: DateTime<Utc>,
) -> std::result::Result<StripeEvent, WebhookError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures = Vec::new();

    for item in header.split(',') {
        let Some((key, value)) = item.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = Some(value),
            "v1" => signatures.push(value),
            _ => {}
        }
    }

    let timestamp_str = timestamp.ok_or(WebhookError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(WebhookError::MalformedHeader);
    }
    let timestamp: i64 = timestamp_str
        .parse()
        .map_err(|_| WebhookError::MalformedHeader)?;

    if now.timestamp().abs_diff(timestamp) > WEBHOOK_TOLERANCE_SECS.unsigned_abs() {
        return Err(WebhookError::TimestampOutOfTolerance);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::SignatureMismatch)?;
    mac.update(timestamp_str.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    let matched = signatures
        .iter()
        .any(|sig| bool::from(expected.as_bytes().ct_eq(sig.as_bytes())));
    if !matched {
        return Err(WebhookError::SignatureMismatch);
    }

    serde_json::from_slice(payload).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";

    fn sign_webhook_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    fn payload() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_1", "amount": 5000, "metadata": {} } }
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_signature() {
        let now = Utc::now();
        let body = payload();
        let header = sign_webhook_payload(&body, SECRET, now.timestamp());

        let event = verify_webhook_signature(&body, &header, SECRET, now).unwrap();
        assert_eq!(event.type_, "payment_intent.succeeded");
    }

    #[test]
    fn test_any_v1_may_match() {
        let now = Utc::now();
        let body = payload();
        let good = sign_webhook_payload(&body, SECRET, now.timestamp());
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={},v1=deadbeef,v0=abc,v1={}", now.timestamp(), good_sig);

        assert!(verify_webhook_signature(&body, &header, SECRET, now).is_ok());
    }

    #[test]
    fn test_wrong_secret() {
        let now = Utc::now();
        let body = payload();
        let header = sign_webhook_payload(&body, "whsec_other", now.timestamp());

        assert_eq!(
            verify_webhook_signature(&body, &header, SECRET, now).unwrap_err(),
            WebhookError::SignatureMismatch
        );
    }

    #[test]
    fn test_tampered_payload() {
        let now = Utc::now();
        let body = payload();
        let header = sign_webhook_payload(&body, SECRET, now.timestamp());
        let mut tampered = body.clone();
        tampered.extend_from_slice(b" ");

        assert_eq!(
            verify_webhook_signature(&tampered, &header, SECRET, now).unwrap_err(),
            WebhookError::SignatureMismatch
        );
    }

    #[test]
    fn test_stale_timestamp() {
        let now = Utc::now();
        let body = payload();
        let header = sign_webhook_payload(&body, SECRET, now.timestamp() - 301);

        assert_eq!(
            verify_webhook_signature(&body, &header, SECRET, now).unwrap_err(),
            WebhookError::TimestampOutOfTolerance
        );
    }

    #[test]
    fn test_malformed_header() {
        let now = Utc::now();
        let body = payload();
        for header in ["", "garbage", "t=123", "v1=abc", "t=notanumber,v1=abc"] {
            assert_eq!(
                verify_webhook_signature(&body, header, SECRET, now).unwrap_err(),
                WebhookError::MalformedHeader,
                "header {:?}",
                header
            );
        }
    }

    #[test]
    fn test_extreme_timestamps_rejected() {
        let now = Utc::now();
        let body = payload();
        for t in [i64::MIN, i64::MAX, -1] {
            let header = format!("t={},v1=00", t);
            assert_eq!(
                verify_webhook_signature(&body, &header, SECRET, now).unwrap_err(),
                WebhookError::TimestampOutOfTolerance,
                "t={}",
                t
            );
        }
    }

    #[test]
    fn test_signed_garbage_payload() {
        let now = Utc::now();
        let body = b"not json".to_vec();
        let header = sign_webhook_payload(&body, SECRET, now.timestamp());

        assert!(matches!(
            verify_webhook_signature(&body, &header, SECRET, now),
            Err(WebhookError::InvalidPayload(_))
        ));
    }
}
