// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Payment reconciliation between the processor and appointment records.
//!
//! The processor is the source of truth for payment state. Appointment
//! payment fields are only written here, from a freshly retrieved intent or a
//! signature-verified webhook, never from client-reported status.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{Appointment, AppointmentUpdate, User};
use crate::services::stripe::{verify_webhook_signature, WebhookPaymentIntent};

const DEFAULT_DESCRIPTION: &str = "Appointment booking";

/// Payment intent as returned by the processor. Amounts are in minor units.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: String,
    pub amount: i64,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Refund {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub status: Option<String>,
}

/// Parameters for a new payment intent.
#[derive(Debug, Clone)]
pub struct CreateIntent {
    pub amount_cents: i64,
    pub currency: String,
    pub customer_id: Option<String>,
    pub description: String,
    pub metadata: Vec<(String, String)>,
}

/// Payment processor API.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Create a customer. Repeated calls for the same `user_id` must not
    /// create duplicates.
    async fn create_customer(
        &self,
        user_id: &str,
        email: Option<&str>,
        name: Option<&str>,
    ) -> Result<String>;

    async fn create_intent(&self, params: &CreateIntent) -> Result<PaymentIntent>;

    async fn retrieve_intent(&self, payment_intent_id: &str) -> Result<PaymentIntent>;

    /// Refund all of the intent, or `amount_cents` of it.
    async fn create_refund(
        &self,
        payment_intent_id: &str,
        amount_cents: Option<i64>,
    ) -> Result<Refund>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentCreated {
    pub client_secret: String,
    pub payment_intent_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentResult {
    pub id: String,
    pub status: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundResult {
    pub id: String,
    pub status: Option<String>,
    pub amount: f64,
}

/// Convert a decimal currency amount to minor units.
///
/// Rejects non-finite, non-positive, and sub-cent amounts.
pub fn to_minor_units(amount: f64) -> Result<i64> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::InvalidAmount);
    }

    let cents = (amount * 100.0).round();
    if cents < 1.0 || cents > i64::MAX as f64 {
        return Err(AppError::InvalidAmount);
    }

    Ok(cents as i64)
}

pub fn from_minor_units(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Drives the payment-intent lifecycle against the processor and the store.
#[derive(Clone)]
pub struct PaymentReconciler {
    processor: Arc<dyn PaymentProcessor>,
    db: Arc<dyn Database>,
    currency: String,
    webhook_secret: String,
}

impl PaymentReconciler {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        db: Arc<dyn Database>,
        currency: String,
        webhook_secret: String,
    ) -> Self {
        Self {
            processor,
            db,
            currency,
            webhook_secret,
        }
    }

    /// Create a payment intent for `user`, provisioning a processor customer
    /// on first use.
    pub async fn create_intent(
        &self,
        user: &User,
        amount: f64,
        appointment_id: Option<&str>,
        description: Option<&str>,
    ) -> Result<IntentCreated> {
        let amount_cents = to_minor_units(amount)?;

        if let Some(appointment_id) = appointment_id {
            self.owned_appointment(appointment_id, &user.id).await?;
        }

        let customer_id = self.ensure_customer(user).await?;

        let params = CreateIntent {
            amount_cents,
            currency: self.currency.clone(),
            customer_id: Some(customer_id),
            description: description
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .unwrap_or(DEFAULT_DESCRIPTION)
                .to_string(),
            metadata: vec![
                ("userId".to_string(), user.id.clone()),
                (
                    "appointmentId".to_string(),
                    appointment_id.unwrap_or_default().to_string(),
                ),
            ],
        };

        let intent = self.processor.create_intent(&params).await?;

        tracing::info!(
            user_id = %user.id,
            payment_intent_id = %intent.id,
            amount_cents,
            "Payment intent created"
        );

        let client_secret = intent.client_secret.ok_or_else(|| {
            AppError::upstream("stripe", "payment intent has no client secret")
        })?;

        Ok(IntentCreated {
            client_secret,
            payment_intent_id: intent.id,
        })
    }

    /// Re-check an intent with the processor and record a successful payment.
    ///
    /// With an `appointment_id`, the intent must have been created for that
    /// appointment.
    pub async fn confirm_intent(
        &self,
        user_id: &str,
        payment_intent_id: &str,
        appointment_id: Option<&str>,
    ) -> Result<PaymentResult> {
        if let Some(appointment_id) = appointment_id {
            self.owned_appointment(appointment_id, user_id).await?;
        }

        let intent = self.owned_intent(user_id, payment_intent_id).await?;

        if let Some(appointment_id) = appointment_id {
            if intent.metadata.get("appointmentId").map(String::as_str) != Some(appointment_id) {
                tracing::warn!(
                    user_id,
                    payment_intent_id,
                    appointment_id,
                    "Payment intent was created for a different appointment"
                );
                return Err(AppError::NotFound("Payment intent".to_string()));
            }
        }

        if intent.status != "succeeded" {
            tracing::info!(
                user_id,
                payment_intent_id,
                status = %intent.status,
                "Payment not completed"
            );
            return Err(AppError::PaymentNotCompleted(intent.status));
        }

        let amount = from_minor_units(intent.amount);

        if let Some(appointment_id) = appointment_id {
            self.db
                .update_appointment(
                    appointment_id,
                    user_id,
                    &AppointmentUpdate::paid(&intent.id, amount),
                )
                .await?
                .ok_or_else(|| AppError::NotFound("Appointment".to_string()))?;
        }

        tracing::info!(user_id, payment_intent_id, amount, "Payment confirmed");

        Ok(PaymentResult {
            id: intent.id,
            status: intent.status,
            amount,
        })
    }

    /// Refund all or part of a payment. With an `appointment_id`, the intent
    /// must be the one recorded on that appointment.
    pub async fn refund(
        &self,
        user_id: &str,
        payment_intent_id: &str,
        amount: Option<f64>,
        appointment_id: Option<&str>,
    ) -> Result<RefundResult> {
        let amount_cents = amount.map(to_minor_units).transpose()?;

        if let Some(appointment_id) = appointment_id {
            let appointment = self.owned_appointment(appointment_id, user_id).await?;
            if appointment.payment_intent_id.as_deref() != Some(payment_intent_id) {
                tracing::warn!(
                    user_id,
                    payment_intent_id,
                    appointment_id,
                    "Refund does not match the appointment's payment"
                );
                return Err(AppError::NotFound("Payment intent".to_string()));
            }
        }

        self.owned_intent(user_id, payment_intent_id).await?;

        let refund = self
            .processor
            .create_refund(payment_intent_id, amount_cents)
            .await?;
        let refunded = from_minor_units(refund.amount);

        if let Some(appointment_id) = appointment_id {
            self.db
                .update_appointment(
                    appointment_id,
                    user_id,
                    &AppointmentUpdate::refunded(&refund.id, refunded),
                )
                .await?;
        }

        tracing::info!(
            user_id,
            payment_intent_id,
            refund_id = %refund.id,
            amount = refunded,
            "Refund processed"
        );

        Ok(RefundResult {
            id: refund.id,
            status: refund.status,
            amount: refunded,
        })
    }

    /// Verify and apply a processor webhook delivery.
    ///
    /// Returns the event type. Events that reference missing appointments are
    /// acknowledged so the processor stops retrying them.
    pub async fn apply_webhook_event(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<String> {
        let header = signature_header
            .ok_or_else(|| AppError::InvalidSignature("missing signature header".to_string()))?;

        let event = verify_webhook_signature(payload, header, &self.webhook_secret, Utc::now())?;

        tracing::info!(
            event_id = ?event.id,
            event_type = %event.type_,
            "Verified webhook event"
        );

        match event.type_.as_str() {
            "payment_intent.succeeded" | "payment_intent.payment_failed" => {
                let intent: WebhookPaymentIntent =
                    match serde_json::from_value(event.data.object.clone()) {
                        Ok(intent) => intent,
                        Err(e) => {
                            tracing::warn!(error = %e, event_type = %event.type_, "Unreadable payment intent in webhook");
                            return Ok(event.type_);
                        }
                    };

                let update = if event.type_ == "payment_intent.succeeded" {
                    AppointmentUpdate::paid(&intent.id, from_minor_units(intent.amount))
                } else {
                    AppointmentUpdate::failed(&intent.id)
                };

                self.apply_to_appointment(&intent, &update).await?;
            }
            "charge.dispute.created" => {
                let dispute_id = event.data.object.get("id").and_then(|v| v.as_str());
                let charge_id = event.data.object.get("charge").and_then(|v| v.as_str());
                tracing::warn!(?dispute_id, ?charge_id, "Charge dispute created");
            }
            other => {
                tracing::debug!(event_type = other, "Ignoring webhook event");
            }
        }

        Ok(event.type_)
    }

    async fn apply_to_appointment(
        &self,
        intent: &WebhookPaymentIntent,
        update: &AppointmentUpdate,
    ) -> Result<()> {
        let metadata = |key: &str| {
            intent
                .metadata
                .get(key)
                .map(String::as_str)
                .filter(|v| !v.is_empty())
        };

        let (Some(appointment_id), Some(user_id)) = (metadata("appointmentId"), metadata("userId"))
        else {
            tracing::info!(
                payment_intent_id = %intent.id,
                "Webhook intent has no appointment metadata"
            );
            return Ok(());
        };

        match self
            .db
            .update_appointment(appointment_id, user_id, update)
            .await?
        {
            Some(appointment) => tracing::info!(
                payment_intent_id = %intent.id,
                appointment_id,
                user_id,
                payment_status = ?appointment.payment_status,
                "Appointment payment status updated from webhook"
            ),
            None => tracing::warn!(
                payment_intent_id = %intent.id,
                appointment_id,
                user_id,
                "Webhook references an appointment that no longer exists"
            ),
        }

        Ok(())
    }

    async fn owned_appointment(&self, appointment_id: &str, user_id: &str) -> Result<Appointment> {
        self.db
            .get_appointment(appointment_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Appointment".to_string()))
    }

    /// Retrieve an intent and check it was created for `user_id`.
    async fn owned_intent(&self, user_id: &str, payment_intent_id: &str) -> Result<PaymentIntent> {
        let intent = self.processor.retrieve_intent(payment_intent_id).await?;

        if intent.metadata.get("userId").map(String::as_str) != Some(user_id) {
            tracing::warn!(
                user_id,
                payment_intent_id,
                "Payment intent belongs to a different user"
            );
            return Err(AppError::NotFound("Payment intent".to_string()));
        }

        Ok(intent)
    }

    async fn ensure_customer(&self, user: &User) -> Result<String> {
        // Re-read so a customer stored by a concurrent request is reused
        let mut current = self.db.get_user(&user.id).await?.unwrap_or_else(|| user.clone());

        if let Some(customer_id) = current.stripe_customer_id.clone() {
            return Ok(customer_id);
        }

        let name = current.display_name();
        let customer_id = self
            .processor
            .create_customer(&current.id, current.email.as_deref(), name.as_deref())
            .await?;

        current.stripe_customer_id = Some(customer_id.clone());
        current.updated_at = Utc::now();
        self.db.upsert_user(&current).await?;

        tracing::info!(user_id = %current.id, "Stripe customer created");

        Ok(customer_id)
    }
}
