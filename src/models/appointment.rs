// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Appointment records and the partial updates applied to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

/// A booked appointment, owned by exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub user_id: String,
    pub customer_name: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    pub service: String,
    pub appointment_date: DateTime<Utc>,
    #[serde(default)]
    pub status: AppointmentStatus,
    #[serde(default)]
    pub reminder_sent: bool,
    #[serde(default)]
    pub reminder_sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub confirmation_sent: bool,
    #[serde(default)]
    pub notes: Option<String>,

    // Written only by the payment reconciler
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
    #[serde(default)]
    pub payment_intent_id: Option<String>,
    #[serde(default)]
    pub amount_paid: Option<f64>,
    #[serde(default)]
    pub refund_id: Option<String>,
    #[serde(default)]
    pub refund_amount: Option<f64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentUpdate {
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub service: Option<String>,
    pub appointment_date: Option<DateTime<Utc>>,
    pub status: Option<AppointmentStatus>,
    pub reminder_sent: Option<bool>,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub confirmation_sent: Option<bool>,
    pub notes: Option<String>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_intent_id: Option<String>,
    pub amount_paid: Option<f64>,
    pub refund_id: Option<String>,
    pub refund_amount: Option<f64>,
}

impl AppointmentUpdate {
    /// Payment succeeded for `payment_intent_id`.
    pub fn paid(payment_intent_id: &str, amount: f64) -> Self {
        Self {
            payment_status: Some(PaymentStatus::Paid),
            payment_intent_id: Some(payment_intent_id.to_string()),
            amount_paid: Some(amount),
            ..Default::default()
        }
    }

    pub fn failed(payment_intent_id: &str) -> Self {
        Self {
            payment_status: Some(PaymentStatus::Failed),
            payment_intent_id: Some(payment_intent_id.to_string()),
            ..Default::default()
        }
    }

    pub fn refunded(refund_id: &str, amount: f64) -> Self {
        Self {
            payment_status: Some(PaymentStatus::Refunded),
            refund_id: Some(refund_id.to_string()),
            refund_amount: Some(amount),
            ..Default::default()
        }
    }
}

impl Appointment {
    /// Apply a partial update and bump `updated_at`.
    pub fn apply(&mut self, update: &AppointmentUpdate, now: DateTime<Utc>) {
        macro_rules! set {
            ($field:ident) => {
                if let Some(v) = &update.$field {
                    self.$field = v.clone();
                }
            };
            (opt $field:ident) => {
                if let Some(v) = &update.$field {
                    self.$field = Some(v.clone());
                }
            };
        }

        set!(customer_name);
        set!(opt customer_email);
        set!(opt customer_phone);
        set!(service);
        set!(appointment_date);
        set!(status);
        set!(reminder_sent);
        set!(opt reminder_sent_at);
        set!(confirmation_sent);
        set!(opt notes);
        set!(opt payment_status);
        set!(opt payment_intent_id);
        set!(opt amount_paid);
        set!(opt refund_id);
        set!(opt refund_amount);

        self.updated_at = now;
    }
}

/// Reject values that are empty once surrounding whitespace is removed.
pub(crate) fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Request body for creating an appointment.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewAppointment {
    #[validate(custom(function = "not_blank"), length(max = 200))]
    pub customer_name: String,
    #[validate(email)]
    pub customer_email: Option<String>,
    #[validate(length(max = 50))]
    pub customer_phone: Option<String>,
    #[validate(custom(function = "not_blank"), length(max = 200))]
    pub service: String,
    pub appointment_date: DateTime<Utc>,
    pub status: Option<AppointmentStatus>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

impl NewAppointment {
    pub fn into_appointment(self, user_id: &str, now: DateTime<Utc>) -> Appointment {
        Appointment {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            customer_name: self.customer_name.trim().to_string(),
            customer_email: self.customer_email.filter(|e| !e.trim().is_empty()),
            customer_phone: self.customer_phone,
            service: self.service.trim().to_string(),
            appointment_date: self.appointment_date,
            status: self.status.unwrap_or_default(),
            reminder_sent: false,
            reminder_sent_at: None,
            confirmation_sent: false,
            notes: self.notes,
            payment_status: None,
            payment_intent_id: None,
            amount_paid: None,
            refund_id: None,
            refund_amount: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Request body for the user-edit path. Payment fields are not accepted here.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentEdit {
    #[validate(custom(function = "not_blank"), length(max = 200))]
    pub customer_name: Option<String>,
    #[validate(email)]
    pub customer_email: Option<String>,
    #[validate(length(max = 50))]
    pub customer_phone: Option<String>,
    #[validate(custom(function = "not_blank"), length(max = 200))]
    pub service: Option<String>,
    pub appointment_date: Option<DateTime<Utc>>,
    pub status: Option<AppointmentStatus>,
    pub reminder_sent: Option<bool>,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

impl From<AppointmentEdit> for AppointmentUpdate {
    fn from(edit: AppointmentEdit) -> Self {
        Self {
            customer_name: edit.customer_name.map(|n| n.trim().to_string()),
            customer_email: edit.customer_email,
            customer_phone: edit.customer_phone,
            service: edit.service.map(|s| s.trim().to_string()),
            appointment_date: edit.appointment_date,
            status: edit.status,
            reminder_sent: edit.reminder_sent,
            reminder_sent_at: edit.reminder_sent_at,
            notes: edit.notes,
            ..Default::default()
        }
    }
}
