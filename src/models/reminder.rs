// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user reminder templates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::appointment::not_blank;

/// Hours before the appointment when no lead time is given.
pub const DEFAULT_HOURS_BEFORE: u32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderChannel {
    Sms,
    Email,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReminderTemplate {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub channel: ReminderChannel,
    /// Email subject line; unused for SMS
    #[serde(default)]
    pub subject: Option<String>,
    pub content: String,
    pub hours_before_appointment: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating a template.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewReminderTemplate {
    #[validate(custom(function = "not_blank"), length(max = 100))]
    pub name: String,
    #[serde(rename = "type")]
    pub channel: ReminderChannel,
    #[validate(length(max = 200))]
    pub subject: Option<String>,
    #[validate(custom(function = "not_blank"), length(max = 5000))]
    pub content: String,
    #[validate(range(max = 720))]
    pub hours_before_appointment: Option<u32>,
    pub is_active: Option<bool>,
}

impl NewReminderTemplate {
    pub fn into_template(self, user_id: &str, now: DateTime<Utc>) -> ReminderTemplate {
        ReminderTemplate {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: self.name.trim().to_string(),
            channel: self.channel,
            subject: self.subject.filter(|s| !s.trim().is_empty()),
            content: self.content,
            hours_before_appointment: self
                .hours_before_appointment
                .unwrap_or(DEFAULT_HOURS_BEFORE),
            is_active: self.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial edit. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReminderTemplateEdit {
    #[validate(custom(function = "not_blank"), length(max = 100))]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub channel: Option<ReminderChannel>,
    #[validate(length(max = 200))]
    pub subject: Option<String>,
    #[validate(custom(function = "not_blank"), length(max = 5000))]
    pub content: Option<String>,
    #[validate(range(max = 720))]
    pub hours_before_appointment: Option<u32>,
    pub is_active: Option<bool>,
}

impl ReminderTemplate {
    pub fn apply(&mut self, edit: &ReminderTemplateEdit, now: DateTime<Utc>) {
        if let Some(name) = &edit.name {
            self.name = name.trim().to_string();
        }
        if let Some(channel) = edit.channel {
            self.channel = channel;
        }
        if let Some(subject) = &edit.subject {
            self.subject = Some(subject.clone()).filter(|s| !s.trim().is_empty());
        }
        if let Some(content) = &edit.content {
            self.content = content.clone();
        }
        if let Some(hours) = edit.hours_before_appointment {
            self.hours_before_appointment = hours;
        }
        if let Some(is_active) = edit.is_active {
            self.is_active = is_active;
        }
        self.updated_at = now;
    }
}
