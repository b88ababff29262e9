// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Outbound email (Mailgun) for booking notifications.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::MailgunConfig;
use crate::error::{AppError, Result};
use crate::models::Appointment;

const MAILGUN_API_BASE: &str = "https://api.mailgun.net/v3";

#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl EmailMessage {
    /// Booking confirmation for the appointment's customer, if it has an email.
    pub fn booking_confirmation(appointment: &Appointment) -> Option<Self> {
        let to = appointment.customer_email.clone()?;

        let date = appointment.appointment_date.format("%A, %B %-d, %Y");
        let time = appointment.appointment_date.format("%H:%M UTC");
        let notes = appointment
            .notes
            .as_deref()
            .map(|n| format!("Notes: {}\n", n))
            .unwrap_or_default();

        let text = format!(
            "Dear {name},\n\n\
             Thank you for booking with us! Your appointment has been confirmed.\n\n\
             Service: {service}\nDate: {date}\nTime: {time}\n{notes}\n\
             If you need to make any changes, please contact us.\n",
            name = appointment.customer_name,
            service = appointment.service,
        );

        let html = format!(
            "<p>Dear {name},</p>\
             <p>Thank you for booking with us! Your appointment has been confirmed.</p>\
             <p><strong>Service:</strong> {service}<br>\
             <strong>Date:</strong> {date}<br>\
             <strong>Time:</strong> {time}</p>",
            name = escape_html(&appointment.customer_name),
            service = escape_html(&appointment.service),
        );

        Some(Self {
            to,
            subject: "Booking Confirmation - Thank You!".to_string(),
            text,
            html,
        })
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Mailgun messages API client.
pub struct MailgunMailer {
    http: reqwest::Client,
    api_key: String,
    domain: String,
}

impl MailgunMailer {
    pub fn new(config: &MailgunConfig, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            domain: config.domain.clone(),
        })
    }
}

#[async_trait]
impl Mailer for MailgunMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let from = format!("FieldFlow <noreply@{}>", self.domain);

        let response = self
            .http
            .post(format!("{}/{}/messages", MAILGUN_API_BASE, self.domain))
            .basic_auth("api", Some(&self.api_key))
            .form(&[
                ("from", from.as_str()),
                ("to", message.to.as_str()),
                ("subject", message.subject.as_str()),
                ("text", message.text.as_str()),
                ("html", message.html.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::upstream("mailgun", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::upstream(
                "mailgun",
                format!("HTTP {}: {}", status, body),
            ));
        }

        tracing::info!(subject = %message.subject, "Email sent");
        Ok(())
    }
}

/// Used when no mail provider is configured. Every send fails.
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        tracing::debug!(subject = %message.subject, "Mail delivery not configured, skipping");
        Err(AppError::Internal(anyhow::anyhow!(
            "mail delivery not configured"
        )))
    }
}
