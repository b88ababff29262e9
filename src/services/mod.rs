// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod calendar;
pub mod calendly;
pub mod google_calendar;
pub mod mailer;
pub mod payments;
pub mod stripe;

pub use calendar::{CalendarConnector, CalendarProvider, RefreshLocks};
pub use calendly::CalendlyClient;
pub use google_calendar::GoogleCalendarClient;
pub use mailer::{DisabledMailer, EmailMessage, MailgunMailer, Mailer};
pub use payments::{PaymentProcessor, PaymentReconciler};
pub use stripe::StripeClient;
