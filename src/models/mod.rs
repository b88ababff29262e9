// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod appointment;
pub mod integration;
pub mod reminder;
pub mod stats;
pub mod user;

pub use appointment::{
    Appointment, AppointmentEdit, AppointmentStatus, AppointmentUpdate, NewAppointment,
    PaymentStatus,
};
pub use integration::{
    CalendarIntegration, IntegrationSummary, NormalizedEvent, Provider, TimeRange, TokenGrant,
};
pub use reminder::{NewReminderTemplate, ReminderChannel, ReminderTemplate, ReminderTemplateEdit};
pub use stats::AppointmentStats;
pub use user::User;
