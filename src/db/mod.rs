// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! Storage is expressed as four store traits so the HTTP layer and the
//! services never see which backend is in use. Every integration,
//! appointment and template accessor takes the owning user ID and matches on
//! `(id, user_id)`; a bare document ID is never enough to read or write.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Appointment, AppointmentUpdate, CalendarIntegration, ReminderTemplate, ReminderTemplateEdit,
    TimeRange, TokenGrant, User,
};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const CALENDAR_INTEGRATIONS: &str = "calendar_integrations";
    pub const APPOINTMENTS: &str = "appointments";
    pub const REMINDER_TEMPLATES: &str = "reminder_templates";
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>>;

    /// Create or replace a user document.
    async fn upsert_user(&self, user: &User) -> Result<()>;
}

/// Storage for calendar OAuth credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn create_integration(&self, integration: &CalendarIntegration) -> Result<()>;

    async fn list_integrations(&self, user_id: &str) -> Result<Vec<CalendarIntegration>>;

    async fn get_integration(
        &self,
        id: &str,
        user_id: &str,
    ) -> Result<Option<CalendarIntegration>>;

    /// Store refreshed token material in place.
    ///
    /// The refresh token is only replaced when the grant carries a new one.
    /// Returns the updated integration, or `None` if `(id, user_id)` matched
    /// nothing.
    async fn update_integration_tokens(
        &self,
        id: &str,
        user_id: &str,
        grant: &TokenGrant,
    ) -> Result<Option<CalendarIntegration>>;

    /// Record a successful event fetch.
    async fn touch_integration(&self, id: &str, user_id: &str) -> Result<()>;

    /// Returns `false` if `(id, user_id)` matched nothing.
    async fn delete_integration(&self, id: &str, user_id: &str) -> Result<bool>;
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn create_appointment(&self, appointment: &Appointment) -> Result<()>;

    async fn get_appointment(&self, id: &str, user_id: &str) -> Result<Option<Appointment>>;

    /// Appointments for a user, optionally limited to an inclusive date
    /// window, newest `appointment_date` first.
    async fn list_appointments(&self, user_id: &str, range: &TimeRange)
        -> Result<Vec<Appointment>>;

    /// Apply a partial update. Returns `None` if `(id, user_id)` matched nothing.
    async fn update_appointment(
        &self,
        id: &str,
        user_id: &str,
        update: &AppointmentUpdate,
    ) -> Result<Option<Appointment>>;

    async fn delete_appointment(&self, id: &str, user_id: &str) -> Result<bool>;
}

#[async_trait]
pub trait ReminderTemplateStore: Send + Sync {
    /// A user's templates, newest first.
    async fn list_reminder_templates(&self, user_id: &str) -> Result<Vec<ReminderTemplate>>;

    async fn create_reminder_template(&self, template: &ReminderTemplate) -> Result<()>;

    /// Returns `None` if `(id, user_id)` matched nothing.
    async fn update_reminder_template(
        &self,
        id: &str,
        user_id: &str,
        edit: &ReminderTemplateEdit,
    ) -> Result<Option<ReminderTemplate>>;

    async fn delete_reminder_template(&self, id: &str, user_id: &str) -> Result<bool>;
}

/// Everything the application needs from a storage backend.
pub trait Database: UserStore + CredentialStore + AppointmentStore + ReminderTemplateStore {}

impl<T> Database for T where
    T: UserStore + CredentialStore + AppointmentStore + ReminderTemplateStore
{
}

/// Apply an inclusive date window and sort newest first.
pub(crate) fn filter_and_sort(
    mut appointments: Vec<Appointment>,
    range: &TimeRange,
) -> Vec<Appointment> {
    appointments.retain(|a| {
        range.start.map_or(true, |start| a.appointment_date >= start)
            && range.end.map_or(true, |end| a.appointment_date <= end)
    });
    appointments.sort_by(|a, b| b.appointment_date.cmp(&a.appointment_date));
    appointments
}

pub(crate) fn newest_first(mut templates: Vec<ReminderTemplate>) -> Vec<ReminderTemplate> {
    templates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    templates
}

/// Copy refreshed token material onto an integration.
pub(crate) fn apply_grant(
    integration: &mut CalendarIntegration,
    grant: &TokenGrant,
    now: chrono::DateTime<chrono::Utc>,
) {
    integration.access_token = grant.access_token.clone();
    if let Some(refresh_token) = &grant.refresh_token {
        integration.refresh_token = Some(refresh_token.clone());
    }
    integration.expires_at = grant.expires_at;
    integration.updated_at = now;
}
