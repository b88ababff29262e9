// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process storage backend for tests and local development.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::db::{
    apply_grant, filter_and_sort, newest_first, AppointmentStore, CredentialStore,
    ReminderTemplateStore, UserStore,
};
use crate::error::Result;
use crate::models::{
    Appointment, AppointmentUpdate, CalendarIntegration, ReminderTemplate, ReminderTemplateEdit,
    TimeRange, TokenGrant, User,
};

/// Process-local store. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryDb {
    users: RwLock<HashMap<String, User>>,
    integrations: RwLock<HashMap<String, CalendarIntegration>>,
    appointments: RwLock<HashMap<String, Appointment>>,
    reminder_templates: RwLock<HashMap<String, ReminderTemplate>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryDb {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.users.read().await.get(user_id).cloned())
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        self.users
            .write()
            .await
            .insert(user.id.clone(), user.clone());
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryDb {
    async fn create_integration(&self, integration: &CalendarIntegration) -> Result<()> {
        self.integrations
            .write()
            .await
            .insert(integration.id.clone(), integration.clone());
        Ok(())
    }

    async fn list_integrations(&self, user_id: &str) -> Result<Vec<CalendarIntegration>> {
        Ok(self
            .integrations
            .read()
            .await
            .values()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_integration(
        &self,
        id: &str,
        user_id: &str,
    ) -> Result<Option<CalendarIntegration>> {
        Ok(self
            .integrations
            .read()
            .await
            .get(id)
            .filter(|i| i.user_id == user_id)
            .cloned())
    }

    async fn update_integration_tokens(
        &self,
        id: &str,
        user_id: &str,
        grant: &TokenGrant,
    ) -> Result<Option<CalendarIntegration>> {
        let mut integrations = self.integrations.write().await;
        match integrations.get_mut(id).filter(|i| i.user_id == user_id) {
            Some(integration) => {
                apply_grant(integration, grant, Utc::now());
                Ok(Some(integration.clone()))
            }
            None => Ok(None),
        }
    }

    async fn touch_integration(&self, id: &str, user_id: &str) -> Result<()> {
        let mut integrations = self.integrations.write().await;
        if let Some(integration) = integrations.get_mut(id).filter(|i| i.user_id == user_id) {
            let now = Utc::now();
            integration.last_sync_at = Some(now);
            integration.updated_at = now;
        }
        Ok(())
    }

    async fn delete_integration(&self, id: &str, user_id: &str) -> Result<bool> {
        let mut integrations = self.integrations.write().await;
        if integrations.get(id).is_some_and(|i| i.user_id == user_id) {
            integrations.remove(id);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[async_trait]
impl AppointmentStore for MemoryDb {
    async fn create_appointment(&self, appointment: &Appointment) -> Result<()> {
        self.appointments
            .write()
            .await
            .insert(appointment.id.clone(), appointment.clone());
        Ok(())
    }

    async fn get_appointment(&self, id: &str, user_id: &str) -> Result<Option<Appointment>> {
        Ok(self
            .appointments
            .read()
            .await
            .get(id)
            .filter(|a| a.user_id == user_id)
            .cloned())
    }

    async fn list_appointments(
        &self,
        user_id: &str,
        range: &TimeRange,
    ) -> Result<Vec<Appointment>> {
        let appointments = self
            .appointments
            .read()
            .await
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        Ok(filter_and_sort(appointments, range))
    }

    async fn update_appointment(
        &self,
        id: &str,
        user_id: &str,
        update: &AppointmentUpdate,
    ) -> Result<Option<Appointment>> {
        let mut appointments = self.appointments.write().await;
        match appointments.get_mut(id).filter(|a| a.user_id == user_id) {
            Some(appointment) => {
                appointment.apply(update, Utc::now());
                Ok(Some(appointment.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete_appointment(&self, id: &str, user_id: &str) -> Result<bool> {
        let mut appointments = self.appointments.write().await;
        if appointments.get(id).is_some_and(|a| a.user_id == user_id) {
            appointments.remove(id);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[async_trait]
impl ReminderTemplateStore for MemoryDb {
    async fn list_reminder_templates(&self, user_id: &str) -> Result<Vec<ReminderTemplate>> {
        let templates = self
            .reminder_templates
            .read()
            .await
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(templates))
    }

    async fn create_reminder_template(&self, template: &ReminderTemplate) -> Result<()> {
        self.reminder_templates
            .write()
            .await
            .insert(template.id.clone(), template.clone());
        Ok(())
    }

    async fn update_reminder_template(
        &self,
        id: &str,
        user_id: &str,
        edit: &ReminderTemplateEdit,
    ) -> Result<Option<ReminderTemplate>> {
        let mut templates = self.reminder_templates.write().await;
        match templates.get_mut(id).filter(|t| t.user_id == user_id) {
            Some(template) => {
                template.apply(edit, Utc::now());
                Ok(Some(template.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete_reminder_template(&self, id: &str, user_id: &str) -> Result<bool> {
        let mut templates = self.reminder_templates.write().await;
        if templates.get(id).is_some_and(|t| t.user_id == user_id) {
            templates.remove(id);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
