// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides the store traits for:
//! - Users (profile and Stripe customer)
//! - Calendar integrations (OAuth credentials per provider)
//! - Appointments
//! - Reminder templates

use async_trait::async_trait;
use chrono::Utc;

use crate::db::{
    apply_grant, collections, filter_and_sort, newest_first, AppointmentStore, CredentialStore,
    ReminderTemplateStore, UserStore,
};
use crate::error::AppError;
use crate::models::{
    Appointment, AppointmentUpdate, CalendarIntegration, ReminderTemplate, ReminderTemplateEdit,
    TimeRange, TokenGrant, User,
};

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: firestore::FirestoreDb,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self { client })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore emulator");

        Ok(Self { client })
    }

    async fn put<T>(&self, collection: &str, id: &str, obj: &T) -> Result<(), AppError>
    where
        T: serde::Serialize + for<'de> serde::Deserialize<'de> + Send + Sync,
    {
        let _: () = self
            .client
            .fluent()
            .update()
            .in_col(collection)
            .document_id(id)
            .object(obj)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn owned_template(
        &self,
        id: &str,
        user_id: &str,
    ) -> Result<Option<ReminderTemplate>, AppError> {
        let template: Option<ReminderTemplate> = self
            .client
            .fluent()
            .select()
            .by_id_in(collections::REMINDER_TEMPLATES)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(template.filter(|t| t.user_id == user_id))
    }

    async fn remove(&self, collection: &str, id: &str) -> Result<(), AppError> {
        self.client
            .fluent()
            .delete()
            .from(collection)
            .document_id(id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for FirestoreDb {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        self.client
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        self.put(collections::USERS, &user.id, user).await
    }
}

#[async_trait]
impl CredentialStore for FirestoreDb {
    async fn create_integration(&self, integration: &CalendarIntegration) -> Result<(), AppError> {
        self.put(collections::CALENDAR_INTEGRATIONS, &integration.id, integration)
            .await
    }

    async fn list_integrations(&self, user_id: &str) -> Result<Vec<CalendarIntegration>, AppError> {
        let user_id = user_id.to_string();
        self.client
            .fluent()
            .select()
            .from(collections::CALENDAR_INTEGRATIONS)
            .filter(move |q| q.for_all([q.field("userId").eq(user_id.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn get_integration(
        &self,
        id: &str,
        user_id: &str,
    ) -> Result<Option<CalendarIntegration>, AppError> {
        let integration: Option<CalendarIntegration> = self
            .client
            .fluent()
            .select()
            .by_id_in(collections::CALENDAR_INTEGRATIONS)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(integration.filter(|i| i.user_id == user_id))
    }

    async fn update_integration_tokens(
        &self,
        id: &str,
        user_id: &str,
        grant: &TokenGrant,
    ) -> Result<Option<CalendarIntegration>, AppError> {
        let Some(mut integration) = self.get_integration(id, user_id).await? else {
            return Ok(None);
        };

        apply_grant(&mut integration, grant, Utc::now());
        self.put(collections::CALENDAR_INTEGRATIONS, id, &integration)
            .await?;

        Ok(Some(integration))
    }

    async fn touch_integration(&self, id: &str, user_id: &str) -> Result<(), AppError> {
        if let Some(mut integration) = self.get_integration(id, user_id).await? {
            let now = Utc::now();
            integration.last_sync_at = Some(now);
            integration.updated_at = now;
            self.put(collections::CALENDAR_INTEGRATIONS, id, &integration)
                .await?;
        }
        Ok(())
    }

    async fn delete_integration(&self, id: &str, user_id: &str) -> Result<bool, AppError> {
        if self.get_integration(id, user_id).await?.is_none() {
            return Ok(false);
        }

        self.remove(collections::CALENDAR_INTEGRATIONS, id).await?;
        Ok(true)
    }
}

#[async_trait]
impl AppointmentStore for FirestoreDb {
    async fn create_appointment(&self, appointment: &Appointment) -> Result<(), AppError> {
        self.put(collections::APPOINTMENTS, &appointment.id, appointment)
            .await
    }

    async fn get_appointment(
        &self,
        id: &str,
        user_id: &str,
    ) -> Result<Option<Appointment>, AppError> {
        let appointment: Option<Appointment> = self
            .client
            .fluent()
            .select()
            .by_id_in(collections::APPOINTMENTS)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(appointment.filter(|a| a.user_id == user_id))
    }

    async fn list_appointments(
        &self,
        user_id: &str,
        range: &TimeRange,
    ) -> Result<Vec<Appointment>, AppError> {
        let user_id = user_id.to_string();

        // Dates are stored as RFC 3339 strings; the window and ordering are
        // applied after the fetch so mixed offsets compare correctly.
        let appointments: Vec<Appointment> = self
            .client
            .fluent()
            .select()
            .from(collections::APPOINTMENTS)
            .filter(move |q| q.for_all([q.field("userId").eq(user_id.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(filter_and_sort(appointments, range))
    }

    async fn update_appointment(
        &self,
        id: &str,
        user_id: &str,
        update: &AppointmentUpdate,
    ) -> Result<Option<Appointment>, AppError> {
        let Some(mut appointment) = self.get_appointment(id, user_id).await? else {
            return Ok(None);
        };

        appointment.apply(update, Utc::now());
        self.put(collections::APPOINTMENTS, id, &appointment).await?;

        Ok(Some(appointment))
    }

    async fn delete_appointment(&self, id: &str, user_id: &str) -> Result<bool, AppError> {
        if self.get_appointment(id, user_id).await?.is_none() {
            return Ok(false);
        }

        self.remove(collections::APPOINTMENTS, id).await?;
        Ok(true)
    }
}

#[async_trait]
impl ReminderTemplateStore for FirestoreDb {
    async fn list_reminder_templates(
        &self,
        user_id: &str,
    ) -> Result<Vec<ReminderTemplate>, AppError> {
        let user_id = user_id.to_string();
        let templates: Vec<ReminderTemplate> = self
            .client
            .fluent()
            .select()
            .from(collections::REMINDER_TEMPLATES)
            .filter(move |q| q.for_all([q.field("userId").eq(user_id.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(newest_first(templates))
    }

    async fn create_reminder_template(&self, template: &ReminderTemplate) -> Result<(), AppError> {
        self.put(collections::REMINDER_TEMPLATES, &template.id, template)
            .await
    }

    async fn update_reminder_template(
        &self,
        id: &str,
        user_id: &str,
        edit: &ReminderTemplateEdit,
    ) -> Result<Option<ReminderTemplate>, AppError> {
        let Some(mut template) = self.owned_template(id, user_id).await? else {
            return Ok(None);
        };

        template.apply(edit, Utc::now());
        self.put(collections::REMINDER_TEMPLATES, id, &template)
            .await?;

        Ok(Some(template))
    }

    async fn delete_reminder_template(&self, id: &str, user_id: &str) -> Result<bool, AppError> {
        if self.owned_template(id, user_id).await?.is_none() {
            return Ok(false);
        }

        self.remove(collections::REMINDER_TEMPLATES, id).await?;
        Ok(true)
    }
}
