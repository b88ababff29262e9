// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Extension, Json, Router,
};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use std::sync::Arc;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{
    Appointment, AppointmentEdit, AppointmentStats, AppointmentUpdate, NewAppointment,
    NewReminderTemplate, ReminderTemplate, ReminderTemplateEdit, TimeRange, User,
};
use crate::routes::calendar::EventsQuery;
use crate::services::EmailMessage;
use crate::AppState;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/user", get(get_user))
        .route(
            "/api/appointments",
            get(list_appointments).post(create_appointment),
        )
        .route(
            "/api/appointments/{id}",
            put(update_appointment).delete(delete_appointment),
        )
        .route("/api/stats", get(get_stats))
        .route(
            "/api/reminder-templates",
            get(list_reminder_templates).post(create_reminder_template),
        )
        .route(
            "/api/reminder-templates/{id}",
            put(update_reminder_template).delete(delete_reminder_template),
        )
}

// ─── User Profile ────────────────────────────────────────────

/// Get the current user, creating the record on first sign-in.
async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<User>> {
    Ok(Json(user.ensure_user(state.db.as_ref()).await?))
}

// ─── Appointments ────────────────────────────────────────────

async fn list_appointments(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Query(query), _): WithRejection<Query<EventsQuery>, AppError>,
) -> Result<Json<Vec<Appointment>>> {
    let range = query.time_range()?;
    let appointments = state.db.list_appointments(&user.user_id, &range).await?;
    Ok(Json(appointments))
}

async fn create_appointment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Json(body), _): WithRejection<Json<NewAppointment>, AppError>,
) -> Result<(StatusCode, Json<Appointment>)> {
    body.validate()?;

    let mut appointment = body.into_appointment(&user.user_id, Utc::now());
    state.db.create_appointment(&appointment).await?;

    tracing::info!(
        user_id = %user.user_id,
        appointment_id = %appointment.id,
        "Appointment created"
    );

    if send_confirmation(&state, &appointment).await {
        appointment.confirmation_sent = true;
    }

    Ok((StatusCode::CREATED, Json(appointment)))
}

/// Send the booking confirmation. Returns whether it was sent and recorded.
///
/// Failures are logged only; the appointment itself is already stored.
async fn send_confirmation(state: &AppState, appointment: &Appointment) -> bool {
    let Some(message) = EmailMessage::booking_confirmation(appointment) else {
        return false;
    };

    if let Err(e) = state.mailer.send(&message).await {
        tracing::warn!(
            appointment_id = %appointment.id,
            error = %e,
            "Failed to send confirmation email"
        );
        return false;
    }

    let update = AppointmentUpdate {
        confirmation_sent: Some(true),
        ..Default::default()
    };

    match state
        .db
        .update_appointment(&appointment.id, &appointment.user_id, &update)
        .await
    {
        Ok(updated) => updated.is_some(),
        Err(e) => {
            tracing::warn!(
                appointment_id = %appointment.id,
                error = %e,
                "Failed to record confirmation email"
            );
            false
        }
    }
}

async fn update_appointment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    WithRejection(Json(body), _): WithRejection<Json<AppointmentEdit>, AppError>,
) -> Result<Json<Appointment>> {
    body.validate()?;

    let updated = state
        .db
        .update_appointment(&id, &user.user_id, &AppointmentUpdate::from(body))
        .await?
        .ok_or_else(|| AppError::NotFound("Appointment".to_string()))?;

    Ok(Json(updated))
}

async fn delete_appointment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    if !state.db.delete_appointment(&id, &user.user_id).await? {
        return Err(AppError::NotFound("Appointment".to_string()));
    }

    tracing::info!(user_id = %user.user_id, appointment_id = %id, "Appointment deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ─── Stats ───────────────────────────────────────────────────

async fn get_stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<AppointmentStats>> {
    let appointments = state
        .db
        .list_appointments(&user.user_id, &TimeRange::default())
        .await?;

    Ok(Json(AppointmentStats::compute(&appointments, Utc::now())))
}

// ─── Reminder Templates ──────────────────────────────────────

async fn list_reminder_templates(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<ReminderTemplate>>> {
    Ok(Json(state.db.list_reminder_templates(&user.user_id).await?))
}

async fn create_reminder_template(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Json(body), _): WithRejection<Json<NewReminderTemplate>, AppError>,
) -> Result<(StatusCode, Json<ReminderTemplate>)> {
    body.validate()?;

    let template = body.into_template(&user.user_id, Utc::now());
    state.db.create_reminder_template(&template).await?;

    tracing::info!(
        user_id = %user.user_id,
        template_id = %template.id,
        "Reminder template created"
    );

    Ok((StatusCode::CREATED, Json(template)))
}

async fn update_reminder_template(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    WithRejection(Json(body), _): WithRejection<Json<ReminderTemplateEdit>, AppError>,
) -> Result<Json<ReminderTemplate>> {
    body.validate()?;

    let updated = state
        .db
        .update_reminder_template(&id, &user.user_id, &body)
        .await?
        .ok_or_else(|| AppError::NotFound("Reminder template".to_string()))?;

    Ok(Json(updated))
}

async fn delete_reminder_template(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    if !state.db.delete_reminder_template(&id, &user.user_id).await? {
        return Err(AppError::NotFound("Reminder template".to_string()));
    }

    tracing::info!(user_id = %user.user_id, template_id = %id, "Reminder template deleted");
    Ok(StatusCode::NO_CONTENT)
}
