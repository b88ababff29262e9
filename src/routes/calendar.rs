// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Calendar event and integration routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Extension, Json, Router,
};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{IntegrationSummary, NormalizedEvent, Provider, TimeRange};
use crate::AppState;

/// Calendar routes (auth applied in routes/mod.rs).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/google-calendar/events", get(google_events))
        .route("/api/calendly/events", get(calendly_events))
        .route("/api/calendar-integrations", get(list_integrations))
        .route("/api/calendar-integrations/{id}", delete(delete_integration))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    start_date: Option<String>,
    end_date: Option<String>,
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_date_param(name: &str, raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| {
            AppError::BadRequest(format!(
                "Invalid '{}' parameter: expected RFC 3339 datetime or YYYY-MM-DD",
                name
            ))
        })
}

impl EventsQuery {
    pub fn time_range(&self) -> Result<TimeRange> {
        let start = self
            .start_date
            .as_deref()
            .map(|raw| parse_date_param("startDate", raw))
            .transpose()?;
        let end = self
            .end_date
            .as_deref()
            .map(|raw| parse_date_param("endDate", raw))
            .transpose()?;

        Ok(TimeRange { start, end })
    }
}

async fn events(
    state: &AppState,
    user: &AuthUser,
    query: &EventsQuery,
    provider: Provider,
) -> Result<Json<Vec<NormalizedEvent>>> {
    let range = query.time_range()?;
    let connector = state.connector(provider)?;
    let events = connector.list_events(&user.user_id, &range).await?;
    Ok(Json(events))
}

async fn google_events(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Query(query), _): WithRejection<Query<EventsQuery>, AppError>,
) -> Result<Json<Vec<NormalizedEvent>>> {
    events(&state, &user, &query, Provider::Google).await
}

async fn calendly_events(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Query(query), _): WithRejection<Query<EventsQuery>, AppError>,
) -> Result<Json<Vec<NormalizedEvent>>> {
    events(&state, &user, &query, Provider::Calendly).await
}

/// List the caller's integrations. Tokens are never returned.
async fn list_integrations(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<IntegrationSummary>>> {
    let integrations = state.db.list_integrations(&user.user_id).await?;
    Ok(Json(
        integrations
            .into_iter()
            .map(IntegrationSummary::from)
            .collect(),
    ))
}

async fn delete_integration(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    if !state.db.delete_integration(&id, &user.user_id).await? {
        return Err(AppError::NotFound("Calendar integration".to_string()));
    }

    tracing::info!(user_id = %user.user_id, integration_id = %id, "Calendar integration deleted");
    Ok(StatusCode::NO_CONTENT)
}
