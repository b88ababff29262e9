// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Calendar integration credentials and normalized provider events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// External calendar provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Calendly,
    Microsoft,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Calendly => "calendly",
            Provider::Microsoft => "microsoft",
        }
    }

    /// Query flag used when redirecting the browser back to the dashboard.
    pub fn redirect_flag(&self) -> &'static str {
        match self {
            Provider::Google => "google_calendar",
            Provider::Calendly => "calendly",
            Provider::Microsoft => "microsoft_calendar",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored OAuth credential set linking a user to one calendar provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarIntegration {
    /// Document ID (UUID v4)
    pub id: String,
    /// Owning user
    pub user_id: String,
    pub provider: Provider,
    /// Account email reported by the provider
    #[serde(default)]
    pub account_email: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// When the access token expires (None if the provider did not say)
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub calendar_id: Option<String>,
    pub is_active: bool,
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CalendarIntegration {
    /// Whether the access token expires within `margin` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        self.expires_at
            .is_some_and(|expires_at| now + margin >= expires_at)
    }

    /// Pick the integration event fetching should use: the newest active one
    /// for `provider`.
    pub fn select_active(
        integrations: Vec<CalendarIntegration>,
        provider: Provider,
    ) -> Option<CalendarIntegration> {
        integrations
            .into_iter()
            .filter(|i| i.provider == provider && i.is_active)
            .max_by_key(|i| i.created_at)
    }
}

/// Fresh token material returned by a provider token endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Integration as shown to the owner (no token material).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationSummary {
    pub id: String,
    pub provider: Provider,
    pub account_email: String,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<CalendarIntegration> for IntegrationSummary {
    fn from(integration: CalendarIntegration) -> Self {
        Self {
            id: integration.id,
            provider: integration.provider,
            account_email: integration.account_email,
            is_active: integration.is_active,
            expires_at: integration.expires_at,
            last_sync_at: integration.last_sync_at,
            created_at: integration.created_at,
        }
    }
}

/// Optional window for event listing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Provider-independent calendar event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedEvent {
    pub id: String,
    pub title: String,
    /// RFC 3339 date-time, or a bare date for all-day events
    pub start: Option<String>,
    pub end: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub source: Provider,
}
