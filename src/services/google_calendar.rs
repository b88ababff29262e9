// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google Calendar API client (OAuth 2.0 + Calendar v3).

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::error::Result;
use crate::models::{NormalizedEvent, Provider, TimeRange, TokenGrant};
use crate::services::calendar::{
    check_response_json, transport_error, CalendarProvider, OAuthTokenResponse,
};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

const SCOPES: &str = "https://www.googleapis.com/auth/calendar.readonly \
                      https://www.googleapis.com/auth/userinfo.email \
                      https://www.googleapis.com/auth/userinfo.profile";

const MAX_RESULTS: u32 = 50;

/// Google Calendar client.
#[derive(Clone)]
pub struct GoogleCalendarClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
}

impl GoogleCalendarClient {
    pub fn new(client_id: String, client_secret: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            http,
            client_id,
            client_secret,
        })
    }

    async fn token_request(&self, form: &[(&str, &str)], context: &str) -> Result<TokenGrant> {
        let response = self
            .http
            .post(TOKEN_URL)
            .form(form)
            .send()
            .await
            .map_err(|e| transport_error(Provider::Google, context, e))?;

        let token: OAuthTokenResponse =
            check_response_json(Provider::Google, context, response).await?;
        Ok(token.into_grant(Utc::now()))
    }
}

#[async_trait]
impl CalendarProvider for GoogleCalendarClient {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    fn authorization_url(&self, redirect_uri: &str, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}\
             &access_type=offline&prompt=consent&state={}",
            AUTH_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(SCOPES),
            urlencoding::encode(state),
        )
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant> {
        self.token_request(
            &[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri),
            ],
            "Token exchange",
        )
        .await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant> {
        self.token_request(
            &[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ],
            "Token refresh",
        )
        .await
    }

    async fn account_email(&self, access_token: &str) -> Result<String> {
        let response = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| transport_error(Provider::Google, "Userinfo", e))?;

        let info: GoogleUserInfo = check_response_json(Provider::Google, "Userinfo", response).await?;
        Ok(info.email.unwrap_or_default())
    }

    async fn list_events(
        &self,
        access_token: &str,
        range: &TimeRange,
    ) -> Result<Vec<NormalizedEvent>> {
        let url = format!("{}/calendars/primary/events", CALENDAR_API_BASE);

        let time_min = range.start.unwrap_or_else(Utc::now);
        let mut query = vec![
            (
                "timeMin",
                time_min.to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            ("maxResults", MAX_RESULTS.to_string()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ];
        if let Some(end) = range.end {
            query.push(("timeMax", end.to_rfc3339_opts(SecondsFormat::Millis, true)));
        }

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&query)
            .send()
            .await
            .map_err(|e| transport_error(Provider::Google, "List events", e))?;

        let events: GoogleEventsResponse =
            check_response_json(Provider::Google, "List events", response).await?;

        Ok(normalize_events(events))
    }
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleEventsResponse {
    #[serde(default)]
    items: Vec<GoogleCalendarEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleCalendarEvent {
    id: String,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    #[serde(default)]
    start: GoogleEventTime,
    #[serde(default)]
    end: GoogleEventTime,
}

/// Either `dateTime` (timed events) or `date` (all-day events) is set.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventTime {
    date_time: Option<String>,
    date: Option<String>,
}

fn normalize_events(response: GoogleEventsResponse) -> Vec<NormalizedEvent> {
    response
        .items
        .into_iter()
        .map(|event| NormalizedEvent {
            id: event.id,
            title: event
                .summary
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "Untitled".to_string()),
            start: event.start.date_time.or(event.start.date),
            end: event.end.date_time.or(event.end.date),
            description: event.description,
            location: event.location,
            source: Provider::Google,
        })
        .collect()
}
