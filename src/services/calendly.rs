// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Calendly API client (OAuth 2.0 + API v2).

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::error::Result;
use crate::models::{NormalizedEvent, Provider, TimeRange, TokenGrant};
use crate::services::calendar::{
    check_response_json, transport_error, CalendarProvider, OAuthTokenResponse,
};

const AUTH_URL: &str = "https://auth.calendly.com/oauth/authorize";
const TOKEN_URL: &str = "https://auth.calendly.com/oauth/token";
const API_BASE: &str = "https://api.calendly.com";

#[derive(Clone)]
pub struct CalendlyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
}

impl CalendlyClient {
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
            .map_err(|e| transport_error(Provider::Calendly, context, e))?;

        let token: OAuthTokenResponse =
            check_response_json(Provider::Calendly, context, response).await?;
        Ok(token.into_grant(Utc::now()))
    }

    async fn current_user(&self, access_token: &str) -> Result<CalendlyUser> {
        let response = self
            .http
            .get(format!("{}/users/me", API_BASE))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| transport_error(Provider::Calendly, "Current user", e))?;

        let envelope: CalendlyUserEnvelope =
            check_response_json(Provider::Calendly, "Current user", response).await?;
        Ok(envelope.resource)
    }
}

#[async_trait]
impl CalendarProvider for CalendlyClient {
    fn provider(&self) -> Provider {
        Provider::Calendly
    }

    fn authorization_url(&self, redirect_uri: &str, state: &str) -> String {
        format!(
            "{}?client_id={}&response_type=code&redirect_uri={}&state={}",
            AUTH_URL,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
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
        Ok(self
            .current_user(access_token)
            .await?
            .email
            .unwrap_or_default())
    }

    async fn list_events(
        &self,
        access_token: &str,
        range: &TimeRange,
    ) -> Result<Vec<NormalizedEvent>> {
        let user = self.current_user(access_token).await?;

        let mut query = vec![
            ("organization", user.current_organization),
            ("status", "active".to_string()),
        ];
        if let Some(start) = range.start {
            query.push((
                "min_start_time",
                start.to_rfc3339_opts(SecondsFormat::Millis, true),
            ));
        }
        if let Some(end) = range.end {
            query.push((
                "max_start_time",
                end.to_rfc3339_opts(SecondsFormat::Millis, true),
            ));
        }

        let response = self
            .http
            .get(format!("{}/scheduled_events", API_BASE))
            .bearer_auth(access_token)
            .query(&query)
            .send()
            .await
            .map_err(|e| transport_error(Provider::Calendly, "Scheduled events", e))?;

        let events: CalendlyEventsResponse =
            check_response_json(Provider::Calendly, "Scheduled events", response).await?;

        Ok(normalize_events(events))
    }
}

#[derive(Debug, Deserialize)]
struct CalendlyUserEnvelope {
    resource: CalendlyUser,
}

#[derive(Debug, Deserialize)]
struct CalendlyUser {
    email: Option<String>,
    current_organization: String,
}

#[derive(Debug, Deserialize)]
struct CalendlyEventsResponse {
    #[serde(default)]
    collection: Vec<CalendlyEvent>,
}

#[derive(Debug, Deserialize)]
struct CalendlyEvent {
    uri: String,
    name: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    /// A URI string in API v2; older payloads embed an object with `name`
    event_type: Option<serde_json::Value>,
    location: Option<CalendlyLocation>,
}

#[derive(Debug, Deserialize)]
struct CalendlyLocation {
    join_url: Option<String>,
    location: Option<String>,
}

fn normalize_events(response: CalendlyEventsResponse) -> Vec<NormalizedEvent> {
    response
        .collection
        .into_iter()
        .map(|event| {
            let type_name = event
                .event_type
                .as_ref()
                .and_then(|t| t.get("name"))
                .and_then(|n| n.as_str())
                .unwrap_or("Unknown type");

            NormalizedEvent {
                id: event.uri,
                title: event
                    .name
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| "Calendly Event".to_string()),
                start: event.start_time,
                end: event.end_time,
                description: Some(format!("Calendly event: {}", type_name)),
                location: event.location.and_then(|l| l.join_url.or(l.location)),
                source: Provider::Calendly,
            }
        })
        .collect()
}
