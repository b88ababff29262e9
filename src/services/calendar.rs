// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth connector for external calendar providers.
//!
//! Handles:
//! - Authorization URLs with a signed `state` bound to the user
//! - Code exchange and integration storage on callback
//! - Token refresh before provider calls (5-minute margin)
//! - Event fetching through the provider client

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{CalendarIntegration, NormalizedEvent, Provider, TimeRange, TokenGrant};

type HmacSha256 = Hmac<Sha256>;

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// OAuth `state` values older than this are rejected.
const STATE_MAX_AGE_SECS: i64 = 60 * 60;

/// Per-integration mutexes that serialize token refresh.
pub type RefreshLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Provider-specific OAuth and calendar API calls.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    fn provider(&self) -> Provider;

    fn authorization_url(&self, redirect_uri: &str, state: &str) -> String;

    /// Exchange an authorization code. `redirect_uri` must match the one
    /// used to build the authorization URL.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant>;

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant>;

    async fn account_email(&self, access_token: &str) -> Result<String>;

    async fn list_events(
        &self,
        access_token: &str,
        range: &TimeRange,
    ) -> Result<Vec<NormalizedEvent>>;
}

/// Token endpoint response shared by Google and Calendly.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OAuthTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl OAuthTokenResponse {
    pub fn into_grant(self, now: DateTime<Utc>) -> TokenGrant {
        TokenGrant {
            access_token: self.access_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            expires_at: self.expires_in.map(|secs| now + Duration::seconds(secs)),
        }
    }
}

/// Check response status and parse the JSON body.
pub(crate) async fn check_response_json<T: for<'de> Deserialize<'de>>(
    provider: Provider,
    context: &str,
    response: reqwest::Response,
) -> Result<T> {
    let name = provider.as_str();

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.as_u16() == 429 {
            tracing::warn!(provider = name, context, "Provider rate limit hit (429)");
        }

        return Err(AppError::upstream(
            name,
            format!("{} failed: HTTP {}: {}", context, status, body),
        ));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::upstream(name, format!("{}: JSON parse error: {}", context, e)))
}

/// Map a transport error to an upstream error for `provider`.
pub(crate) fn transport_error(provider: Provider, context: &str, e: reqwest::Error) -> AppError {
    AppError::upstream(provider.as_str(), format!("{} request failed: {}", context, e))
}

// ─── OAuth State ─────────────────────────────────────────────────────────────

/// Sign `user_id` into an opaque OAuth `state` value.
///
/// Format before encoding: `user_id|timestamp_hex|signature_hex`.
pub fn sign_state(user_id: &str, key: &[u8], now: DateTime<Utc>) -> Result<String> {
    let payload = format!("{}|{:x}", user_id, now.timestamp());

    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    Ok(URL_SAFE_NO_PAD.encode(format!("{}|{}", payload, signature)))
}

/// Verify a `state` value and return the user ID it was issued for.
pub fn verify_state(state: &str, key: &[u8], now: DateTime<Utc>) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let decoded = String::from_utf8(bytes).ok()?;

    // User IDs never contain '|', so split from the right
    let mut parts = decoded.rsplitn(3, '|');
    let signature_hex = parts.next()?;
    let timestamp_hex = parts.next()?;
    let user_id = parts.next()?;
    if user_id.is_empty() {
        return None;
    }

    let mut mac = HmacSha256::new_from_slice(key).ok()?;
    mac.update(format!("{}|{}", user_id, timestamp_hex).as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    if !bool::from(expected.as_bytes().ct_eq(signature_hex.as_bytes())) {
        tracing::warn!("OAuth state signature mismatch");
        return None;
    }

    let issued_at = i64::from_str_radix(timestamp_hex, 16).ok()?;
    let age = now.timestamp() - issued_at;
    if !(0..=STATE_MAX_AGE_SECS).contains(&age) {
        tracing::warn!(age_secs = age, "OAuth state expired");
        return None;
    }

    Some(user_id.to_string())
}

// ─── Connector ───────────────────────────────────────────────────────────────

/// Manages the OAuth token lifecycle for one provider on top of the
/// credential store.
#[derive(Clone)]
pub struct CalendarConnector {
    client: Arc<dyn CalendarProvider>,
    db: Arc<dyn Database>,
    state_key: Vec<u8>,
    refresh_locks: RefreshLocks,
}

impl CalendarConnector {
    /// `refresh_locks` should be shared by every connector in the process.
    pub fn new(
        client: Arc<dyn CalendarProvider>,
        db: Arc<dyn Database>,
        state_key: Vec<u8>,
        refresh_locks: RefreshLocks,
    ) -> Self {
        Self {
            client,
            db,
            state_key,
            refresh_locks,
        }
    }

    pub fn provider(&self) -> Provider {
        self.client.provider()
    }

    /// Build the provider authorization URL for `user_id`.
    pub fn begin_auth(&self, user_id: &str, redirect_uri: &str) -> Result<String> {
        let state = sign_state(user_id, &self.state_key, Utc::now())?;

        tracing::info!(
            user_id,
            provider = %self.provider(),
            redirect_uri,
            "Starting calendar OAuth flow"
        );

        Ok(self.client.authorization_url(redirect_uri, &state))
    }

    /// Finish the OAuth flow and store a new active integration.
    ///
    /// Nothing is written unless every step succeeds.
    pub async fn complete_auth(
        &self,
        code: &str,
        state: &str,
        redirect_uri: &str,
    ) -> Result<CalendarIntegration> {
        let provider = self.provider();

        let user_id = verify_state(state, &self.state_key, Utc::now())
            .ok_or_else(|| AppError::BadRequest("Invalid OAuth state".to_string()))?;

        if code.is_empty() {
            return Err(AppError::BadRequest("Missing authorization code".to_string()));
        }

        let grant = self.client.exchange_code(code, redirect_uri).await?;
        let account_email = self.client.account_email(&grant.access_token).await?;

        let now = Utc::now();
        let integration = CalendarIntegration {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.clone(),
            provider,
            account_email,
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at: grant.expires_at,
            calendar_id: match provider {
                Provider::Google => Some("primary".to_string()),
                _ => None,
            },
            is_active: true,
            last_sync_at: None,
            created_at: now,
            updated_at: now,
        };

        self.db.create_integration(&integration).await?;

        tracing::info!(
            user_id = %user_id,
            provider = %provider,
            integration_id = %integration.id,
            "Calendar integration stored"
        );

        Ok(integration)
    }

    /// Fetch events from the user's active integration.
    pub async fn list_events(
        &self,
        user_id: &str,
        range: &TimeRange,
    ) -> Result<Vec<NormalizedEvent>> {
        let provider = self.provider();

        let integration = CalendarIntegration::select_active(
            self.db.list_integrations(user_id).await?,
            provider,
        )
        .ok_or(AppError::NotConnected(provider))?;

        let (integration_id, access_token) = self.valid_access_token(integration).await?;

        let events = self.client.list_events(&access_token, range).await?;

        if let Err(e) = self.db.touch_integration(&integration_id, user_id).await {
            tracing::warn!(error = %e, integration_id = %integration_id, "Failed to record sync time");
        }

        tracing::debug!(
            user_id,
            provider = %provider,
            count = events.len(),
            "Fetched calendar events"
        );

        Ok(events)
    }

    /// Return an access token that is valid for at least the refresh margin,
    /// refreshing and persisting new tokens if needed.
    async fn valid_access_token(
        &self,
        integration: CalendarIntegration,
    ) -> Result<(String, String)> {
        let margin = Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);

        if !integration.expires_within(Utc::now(), margin) {
            return Ok((integration.id, integration.access_token));
        }

        if integration.refresh_token.is_none() {
            // Nothing to refresh with; let the provider reject the token if it has expired
            tracing::debug!(
                integration_id = %integration.id,
                "Token expiring but no refresh token stored"
            );
            return Ok((integration.id, integration.access_token));
        }

        let lock = self
            .refresh_locks
            .entry(integration.id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.refresh_locked(&integration, margin).await
        };

        // Drop the table entry unless another request still holds it
        drop(lock);
        self.refresh_locks
            .remove_if(&integration.id, |_, entry| Arc::strong_count(entry) == 1);

        result
    }

    /// Refresh under the integration's lock, re-reading first in case
    /// another request already stored new tokens.
    async fn refresh_locked(
        &self,
        integration: &CalendarIntegration,
        margin: Duration,
    ) -> Result<(String, String)> {
        let current = self
            .db
            .get_integration(&integration.id, &integration.user_id)
            .await?
            .ok_or_else(|| AppError::NotConnected(integration.provider))?;

        if !current.expires_within(Utc::now(), margin) {
            return Ok((current.id, current.access_token));
        }

        let Some(refresh_token) = current.refresh_token.as_deref() else {
            return Ok((current.id, current.access_token));
        };

        tracing::info!(
            user_id = %current.user_id,
            provider = %current.provider,
            integration_id = %current.id,
            "Access token expiring, refreshing"
        );

        let grant = self.client.refresh_token(refresh_token).await?;

        let updated = self
            .db
            .update_integration_tokens(&current.id, &current.user_id, &grant)
            .await?
            .ok_or_else(|| AppError::NotConnected(current.provider))?;

        Ok((updated.id, updated.access_token))
    }
}
