// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Calendar OAuth routes.
//!
//! Starting a flow requires a session; the provider callbacks are public and
//! identify the user through the signed `state` parameter.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::compute_redirect_uri;
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::Provider;
use crate::AppState;

const GOOGLE_CALLBACK_PATH: &str = "/api/auth/google/callback";
const CALENDLY_CALLBACK_PATH: &str = "/api/auth/calendly/callback";

/// Routes that start an OAuth flow (auth applied in routes/mod.rs).
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/google", get(google_start))
        .route("/api/auth/calendly", get(calendly_start))
        .route("/api/auth/complete-registration", post(complete_registration))
}

/// Provider callbacks (public).
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(GOOGLE_CALLBACK_PATH, get(google_callback))
        .route(CALENDLY_CALLBACK_PATH, get(calendly_callback))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUrlResponse {
    pub auth_url: String,
}

/// Calendar choice made at the end of sign-up.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrationChoice {
    connect_google_calendar: bool,
    connect_calendly: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
    pub redirect_to_dashboard: bool,
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Redirect URI registered with the provider for this request's host.
fn redirect_uri_for(state: &AppState, headers: &HeaderMap, provider: Provider) -> String {
    if provider == Provider::Calendly {
        if let Some(url) = &state.config.calendly_redirect_url {
            return url.clone();
        }
    }

    let header_str = |name: &str| headers.get(name).and_then(|h| h.to_str().ok());

    let host = header_str("x-forwarded-host")
        .or_else(|| header_str(header::HOST.as_str()))
        .unwrap_or("localhost:8080");
    let proto = header_str("x-forwarded-proto");

    let path = match provider {
        Provider::Calendly => CALENDLY_CALLBACK_PATH,
        _ => GOOGLE_CALLBACK_PATH,
    };

    compute_redirect_uri(host, proto, path)
}

async fn start(
    state: &AppState,
    user: &AuthUser,
    headers: &HeaderMap,
    provider: Provider,
) -> Result<Json<AuthUrlResponse>> {
    let connector = state.connector(provider)?;
    let redirect_uri = redirect_uri_for(state, headers, provider);
    let auth_url = connector.begin_auth(&user.user_id, &redirect_uri)?;

    Ok(Json(AuthUrlResponse { auth_url }))
}

async fn google_start(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
) -> Result<Json<AuthUrlResponse>> {
    start(&state, &user, &headers, Provider::Google).await
}

async fn calendly_start(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
) -> Result<Json<AuthUrlResponse>> {
    start(&state, &user, &headers, Provider::Calendly).await
}

/// Start the chosen provider's OAuth flow, or send the user straight to the
/// dashboard when no calendar was picked. Google wins if both are set.
async fn complete_registration(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    WithRejection(Json(choice), _): WithRejection<Json<RegistrationChoice>, AppError>,
) -> Result<Json<RegistrationResponse>> {
    let provider = if choice.connect_google_calendar {
        Provider::Google
    } else if choice.connect_calendly {
        Provider::Calendly
    } else {
        tracing::info!(user_id = %user.user_id, "Registration completed without a calendar");
        return Ok(Json(RegistrationResponse {
            auth_url: None,
            redirect_to_dashboard: true,
        }));
    };

    let Json(started) = start(&state, &user, &headers, provider).await?;

    Ok(Json(RegistrationResponse {
        auth_url: Some(started.auth_url),
        redirect_to_dashboard: false,
    }))
}

/// Exchange the code and redirect the browser back to the UI. Failures are
/// reported through the redirect flag, never as JSON.
async fn callback(
    state: &AppState,
    headers: &HeaderMap,
    params: CallbackParams,
    provider: Provider,
) -> Response {
    let flag = provider.redirect_flag();
    let outcome = |result: &str| {
        (
            StatusCode::FOUND,
            [(header::LOCATION, format!("/?{}={}", flag, result))],
        )
            .into_response()
    };

    if let Some(error) = params.error {
        tracing::warn!(provider = %provider, error = %error, "OAuth error from provider");
        return outcome("error");
    }

    let (Some(code), Some(oauth_state)) = (params.code, params.state) else {
        tracing::warn!(provider = %provider, "OAuth callback missing code or state");
        return outcome("error");
    };

    let connector = match state.connector(provider) {
        Ok(connector) => connector,
        Err(e) => {
            tracing::error!(provider = %provider, error = %e, "OAuth callback for unconfigured provider");
            return outcome("error");
        }
    };

    let redirect_uri = redirect_uri_for(state, headers, provider);

    match connector
        .complete_auth(&code, &oauth_state, &redirect_uri)
        .await
    {
        Ok(integration) => {
            tracing::info!(
                user_id = %integration.user_id,
                provider = %provider,
                "Calendar connected"
            );
            outcome("connected")
        }
        Err(e) => {
            tracing::error!(provider = %provider, error = %e, "OAuth callback failed");
            outcome("error")
        }
    }
}

async fn google_callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    callback(&state, &headers, params, Provider::Google).await
}

async fn calendly_callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    callback(&state, &headers, params, Provider::Calendly).await
}
