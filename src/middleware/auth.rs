// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JWT authentication middleware.
//!
//! Session tokens are issued by the identity provider (HS256 with a shared
//! key). This service only verifies them.

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::User;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Name of the session cookie set by the frontend.
pub const SESSION_COOKIE: &str = "fieldflow_session";

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (identity provider user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
}

/// Authenticated user extracted from JWT.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl AuthUser {
    /// Load the stored user record, creating it from the token claims on
    /// first use.
    pub async fn ensure_user(&self, db: &dyn Database) -> Result<User> {
        if let Some(user) = db.get_user(&self.user_id).await? {
            return Ok(user);
        }

        let user = User::new(
            self.user_id.clone(),
            self.email.clone(),
            self.first_name.clone(),
            self.last_name.clone(),
            Utc::now(),
        );
        db.upsert_user(&user).await?;

        tracing::info!(user_id = %user.id, "Created user record");
        Ok(user)
    }
}

/// Middleware that requires valid JWT authentication.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    // Try cookie first, then header
    let token = if let Some(cookie) = jar.get(SESSION_COOKIE) {
        cookie.value().to_string()
    } else {
        let auth_header = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
            Some(t) if !t.trim().is_empty() => t.trim().to_string(),
            _ => return Err(AppError::Unauthorized),
        }
    };

    let claims = decode_token(&token, &state.config.jwt_signing_key)?;

    if claims.sub.is_empty() {
        return Err(AppError::InvalidToken);
    }

    let auth_user = AuthUser {
        user_id: claims.sub,
        email: claims.email,
        first_name: claims.given_name,
        last_name: claims.family_name,
    };
    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}

/// Verify a session token and return its claims.
pub fn decode_token(token: &str, signing_key: &[u8]) -> Result<Claims> {
    let key = DecodingKey::from_secret(signing_key);
    let validation = Validation::new(Algorithm::HS256);

    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(error = %e, "Rejected session token");
            AppError::InvalidToken
        })
}
