// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Optional integrations (Google, Calendly, Mailgun) are disabled when their
//! credentials are absent rather than failing startup.

use std::env;
use std::time::Duration;

/// OAuth client credentials for one calendar provider.
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct MailgunConfig {
    pub api_key: String,
    pub domain: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Firestore,
    Memory,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// Frontend URL (CORS origin)
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    pub storage_backend: StorageBackend,
    /// Timeout applied to every outbound HTTP request
    pub http_timeout: Duration,

    /// HS256 key shared with the identity provider (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// HMAC key for OAuth `state` parameters
    pub oauth_state_key: Vec<u8>,

    pub google: Option<OAuthClientConfig>,
    pub calendly: Option<OAuthClientConfig>,
    /// Fixed Calendly redirect URI; computed from the request when unset
    pub calendly_redirect_url: Option<String>,

    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_currency: String,

    pub mailgun: Option<MailgunConfig>,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            port: 8080,
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            storage_backend: StorageBackend::Memory,
            http_timeout: Duration::from_secs(30),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            oauth_state_key: b"test_oauth_state_key_32_bytes!!".to_vec(),
            google: Some(OAuthClientConfig {
                client_id: "test_google_client".to_string(),
                client_secret: "test_google_secret".to_string(),
            }),
            calendly: Some(OAuthClientConfig {
                client_id: "test_calendly_client".to_string(),
                client_secret: "test_calendly_secret".to_string(),
            }),
            calendly_redirect_url: None,
            stripe_secret_key: "sk_test_dummy".to_string(),
            stripe_webhook_secret: "whsec_test_secret".to_string(),
            stripe_currency: "usd".to_string(),
            mailgun: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let storage_backend = match optional("STORAGE_BACKEND").as_deref() {
            None | Some("firestore") => StorageBackend::Firestore,
            Some("memory") => StorageBackend::Memory,
            Some(_) => return Err(ConfigError::Invalid("STORAGE_BACKEND")),
        };

        let http_timeout_secs = match optional("HTTP_TIMEOUT_SECS") {
            Some(v) => v
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::Invalid("HTTP_TIMEOUT_SECS"))?,
            None => 30,
        };

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::Invalid("PORT"))?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            storage_backend,
            http_timeout: Duration::from_secs(http_timeout_secs),

            jwt_signing_key: required("JWT_SIGNING_KEY")?.into_bytes(),
            oauth_state_key: required("OAUTH_STATE_KEY")?.into_bytes(),

            google: oauth_client("GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET"),
            calendly: oauth_client("CALENDLY_CLIENT_ID", "CALENDLY_CLIENT_SECRET"),
            calendly_redirect_url: optional("CALENDLY_REDIRECT_URL"),

            stripe_secret_key: required("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            stripe_currency: optional("STRIPE_CURRENCY")
                .map(|c| c.to_lowercase())
                .unwrap_or_else(|| "usd".to_string()),

            mailgun: match (optional("MAILGUN_API_KEY"), optional("MAILGUN_DOMAIN")) {
                (Some(api_key), Some(domain)) => Some(MailgunConfig { api_key, domain }),
                _ => None,
            },
        })
    }
}

/// Trimmed, non-empty value of an environment variable.
fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn oauth_client(id_var: &str, secret_var: &str) -> Option<OAuthClientConfig> {
    Some(OAuthClientConfig {
        client_id: optional(id_var)?,
        client_secret: optional(secret_var)?,
    })
}

/// Build the absolute OAuth redirect URI for the current deployment.
///
/// `host` and `proto` come from `x-forwarded-host`/`host` and
/// `x-forwarded-proto`. Without a forwarded protocol, localhost is assumed to
/// be plain HTTP and anything else HTTPS.
pub fn compute_redirect_uri(host: &str, proto: Option<&str>, provider_path: &str) -> String {
    // Forwarded headers may carry a comma-separated chain; the first hop is the client's
    let host = host.split(',').next().unwrap_or(host).trim();
    let proto = proto
        .and_then(|p| p.split(',').next())
        .map(str::trim)
        .filter(|p| !p.is_empty());

    let scheme = match proto {
        Some(p) => p.to_string(),
        None if is_local(host) => "http".to_string(),
        None => "https".to_string(),
    };

    let path = if provider_path.starts_with('/') {
        provider_path.to_string()
    } else {
        format!("/{}", provider_path)
    };

    format!("{}://{}{}", scheme, host, path)
}

fn is_local(host: &str) -> bool {
    host.starts_with("localhost") || host.starts_with("127.0.0.1") || host.starts_with("[::1]")
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
