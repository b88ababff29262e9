// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use std::collections::BTreeMap;

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::models::Provider;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("{0} calendar not connected")]
    NotConnected(Provider),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Amount must be a positive value of at least one cent")]
    InvalidAmount,

    #[error("Payment not completed (status {0})")]
    PaymentNotCompleted(String),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("{0} integration is not configured")]
    ProviderNotConfigured(Provider),

    #[error("{provider} API error: {message}")]
    Upstream {
        provider: &'static str,
        message: String,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn upstream(provider: &'static str, message: impl Into<String>) -> Self {
        AppError::Upstream {
            provider,
            message: message.into(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<BTreeMap<String, Vec<String>>>,
}

fn field_messages(errors: &validator::ValidationErrors) -> BTreeMap<String, Vec<String>> {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut status_field = None;
        let mut fields = None;

        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::NotConnected(_) => {
                (StatusCode::NOT_FOUND, "not_connected", Some(self.to_string()))
            }
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Validation(errors) => {
                fields = Some(field_messages(errors));
                (StatusCode::BAD_REQUEST, "validation_error", None)
            }
            AppError::InvalidAmount => (
                StatusCode::BAD_REQUEST,
                "invalid_amount",
                Some(self.to_string()),
            ),
            AppError::PaymentNotCompleted(payment_status) => {
                status_field = Some(payment_status.clone());
                (StatusCode::BAD_REQUEST, "payment_not_completed", None)
            }
            AppError::InvalidSignature(msg) => {
                tracing::warn!(error = %msg, "Rejected webhook signature");
                (StatusCode::BAD_REQUEST, "invalid_signature", None)
            }
            AppError::ProviderNotConfigured(provider) => {
                tracing::error!(%provider, "Provider credentials not configured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "provider_not_configured",
                    Some(self.to_string()),
                )
            }
            AppError::Upstream { provider, message } => {
                tracing::error!(provider, error = %message, "Upstream API error");
                (StatusCode::INTERNAL_SERVER_ERROR, "upstream_error", None)
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
            status: status_field,
            fields,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
