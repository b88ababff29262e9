// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stripe webhook route.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::Result;
use crate::AppState;

/// Header carrying the Stripe signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Webhook routes. Public; authenticity comes from the signature.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/stripe/webhook", post(handle_event))
}

#[derive(Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// Verify and apply a webhook delivery.
///
/// The raw body is needed for signature verification, so it is read as bytes
/// and only parsed after the signature checks out.
async fn handle_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok());

    let event_type = state
        .payments
        .apply_webhook_event(&body, signature)
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "Rejected webhook delivery"))?;

    tracing::debug!(event_type = %event_type, "Webhook processed");

    Ok(Json(WebhookAck { received: true }))
}
