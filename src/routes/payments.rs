// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Payment routes backed by the payment reconciler.

use axum::{extract::State, routing::post, Extension, Json, Router};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::services::payments::{IntentCreated, PaymentResult, RefundResult};
use crate::AppState;

/// Payment routes (auth applied in routes/mod.rs).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/create-payment-intent", post(create_payment_intent))
        .route("/api/confirm-payment", post(confirm_payment))
        .route("/api/refund-payment", post(refund_payment))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    amount: Option<f64>,
    appointment_id: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentRequest {
    payment_intent_id: Option<String>,
    appointment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    payment_intent_id: Option<String>,
    amount: Option<f64>,
    appointment_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentResponse {
    pub message: &'static str,
    pub payment_intent: PaymentResult,
}

#[derive(Serialize)]
pub struct RefundResponse {
    pub message: &'static str,
    pub refund: RefundResult,
}

fn required_intent_id(id: Option<String>) -> Result<String> {
    id.filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Payment intent ID is required".to_string()))
}

async fn create_payment_intent(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Json(body), _): WithRejection<Json<CreateIntentRequest>, AppError>,
) -> Result<Json<IntentCreated>> {
    let amount = body.amount.ok_or(AppError::InvalidAmount)?;
    let account = user.ensure_user(state.db.as_ref()).await?;

    let created = state
        .payments
        .create_intent(
            &account,
            amount,
            body.appointment_id.as_deref(),
            body.description.as_deref(),
        )
        .await?;

    Ok(Json(created))
}

async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Json(body), _): WithRejection<Json<ConfirmPaymentRequest>, AppError>,
) -> Result<Json<ConfirmPaymentResponse>> {
    let payment_intent_id = required_intent_id(body.payment_intent_id)?;

    let payment_intent = state
        .payments
        .confirm_intent(
            &user.user_id,
            &payment_intent_id,
            body.appointment_id.as_deref(),
        )
        .await?;

    Ok(Json(ConfirmPaymentResponse {
        message: "Payment confirmed successfully",
        payment_intent,
    }))
}

async fn refund_payment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Json(body), _): WithRejection<Json<RefundRequest>, AppError>,
) -> Result<Json<RefundResponse>> {
    let payment_intent_id = required_intent_id(body.payment_intent_id)?;

    let refund = state
        .payments
        .refund(
            &user.user_id,
            &payment_intent_id,
            body.amount,
            body.appointment_id.as_deref(),
        )
        .await?;

    Ok(Json(RefundResponse {
        message: "Refund processed successfully",
        refund,
    }))
}
