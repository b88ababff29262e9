// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Payment intent, confirmation and refund tests against a fake processor.

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use fieldflow::db::{AppointmentStore, UserStore};
use fieldflow::models::{AppointmentUpdate, PaymentStatus};
use serde_json::json;
use tower::ServiceExt;

mod common;
use common::{body_json, create_test_app, json_request, seed_appointment};

const OWNER: &str = "user-owner";
const OTHER: &str = "user-other";

#[tokio::test]
async fn test_create_then_confirm_marks_appointment_paid() {
    let app = create_test_app();
    let appt = seed_appointment(&app.db, OWNER, Utc::now() + Duration::days(2)).await;

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/create-payment-intent",
            OWNER,
            json!({ "amount": 75.5, "appointmentId": appt.id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let created = body_json(response).await;
    let intent_id = created["paymentIntentId"].as_str().unwrap().to_string();
    assert!(created["clientSecret"].as_str().unwrap().starts_with(&intent_id));

    // Client-side confirmation happens at the processor
    app.processor.set_status(&intent_id, "succeeded");

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/confirm-payment",
            OWNER,
            json!({ "paymentIntentId": intent_id, "appointmentId": appt.id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["message"], "Payment confirmed successfully");
    assert_eq!(body["paymentIntent"]["status"], "succeeded");
    assert_eq!(body["paymentIntent"]["amount"], 75.5);

    let stored = app.db.get_appointment(&appt.id, OWNER).await.unwrap().unwrap();
    assert_eq!(stored.payment_status, Some(PaymentStatus::Paid));
    assert_eq!(stored.amount_paid, Some(75.5));
    assert_eq!(stored.payment_intent_id.as_deref(), Some(intent_id.as_str()));
}

#[tokio::test]
async fn test_confirm_incomplete_payment_leaves_appointment_untouched() {
    let app = create_test_app();
    let appt = seed_appointment(&app.db, OWNER, Utc::now() + Duration::days(2)).await;
    app.processor.insert_appointment_intent(
        "pi_pending",
        OWNER,
        &appt.id,
        5000,
        "requires_payment_method",
    );

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/confirm-payment",
            OWNER,
            json!({ "paymentIntentId": "pi_pending", "appointmentId": appt.id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"], "payment_not_completed");
    assert_eq!(body["status"], "requires_payment_method");

    let stored = app.db.get_appointment(&appt.id, OWNER).await.unwrap().unwrap();
    assert_eq!(stored, appt);
}

#[tokio::test]
async fn test_refund_for_other_users_appointment_makes_no_processor_calls() {
    let app = create_test_app();
    let appt = seed_appointment(&app.db, OWNER, Utc::now()).await;
    app.processor.insert_intent("pi_paid", OWNER, 5000, "succeeded");

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/refund-payment",
            OTHER,
            json!({ "paymentIntentId": "pi_paid", "appointmentId": appt.id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.processor.calls(), 0);

    let stored = app.db.get_appointment(&appt.id, OWNER).await.unwrap().unwrap();
    assert_eq!(stored.payment_status, None);
}

#[tokio::test]
async fn test_partial_refund_marks_appointment_refunded() {
    let app = create_test_app();
    let appt = seed_appointment(&app.db, OWNER, Utc::now()).await;
    app.processor
        .insert_appointment_intent("pi_paid", OWNER, &appt.id, 5000, "succeeded");
    app.db
        .update_appointment(&appt.id, OWNER, &AppointmentUpdate::paid("pi_paid", 50.0))
        .await
        .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/refund-payment",
            OWNER,
            json!({ "paymentIntentId": "pi_paid", "amount": 20.0, "appointmentId": appt.id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["message"], "Refund processed successfully");
    assert_eq!(body["refund"]["amount"], 20.0);

    let stored = app.db.get_appointment(&appt.id, OWNER).await.unwrap().unwrap();
    assert_eq!(stored.payment_status, Some(PaymentStatus::Refunded));
    assert_eq!(stored.refund_amount, Some(20.0));
}

#[tokio::test]
async fn test_confirm_other_users_intent_is_not_found() {
    let app = create_test_app();
    app.processor.insert_intent("pi_theirs", OTHER, 5000, "succeeded");

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/confirm-payment",
            OWNER,
            json!({ "paymentIntentId": "pi_theirs" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_amounts_rejected() {
    let app = create_test_app();

    for amount in [json!(-5), json!(0), json!(0.001), json!(null)] {
        let response = app
            .router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/create-payment-intent",
                OWNER,
                json!({ "amount": amount }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "amount {}", amount);

        let body = body_json(response).await;
        assert_eq!(body["error"], "invalid_amount");
    }

    assert_eq!(app.processor.calls(), 0);
}

#[tokio::test]
async fn test_missing_payment_intent_id_is_bad_request() {
    let app = create_test_app();

    for uri in ["/api/confirm-payment", "/api/refund-payment"] {
        let response = app
            .router
            .clone()
            .oneshot(json_request("POST", uri, OWNER, json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }
}

#[tokio::test]
async fn test_customer_created_once_per_user() {
    let app = create_test_app();

    for _ in 0..2 {
        let response = app
            .router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/create-payment-intent",
                OWNER,
                json!({ "amount": 10 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(app.processor.customers_created(), 1);

    let user = app.db.get_user(OWNER).await.unwrap().unwrap();
    assert_eq!(
        user.stripe_customer_id.as_deref(),
        Some("cus_user-owner")
    );
}

#[tokio::test]
async fn test_create_intent_for_other_users_appointment_is_not_found() {
    let app = create_test_app();
    let appt = seed_appointment(&app.db, OTHER, Utc::now()).await;

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/create-payment-intent",
            OWNER,
            json!({ "amount": 10, "appointmentId": appt.id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.processor.calls(), 0);
}

#[tokio::test]
async fn test_confirm_with_intent_for_another_appointment_is_not_found() {
    let app = create_test_app();
    let paid_for = seed_appointment(&app.db, OWNER, Utc::now()).await;
    let other = seed_appointment(&app.db, OWNER, Utc::now()).await;
    app.processor
        .insert_appointment_intent("pi_one", OWNER, &paid_for.id, 5000, "succeeded");

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/confirm-payment",
            OWNER,
            json!({ "paymentIntentId": "pi_one", "appointmentId": other.id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let stored = app.db.get_appointment(&other.id, OWNER).await.unwrap().unwrap();
    assert_eq!(stored, other);
}

#[tokio::test]
async fn test_refund_with_intent_not_recorded_on_appointment_is_not_found() {
    let app = create_test_app();
    let appt = seed_appointment(&app.db, OWNER, Utc::now()).await;
    app.db
        .update_appointment(&appt.id, OWNER, &AppointmentUpdate::paid("pi_real", 50.0))
        .await
        .unwrap();
    app.processor.insert_intent("pi_unrelated", OWNER, 5000, "succeeded");

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/refund-payment",
            OWNER,
            json!({ "paymentIntentId": "pi_unrelated", "appointmentId": appt.id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.processor.calls(), 0);

    let stored = app.db.get_appointment(&appt.id, OWNER).await.unwrap().unwrap();
    assert_eq!(stored.payment_status, Some(PaymentStatus::Paid));
}

#[tokio::test]
async fn test_mistyped_amount_is_bad_request() {
    let app = create_test_app();

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/create-payment-intent",
            OWNER,
            json!({ "amount": "50" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"], "bad_request");
    assert!(body["details"].as_str().unwrap().contains("invalid type"));
    assert_eq!(app.processor.calls(), 0);
}
