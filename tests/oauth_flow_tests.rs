// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Calendar OAuth flow tests: authorization URL, callback, and state binding.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use fieldflow::db::CredentialStore;
use fieldflow::models::Provider;
use tower::ServiceExt;

mod common;
use common::{body_json, create_test_app, create_test_jwt, TestApp};

const OWNER: &str = "user-owner";

fn start_request(path: &str, host: &str, forwarded_proto: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .uri(path)
        .header(header::HOST, host)
        .header(header::AUTHORIZATION, format!("Bearer {}", create_test_jwt(OWNER)));
    if let Some(proto) = forwarded_proto {
        builder = builder.header("x-forwarded-proto", proto);
    }
    builder.body(Body::empty()).unwrap()
}

fn query_param(url: &str, name: &str) -> String {
    let query = url.split_once('?').map(|(_, q)| q).unwrap_or("");
    let raw = query
        .split('&')
        .find_map(|pair| pair.strip_prefix(&format!("{}=", name)))
        .unwrap_or_else(|| panic!("{} missing from {}", name, url));
    urlencoding::decode(raw).unwrap().into_owned()
}

/// Start a flow as OWNER and return the authorization URL.
async fn begin(app: &TestApp, path: &str) -> String {
    let response = app
        .router
        .clone()
        .oneshot(start_request(path, "app.example.com", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["authUrl"]
        .as_str()
        .unwrap()
        .to_string()
}

async fn callback(app: &TestApp, path: &str, query: &str) -> String {
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("{}?{}", path, query))
                .header(header::HOST, "app.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_auth_url_uses_request_host() {
    let app = create_test_app();

    let auth_url = begin(&app, "/api/auth/google").await;
    assert_eq!(
        query_param(&auth_url, "redirect_uri"),
        "https://app.example.com/api/auth/google/callback"
    );

    let response = app
        .router
        .clone()
        .oneshot(start_request("/api/auth/google", "localhost:8080", None))
        .await
        .unwrap();
    let auth_url = body_json(response).await["authUrl"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(
        query_param(&auth_url, "redirect_uri"),
        "http://localhost:8080/api/auth/google/callback"
    );
}

#[tokio::test]
async fn test_auth_url_honors_forwarded_proto() {
    let app = create_test_app();

    let response = app
        .router
        .clone()
        .oneshot(start_request(
            "/api/auth/calendly",
            "preview.example.com",
            Some("http"),
        ))
        .await
        .unwrap();
    let auth_url = body_json(response).await["authUrl"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(
        query_param(&auth_url, "redirect_uri"),
        "http://preview.example.com/api/auth/calendly/callback"
    );
}

#[tokio::test]
async fn test_start_requires_authentication() {
    let app = create_test_app();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/google")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_google_flow_stores_integration() {
    let app = create_test_app();

    let auth_url = begin(&app, "/api/auth/google").await;
    let state = query_param(&auth_url, "state");

    let location = callback(
        &app,
        "/api/auth/google/callback",
        &format!("code=abc&state={}", urlencoding::encode(&state)),
    )
    .await;
    assert_eq!(location, "/?google_calendar=connected");

    let integrations = app.db.list_integrations(OWNER).await.unwrap();
    assert_eq!(integrations.len(), 1);

    let integration = &integrations[0];
    assert_eq!(integration.provider, Provider::Google);
    assert_eq!(integration.access_token, "access-abc");
    assert_eq!(integration.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(integration.account_email, "owner@example.com");
    assert_eq!(integration.calendar_id.as_deref(), Some("primary"));
    assert!(integration.is_active);
}

#[tokio::test]
async fn test_calendly_flow_stores_integration() {
    let app = create_test_app();

    let auth_url = begin(&app, "/api/auth/calendly").await;
    let state = query_param(&auth_url, "state");

    let location = callback(
        &app,
        "/api/auth/calendly/callback",
        &format!("code=xyz&state={}", urlencoding::encode(&state)),
    )
    .await;
    assert_eq!(location, "/?calendly=connected");

    let integrations = app.db.list_integrations(OWNER).await.unwrap();
    assert_eq!(integrations.len(), 1);
    assert_eq!(integrations[0].provider, Provider::Calendly);
    assert_eq!(integrations[0].calendar_id, None);
}

#[tokio::test]
async fn test_provider_error_redirects_without_storing() {
    let app = create_test_app();

    let auth_url = begin(&app, "/api/auth/google").await;
    let state = urlencoding::encode(&query_param(&auth_url, "state")).into_owned();

    let queries = [
        format!("code=bad-code&state={}", state),
        format!("error=access_denied&state={}", state),
        format!("state={}", state),
        "code=abc".to_string(),
    ];

    for query in queries {
        let location = callback(&app, "/api/auth/google/callback", &query).await;
        assert_eq!(location, "/?google_calendar=error", "query {}", query);
    }

    assert!(app.db.list_integrations(OWNER).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_forged_state_is_rejected() {
    let app = create_test_app();

    // A bare user ID is what an unsigned state would look like
    for state in [OWNER, "dXNlci1vd25lcnwwfDAw"] {
        let location = callback(
            &app,
            "/api/auth/google/callback",
            &format!("code=abc&state={}", state),
        )
        .await;
        assert_eq!(location, "/?google_calendar=error");
    }

    assert!(app.db.list_integrations(OWNER).await.unwrap().is_empty());
}

fn registration_request(choice: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/auth/complete-registration")
        .header(header::HOST, "app.example.com")
        .header(header::AUTHORIZATION, format!("Bearer {}", create_test_jwt(OWNER)))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(choice.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_complete_registration_starts_chosen_flow() {
    let app = create_test_app();

    let cases = [
        (
            serde_json::json!({ "connectGoogleCalendar": true }),
            "https://app.example.com/api/auth/google/callback",
        ),
        (
            serde_json::json!({ "connectCalendly": true }),
            "https://app.example.com/api/auth/calendly/callback",
        ),
    ];

    for (choice, redirect_uri) in cases {
        let response = app
            .router
            .clone()
            .oneshot(registration_request(choice.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "choice {}", choice);

        let body = body_json(response).await;
        assert_eq!(body["redirectToDashboard"], false);
        let auth_url = body["authUrl"].as_str().unwrap();
        assert_eq!(query_param(auth_url, "redirect_uri"), redirect_uri);
    }

    // The returned state completes the flow like the direct start route
    let response = app
        .router
        .clone()
        .oneshot(registration_request(
            serde_json::json!({ "connectGoogleCalendar": true }),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    let state = query_param(body["authUrl"].as_str().unwrap(), "state");
    let location = callback(
        &app,
        "/api/auth/google/callback",
        &format!("code=abc&state={}", urlencoding::encode(&state)),
    )
    .await;
    assert_eq!(location, "/?google_calendar=connected");
}

#[tokio::test]
async fn test_complete_registration_without_calendar() {
    let app = create_test_app();

    for choice in [
        serde_json::json!({}),
        serde_json::json!({ "connectGoogleCalendar": false, "connectCalendly": false }),
    ] {
        let response = app
            .router
            .clone()
            .oneshot(registration_request(choice))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["redirectToDashboard"], true);
        assert!(body.get("authUrl").is_none());
    }

    assert!(app.db.list_integrations(OWNER).await.unwrap().is_empty());
}
