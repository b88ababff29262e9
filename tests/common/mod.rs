// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use chrono::{Duration, Utc};
use fieldflow::config::Config;
use fieldflow::db::{Database, FirestoreDb, MemoryDb};
use fieldflow::error::{AppError, Result};
use fieldflow::models::{NormalizedEvent, Provider, TimeRange, TokenGrant};
use fieldflow::routes::create_router;
use fieldflow::services::payments::{CreateIntent, PaymentIntent, Refund};
use fieldflow::services::{CalendarProvider, EmailMessage, Mailer, PaymentProcessor};
use fieldflow::{AppState, Collaborators};
use hmac::{Hmac, Mac};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Check if emulator is available via environment variable.
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

// ─── Fakes ───────────────────────────────────────────────────

/// In-process payment processor. Intents start as `requires_payment_method`
/// until a test moves them with [`FakeProcessor::set_status`].
#[derive(Default)]
pub struct FakeProcessor {
    intents: Mutex<HashMap<String, PaymentIntent>>,
    customers: Mutex<HashMap<String, String>>,
    calls: AtomicUsize,
    next_id: AtomicUsize,
}

impl FakeProcessor {
    /// Number of processor API calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn customers_created(&self) -> usize {
        self.customers.lock().unwrap().len()
    }

    pub fn set_status(&self, payment_intent_id: &str, status: &str) {
        let mut intents = self.intents.lock().unwrap();
        let intent = intents.get_mut(payment_intent_id).expect("unknown intent");
        intent.status = status.to_string();
    }

    /// Insert an intent directly, bypassing `create_intent`.
    pub fn insert_intent(&self, id: &str, user_id: &str, amount: i64, status: &str) {
        self.insert_intent_with_metadata(id, amount, status, &[("userId", user_id)]);
    }

    /// Insert an intent created for `appointment_id`.
    pub fn insert_appointment_intent(
        &self,
        id: &str,
        user_id: &str,
        appointment_id: &str,
        amount: i64,
        status: &str,
    ) {
        self.insert_intent_with_metadata(
            id,
            amount,
            status,
            &[("userId", user_id), ("appointmentId", appointment_id)],
        );
    }

    fn insert_intent_with_metadata(
        &self,
        id: &str,
        amount: i64,
        status: &str,
        metadata: &[(&str, &str)],
    ) {
        self.intents.lock().unwrap().insert(
            id.to_string(),
            PaymentIntent {
                id: id.to_string(),
                status: status.to_string(),
                amount,
                client_secret: Some(format!("{}_secret", id)),
                metadata: metadata
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
        );
    }

    fn next(&self, prefix: &str) -> String {
        format!("{}_{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    async fn create_customer(
        &self,
        user_id: &str,
        _email: Option<&str>,
        _name: Option<&str>,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut customers = self.customers.lock().unwrap();
        let id = customers
            .entry(user_id.to_string())
            .or_insert_with(|| format!("cus_{}", user_id));
        Ok(id.clone())
    }

    async fn create_intent(&self, params: &CreateIntent) -> Result<PaymentIntent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let id = self.next("pi");
        let intent = PaymentIntent {
            id: id.clone(),
            status: "requires_payment_method".to_string(),
            amount: params.amount_cents,
            client_secret: Some(format!("{}_secret", id)),
            metadata: params.metadata.iter().cloned().collect(),
        };
        self.intents.lock().unwrap().insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_intent(&self, payment_intent_id: &str) -> Result<PaymentIntent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.intents
            .lock()
            .unwrap()
            .get(payment_intent_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Payment intent".to_string()))
    }

    async fn create_refund(
        &self,
        payment_intent_id: &str,
        amount_cents: Option<i64>,
    ) -> Result<Refund> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let intent = self
            .intents
            .lock()
            .unwrap()
            .get(payment_intent_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Payment intent".to_string()))?;

        Ok(Refund {
            id: self.next("re"),
            amount: amount_cents.unwrap_or(intent.amount),
            status: Some("succeeded".to_string()),
        })
    }
}

/// Calendar provider that never leaves the process.
///
/// The code `"bad-code"` makes the token exchange fail like a provider 400.
pub struct FakeCalendarProvider {
    provider: Provider,
    refreshes: AtomicUsize,
    seen_tokens: Mutex<Vec<String>>,
}

impl FakeCalendarProvider {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            refreshes: AtomicUsize::new(0),
            seen_tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Access tokens passed to `list_events`, in call order.
    pub fn seen_tokens(&self) -> Vec<String> {
        self.seen_tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl CalendarProvider for FakeCalendarProvider {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn authorization_url(&self, redirect_uri: &str, state: &str) -> String {
        format!(
            "https://auth.example.com/{}?redirect_uri={}&state={}",
            self.provider,
            urlencoding::encode(redirect_uri),
            urlencoding::encode(state)
        )
    }

    async fn exchange_code(&self, code: &str, _redirect_uri: &str) -> Result<TokenGrant> {
        if code == "bad-code" {
            return Err(AppError::upstream("fake", "invalid_grant"));
        }
        Ok(TokenGrant {
            access_token: format!("access-{}", code),
            refresh_token: Some("refresh-1".to_string()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
        })
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenGrant> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TokenGrant {
            access_token: format!("refreshed-{}", n),
            refresh_token: None,
            expires_at: Some(Utc::now() + Duration::hours(1)),
        })
    }

    async fn account_email(&self, _access_token: &str) -> Result<String> {
        Ok("owner@example.com".to_string())
    }

    async fn list_events(
        &self,
        access_token: &str,
        _range: &TimeRange,
    ) -> Result<Vec<NormalizedEvent>> {
        self.seen_tokens
            .lock()
            .unwrap()
            .push(access_token.to_string());
        Ok(vec![NormalizedEvent {
            id: "evt-1".to_string(),
            title: "Consultation".to_string(),
            start: Some("2026-05-04T10:00:00Z".to_string()),
            end: Some("2026-05-04T11:00:00Z".to_string()),
            description: None,
            location: None,
            source: self.provider,
        }])
    }
}

/// Mailer that records messages, or fails every send.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<EmailMessage>>,
    pub fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        if self.fail {
            return Err(AppError::upstream("mailgun", "503 Service Unavailable"));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

// ─── App ─────────────────────────────────────────────────────

/// Handles to the fakes behind a test app.
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub db: Arc<MemoryDb>,
    pub processor: Arc<FakeProcessor>,
    pub google: Arc<FakeCalendarProvider>,
    pub calendly: Arc<FakeCalendarProvider>,
    pub mailer: Arc<RecordingMailer>,
}

/// Create a test app over the in-memory store and fakes.
pub fn create_test_app() -> TestApp {
    create_test_app_with_mailer(RecordingMailer::default())
}

pub fn create_test_app_with_mailer(mailer: RecordingMailer) -> TestApp {
    let config = Config::default();
    let db = Arc::new(MemoryDb::new());
    let processor = Arc::new(FakeProcessor::default());
    let google = Arc::new(FakeCalendarProvider::new(Provider::Google));
    let calendly = Arc::new(FakeCalendarProvider::new(Provider::Calendly));
    let mailer = Arc::new(mailer);

    let state = Arc::new(AppState::new(
        config,
        Collaborators {
            db: db.clone() as Arc<dyn Database>,
            google: Some(google.clone() as Arc<dyn CalendarProvider>),
            calendly: Some(calendly.clone() as Arc<dyn CalendarProvider>),
            processor: processor.clone(),
            mailer: mailer.clone(),
        },
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        db,
        processor,
        google,
        calendly,
        mailer,
    }
}

// ─── Requests ────────────────────────────────────────────────

/// Create a test JWT for `user_id`, signed with the test config key.
pub fn create_test_jwt(user_id: &str) -> String {
    #[derive(Serialize)]
    struct Claims<'a> {
        sub: &'a str,
        exp: usize,
        iat: usize,
        email: &'a str,
        given_name: &'a str,
    }

    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user_id,
        exp: now + 86400,
        iat: now,
        email: "owner@example.com",
        given_name: "Pat",
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(&Config::default().jwt_signing_key),
    )
    .unwrap()
}

/// Authenticated JSON request.
pub fn json_request(method: &str, uri: &str, user_id: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", create_test_jwt(user_id)))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Authenticated request without a body.
pub fn authed_request(method: &str, uri: &str, user_id: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", create_test_jwt(user_id)))
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// `stripe-signature` header value for `payload` signed at `timestamp`.
pub fn sign_webhook(payload: &str, secret: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

/// Store an appointment for `user_id` directly, bypassing the API.
pub async fn seed_appointment(
    db: &MemoryDb,
    user_id: &str,
    date: chrono::DateTime<Utc>,
) -> fieldflow::models::Appointment {
    use fieldflow::db::AppointmentStore;
    use fieldflow::models::NewAppointment;

    let new: NewAppointment = serde_json::from_value(serde_json::json!({
        "customerName": "Jordan Customer",
        "service": "Lawn care",
        "appointmentDate": date,
    }))
    .unwrap();

    let appointment = new.into_appointment(user_id, Utc::now());
    db.create_appointment(&appointment).await.unwrap();
    appointment
}
