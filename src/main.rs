// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! FieldFlow API Server
//!
//! Appointment booking backend: calendar integrations (Google Calendar,
//! Calendly) and Stripe payment reconciliation.

use fieldflow::{
    config::{Config, StorageBackend},
    db::{Database, FirestoreDb, MemoryDb},
    services::{
        CalendarProvider, CalendlyClient, DisabledMailer, GoogleCalendarClient, MailgunMailer,
        Mailer, StripeClient,
    },
    AppState, Collaborators,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting FieldFlow API");

    let db: Arc<dyn Database> = match config.storage_backend {
        StorageBackend::Firestore => Arc::new(FirestoreDb::new(&config.gcp_project_id).await?),
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Arc::new(MemoryDb::new())
        }
    };

    let google: Option<Arc<dyn CalendarProvider>> = match &config.google {
        Some(c) => Some(Arc::new(GoogleCalendarClient::new(
            c.client_id.clone(),
            c.client_secret.clone(),
            config.http_timeout,
        )?)),
        None => {
            tracing::warn!("Google OAuth credentials not set, Google Calendar disabled");
            None
        }
    };

    let calendly: Option<Arc<dyn CalendarProvider>> = match &config.calendly {
        Some(c) => Some(Arc::new(CalendlyClient::new(
            c.client_id.clone(),
            c.client_secret.clone(),
            config.http_timeout,
        )?)),
        None => {
            tracing::warn!("Calendly OAuth credentials not set, Calendly disabled");
            None
        }
    };

    let mailer: Arc<dyn Mailer> = match &config.mailgun {
        Some(mailgun) => Arc::new(MailgunMailer::new(mailgun, config.http_timeout)?),
        None => {
            tracing::warn!("Mailgun not configured, confirmation emails disabled");
            Arc::new(DisabledMailer)
        }
    };

    let processor = Arc::new(StripeClient::new(
        config.stripe_secret_key.clone(),
        config.http_timeout,
    )?);

    let port = config.port;

    // Build shared state
    let state = Arc::new(AppState::new(
        config,
        Collaborators {
            db,
            google,
            calendly,
            processor,
            mailer,
        },
    ));

    // Build router
    let app = fieldflow::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fieldflow=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();

    Ok(())
}
