// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! FieldFlow: appointment booking backend for small businesses
//!
//! This crate provides the API for connecting external calendars (Google
//! Calendar, Calendly), managing appointments, and reconciling Stripe
//! payments against appointment records.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use config::Config;
use db::Database;
use error::{AppError, Result};
use models::Provider;
use services::{CalendarConnector, CalendarProvider, Mailer, PaymentProcessor, PaymentReconciler};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Arc<dyn Database>,
    /// `None` when Google credentials are not configured
    pub google: Option<CalendarConnector>,
    /// `None` when Calendly credentials are not configured
    pub calendly: Option<CalendarConnector>,
    pub payments: PaymentReconciler,
    pub mailer: Arc<dyn Mailer>,
}

/// External collaborators injected into [`AppState`].
pub struct Collaborators {
    pub db: Arc<dyn Database>,
    pub google: Option<Arc<dyn CalendarProvider>>,
    pub calendly: Option<Arc<dyn CalendarProvider>>,
    pub processor: Arc<dyn PaymentProcessor>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(config: Config, deps: Collaborators) -> Self {
        // One lock table for every connector in this process
        let refresh_locks: services::RefreshLocks = Arc::new(dashmap::DashMap::new());

        let connector = |client: Arc<dyn CalendarProvider>| {
            CalendarConnector::new(
                client,
                deps.db.clone(),
                config.oauth_state_key.clone(),
                refresh_locks.clone(),
            )
        };

        let google = deps.google.map(connector);
        let calendly = deps.calendly.map(connector);

        let payments = PaymentReconciler::new(
            deps.processor,
            deps.db.clone(),
            config.stripe_currency.clone(),
            config.stripe_webhook_secret.clone(),
        );

        Self {
            config,
            db: deps.db,
            google,
            calendly,
            payments,
            mailer: deps.mailer,
        }
    }

    /// The connector for `provider`, or `ProviderNotConfigured`.
    pub fn connector(&self, provider: Provider) -> Result<&CalendarConnector> {
        let connector = match provider {
            Provider::Google => self.google.as_ref(),
            Provider::Calendly => self.calendly.as_ref(),
            Provider::Microsoft => None,
        };
        connector.ok_or(AppError::ProviderNotConfigured(provider))
    }
}
