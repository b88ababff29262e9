// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Dashboard statistics computed from a user's appointments.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::{Appointment, AppointmentStatus};

/// Dashboard counters for one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentStats {
    /// Appointments whose date falls in the current UTC day
    pub today_appointments: u32,
    /// Reminders sent in the last 7 days
    pub reminders_sent: u32,
    /// Percent of appointments created in the last 30 days that are confirmed
    pub confirmation_rate: u32,
    /// Percent of appointments created in the last 30 days marked no-show
    pub no_show_rate: u32,
}

impl AppointmentStats {
    pub fn compute(appointments: &[Appointment], now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let week_ago = now - Duration::days(7);
        let month_ago = now - Duration::days(30);

        let mut stats = Self::default();
        let mut recent = 0u32;
        let mut confirmed = 0u32;
        let mut no_show = 0u32;

        for appt in appointments {
            if appt.appointment_date.date_naive() == today {
                stats.today_appointments += 1;
            }

            if appt.reminder_sent
                && appt
                    .reminder_sent_at
                    .is_some_and(|sent| sent >= week_ago)
            {
                stats.reminders_sent += 1;
            }

            if appt.created_at >= month_ago {
                recent += 1;
                match appt.status {
                    AppointmentStatus::Confirmed => confirmed += 1,
                    AppointmentStatus::NoShow => no_show += 1,
                    _ => {}
                }
            }
        }

        stats.confirmation_rate = percent(confirmed, recent);
        stats.no_show_rate = percent(no_show, recent);
        stats
    }
}

fn percent(n: u32, total: u32) -> u32 {
    if total == 0 {
        0
    } else {
        (100.0 * n as f64 / total as f64).round() as u32
    }
}
