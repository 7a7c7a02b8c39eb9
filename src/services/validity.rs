use chrono::{DateTime, Duration, Utc};

use crate::models::application::Application;

/// Days an approved card may be exported after approval
pub const VALIDITY_DAYS: i64 = 3;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Remaining whole days in the validity window, rounded up and floored at
/// zero. Without an approval timestamp the window is closed.
pub fn remaining_days(approved_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u32 {
    let Some(approved_at) = approved_at else {
        return 0;
    };

    let window_end = approved_at + Duration::days(VALIDITY_DAYS);
    let remaining_ms = (window_end - now).num_milliseconds();
    if remaining_ms <= 0 {
        return 0;
    }

    // ceil for positive values
    ((remaining_ms + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY) as u32
}

/// Countdown for an application, honouring the approved-status invariant
pub fn countdown(application: &Application, now: DateTime<Utc>) -> u32 {
    remaining_days(application.validity_anchor(), now)
}

/// Whether the card export is reachable for this application
pub fn is_exportable(application: &Application, now: DateTime<Utc>) -> bool {
    countdown(application, now) > 0
}

/// Status line shown next to an application on the student dashboard
pub fn status_label(application: &Application, now: DateTime<Utc>) -> String {
    match application.validity_anchor() {
        None => "Pending Approval".to_string(),
        Some(at) => match remaining_days(Some(at), now) {
            0 => "Expired".to_string(),
            days => format!("Valid ({} days left)", days),
        },
    }
}
