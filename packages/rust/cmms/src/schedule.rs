//! Scheduling rules applied to everything sent to the CMMS.

use chrono::{DateTime, Duration, Utc};

use assetguard_shared::Priority;

/// Days until due for critical work orders, regardless of configuration.
pub const CRITICAL_DAYS_UNTIL_DUE: i64 = 3;

/// Minimum planned duration of high and critical activities.
pub const URGENT_MIN_MINUTES: u32 = 180;

/// Maximum planned duration of low-priority activities.
pub const LOW_MAX_MINUTES: u32 = 60;

/// Timestamp format the CMMS expects (`2024-05-01T08:30:00.000Z`).
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S.000Z").to_string()
}

/// When a work order created at `now` falls due.
pub fn due_date(now: DateTime<Utc>, priority: Priority, days_until_due: i64) -> DateTime<Utc> {
    let days = match priority {
        Priority::Critical => CRITICAL_DAYS_UNTIL_DUE,
        _ => days_until_due,
    };
    now + Duration::days(days)
}

/// Planned activity duration after priority adjustment.
pub fn activity_duration(priority: Priority, requested_minutes: u32) -> u32 {
    match priority {
        Priority::High | Priority::Critical => requested_minutes.max(URGENT_MIN_MINUTES),
        Priority::Low => requested_minutes.min(LOW_MAX_MINUTES),
        Priority::Medium => requested_minutes,
    }
}

/// Title as the CMMS accepts it: at most 100 characters.
pub fn truncate_title(title: &str) -> String {
    const MAX: usize = 100;
    if title.chars().count() <= MAX {
        title.to_string()
    } else {
        let head: String = title.chars().take(MAX - 3).collect();
        format!("{head}...")
    }
}
