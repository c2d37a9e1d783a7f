//! Route handlers

pub mod alerts;
pub mod health;
pub mod monitoring;
pub mod sessions;
pub mod stats;
pub mod stream;

use chrono::{DateTime, Local, Utc};

/// Wall-clock time of day in the server's timezone
pub(crate) fn local_time_of_day(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}
