//! Session log records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// Session handle
pub type SessionId = i64;

/// Identity of an authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One monitoring session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub user: UserId,
    pub session_start: DateTime<Utc>,
    pub session_end: Option<DateTime<Utc>>,
    pub alert_count: u32,
    /// JSON array of RFC 3339 alert timestamps
    pub drowsy_timestamps: String,
    pub session_duration: Option<Duration>,
}

/// Result of ending a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEnd {
    pub end_time: DateTime<Utc>,
    pub duration: Duration,
}

impl SessionRecord {
    pub fn new(id: SessionId, user: UserId, session_start: DateTime<Utc>) -> Self {
        Self {
            id,
            user,
            session_start,
            session_end: None,
            alert_count: 0,
            drowsy_timestamps: "[]".to_string(),
            session_duration: None,
        }
    }

    /// Still running (no end time)
    pub fn is_active(&self) -> bool {
        self.session_end.is_none()
    }

    /// Parsed alert history; a malformed log reads as empty
    pub fn alert_timestamps(&self) -> Vec<String> {
        match serde_json::from_str::<Vec<String>>(&self.drowsy_timestamps) {
            Ok(timestamps) => timestamps,
            Err(e) => {
                warn!(session = self.id, error = %e, "Malformed alert history, treating as empty");
                Vec::new()
            }
        }
    }

    /// Append an alert timestamp and bump the count
    pub fn add_drowsy_alert(&mut self, at: DateTime<Utc>) -> u32 {
        let mut timestamps = self.alert_timestamps();
        timestamps.push(at.to_rfc3339());
        self.drowsy_timestamps = serde_json::to_string(&timestamps).unwrap_or_else(|_| "[]".to_string());
        self.alert_count += 1;
        self.alert_count
    }

    /// Stamp end time and duration
    pub fn end(&mut self, at: DateTime<Utc>) -> SessionEnd {
        let duration = (at - self.session_start).to_std().unwrap_or_default();
        self.session_end = Some(at);
        self.session_duration = Some(duration);
        SessionEnd {
            end_time: at,
            duration,
        }
    }

    /// Duration as HH:MM:SS ("00:00:00" while running)
    pub fn duration_string(&self) -> String {
        self.session_duration.map(format_duration).unwrap_or_else(|| "00:00:00".to_string())
    }
}

/// Format a duration as HH:MM:SS, dropping sub-second precision
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// Aggregates shown on the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UserSummary {
    pub total_sessions: usize,
    pub total_alerts: u64,
    /// Average alerts per session, rounded to 2 decimals
    pub average_alerts: f64,
}

impl UserSummary {
    pub fn from_sessions(sessions: &[SessionRecord]) -> Self {
        if sessions.is_empty() {
            return Self::default();
        }
        let total_alerts: u64 = sessions.iter().map(|s| s.alert_count as u64).sum();
        let average = total_alerts as f64 / sessions.len() as f64;
        Self {
            total_sessions: sessions.len(),
            total_alerts,
            average_alerts: (average * 100.0).round() / 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> SessionRecord {
        SessionRecord::new(1, UserId::new("alice"), Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap())
    }

    #[test]
    fn test_add_alert_appends_timestamp() {
        let mut r = record();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 5, 0).unwrap();
        assert_eq!(r.add_drowsy_alert(at), 1);
        assert_eq!(r.add_drowsy_alert(at), 2);
        assert_eq!(r.alert_timestamps(), vec![at.to_rfc3339(), at.to_rfc3339()]);
    }

    #[test]
    fn test_malformed_history_is_empty() {
        let mut r = record();
        r.drowsy_timestamps = "{not json".to_string();
        assert!(r.alert_timestamps().is_empty());

        // Appending recovers a valid log
        r.add_drowsy_alert(Utc::now());
        assert_eq!(r.alert_timestamps().len(), 1);
    }

    #[test]
    fn test_end_computes_duration() {
        let mut r = record();
        let end = r.end(Utc.with_ymd_and_hms(2024, 5, 1, 10, 2, 3).unwrap());
        assert_eq!(end.duration, Duration::from_secs(3723));
        assert!(!r.is_active());
        assert_eq!(r.duration_string(), "01:02:03");
    }

    #[test]
    fn test_format_duration_truncates_subseconds() {
        assert_eq!(format_duration(Duration::from_millis(59_999)), "00:00:59");
        assert_eq!(format_duration(Duration::from_secs(100 * 3600)), "100:00:00");
    }

    #[test]
    fn test_summary_rounds_average() {
        let mut a = record();
        a.alert_count = 1;
        let mut b = record();
        b.alert_count = 1;
        let mut c = record();
        c.alert_count = 0;
        let summary = UserSummary::from_sessions(&[a, b, c]);
        assert_eq!(summary.total_sessions, 3);
        assert_eq!(summary.total_alerts, 2);
        assert_eq!(summary.average_alerts, 0.67);
    }
}
