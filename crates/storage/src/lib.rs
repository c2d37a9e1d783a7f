//! Storage Layer
//!
//! The persistence boundary for monitoring sessions. The detection core only
//! needs to create a session, append alert timestamps, end it and list a
//! user's sessions; [`SessionStore`] is that contract and [`Repository`] is an
//! in-memory implementation of it.

mod record;
mod repository;

pub use record::{format_duration, SessionEnd, SessionId, SessionRecord, UserId, UserSummary};
pub use repository::Repository;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Session {0} not found")]
    NotFound(SessionId),
    #[error("Session {0} already ended")]
    SessionClosed(SessionId),
}

/// Data access contract for session logs
pub trait SessionStore: Send + Sync {
    /// Open a new session for `user` starting now
    fn create_session(&self, user: &UserId) -> Result<SessionRecord, StorageError>;

    /// Append one alert timestamp; returns the session's new alert count
    fn append_alert(&self, id: SessionId, at: DateTime<Utc>) -> Result<u32, StorageError>;

    /// Stamp the end time and duration; a session ends exactly once
    fn end_session(&self, id: SessionId) -> Result<SessionEnd, StorageError>;

    /// A user's sessions, newest first
    fn list_sessions(&self, user: &UserId) -> Result<Vec<SessionRecord>, StorageError>;

    /// One session, only if it belongs to `user`
    fn get_session(&self, user: &UserId, id: SessionId) -> Result<SessionRecord, StorageError>;

    /// Totals across a user's sessions
    fn user_summary(&self, user: &UserId) -> Result<UserSummary, StorageError> {
        Ok(UserSummary::from_sessions(&self.list_sessions(user)?))
    }
}
