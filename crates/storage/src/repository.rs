//! Repository Implementation

use crate::record::{SessionEnd, SessionId, SessionRecord, UserId};
use crate::{SessionStore, StorageError};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

struct Inner {
    sessions: BTreeMap<SessionId, SessionRecord>,
    next_session_id: SessionId,
}

/// In-memory session repository
pub struct Repository {
    inner: Mutex<Inner>,
}

impl Repository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        info!("Creating in-memory session repository");
        Self {
            inner: Mutex::new(Inner {
                sessions: BTreeMap::new(),
                next_session_id: 1,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StorageError> {
        self.inner
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))
    }

    /// Get total session count
    pub fn session_count(&self) -> usize {
        self.inner.lock().map(|i| i.sessions.len()).unwrap_or(0)
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for Repository {
    fn create_session(&self, user: &UserId) -> Result<SessionRecord, StorageError> {
        let mut inner = self.lock()?;
        let id = inner.next_session_id;
        inner.next_session_id += 1;

        let record = SessionRecord::new(id, user.clone(), Utc::now());
        inner.sessions.insert(id, record.clone());
        debug!(session = id, user = %user, "Created session");
        Ok(record)
    }

    fn append_alert(&self, id: SessionId, at: DateTime<Utc>) -> Result<u32, StorageError> {
        let mut inner = self.lock()?;
        let record = inner.sessions.get_mut(&id).ok_or(StorageError::NotFound(id))?;
        if !record.is_active() {
            return Err(StorageError::SessionClosed(id));
        }
        Ok(record.add_drowsy_alert(at))
    }

    fn end_session(&self, id: SessionId) -> Result<SessionEnd, StorageError> {
        let mut inner = self.lock()?;
        let record = inner.sessions.get_mut(&id).ok_or(StorageError::NotFound(id))?;
        if !record.is_active() {
            return Err(StorageError::SessionClosed(id));
        }
        let end = record.end(Utc::now());
        debug!(session = id, duration = %record.duration_string(), "Ended session");
        Ok(end)
    }

    fn list_sessions(&self, user: &UserId) -> Result<Vec<SessionRecord>, StorageError> {
        let inner = self.lock()?;
        let mut sessions: Vec<SessionRecord> = inner
            .sessions
            .values()
            .filter(|s| &s.user == user)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.session_start.cmp(&a.session_start).then(b.id.cmp(&a.id)));
        Ok(sessions)
    }

    fn get_session(&self, user: &UserId, id: SessionId) -> Result<SessionRecord, StorageError> {
        let inner = self.lock()?;
        inner
            .sessions
            .get(&id)
            .filter(|s| &s.user == user)
            .cloned()
            .ok_or(StorageError::NotFound(id))
    }
}
