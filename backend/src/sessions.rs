use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use shared::{SessionId, Verdict};

use crate::pipeline::{PipelineError, PreparedImage, Session, SessionState};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session {0} not found or expired")]
    NotFound(SessionId),
    #[error("Session {id}: {source}")]
    Conflict {
        id: SessionId,
        source: PipelineError,
    },
    #[error("Session store lock poisoned")]
    Poisoned,
}

/// In-memory holder for uploads that passed the gate and wait for an
/// explicit prediction. Shared across workers; cloning shares the map.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<SessionId, Session>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    pub fn insert(&self, session: Session) -> Result<SessionId, SessionError> {
        let mut sessions = self.sessions.lock().map_err(|_| SessionError::Poisoned)?;
        self.purge_expired(&mut sessions);

        let id = SessionId::new();
        sessions.insert(id, session);
        log::debug!("Stored session {} ({} active)", id, sessions.len());
        Ok(id)
    }

    /// Moves a Ready session to Scoring and hands out its tensor. A second
    /// caller for the same session gets a conflict until it is finished.
    pub fn begin_scoring(&self, id: SessionId) -> Result<PreparedImage, SessionError> {
        let mut sessions = self.sessions.lock().map_err(|_| SessionError::Poisoned)?;
        let session = sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        session
            .begin_scoring()
            .map_err(|source| SessionError::Conflict { id, source })
    }

    /// Records the verdict and discards the session.
    pub fn finish_scoring(&self, id: SessionId, verdict: Verdict) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock().map_err(|_| SessionError::Poisoned)?;
        let mut session = sessions.remove(&id).ok_or(SessionError::NotFound(id))?;
        session
            .finish_scoring(verdict)
            .map_err(|source| SessionError::Conflict { id, source })?;
        Ok(())
    }

    /// Drops a session whose prediction failed.
    pub fn discard(&self, id: SessionId) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock().map_err(|_| SessionError::Poisoned)?;
        sessions.remove(&id);
        Ok(())
    }

    #[cfg(test)]
    pub fn active_count(&self) -> Result<usize, SessionError> {
        let sessions = self.sessions.lock().map_err(|_| SessionError::Poisoned)?;
        Ok(sessions.len())
    }

    /// Sessions in Scoring are kept so their verdict can still be recorded.
    fn purge_expired(&self, sessions: &mut HashMap<SessionId, Session>) {
        let cutoff = Utc::now() - self.ttl;
        let before = sessions.len();
        sessions.retain(|_, session| {
            matches!(session.state(), SessionState::Scoring) || session.created_at() > cutoff
        });
        let purged = before - sessions.len();
        if purged > 0 {
            log::info!("Purged {} expired sessions", purged);
        }
    }
}

/// Owns a session while it is in Scoring. Unless the verdict is recorded
/// through [`ScoringGuard::finish`], dropping the guard discards the session,
/// including when the request future is dropped mid-inference.
pub struct ScoringGuard {
    store: SessionStore,
    id: SessionId,
    settled: bool,
}

impl ScoringGuard {
    pub fn new(store: SessionStore, id: SessionId) -> Self {
        Self {
            store,
            id,
            settled: false,
        }
    }

    pub fn finish(mut self, verdict: Verdict) -> Result<(), SessionError> {
        self.settled = true;
        self.store.finish_scoring(self.id, verdict)
    }
}

impl Drop for ScoringGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        match self.store.discard(self.id) {
            Ok(()) => log::warn!("Discarded session {} without a verdict", self.id),
            Err(e) => log::error!("Could not discard session {}: {}", self.id, e),
        }
    }
}
