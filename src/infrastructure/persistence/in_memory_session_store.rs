use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::application::ports::{RepositoryError, SessionStore};
use crate::domain::{DeviceId, Session, SessionId, SessionStatus, Turn};

/// Process-local session documents. Enforces at most one Active session per
/// device on every write.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn sessions_for(&self, device_id: &DeviceId) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| &s.device_id == device_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }
}

fn conflicting_active(
    sessions: &HashMap<SessionId, Session>,
    candidate: &Session,
) -> bool {
    candidate.status == SessionStatus::Active
        && sessions.values().any(|existing| {
            existing.id != candidate.id
                && existing.device_id == candidate.device_id
                && existing.status == SessionStatus::Active
        })
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_active(&self, device_id: &DeviceId) -> Result<Option<Session>, RepositoryError> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|s| &s.device_id == device_id && s.status == SessionStatus::Active)
            .cloned())
    }

    async fn get(&self, id: SessionId) -> Result<Option<Session>, RepositoryError> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn create(&self, session: &Session) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(RepositoryError::WriteRejected(format!(
                "session {} already exists",
                session.id
            )));
        }
        if conflicting_active(&sessions, session) {
            return Err(RepositoryError::ActiveSessionExists(
                session.device_id.clone(),
            ));
        }
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn update(&self, session: &Session) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(&session.id) {
            return Err(RepositoryError::SessionNotFound(session.id));
        }
        if conflicting_active(&sessions, session) {
            return Err(RepositoryError::ActiveSessionExists(
                session.device_id.clone(),
            ));
        }
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn add_turn(&self, id: SessionId, turn: &Turn) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&id)
            .ok_or(RepositoryError::SessionNotFound(id))?;
        session
            .append_turn(turn.clone(), Utc::now())
            .map_err(|e| RepositoryError::WriteRejected(e.to_string()))
    }

    async fn expire_sessions(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let mut sessions = self.sessions.write().await;
        let mut expired = 0;
        for session in sessions.values_mut() {
            if session.status == SessionStatus::Active && session.is_expired(now) {
                session.expire(now);
                expired += 1;
            }
        }
        Ok(expired)
    }
}
