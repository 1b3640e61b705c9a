use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use super::{DEFAULT_LANGUAGE, DeviceId, SessionId, SessionStatus, Turn};

pub const SESSION_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionMetadata {
    pub language: String,
    pub preferences: HashMap<String, String>,
}

impl Default for SessionMetadata {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            preferences: HashMap::new(),
        }
    }
}

/// Server-side record of one device's multi-turn conversation.
///
/// Every mutation goes through a method that refreshes `last_active_at`
/// and moves `expires_at` to `last_active_at + 24h`.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub device_id: DeviceId,
    pub status: SessionStatus,
    pub turns: Vec<Turn>,
    pub metadata: SessionMetadata,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(device_id: DeviceId) -> Self {
        Self::new_at(device_id, Utc::now())
    }

    pub fn new_at(device_id: DeviceId, now: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::new(),
            device_id,
            status: SessionStatus::Active,
            turns: Vec::new(),
            metadata: SessionMetadata::default(),
            created_at: now,
            last_active_at: now,
            expires_at: now + Duration::hours(SESSION_TTL_HOURS),
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_active_at = now;
        self.expires_at = now + Duration::hours(SESSION_TTL_HOURS);
    }

    pub fn append_turn(&mut self, turn: Turn, now: DateTime<Utc>) -> Result<(), SessionError> {
        if let Some(last) = self.turns.last() {
            if turn.timestamp < last.timestamp {
                return Err(SessionError::TurnOutOfOrder {
                    last: last.timestamp,
                    attempted: turn.timestamp,
                });
            }
        }
        self.turns.push(turn);
        self.touch(now);
        Ok(())
    }

    pub fn set_language(&mut self, language: String, now: DateTime<Utc>) {
        self.metadata.language = language;
        self.touch(now);
    }

    pub fn terminate(&mut self, now: DateTime<Utc>) {
        self.status = SessionStatus::Terminated;
        self.touch(now);
    }

    pub fn expire(&mut self, now: DateTime<Utc>) {
        self.status = SessionStatus::Expired;
        self.touch(now);
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Active && !self.is_expired(now)
    }

    pub fn last_turn_at(&self) -> Option<DateTime<Utc>> {
        self.turns.last().map(|t| t.timestamp)
    }

    pub fn history(&self) -> &[Turn] {
        &self.turns
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("turn at {attempted} is older than the last turn at {last}")]
    TurnOutOfOrder {
        last: DateTime<Utc>,
        attempted: DateTime<Utc>,
    },
}
