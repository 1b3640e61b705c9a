use chrono::{DateTime, Duration, Utc};

use super::Session;

pub const DEFAULT_CONTINUATION_WINDOW_MINUTES: i64 = 30;

/// Decides whether a device's Active session may absorb a new utterance.
#[derive(Debug, Clone, Copy)]
pub struct ContinuationPolicy {
    window: Duration,
}

impl ContinuationPolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn from_minutes(minutes: i64) -> Self {
        Self::new(Duration::minutes(minutes))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn allows(&self, session: &Session, now: DateTime<Utc>) -> bool {
        if !session.is_active(now) {
            return false;
        }
        let reference = session.last_turn_at().unwrap_or(session.last_active_at);
        now - reference <= self.window
    }
}

impl Default for ContinuationPolicy {
    fn default() -> Self {
        Self::from_minutes(DEFAULT_CONTINUATION_WINDOW_MINUTES)
    }
}
