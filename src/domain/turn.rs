use super::TurnRole;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnMetadata {
    pub confidence: Option<f32>,
    pub emotion: Option<String>,
}

/// One message within a session. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub timestamp: DateTime<Utc>,
    pub role: TurnRole,
    pub content: String,
    pub duration_ms: u64,
    pub metadata: TurnMetadata,
}

impl Turn {
    pub fn new(
        timestamp: DateTime<Utc>,
        role: TurnRole,
        content: String,
        duration_ms: u64,
    ) -> Self {
        Self {
            timestamp,
            role,
            content,
            duration_ms,
            metadata: TurnMetadata::default(),
        }
    }

    pub fn user(timestamp: DateTime<Utc>, content: String, duration_ms: u64) -> Self {
        Self::new(timestamp, TurnRole::User, content, duration_ms)
    }

    pub fn assistant(timestamp: DateTime<Utc>, content: String, duration_ms: u64) -> Self {
        Self::new(timestamp, TurnRole::Assistant, content, duration_ms)
    }

    pub fn with_metadata(mut self, metadata: TurnMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}
