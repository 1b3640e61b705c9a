use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::domain::AudioConfig;

pub const MIN_SAMPLE_RATE: u32 = 8_000;
pub const MAX_SAMPLE_RATE: u32 = 48_000;

/// Control messages a device may send as JSON text frames.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    ListeningStart {
        #[serde(default)]
        sample_rate: Option<u32>,
        #[serde(default)]
        encoding: Option<String>,
        #[serde(default)]
        language: Option<String>,
        #[serde(default)]
        timestamp: Option<i64>,
    },
    ListeningEnd {
        #[serde(default)]
        timestamp: Option<i64>,
    },
    Ping {
        #[serde(default)]
        timestamp: Option<i64>,
    },
    Pong {
        #[serde(default)]
        timestamp: Option<i64>,
    },
}

impl InboundMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let message: InboundMessage =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        message.validate()?;
        Ok(message)
    }

    pub fn name(&self) -> &'static str {
        match self {
            InboundMessage::ListeningStart { .. } => "listening_start",
            InboundMessage::ListeningEnd { .. } => "listening_end",
            InboundMessage::Ping { .. } => "ping",
            InboundMessage::Pong { .. } => "pong",
        }
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        if let InboundMessage::ListeningStart {
            sample_rate,
            encoding,
            language,
            ..
        } = self
        {
            if let Some(rate) = sample_rate {
                if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(rate) {
                    return Err(ProtocolError::InvalidField(format!(
                        "sample_rate must be between {} and {}",
                        MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
                    )));
                }
            }
            if encoding.as_deref().is_some_and(|e| e.trim().is_empty()) {
                return Err(ProtocolError::InvalidField(
                    "encoding must not be empty".to_string(),
                ));
            }
            if language.as_deref().is_some_and(|l| l.trim().is_empty()) {
                return Err(ProtocolError::InvalidField(
                    "language must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Merges the fields a `listening_start` carries over the fallback config.
pub fn negotiate_audio_config(
    fallback: &AudioConfig,
    sample_rate: Option<u32>,
    encoding: Option<String>,
    language: Option<String>,
) -> AudioConfig {
    AudioConfig {
        sample_rate: sample_rate.unwrap_or(fallback.sample_rate),
        encoding: encoding.unwrap_or_else(|| fallback.encoding.clone()),
        language: language.unwrap_or_else(|| fallback.language.clone()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    StateError,
    StreamError,
    TimeoutError,
    ResourceError,
    ContentRejected,
}

/// Messages the server sends as JSON text frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    ListeningStart {
        session_id: String,
        status: String,
        message: String,
        timestamp: i64,
    },
    ListeningEnd {
        session_id: String,
        transcript: String,
        timestamp: i64,
    },
    SpeakingStart {
        session_id: String,
        text: String,
        timestamp: i64,
    },
    SpeakingEnd {
        session_id: String,
        timestamp: i64,
    },
    Pong {
        timestamp: i64,
    },
    Error {
        code: ErrorCode,
        message: String,
        timestamp: i64,
    },
}

impl OutboundMessage {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        OutboundMessage::Error {
            code,
            message: message.into(),
            timestamp: now_unix(),
        }
    }

    pub fn pong() -> Self {
        OutboundMessage::Pong {
            timestamp: now_unix(),
        }
    }
}

/// One item of a connection's outbound queue.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Text(String),
    Binary(Bytes),
    Close,
}

impl OutboundFrame {
    pub fn message(message: &OutboundMessage) -> Result<Self, serde_json::Error> {
        serde_json::to_string(message).map(OutboundFrame::Text)
    }
}

pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed control message: {0}")]
    Malformed(String),
    #[error("invalid field: {0}")]
    InvalidField(String),
}
