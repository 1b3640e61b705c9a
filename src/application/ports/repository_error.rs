use crate::domain::{DeviceId, SessionId};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
    #[error("device {0} already has an active session")]
    ActiveSessionExists(DeviceId),
    #[error("write rejected: {0}")]
    WriteRejected(String),
}
