use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{DeviceId, Session, SessionId, Turn};

use super::RepositoryError;

/// Persistent session documents. Implementations must refuse to create a
/// second Active session for a device.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_active(&self, device_id: &DeviceId) -> Result<Option<Session>, RepositoryError>;

    async fn get(&self, id: SessionId) -> Result<Option<Session>, RepositoryError>;

    async fn create(&self, session: &Session) -> Result<(), RepositoryError>;

    async fn update(&self, session: &Session) -> Result<(), RepositoryError>;

    async fn add_turn(&self, id: SessionId, turn: &Turn) -> Result<(), RepositoryError>;

    /// Marks every Active session whose `expires_at` has passed as Expired.
    async fn expire_sessions(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError>;
}
