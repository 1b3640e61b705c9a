use async_trait::async_trait;

#[async_trait]
pub trait ContentModerator: Send + Sync {
    async fn is_safe(&self, text: &str) -> Result<bool, ModerationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    #[error("moderation request failed: {0}")]
    RequestFailed(String),
}
