use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::Turn;

#[async_trait]
pub trait ConversationModel: Send + Sync {
    /// Opens a stateful chat seeded with prior turns.
    async fn start_conversation(
        &self,
        history: &[Turn],
    ) -> Result<Arc<dyn ConversationHandle>, ConversationError>;
}

#[async_trait]
pub trait ConversationHandle: Send + Sync {
    async fn send(&self, text: &str) -> Result<String, ConversationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("api request failed: {0}")]
    ApiRequestFailed(String),
    #[error("rate limited")]
    RateLimited,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("empty reply")]
    EmptyReply,
}
