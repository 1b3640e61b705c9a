use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::application::ports::{ConversationError, ConversationHandle, ConversationModel};
use crate::domain::{Turn, TurnRole};

const GREETING: &str =
    "Halo! Saya adalah boneka pintar Arunika. Apa yang ingin kamu ceritakan hari ini?";

pub struct MockConversationModel;

#[async_trait]
impl ConversationModel for MockConversationModel {
    async fn start_conversation(
        &self,
        history: &[Turn],
    ) -> Result<Arc<dyn ConversationHandle>, ConversationError> {
        let history = history
            .iter()
            .map(|turn| (turn.role, turn.content.clone()))
            .collect();
        Ok(Arc::new(MockConversation {
            history: Mutex::new(history),
        }))
    }
}

/// Echoes the child's words back in a friendly sentence.
pub struct MockConversation {
    history: Mutex<Vec<(TurnRole, String)>>,
}

impl MockConversation {
    pub async fn history_len(&self) -> usize {
        self.history.lock().await.len()
    }
}

#[async_trait]
impl ConversationHandle for MockConversation {
    async fn send(&self, text: &str) -> Result<String, ConversationError> {
        let text = text.trim();
        let reply = if text.is_empty() {
            GREETING.to_string()
        } else {
            format!(
                "Terima kasih sudah bercerita! Saya senang mendengar '{}'. Apa lagi yang ingin kamu ceritakan?",
                text
            )
        };

        let mut history = self.history.lock().await;
        history.push((TurnRole::User, text.to_string()));
        history.push((TurnRole::Assistant, reply.clone()));
        Ok(reply)
    }
}
