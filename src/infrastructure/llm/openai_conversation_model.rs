use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::application::ports::{ConversationError, ConversationHandle, ConversationModel};
use crate::domain::{Turn, TurnRole};
use crate::presentation::config::ProvidersSettings;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly, caring AI companion for children \
aged 4 to 12. Keep every answer safe, warm and encouraging. Use simple words and at most two or \
three short sentences. Never be scary, violent or inappropriate.";

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: usize,
    temperature: f32,
}

#[derive(Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

struct ChatConfig {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: usize,
    temperature: f32,
}

/// Chat-completions backed conversation model. Each handle keeps its own
/// message history and replays it on every request.
pub struct OpenAiConversationModel {
    config: Arc<ChatConfig>,
    system_prompt: String,
}

impl OpenAiConversationModel {
    pub fn new(settings: &ProvidersSettings) -> Result<Self, ConversationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| ConversationError::ApiRequestFailed(e.to_string()))?;
        let system_prompt = if settings.system_prompt.trim().is_empty() {
            DEFAULT_SYSTEM_PROMPT.to_string()
        } else {
            settings.system_prompt.clone()
        };
        Ok(Self {
            config: Arc::new(ChatConfig {
                client,
                base_url: settings.base_url.trim_end_matches('/').to_string(),
                api_key: settings.api_key.clone(),
                model: settings.chat_model.clone(),
                max_tokens: settings.max_tokens,
                temperature: settings.temperature,
            }),
            system_prompt,
        })
    }
}

#[async_trait]
impl ConversationModel for OpenAiConversationModel {
    async fn start_conversation(
        &self,
        history: &[Turn],
    ) -> Result<Arc<dyn ConversationHandle>, ConversationError> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::new("system", self.system_prompt.clone()));
        messages.extend(history.iter().map(|turn| {
            let role = match turn.role {
                TurnRole::User => "user",
                TurnRole::Assistant => "assistant",
            };
            ChatMessage::new(role, turn.content.clone())
        }));

        tracing::debug!(seeded_turns = history.len(), "Chat conversation opened");
        Ok(Arc::new(OpenAiConversation {
            config: Arc::clone(&self.config),
            messages: Mutex::new(messages),
        }))
    }
}

struct OpenAiConversation {
    config: Arc<ChatConfig>,
    messages: Mutex<Vec<ChatMessage>>,
}

impl OpenAiConversation {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ConversationError> {
        let config = &self.config;
        let request_body = ChatCompletionRequest {
            model: &config.model,
            messages,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        };

        let response = config
            .client
            .post(format!("{}/chat/completions", config.base_url))
            .bearer_auth(&config.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| ConversationError::ApiRequestFailed(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ConversationError::RateLimited);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ConversationError::ApiRequestFailed(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ConversationError::InvalidResponse(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ConversationError::InvalidResponse("empty choices".to_string()))
    }
}

#[async_trait]
impl ConversationHandle for OpenAiConversation {
    async fn send(&self, text: &str) -> Result<String, ConversationError> {
        let user_message = ChatMessage::new("user", text);
        let mut request = self.messages.lock().await.clone();
        request.push(user_message.clone());

        let reply = self.complete(&request).await?;
        let reply = reply.trim().to_string();
        if reply.is_empty() {
            return Err(ConversationError::EmptyReply);
        }

        let mut messages = self.messages.lock().await;
        messages.push(user_message);
        messages.push(ChatMessage::new("assistant", reply.clone()));
        Ok(reply)
    }
}
