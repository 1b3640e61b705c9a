use std::time::Duration;

use async_trait::async_trait;
use futures::stream::StreamExt;
use serde::Serialize;

use crate::application::ports::{AudioChunkStream, SpeechSynthesizer, SynthesisError};

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// `/audio/speech` client that relays the response body as it arrives.
pub struct OpenAiSpeechSynthesizer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    voice: String,
    response_format: String,
}

impl OpenAiSpeechSynthesizer {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        voice: String,
        timeout: Duration,
    ) -> Result<Self, SynthesisError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SynthesisError::ApiRequestFailed(format!("client: {}", e)))?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            voice,
            response_format: "pcm".to_string(),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeechSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioChunkStream, SynthesisError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SynthesisError::EmptyText);
        }

        let body = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            response_format: &self.response_format,
        };

        tracing::debug!(model = %self.model, voice = %self.voice, chars = text.len(), "Requesting speech");

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SynthesisError::ApiRequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::ApiRequestFailed(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| SynthesisError::StreamInterrupted(e.to_string())));
        Ok(Box::pin(stream))
    }
}
