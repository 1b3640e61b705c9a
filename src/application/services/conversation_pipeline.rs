use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::StreamExt;
use serde_json::json;

use crate::application::ports::{
    ContentModerator, ConversationHandle, SpeechRecognizer, SpeechSynthesizer,
};
use crate::application::saga::{SagaDefinition, Step, StepError, StepId, StepOutcome};
use crate::domain::{AudioConfig, DeviceId, SessionId};
use crate::infrastructure::observability::sanitize_transcript;

pub const CONVERSATION_PIPELINE: &str = "conversation_processing";
pub const DEFAULT_PIPELINE_TIMEOUT: Duration = Duration::from_secs(30);

pub const TRANSCRIBE_STEP: &str = "transcribe";
pub const VALIDATE_CONTENT_STEP: &str = "validate_content";
pub const GENERATE_REPLY_STEP: &str = "generate_reply";
pub const SYNTHESIZE_STEP: &str = "synthesize";

/// Request record shared by the four conversation steps. Each step reads
/// the previous step's field and fills in its own.
#[derive(Clone)]
pub struct ConversationRequest {
    pub device_id: DeviceId,
    pub session_id: SessionId,
    pub audio_config: AudioConfig,
    pub audio: Option<Bytes>,
    pub transcript: Option<String>,
    pub is_content_safe: Option<bool>,
    pub reply: Option<String>,
    pub reply_audio: Vec<Bytes>,
    pub conversation: Arc<dyn ConversationHandle>,
}

impl ConversationRequest {
    pub fn from_transcript(
        device_id: DeviceId,
        session_id: SessionId,
        audio_config: AudioConfig,
        transcript: String,
        conversation: Arc<dyn ConversationHandle>,
    ) -> Self {
        Self {
            device_id,
            session_id,
            audio_config,
            audio: None,
            transcript: Some(transcript),
            is_content_safe: None,
            reply: None,
            reply_audio: Vec::new(),
            conversation,
        }
    }

    pub fn from_audio(
        device_id: DeviceId,
        session_id: SessionId,
        audio_config: AudioConfig,
        audio: Bytes,
        conversation: Arc<dyn ConversationHandle>,
    ) -> Self {
        Self {
            audio: Some(audio),
            transcript: None,
            ..Self::from_transcript(device_id, session_id, audio_config, String::new(), conversation)
        }
    }
}

impl fmt::Debug for ConversationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationRequest")
            .field("device_id", &self.device_id)
            .field("session_id", &self.session_id)
            .field("audio_config", &self.audio_config)
            .field("audio_bytes", &self.audio.as_ref().map(|a| a.len()))
            .field("transcript", &self.transcript)
            .field("is_content_safe", &self.is_content_safe)
            .field("reply", &self.reply)
            .field("reply_audio_chunks", &self.reply_audio.len())
            .finish()
    }
}

pub fn conversation_pipeline(
    recognizer: Arc<dyn SpeechRecognizer>,
    moderator: Arc<dyn ContentModerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    timeout: Duration,
) -> SagaDefinition<ConversationRequest> {
    SagaDefinition::new(CONVERSATION_PIPELINE, timeout)
        .with_step(Arc::new(TranscribeStep::new(recognizer)))
        .with_step(Arc::new(ValidateContentStep::new(moderator)))
        .with_step(Arc::new(GenerateReplyStep))
        .with_step(Arc::new(SynthesizeStep::new(synthesizer)))
}

/// Uses the streaming transcript when the connection already has one,
/// otherwise runs batch recognition over the buffered audio.
pub struct TranscribeStep {
    recognizer: Arc<dyn SpeechRecognizer>,
}

impl TranscribeStep {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        Self { recognizer }
    }
}

#[async_trait]
impl Step<ConversationRequest> for TranscribeStep {
    fn id(&self) -> StepId {
        StepId::from(TRANSCRIBE_STEP)
    }

    async fn execute(&self, data: &mut ConversationRequest) -> StepOutcome {
        let streamed = data
            .transcript
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let (transcript, source) = match (streamed, data.audio.as_ref()) {
            (Some(text), _) => (text, "stream"),
            (None, Some(audio)) => {
                let text = self
                    .recognizer
                    .recognize(audio, &data.audio_config)
                    .await
                    .map_err(|e| StepError::Capability(e.to_string()))?;
                (text.trim().to_string(), "batch")
            }
            (None, None) => return Err(StepError::MissingInput("audio")),
        };

        if transcript.is_empty() {
            return Err(StepError::Capability("empty transcript".to_string()));
        }

        tracing::debug!(
            transcript = %sanitize_transcript(&transcript),
            source,
            "Transcription ready"
        );
        data.transcript = Some(transcript.clone());
        Ok(json!({ "transcript": transcript, "source": source }))
    }

    async fn compensate(&self, _data: &mut ConversationRequest) -> Result<(), StepError> {
        tracing::debug!("Transcribe compensation (no-op)");
        Ok(())
    }
}

pub struct ValidateContentStep {
    moderator: Arc<dyn ContentModerator>,
}

impl ValidateContentStep {
    pub fn new(moderator: Arc<dyn ContentModerator>) -> Self {
        Self { moderator }
    }
}

#[async_trait]
impl Step<ConversationRequest> for ValidateContentStep {
    fn id(&self) -> StepId {
        StepId::from(VALIDATE_CONTENT_STEP)
    }

    async fn execute(&self, data: &mut ConversationRequest) -> StepOutcome {
        let transcript = data
            .transcript
            .as_deref()
            .ok_or(StepError::MissingInput("transcript"))?;

        let is_safe = self
            .moderator
            .is_safe(transcript)
            .await
            .map_err(|e| StepError::Capability(e.to_string()))?;

        if !is_safe {
            return Err(StepError::ContentRejected(
                "content is not child-safe".to_string(),
            ));
        }

        data.is_content_safe = Some(true);
        Ok(json!({ "is_safe": true }))
    }

    async fn compensate(&self, _data: &mut ConversationRequest) -> Result<(), StepError> {
        tracing::debug!("Content validation compensation (no-op)");
        Ok(())
    }
}

pub struct GenerateReplyStep;

#[async_trait]
impl Step<ConversationRequest> for GenerateReplyStep {
    fn id(&self) -> StepId {
        StepId::from(GENERATE_REPLY_STEP)
    }

    async fn execute(&self, data: &mut ConversationRequest) -> StepOutcome {
        let transcript = data
            .transcript
            .clone()
            .ok_or(StepError::MissingInput("transcript"))?;

        let reply = data
            .conversation
            .send(&transcript)
            .await
            .map_err(|e| StepError::Capability(e.to_string()))?;

        let reply = reply.trim().to_string();
        if reply.is_empty() {
            return Err(StepError::Capability("empty reply".to_string()));
        }

        tracing::debug!(reply = %sanitize_transcript(&reply), "Reply generated");
        data.reply = Some(reply.clone());
        Ok(json!({ "reply": reply }))
    }

    async fn compensate(&self, _data: &mut ConversationRequest) -> Result<(), StepError> {
        tracing::debug!("Reply generation compensation (no-op)");
        Ok(())
    }
}

/// Drains the synthesizer's chunk stream completely before succeeding so
/// that a failure never leaves partial audio behind.
pub struct SynthesizeStep {
    synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl SynthesizeStep {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        Self { synthesizer }
    }
}

#[async_trait]
impl Step<ConversationRequest> for SynthesizeStep {
    fn id(&self) -> StepId {
        StepId::from(SYNTHESIZE_STEP)
    }

    async fn execute(&self, data: &mut ConversationRequest) -> StepOutcome {
        let reply = data
            .reply
            .as_deref()
            .ok_or(StepError::MissingInput("reply"))?;

        let mut stream = self
            .synthesizer
            .synthesize(reply)
            .await
            .map_err(|e| StepError::Capability(e.to_string()))?;

        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| StepError::Capability(e.to_string()))?;
            if !chunk.is_empty() {
                chunks.push(chunk);
            }
        }

        if chunks.is_empty() {
            return Err(StepError::Capability("no audio synthesized".to_string()));
        }

        let total_bytes: usize = chunks.iter().map(Bytes::len).sum();
        tracing::debug!(chunks = chunks.len(), total_bytes, "Speech synthesized");
        let result = json!({ "chunks": chunks.len(), "bytes": total_bytes });
        data.reply_audio = chunks;
        Ok(result)
    }

    async fn compensate(&self, _data: &mut ConversationRequest) -> Result<(), StepError> {
        tracing::debug!("Synthesis compensation (no-op)");
        Ok(())
    }
}
