use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{SpeechRecognizer, SpeechSynthesizer};
use crate::presentation::config::{ProviderKind, ProvidersSettings};

use super::{
    MockSpeechRecognizer, MockSpeechSynthesizer, OpenAiSpeechRecognizer, OpenAiSpeechSynthesizer,
};

pub struct AudioProviderFactory;

impl AudioProviderFactory {
    pub fn recognizer(
        settings: &ProvidersSettings,
    ) -> Result<Arc<dyn SpeechRecognizer>, AudioProviderError> {
        match settings.kind {
            ProviderKind::Mock => Ok(Arc::new(MockSpeechRecognizer)),
            ProviderKind::OpenAi => {
                let recognizer = OpenAiSpeechRecognizer::new(
                    required_api_key(settings)?,
                    settings.base_url.clone(),
                    settings.transcription_model.clone(),
                    Duration::from_secs(settings.request_timeout_secs),
                )
                .map_err(|e| AudioProviderError::Build(e.to_string()))?;
                Ok(Arc::new(recognizer))
            }
        }
    }

    pub fn synthesizer(
        settings: &ProvidersSettings,
    ) -> Result<Arc<dyn SpeechSynthesizer>, AudioProviderError> {
        match settings.kind {
            ProviderKind::Mock => Ok(Arc::new(MockSpeechSynthesizer::default())),
            ProviderKind::OpenAi => {
                let synthesizer = OpenAiSpeechSynthesizer::new(
                    required_api_key(settings)?,
                    settings.base_url.clone(),
                    settings.speech_model.clone(),
                    settings.voice.clone(),
                    Duration::from_secs(settings.request_timeout_secs),
                )
                .map_err(|e| AudioProviderError::Build(e.to_string()))?;
                Ok(Arc::new(synthesizer))
            }
        }
    }
}

fn required_api_key(settings: &ProvidersSettings) -> Result<String, AudioProviderError> {
    if settings.api_key.trim().is_empty() {
        return Err(AudioProviderError::MissingApiKey);
    }
    Ok(settings.api_key.clone())
}

#[derive(Debug, thiserror::Error)]
pub enum AudioProviderError {
    #[error("providers.api_key is required for the openai provider")]
    MissingApiKey,
    #[error("failed to build provider: {0}")]
    Build(String),
}
