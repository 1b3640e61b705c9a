use async_trait::async_trait;

use crate::domain::AudioConfig;

#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn recognize(
        &self,
        audio_data: &[u8],
        config: &AudioConfig,
    ) -> Result<String, RecognitionError>;

    async fn start_stream(
        &self,
        config: &AudioConfig,
    ) -> Result<Box<dyn RecognitionStream>, RecognitionError>;
}

/// One open streaming-recognition session. Owned exclusively by a single
/// connection; frames must be pushed in arrival order.
///
/// After `end` has returned once, every further call to `end` must fail
/// with [`RecognitionError::AlreadyEnded`].
#[async_trait]
pub trait RecognitionStream: Send + Sync {
    async fn stream(&mut self, audio_data: &[u8]) -> Result<(), RecognitionError>;

    async fn end(&mut self) -> Result<String, RecognitionError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("no audio data received")]
    NoAudio,
    #[error("no speech detected in audio")]
    NoSpeech,
    #[error("recognition stream already ended")]
    AlreadyEnded,
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),
    #[error("stream failed: {0}")]
    StreamFailed(String),
    #[error("api request failed: {0}")]
    ApiRequestFailed(String),
}
