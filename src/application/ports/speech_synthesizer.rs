use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::Stream;

pub type AudioChunkStream =
    Pin<Box<dyn Stream<Item = Result<Bytes, SynthesisError>> + Send + 'static>>;

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<AudioChunkStream, SynthesisError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("api request failed: {0}")]
    ApiRequestFailed(String),
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),
    #[error("empty text")]
    EmptyText,
}
