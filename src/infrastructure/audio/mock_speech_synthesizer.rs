use async_trait::async_trait;
use bytes::Bytes;

use crate::application::ports::{AudioChunkStream, SpeechSynthesizer, SynthesisError};

pub const DEFAULT_MOCK_CHUNK_SIZE: usize = 1024;

/// Bytes of silent 16-bit PCM emitted per character of input.
const BYTES_PER_CHAR: usize = 160;

/// Emits silence sized to the text, split into fixed-size chunks.
pub struct MockSpeechSynthesizer {
    chunk_size: usize,
}

impl MockSpeechSynthesizer {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }
}

impl Default for MockSpeechSynthesizer {
    fn default() -> Self {
        Self::new(DEFAULT_MOCK_CHUNK_SIZE)
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSpeechSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioChunkStream, SynthesisError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SynthesisError::EmptyText);
        }

        let audio = vec![0u8; text.chars().count() * BYTES_PER_CHAR];
        let chunks: Vec<Result<Bytes, SynthesisError>> = audio
            .chunks(self.chunk_size)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();

        tracing::debug!(chunks = chunks.len(), "Mock speech synthesized");
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}
