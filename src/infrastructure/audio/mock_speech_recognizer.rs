use async_trait::async_trait;

use crate::application::ports::{RecognitionError, RecognitionStream, SpeechRecognizer};
use crate::domain::AudioConfig;

const LONG_UTTERANCE: &str = "Halo Arunika, apa kabar? Saya ingin bercerita tentang hari ini.";
const MEDIUM_UTTERANCE: &str = "Terima kasih sudah mendengarkan.";
const SHORT_UTTERANCE: &str = "Halo Arunika!";
const TINY_UTTERANCE: &str = "Hai";

/// Canned transcripts picked by how much audio was received.
fn transcript_for(audio_bytes: usize) -> &'static str {
    match audio_bytes {
        n if n > 10_000 => LONG_UTTERANCE,
        n if n > 5_000 => MEDIUM_UTTERANCE,
        n if n > 1_000 => SHORT_UTTERANCE,
        _ => TINY_UTTERANCE,
    }
}

pub struct MockSpeechRecognizer;

#[async_trait]
impl SpeechRecognizer for MockSpeechRecognizer {
    async fn recognize(
        &self,
        audio_data: &[u8],
        config: &AudioConfig,
    ) -> Result<String, RecognitionError> {
        tracing::debug!(
            bytes = audio_data.len(),
            sample_rate = config.sample_rate,
            encoding = %config.encoding,
            "Mock batch recognition"
        );
        if audio_data.is_empty() {
            return Err(RecognitionError::NoAudio);
        }
        Ok(transcript_for(audio_data.len()).to_string())
    }

    async fn start_stream(
        &self,
        config: &AudioConfig,
    ) -> Result<Box<dyn RecognitionStream>, RecognitionError> {
        tracing::debug!(
            sample_rate = config.sample_rate,
            encoding = %config.encoding,
            language = %config.language,
            "Mock recognition stream opened"
        );
        Ok(Box::new(MockRecognitionStream::default()))
    }
}

#[derive(Default)]
pub struct MockRecognitionStream {
    bytes_received: usize,
    ended: bool,
}

#[async_trait]
impl RecognitionStream for MockRecognitionStream {
    async fn stream(&mut self, audio_data: &[u8]) -> Result<(), RecognitionError> {
        if self.ended {
            return Err(RecognitionError::AlreadyEnded);
        }
        self.bytes_received += audio_data.len();
        Ok(())
    }

    async fn end(&mut self) -> Result<String, RecognitionError> {
        if self.ended {
            return Err(RecognitionError::AlreadyEnded);
        }
        self.ended = true;

        if self.bytes_received == 0 {
            return Err(RecognitionError::NoAudio);
        }
        Ok(transcript_for(self.bytes_received).to_string())
    }
}
