use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;

use crate::application::ports::{RecognitionError, RecognitionStream, SpeechRecognizer};
use crate::domain::AudioConfig;

use super::wav::{WAV_HEADER_LEN, upload_payload};

/// Largest file the transcription endpoint accepts.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Whisper-compatible `/audio/transcriptions` client. Streaming sessions
/// buffer the utterance and transcribe it in one request on `end`.
#[derive(Clone)]
pub struct OpenAiSpeechRecognizer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiSpeechRecognizer {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, RecognitionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecognitionError::ApiRequestFailed(format!("client: {}", e)))?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    fn language_code(config: &AudioConfig) -> String {
        config
            .language
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }
}

#[async_trait]
impl SpeechRecognizer for OpenAiSpeechRecognizer {
    async fn recognize(
        &self,
        audio_data: &[u8],
        config: &AudioConfig,
    ) -> Result<String, RecognitionError> {
        if audio_data.is_empty() {
            return Err(RecognitionError::NoAudio);
        }

        let url = format!("{}/audio/transcriptions", self.base_url);
        let (payload, file_name, mime) = upload_payload(audio_data, config);

        let file_part = multipart::Part::bytes(payload)
            .file_name(file_name)
            .mime_str(mime)
            .map_err(|e| RecognitionError::UnsupportedFormat(format!("mime: {}", e)))?;

        let mut form = multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", "text")
            .part("file", file_part);
        let language = Self::language_code(config);
        if !language.is_empty() {
            form = form.text("language", language);
        }

        tracing::debug!(
            model = %self.model,
            bytes = audio_data.len(),
            encoding = %config.encoding,
            "Sending audio for transcription"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| RecognitionError::ApiRequestFailed(format!("request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(RecognitionError::ApiRequestFailed(format!(
                "status {}: {}",
                status, body
            )));
        }

        let transcript = response
            .text()
            .await
            .map_err(|e| RecognitionError::ApiRequestFailed(format!("body: {}", e)))?;
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Err(RecognitionError::NoSpeech);
        }

        tracing::info!(chars = transcript.len(), "Transcription completed");
        Ok(transcript.to_string())
    }

    async fn start_stream(
        &self,
        config: &AudioConfig,
    ) -> Result<Box<dyn RecognitionStream>, RecognitionError> {
        Ok(Box::new(BufferedRecognitionStream {
            recognizer: self.clone(),
            config: config.clone(),
            buffer: Vec::new(),
            max_bytes: MAX_UPLOAD_BYTES - WAV_HEADER_LEN,
            ended: false,
        }))
    }
}

struct BufferedRecognitionStream {
    recognizer: OpenAiSpeechRecognizer,
    config: AudioConfig,
    buffer: Vec<u8>,
    max_bytes: usize,
    ended: bool,
}

#[async_trait]
impl RecognitionStream for BufferedRecognitionStream {
    async fn stream(&mut self, audio_data: &[u8]) -> Result<(), RecognitionError> {
        if self.ended {
            return Err(RecognitionError::AlreadyEnded);
        }
        if self.buffer.len() + audio_data.len() > self.max_bytes {
            self.ended = true;
            self.buffer = Vec::new();
            return Err(RecognitionError::StreamFailed(format!(
                "utterance exceeds {} bytes",
                self.max_bytes
            )));
        }
        self.buffer.extend_from_slice(audio_data);
        Ok(())
    }

    async fn end(&mut self) -> Result<String, RecognitionError> {
        if self.ended {
            return Err(RecognitionError::AlreadyEnded);
        }
        self.ended = true;
        let audio = std::mem::take(&mut self.buffer);
        self.recognizer.recognize(&audio, &self.config).await
    }
}
