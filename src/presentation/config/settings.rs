use std::time::Duration;

use config::{Config, ConfigBuilder, ConfigError, File, builder::DefaultState};
use serde::Deserialize;

use crate::domain::{
    AudioConfig, ContinuationPolicy, DEFAULT_CONTINUATION_WINDOW_MINUTES, DEFAULT_ENCODING,
    DEFAULT_LANGUAGE, DEFAULT_SAMPLE_RATE,
};

use crate::infrastructure::observability::DEFAULT_LOG_FILTER;

use super::Environment;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub websocket: WebSocketSettings,
    pub session: SessionSettings,
    pub pipeline: PipelineSettings,
    pub audio: AudioSettings,
    pub providers: ProvidersSettings,
    pub moderation: ModerationSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketSettings {
    pub write_wait_secs: u64,
    pub pong_wait_secs: u64,
    pub ping_period_secs: u64,
    pub max_message_bytes: usize,
    pub outbound_buffer: usize,
    pub hub_buffer: usize,
}

impl WebSocketSettings {
    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    pub fn ping_period(&self) -> Duration {
        Duration::from_secs(self.ping_period_secs)
    }
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            write_wait_secs: 10,
            pong_wait_secs: 60,
            ping_period_secs: 54,
            max_message_bytes: 512 * 1024,
            outbound_buffer: 256,
            hub_buffer: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    pub continuation_window_minutes: i64,
    pub store_timeout_secs: u64,
    pub cleanup_interval_secs: u64,
    pub cleanup_initial_delay_secs: u64,
    pub saga_retention_secs: u64,
}

impl SessionSettings {
    pub fn continuation_policy(&self) -> ContinuationPolicy {
        ContinuationPolicy::from_minutes(self.continuation_window_minutes)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    pub timeout_secs: u64,
    pub wait_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub event_buffer: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub encoding: String,
    pub language: String,
    pub recognition_close_timeout_secs: u64,
}

impl AudioSettings {
    pub fn recognition_close_timeout(&self) -> Duration {
        Duration::from_secs(self.recognition_close_timeout_secs)
    }
}

impl From<&AudioSettings> for AudioConfig {
    fn from(settings: &AudioSettings) -> Self {
        AudioConfig {
            sample_rate: settings.sample_rate,
            encoding: settings.encoding.clone(),
            language: settings.language.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Mock,
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersSettings {
    pub kind: ProviderKind,
    pub api_key: String,
    pub base_url: String,
    pub transcription_model: String,
    pub chat_model: String,
    pub speech_model: String,
    pub voice: String,
    pub system_prompt: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModerationSettings {
    pub blocked_terms: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub enable_json: bool,
}

impl Settings {
    /// Layers compiled defaults, `appsettings.{environment}.toml` and
    /// `APP_`-prefixed environment variables, in that order.
    pub fn load(environment: Environment) -> Result<Self, ConfigError> {
        Self::with_defaults(Config::builder())?
            .add_source(
                File::with_name(&format!("appsettings.{}", environment.as_str().to_lowercase()))
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("moderation.blocked_terms"),
            )
            .build()?
            .try_deserialize()
    }

    fn with_defaults(
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        builder
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("websocket.write_wait_secs", 10)?
            .set_default("websocket.pong_wait_secs", 60)?
            .set_default("websocket.ping_period_secs", 54)?
            .set_default("websocket.max_message_bytes", 512 * 1024)?
            .set_default("websocket.outbound_buffer", 256)?
            .set_default("websocket.hub_buffer", 64)?
            .set_default(
                "session.continuation_window_minutes",
                DEFAULT_CONTINUATION_WINDOW_MINUTES,
            )?
            .set_default("session.store_timeout_secs", 5)?
            .set_default("session.cleanup_interval_secs", 30 * 60)?
            .set_default("session.cleanup_initial_delay_secs", 60)?
            .set_default("session.saga_retention_secs", 10 * 60)?
            .set_default("pipeline.timeout_secs", 30)?
            .set_default("pipeline.wait_timeout_secs", 35)?
            .set_default("pipeline.poll_interval_ms", 100)?
            .set_default("pipeline.event_buffer", 100)?
            .set_default("audio.sample_rate", i64::from(DEFAULT_SAMPLE_RATE))?
            .set_default("audio.encoding", DEFAULT_ENCODING)?
            .set_default("audio.language", DEFAULT_LANGUAGE)?
            .set_default("audio.recognition_close_timeout_secs", 3)?
            .set_default("providers.kind", "mock")?
            .set_default("providers.api_key", "")?
            .set_default("providers.base_url", "https://api.openai.com/v1")?
            .set_default("providers.transcription_model", "whisper-1")?
            .set_default("providers.chat_model", "gpt-4o-mini")?
            .set_default("providers.speech_model", "tts-1")?
            .set_default("providers.voice", "nova")?
            .set_default("providers.system_prompt", "")?
            .set_default("providers.max_tokens", 256)?
            .set_default("providers.temperature", 0.7)?
            .set_default("providers.request_timeout_secs", 20)?
            .set_default("moderation.blocked_terms", Vec::<String>::new())?
            .set_default("logging.level", DEFAULT_LOG_FILTER)?
            .set_default("logging.enable_json", false)
    }
}
