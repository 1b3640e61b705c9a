mod environment;
mod settings;

pub use environment::Environment;
pub use settings::{
    AudioSettings, LoggingSettings, ModerationSettings, PipelineSettings, ProviderKind,
    ProvidersSettings, ServerSettings, SessionSettings, Settings, WebSocketSettings,
};
