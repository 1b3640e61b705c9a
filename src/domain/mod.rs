mod audio_config;
mod continuation_policy;
mod device_id;
mod session;
mod session_id;
mod session_status;
mod turn;
mod turn_role;

pub use audio_config::{AudioConfig, DEFAULT_ENCODING, DEFAULT_LANGUAGE, DEFAULT_SAMPLE_RATE};
pub use continuation_policy::{ContinuationPolicy, DEFAULT_CONTINUATION_WINDOW_MINUTES};
pub use device_id::DeviceId;
pub use session::{SESSION_TTL_HOURS, Session, SessionError, SessionMetadata};
pub use session_id::SessionId;
pub use session_status::SessionStatus;
pub use turn::{Turn, TurnMetadata};
pub use turn_role::TurnRole;
