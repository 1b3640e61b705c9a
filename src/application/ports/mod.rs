mod content_moderator;
mod conversation_model;
mod repository_error;
mod session_store;
mod speech_recognizer;
mod speech_synthesizer;

pub use content_moderator::{ContentModerator, ModerationError};
pub use conversation_model::{ConversationError, ConversationHandle, ConversationModel};
pub use repository_error::RepositoryError;
pub use session_store::SessionStore;
pub use speech_recognizer::{RecognitionError, RecognitionStream, SpeechRecognizer};
pub use speech_synthesizer::{AudioChunkStream, SpeechSynthesizer, SynthesisError};
