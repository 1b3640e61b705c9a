mod audio_provider_factory;
mod mock_speech_recognizer;
mod mock_speech_synthesizer;
mod openai_speech_recognizer;
mod openai_speech_synthesizer;
mod wav;

pub use audio_provider_factory::{AudioProviderError, AudioProviderFactory};
pub use mock_speech_recognizer::{MockRecognitionStream, MockSpeechRecognizer};
pub use mock_speech_synthesizer::{DEFAULT_MOCK_CHUNK_SIZE, MockSpeechSynthesizer};
pub use openai_speech_recognizer::OpenAiSpeechRecognizer;
pub use openai_speech_synthesizer::OpenAiSpeechSynthesizer;
pub use wav::pcm16_to_wav;
