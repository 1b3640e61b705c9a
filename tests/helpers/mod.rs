use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use arunika::application::ports::{
    AudioChunkStream, ContentModerator, ConversationError, ConversationHandle, ConversationModel,
    RecognitionError, RecognitionStream, RepositoryError, SessionStore, SpeechRecognizer,
    SpeechSynthesizer, SynthesisError,
};
use arunika::application::realtime::{
    ConnectionId, ConnectionServices, DeviceConnection, OutboundFrame, OutboundMessage,
};
use arunika::application::saga::{DEFAULT_EVENT_BUFFER, SagaEvent, SagaManager};
use arunika::application::services::{
    ConversationRequest, ConversationService, conversation_pipeline,
};
use arunika::domain::{AudioConfig, ContinuationPolicy, DeviceId, Session, SessionId, Turn};
use arunika::infrastructure::audio::{MockSpeechRecognizer, MockSpeechSynthesizer};
use arunika::infrastructure::llm::MockConversationModel;
use arunika::infrastructure::moderation::KeywordContentModerator;
use arunika::infrastructure::persistence::InMemorySessionStore;

pub const TEST_DEVICE: &str = "doll-001";
pub const LISTENING_START: &str =
    r#"{"type":"listening_start","sample_rate":16000,"encoding":"LINEAR16","timestamp":1700000000}"#;
pub const LISTENING_END: &str = r#"{"type":"listening_end","timestamp":1700000005}"#;
pub const FRAME_BYTES: usize = 4_000;

pub struct HarnessOptions {
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub moderator: Arc<dyn ContentModerator>,
    pub conversation_model: Arc<dyn ConversationModel>,
    pub session_store: Arc<dyn SessionStore>,
    pub continuation_policy: ContinuationPolicy,
    pub pipeline_timeout: Duration,
    pub recognition_close_timeout: Duration,
    pub outbound_capacity: usize,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            recognizer: Arc::new(MockSpeechRecognizer),
            synthesizer: Arc::new(MockSpeechSynthesizer::default()),
            moderator: Arc::new(KeywordContentModerator::new(Vec::<String>::new())),
            conversation_model: Arc::new(MockConversationModel),
            session_store: Arc::new(InMemorySessionStore::new()),
            continuation_policy: ContinuationPolicy::default(),
            pipeline_timeout: Duration::from_secs(5),
            recognition_close_timeout: Duration::from_secs(1),
            outbound_capacity: 256,
        }
    }
}

pub struct Harness {
    pub connection: DeviceConnection,
    pub outbound: mpsc::Receiver<OutboundFrame>,
    pub saga_manager: Arc<SagaManager<ConversationRequest>>,
    pub events: mpsc::Receiver<SagaEvent>,
    pub session_store: Arc<dyn SessionStore>,
}

pub async fn harness(options: HarnessOptions) -> Harness {
    let saga_manager = Arc::new(SagaManager::new(DEFAULT_EVENT_BUFFER));
    saga_manager
        .register_definition(conversation_pipeline(
            Arc::clone(&options.recognizer),
            options.moderator,
            options.synthesizer,
            options.pipeline_timeout,
        ))
        .await;
    let events = saga_manager.take_event_receiver().unwrap();

    let conversation_service = Arc::new(ConversationService::new(
        Arc::clone(&saga_manager),
        Duration::from_secs(5),
        Duration::from_millis(10),
    ));

    let services = ConnectionServices {
        session_store: Arc::clone(&options.session_store),
        recognizer: options.recognizer,
        conversation_model: options.conversation_model,
        conversation_service,
        continuation_policy: options.continuation_policy,
        default_audio: AudioConfig::default(),
        store_timeout: Duration::from_secs(1),
        recognition_close_timeout: options.recognition_close_timeout,
    };

    let (sender, outbound) = mpsc::channel(options.outbound_capacity);
    let connection = DeviceConnection::new(
        ConnectionId::new(),
        DeviceId::new(TEST_DEVICE),
        services,
        sender,
    );

    Harness {
        connection,
        outbound,
        saga_manager,
        events,
        session_store: options.session_store,
    }
}

pub fn drain(outbound: &mut mpsc::Receiver<OutboundFrame>) -> Vec<OutboundFrame> {
    let mut frames = Vec::new();
    while let Ok(frame) = outbound.try_recv() {
        frames.push(frame);
    }
    frames
}

pub fn drain_events(events: &mut mpsc::Receiver<SagaEvent>) -> Vec<SagaEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

pub fn parse_message(frame: &OutboundFrame) -> Option<OutboundMessage> {
    match frame {
        OutboundFrame::Text(text) => Some(serde_json::from_str(text).unwrap()),
        OutboundFrame::Binary(_) | OutboundFrame::Close => None,
    }
}

pub fn messages(frames: &[OutboundFrame]) -> Vec<OutboundMessage> {
    frames.iter().filter_map(parse_message).collect()
}

/// One label per frame: the message type for text frames, "audio" for
/// binary frames.
pub fn labels(frames: &[OutboundFrame]) -> Vec<&'static str> {
    frames
        .iter()
        .map(|frame| match parse_message(frame) {
            Some(OutboundMessage::ListeningStart { .. }) => "listening_start",
            Some(OutboundMessage::ListeningEnd { .. }) => "listening_end",
            Some(OutboundMessage::SpeakingStart { .. }) => "speaking_start",
            Some(OutboundMessage::SpeakingEnd { .. }) => "speaking_end",
            Some(OutboundMessage::Pong { .. }) => "pong",
            Some(OutboundMessage::Error { .. }) => "error",
            None if matches!(frame, OutboundFrame::Binary(_)) => "audio",
            None => "close",
        })
        .collect()
}

pub struct FailingSynthesizer;

#[async_trait]
impl SpeechSynthesizer for FailingSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<AudioChunkStream, SynthesisError> {
        Err(SynthesisError::ApiRequestFailed("voice service down".to_string()))
    }
}

/// Fails the first synthesis, then delegates to the mock synthesizer.
#[derive(Default)]
pub struct FlakySynthesizer {
    calls: AtomicUsize,
}

#[async_trait]
impl SpeechSynthesizer for FlakySynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioChunkStream, SynthesisError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(SynthesisError::ApiRequestFailed("voice service hiccup".to_string()));
        }
        MockSpeechSynthesizer::default().synthesize(text).await
    }
}

/// Waits before delegating to the mock synthesizer.
pub struct SlowSynthesizer {
    pub delay: Duration,
}

#[async_trait]
impl SpeechSynthesizer for SlowSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioChunkStream, SynthesisError> {
        tokio::time::sleep(self.delay).await;
        MockSpeechSynthesizer::default().synthesize(text).await
    }
}

/// Session store whose operations can be made to fail one by one.
#[derive(Default)]
pub struct FlakySessionStore {
    pub inner: InMemorySessionStore,
    pub fail_lookups: bool,
    pub fail_updates: bool,
}

#[async_trait]
impl SessionStore for FlakySessionStore {
    async fn get_active(&self, device_id: &DeviceId) -> Result<Option<Session>, RepositoryError> {
        if self.fail_lookups {
            return Err(RepositoryError::Unavailable("connection refused".to_string()));
        }
        self.inner.get_active(device_id).await
    }

    async fn get(&self, id: SessionId) -> Result<Option<Session>, RepositoryError> {
        self.inner.get(id).await
    }

    async fn create(&self, session: &Session) -> Result<(), RepositoryError> {
        self.inner.create(session).await
    }

    async fn update(&self, session: &Session) -> Result<(), RepositoryError> {
        if self.fail_updates {
            return Err(RepositoryError::Unavailable("write timeout".to_string()));
        }
        self.inner.update(session).await
    }

    async fn add_turn(&self, id: SessionId, turn: &Turn) -> Result<(), RepositoryError> {
        self.inner.add_turn(id, turn).await
    }

    async fn expire_sessions(
        &self,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<usize, RepositoryError> {
        self.inner.expire_sessions(now).await
    }
}

/// Recognizer whose streams never finish closing.
pub struct HangingRecognizer;

#[async_trait]
impl SpeechRecognizer for HangingRecognizer {
    async fn recognize(
        &self,
        _audio_data: &[u8],
        _config: &AudioConfig,
    ) -> Result<String, RecognitionError> {
        Err(RecognitionError::NoSpeech)
    }

    async fn start_stream(
        &self,
        _config: &AudioConfig,
    ) -> Result<Box<dyn RecognitionStream>, RecognitionError> {
        Ok(Box::new(HangingStream))
    }
}

struct HangingStream;

#[async_trait]
impl RecognitionStream for HangingStream {
    async fn stream(&mut self, _audio_data: &[u8]) -> Result<(), RecognitionError> {
        Ok(())
    }

    async fn end(&mut self) -> Result<String, RecognitionError> {
        futures::future::pending().await
    }
}

/// Recognizer that cannot open a stream.
pub struct UnavailableRecognizer;

#[async_trait]
impl SpeechRecognizer for UnavailableRecognizer {
    async fn recognize(
        &self,
        _audio_data: &[u8],
        _config: &AudioConfig,
    ) -> Result<String, RecognitionError> {
        Err(RecognitionError::StreamFailed("recognizer offline".to_string()))
    }

    async fn start_stream(
        &self,
        _config: &AudioConfig,
    ) -> Result<Box<dyn RecognitionStream>, RecognitionError> {
        Err(RecognitionError::StreamFailed("recognizer offline".to_string()))
    }
}

/// Conversation model that records how each handle was seeded and how
/// much history it held at every send.
#[derive(Default)]
pub struct RecordingConversationModel {
    pub seeded_turns: Arc<Mutex<Vec<usize>>>,
    pub history_at_send: Arc<Mutex<Vec<usize>>>,
}

#[async_trait]
impl ConversationModel for RecordingConversationModel {
    async fn start_conversation(
        &self,
        history: &[Turn],
    ) -> Result<Arc<dyn ConversationHandle>, ConversationError> {
        self.seeded_turns.lock().unwrap().push(history.len());
        Ok(Arc::new(RecordingConversation {
            history_len: AtomicUsize::new(history.len()),
            history_at_send: Arc::clone(&self.history_at_send),
        }))
    }
}

struct RecordingConversation {
    history_len: AtomicUsize,
    history_at_send: Arc<Mutex<Vec<usize>>>,
}

#[async_trait]
impl ConversationHandle for RecordingConversation {
    async fn send(&self, text: &str) -> Result<String, ConversationError> {
        let prior = self.history_len.fetch_add(2, Ordering::SeqCst);
        self.history_at_send.lock().unwrap().push(prior);
        Ok(format!("Kamu bilang '{}'", text))
    }
}
