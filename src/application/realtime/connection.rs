use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::application::ports::{
    ConversationHandle, ConversationModel, RecognitionError, RecognitionStream, RepositoryError,
    SessionStore, SpeechRecognizer,
};
use crate::application::saga::FailureKind;
use crate::application::services::{
    ConversationReply, ConversationRequest, ConversationService, PipelineError,
};
use crate::domain::{AudioConfig, ContinuationPolicy, DeviceId, Session, SessionId, Turn};
use crate::infrastructure::observability::sanitize_transcript;

use super::{
    ConnectionId, ErrorCode, InboundMessage, OutboundFrame, OutboundMessage,
    negotiate_audio_config, now_unix,
};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_RECOGNITION_CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Idle,
    Listening,
    Processing,
    Speaking,
}

impl ConnectionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionPhase::Idle => "idle",
            ConnectionPhase::Listening => "listening",
            ConnectionPhase::Processing => "processing",
            ConnectionPhase::Speaking => "speaking",
        }
    }
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fields touched by both the read loop and the reply task. The lock is
/// only held for a transition, never across a provider or store call.
struct SharedState {
    phase: ConnectionPhase,
    session: Option<Session>,
    conversation: Option<(SessionId, Arc<dyn ConversationHandle>)>,
    listening_started_at: Option<DateTime<Utc>>,
    audio_config: AudioConfig,
}

/// Collaborators every connection needs, cloned once per socket.
#[derive(Clone)]
pub struct ConnectionServices {
    pub session_store: Arc<dyn SessionStore>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub conversation_model: Arc<dyn ConversationModel>,
    pub conversation_service: Arc<ConversationService>,
    pub continuation_policy: ContinuationPolicy,
    pub default_audio: AudioConfig,
    pub store_timeout: Duration,
    /// Bound on the best-effort `end()` call made when a socket goes away.
    pub recognition_close_timeout: Duration,
}

/// Listening/speaking state machine for one device socket.
///
/// Driven exclusively by the connection's read loop. Replies leave through
/// the outbound queue, which the write loop drains.
pub struct DeviceConnection {
    connection_id: ConnectionId,
    device_id: DeviceId,
    services: ConnectionServices,
    outbound: mpsc::Sender<OutboundFrame>,
    state: Arc<Mutex<SharedState>>,
    recognition: Option<Box<dyn RecognitionStream>>,
    frames_received: usize,
    bytes_received: usize,
    reply_task: Option<JoinHandle<()>>,
}

impl DeviceConnection {
    pub fn new(
        connection_id: ConnectionId,
        device_id: DeviceId,
        services: ConnectionServices,
        outbound: mpsc::Sender<OutboundFrame>,
    ) -> Self {
        let audio_config = services.default_audio.clone();
        Self {
            connection_id,
            device_id,
            services,
            outbound,
            state: Arc::new(Mutex::new(SharedState {
                phase: ConnectionPhase::Idle,
                session: None,
                conversation: None,
                listening_started_at: None,
                audio_config,
            })),
            recognition: None,
            frames_received: 0,
            bytes_received: 0,
            reply_task: None,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub async fn phase(&self) -> ConnectionPhase {
        self.state.lock().await.phase
    }

    pub async fn session(&self) -> Option<Session> {
        self.state.lock().await.session.clone()
    }

    /// Handles one control message. Rejections are reported to the device
    /// as `error` messages; only a closed outbound queue is returned.
    pub async fn handle_text(&mut self, text: &str) -> Result<(), ConnectionError> {
        let outcome = match InboundMessage::parse(text) {
            Ok(message) => self.dispatch(message).await,
            Err(e) => Err(ConnectionError::Validation(e.to_string())),
        };
        self.report(outcome).await
    }

    /// Forwards one audio frame to the open recognition stream.
    pub async fn handle_binary(&mut self, data: Bytes) -> Result<(), ConnectionError> {
        let Some(recognition) = self.recognition.as_mut() else {
            tracing::warn!(
                device_id = %self.device_id,
                bytes = data.len(),
                "Dropping audio frame received outside listening"
            );
            return Ok(());
        };

        match recognition.stream(&data).await {
            Ok(()) => {
                self.frames_received += 1;
                self.bytes_received += data.len();
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    device_id = %self.device_id,
                    error = %e,
                    "Recognition stream rejected audio, abandoning utterance"
                );
                self.recognition = None;
                self.frames_received = 0;
                self.bytes_received = 0;
                self.set_phase(ConnectionPhase::Idle).await;
                self.report(Err(ConnectionError::Stream(e.to_string())))
                    .await
            }
        }
    }

    /// Releases the recognition stream and the conversation handle. An
    /// in-flight reply task keeps running; its delivery simply fails.
    pub async fn teardown(&mut self) {
        if let Some(mut recognition) = self.recognition.take() {
            match tokio::time::timeout(
                self.services.recognition_close_timeout,
                recognition.end(),
            )
            .await
            {
                Ok(_) => {}
                Err(_) => tracing::warn!(
                    device_id = %self.device_id,
                    "Timed out closing recognition stream"
                ),
            }
        }

        let mut state = self.state.lock().await;
        state.conversation = None;
        if state.phase == ConnectionPhase::Listening {
            state.phase = ConnectionPhase::Idle;
        }
        tracing::info!(
            device_id = %self.device_id,
            connection_id = %self.connection_id,
            phase = %state.phase,
            "Connection torn down"
        );
    }

    /// Waits for the most recent reply task, if any.
    pub async fn await_pending_reply(&mut self) {
        if let Some(task) = self.reply_task.take() {
            if let Err(e) = task.await {
                tracing::error!(device_id = %self.device_id, error = %e, "Reply task panicked");
            }
        }
    }

    async fn dispatch(&mut self, message: InboundMessage) -> Result<(), ConnectionError> {
        tracing::debug!(
            device_id = %self.device_id,
            message_type = message.name(),
            "Control message received"
        );
        match message {
            InboundMessage::ListeningStart {
                sample_rate,
                encoding,
                language,
                ..
            } => self.listening_start(sample_rate, encoding, language).await,
            InboundMessage::ListeningEnd { .. } => self.listening_end().await,
            InboundMessage::Ping { .. } => self.send(&OutboundMessage::pong()).await,
            InboundMessage::Pong { .. } => Ok(()),
        }
    }

    async fn report(&self, outcome: Result<(), ConnectionError>) -> Result<(), ConnectionError> {
        let error = match outcome {
            Ok(()) => return Ok(()),
            Err(ConnectionError::OutboundClosed) => return Err(ConnectionError::OutboundClosed),
            Err(error) => error,
        };
        tracing::warn!(
            device_id = %self.device_id,
            code = ?error.code(),
            error = %error,
            "Rejecting control message"
        );
        match self
            .send(&OutboundMessage::error(error.code(), error.to_string()))
            .await
        {
            Err(ConnectionError::OutboundClosed) => Err(ConnectionError::OutboundClosed),
            Err(e) => {
                tracing::error!(device_id = %self.device_id, error = %e, "Failed to report error");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    async fn listening_start(
        &mut self,
        sample_rate: Option<u32>,
        encoding: Option<String>,
        language: Option<String>,
    ) -> Result<(), ConnectionError> {
        {
            let mut state = self.state.lock().await;
            if state.phase != ConnectionPhase::Idle {
                return Err(ConnectionError::InvalidState {
                    operation: "listening_start",
                    phase: state.phase,
                });
            }
            state.phase = ConnectionPhase::Listening;
        }

        let now = Utc::now();
        let session = match self.resolve_session(now).await {
            Ok(session) => session,
            Err(e) => {
                self.set_phase(ConnectionPhase::Idle).await;
                return Err(e);
            }
        };
        let session_id = session.id;

        match self
            .open_utterance(session, now, sample_rate, encoding, language)
            .await
        {
            Ok(()) => {
                self.send(&OutboundMessage::ListeningStart {
                    session_id: session_id.to_string(),
                    status: "ready".to_string(),
                    message: "Listening started".to_string(),
                    timestamp: now_unix(),
                })
                .await
            }
            Err(e) => {
                self.set_phase(ConnectionPhase::Idle).await;
                self.send(&OutboundMessage::ListeningStart {
                    session_id: session_id.to_string(),
                    status: "error".to_string(),
                    message: e.to_string(),
                    timestamp: now_unix(),
                })
                .await?;
                Err(e)
            }
        }
    }

    async fn open_utterance(
        &mut self,
        mut session: Session,
        now: DateTime<Utc>,
        sample_rate: Option<u32>,
        encoding: Option<String>,
        language: Option<String>,
    ) -> Result<(), ConnectionError> {
        if let Some(requested) = language.as_deref() {
            if requested != session.metadata.language {
                session.set_language(requested.to_string(), now);
                if let Err(e) = self
                    .store_call(self.services.session_store.update(&session))
                    .await
                {
                    tracing::warn!(
                        device_id = %self.device_id,
                        session_id = %session.id,
                        error = %e,
                        "Failed to persist session language"
                    );
                }
            }
        }

        let fallback = AudioConfig {
            language: session.metadata.language.clone(),
            ..self.services.default_audio.clone()
        };
        let audio_config = negotiate_audio_config(&fallback, sample_rate, encoding, language);

        let conversation = self.resolve_conversation(&session).await?;
        let recognition = self
            .services
            .recognizer
            .start_stream(&audio_config)
            .await
            .map_err(|e| ConnectionError::Stream(e.to_string()))?;

        let session_id = session.id;
        tracing::info!(
            device_id = %self.device_id,
            session_id = %session_id,
            sample_rate = audio_config.sample_rate,
            encoding = %audio_config.encoding,
            language = %audio_config.language,
            "Listening started"
        );

        {
            let mut state = self.state.lock().await;
            state.session = Some(session);
            state.conversation = Some((session_id, conversation));
            state.listening_started_at = Some(now);
            state.audio_config = audio_config;
        }
        self.recognition = Some(recognition);
        self.frames_received = 0;
        self.bytes_received = 0;

        Ok(())
    }

    /// Continues the device's Active session when the policy allows it,
    /// otherwise terminates it and creates a fresh one.
    async fn resolve_session(&self, now: DateTime<Utc>) -> Result<Session, ConnectionError> {
        let store = &self.services.session_store;
        let stored = self.store_call(store.get_active(&self.device_id)).await?;
        let local = self.state.lock().await.session.clone();

        // The local copy may hold turns whose persistence failed.
        let current = match (stored, local) {
            (Some(stored), Some(local)) if stored.id == local.id => Some(local),
            (stored, _) => stored,
        };

        if let Some(mut session) = current {
            if self.services.continuation_policy.allows(&session, now) {
                tracing::debug!(
                    device_id = %self.device_id,
                    session_id = %session.id,
                    turns = session.turns.len(),
                    "Continuing session"
                );
                return Ok(session);
            }

            session.terminate(now);
            if let Err(e) = self.store_call(store.update(&session)).await {
                tracing::warn!(
                    device_id = %self.device_id,
                    session_id = %session.id,
                    error = %e,
                    "Failed to terminate lapsed session"
                );
            }
            tracing::info!(
                device_id = %self.device_id,
                session_id = %session.id,
                "Session lapsed, starting a new one"
            );
        }

        let session = Session::new_at(self.device_id.clone(), now);
        self.store_call(store.create(&session)).await?;
        tracing::info!(
            device_id = %self.device_id,
            session_id = %session.id,
            "Session created"
        );
        Ok(session)
    }

    async fn resolve_conversation(
        &self,
        session: &Session,
    ) -> Result<Arc<dyn ConversationHandle>, ConnectionError> {
        let existing = {
            let state = self.state.lock().await;
            state
                .conversation
                .as_ref()
                .filter(|(id, _)| *id == session.id)
                .map(|(_, handle)| Arc::clone(handle))
        };
        if let Some(handle) = existing {
            return Ok(handle);
        }

        self.services
            .conversation_model
            .start_conversation(session.history())
            .await
            .map_err(|e| ConnectionError::Stream(e.to_string()))
    }

    async fn listening_end(&mut self) -> Result<(), ConnectionError> {
        {
            let mut state = self.state.lock().await;
            if state.phase != ConnectionPhase::Listening {
                return Err(ConnectionError::InvalidState {
                    operation: "listening_end",
                    phase: state.phase,
                });
            }
            state.phase = ConnectionPhase::Processing;
        }

        let frames = std::mem::take(&mut self.frames_received);
        let bytes = std::mem::take(&mut self.bytes_received);
        let ended_at = Utc::now();

        let transcript = match self.finish_recognition(frames).await {
            Ok(transcript) => transcript,
            Err(e) => {
                self.set_phase(ConnectionPhase::Idle).await;
                return Err(e);
            }
        };

        let context = {
            let state = self.state.lock().await;
            match (&state.session, &state.conversation) {
                (Some(session), Some((_, conversation))) => Some((
                    session.id,
                    Arc::clone(conversation),
                    state.listening_started_at.unwrap_or(ended_at),
                    state.audio_config.clone(),
                )),
                _ => None,
            }
        };
        let Some((session_id, conversation, started_at, audio_config)) = context else {
            self.set_phase(ConnectionPhase::Idle).await;
            return Err(ConnectionError::Stream(
                "no session is open for this utterance".to_string(),
            ));
        };

        tracing::info!(
            device_id = %self.device_id,
            session_id = %session_id,
            frames,
            bytes,
            transcript = %sanitize_transcript(&transcript),
            "Utterance received"
        );

        self.send(&OutboundMessage::ListeningEnd {
            session_id: session_id.to_string(),
            transcript: transcript.clone(),
            timestamp: now_unix(),
        })
        .await?;

        let request = ConversationRequest::from_transcript(
            self.device_id.clone(),
            session_id,
            audio_config,
            transcript.clone(),
            conversation,
        );
        let task = ReplyTask {
            device_id: self.device_id.clone(),
            session_id,
            transcript,
            utterance_at: ended_at,
            utterance_ms: duration_ms(started_at, ended_at),
            services: self.services.clone(),
            outbound: self.outbound.clone(),
            state: Arc::clone(&self.state),
        };
        let span = tracing::info_span!(
            "reply",
            device_id = %self.device_id,
            session_id = %session_id
        );
        self.reply_task = Some(tokio::spawn(task.run(request).instrument(span)));
        Ok(())
    }

    async fn finish_recognition(&mut self, frames: usize) -> Result<String, ConnectionError> {
        let Some(mut recognition) = self.recognition.take() else {
            return Err(ConnectionError::Stream(
                "no recognition stream is open".to_string(),
            ));
        };

        let transcript = recognition
            .end()
            .await
            .map_err(|e| ConnectionError::Stream(e.to_string()))?;

        if frames == 0 {
            return Err(ConnectionError::Stream(
                RecognitionError::NoAudio.to_string(),
            ));
        }
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Err(ConnectionError::Stream(
                RecognitionError::NoSpeech.to_string(),
            ));
        }
        Ok(transcript.to_string())
    }

    async fn set_phase(&self, phase: ConnectionPhase) {
        self.state.lock().await.phase = phase;
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), ConnectionError> {
        send_message(&self.outbound, message).await
    }

    async fn store_call<T>(
        &self,
        operation: impl Future<Output = Result<T, RepositoryError>>,
    ) -> Result<T, ConnectionError> {
        store_call(self.services.store_timeout, operation).await
    }
}

/// Detached unit that turns one transcript into a spoken reply. It talks
/// back to the connection only through the outbound queue and the guarded
/// shared state.
struct ReplyTask {
    device_id: DeviceId,
    session_id: SessionId,
    transcript: String,
    utterance_at: DateTime<Utc>,
    utterance_ms: u64,
    services: ConnectionServices,
    outbound: mpsc::Sender<OutboundFrame>,
    state: Arc<Mutex<SharedState>>,
}

impl ReplyTask {
    async fn run(self, request: ConversationRequest) {
        match self.services.conversation_service.process(request).await {
            Ok(reply) => self.deliver(reply).await,
            Err(error) => self.fail(error).await,
        }
    }

    async fn fail(&self, error: PipelineError) {
        let code = match error.failure_kind() {
            Some(FailureKind::Timeout) => ErrorCode::TimeoutError,
            Some(FailureKind::ContentRejected) => ErrorCode::ContentRejected,
            Some(FailureKind::Capability) | Some(FailureKind::MissingInput) | None => {
                ErrorCode::StreamError
            }
        };
        tracing::warn!(code = ?code, error = %error, "Conversation pipeline failed");

        self.abandon().await;
        let message = OutboundMessage::error(code, error.to_string());
        if let Err(e) = send_message(&self.outbound, &message).await {
            tracing::info!(error = %e, "Could not report pipeline failure to device");
        }
    }

    /// Returns to Idle after an utterance that produced no turns. The
    /// conversation handle may already hold the unheard exchange, so it is
    /// dropped and the next `listening_start` reseeds it from the session.
    async fn abandon(&self) {
        let mut state = self.state.lock().await;
        state.phase = ConnectionPhase::Idle;
        if state
            .conversation
            .as_ref()
            .is_some_and(|(id, _)| *id == self.session_id)
        {
            state.conversation = None;
        }
    }

    async fn deliver(self, reply: ConversationReply) {
        let speaking_started = Utc::now();
        self.state.lock().await.phase = ConnectionPhase::Speaking;

        if let Err(e) = self.stream_reply(&reply).await {
            tracing::info!(
                saga_id = %reply.saga_id,
                error = %e,
                "Connection closed before reply was delivered"
            );
            self.abandon().await;
            return;
        }

        // speaking_end is queued before Idle so no new utterance can start
        // ahead of it.
        let finished = Utc::now();
        let snapshot = {
            let mut state = self.state.lock().await;
            state.phase = ConnectionPhase::Idle;
            match state.session.as_mut() {
                Some(session) if session.id == self.session_id => {
                    self.append_turns(session, &reply.reply, speaking_started, finished);
                    Some(session.clone())
                }
                _ => None,
            }
        };

        let Some(session) = snapshot else {
            return;
        };
        match store_call(
            self.services.store_timeout,
            self.services.session_store.update(&session),
        )
        .await
        {
            Ok(()) => tracing::debug!(turns = session.turns.len(), "Session persisted"),
            Err(e) => tracing::warn!(
                code = ?e.code(),
                error = %e,
                "Failed to persist session, keeping turns in memory"
            ),
        }
    }

    async fn stream_reply(&self, reply: &ConversationReply) -> Result<(), ConnectionError> {
        send_message(
            &self.outbound,
            &OutboundMessage::SpeakingStart {
                session_id: self.session_id.to_string(),
                text: reply.reply.clone(),
                timestamp: now_unix(),
            },
        )
        .await?;

        for chunk in &reply.audio {
            self.outbound
                .send(OutboundFrame::Binary(chunk.clone()))
                .await
                .map_err(|_| ConnectionError::OutboundClosed)?;
        }
        send_message(
            &self.outbound,
            &OutboundMessage::SpeakingEnd {
                session_id: self.session_id.to_string(),
                timestamp: now_unix(),
            },
        )
        .await?;
        tracing::info!(
            saga_id = %reply.saga_id,
            chunks = reply.audio.len(),
            "Reply delivered"
        );
        Ok(())
    }

    fn append_turns(
        &self,
        session: &mut Session,
        reply: &str,
        speaking_started: DateTime<Utc>,
        finished: DateTime<Utc>,
    ) {
        let turns = [
            Turn::user(self.utterance_at, self.transcript.clone(), self.utterance_ms),
            Turn::assistant(
                speaking_started,
                reply.to_string(),
                duration_ms(speaking_started, finished),
            ),
        ];
        for turn in turns {
            if let Err(e) = session.append_turn(turn, finished) {
                tracing::error!(device_id = %self.device_id, error = %e, "Turn rejected");
            }
        }
    }
}

async fn send_message(
    outbound: &mpsc::Sender<OutboundFrame>,
    message: &OutboundMessage,
) -> Result<(), ConnectionError> {
    let frame =
        OutboundFrame::message(message).map_err(|e| ConnectionError::Encoding(e.to_string()))?;
    outbound
        .send(frame)
        .await
        .map_err(|_| ConnectionError::OutboundClosed)
}

async fn store_call<T>(
    timeout: Duration,
    operation: impl Future<Output = Result<T, RepositoryError>>,
) -> Result<T, ConnectionError> {
    match tokio::time::timeout(timeout, operation).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ConnectionError::Resource(e.to_string())),
        Err(_) => Err(ConnectionError::Resource(format!(
            "session store did not answer within {:?}",
            timeout
        ))),
    }
}

fn duration_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    u64::try_from((to - from).num_milliseconds()).unwrap_or(0)
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("{0}")]
    Validation(String),
    #[error("{operation} is not allowed while {phase}")]
    InvalidState {
        operation: &'static str,
        phase: ConnectionPhase,
    },
    #[error("{0}")]
    Stream(String),
    #[error("session store failure: {0}")]
    Resource(String),
    #[error("failed to encode message: {0}")]
    Encoding(String),
    #[error("outbound queue closed")]
    OutboundClosed,
}

impl ConnectionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ConnectionError::Validation(_) => ErrorCode::ValidationError,
            ConnectionError::InvalidState { .. } => ErrorCode::StateError,
            ConnectionError::Resource(_) => ErrorCode::ResourceError,
            ConnectionError::Stream(_)
            | ConnectionError::Encoding(_)
            | ConnectionError::OutboundClosed => ErrorCode::StreamError,
        }
    }
}
