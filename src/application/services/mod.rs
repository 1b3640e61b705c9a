mod conversation_pipeline;
mod conversation_service;
mod saga_event_logger;
mod session_cleanup_worker;

pub use conversation_pipeline::{
    CONVERSATION_PIPELINE, ConversationRequest, DEFAULT_PIPELINE_TIMEOUT, GENERATE_REPLY_STEP,
    GenerateReplyStep, SYNTHESIZE_STEP, SynthesizeStep, TRANSCRIBE_STEP, TranscribeStep,
    VALIDATE_CONTENT_STEP, ValidateContentStep, conversation_pipeline,
};
pub use conversation_service::{
    ConversationReply, ConversationService, DEFAULT_POLL_INTERVAL, PipelineError,
};
pub use saga_event_logger::log_saga_events;
pub use session_cleanup_worker::{
    CleanupReport, DEFAULT_CLEANUP_INTERVAL, DEFAULT_INITIAL_DELAY, DEFAULT_SAGA_RETENTION,
    SessionCleanupWorker,
};
