use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use crate::application::saga::{
    FailureKind, SagaError, SagaFailure, SagaId, SagaInstance, SagaManager, SagaState,
};

use super::conversation_pipeline::{CONVERSATION_PIPELINE, ConversationRequest};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runs one utterance through the conversation pipeline and waits for the
/// outcome by polling the orchestrator.
pub struct ConversationService {
    saga_manager: Arc<SagaManager<ConversationRequest>>,
    wait_timeout: Duration,
    poll_interval: Duration,
}

impl ConversationService {
    pub fn new(
        saga_manager: Arc<SagaManager<ConversationRequest>>,
        wait_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            saga_manager,
            wait_timeout,
            poll_interval,
        }
    }

    pub fn saga_manager(&self) -> &Arc<SagaManager<ConversationRequest>> {
        &self.saga_manager
    }

    pub async fn process(
        &self,
        request: ConversationRequest,
    ) -> Result<ConversationReply, PipelineError> {
        let device_id = request.device_id.clone();
        let saga_id = self
            .saga_manager
            .start(CONVERSATION_PIPELINE, request)
            .await
            .map_err(PipelineError::Start)?;

        let instance = self.wait_for_completion(&saga_id).await?;
        tracing::info!(
            device_id = %device_id,
            saga_id = %saga_id,
            "Utterance processed"
        );

        let data = instance.data;
        Ok(ConversationReply {
            saga_id,
            transcript: data.transcript.unwrap_or_default(),
            reply: data.reply.unwrap_or_default(),
            audio: data.reply_audio,
        })
    }

    /// Polls until the instance is terminal or `wait_timeout` elapses. The
    /// saga's own deadline keeps running independently of this wait.
    pub async fn wait_for_completion(
        &self,
        saga_id: &SagaId,
    ) -> Result<SagaInstance<ConversationRequest>, PipelineError> {
        let deadline = Instant::now() + self.wait_timeout;
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            ticker.tick().await;

            let instance = self
                .saga_manager
                .get(saga_id)
                .await
                .ok_or_else(|| PipelineError::NotFound(saga_id.clone()))?;

            match instance.state {
                SagaState::Completed => return Ok(instance),
                SagaState::Compensated => {
                    return Err(PipelineError::Failed {
                        saga_id: saga_id.clone(),
                        failure: instance.error,
                    });
                }
                SagaState::Started | SagaState::Running | SagaState::Failed => {}
            }

            if Instant::now() >= deadline {
                return Err(PipelineError::WaitTimeout {
                    saga_id: saga_id.clone(),
                    waited: self.wait_timeout,
                });
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversationReply {
    pub saga_id: SagaId,
    pub transcript: String,
    pub reply: String,
    pub audio: Vec<Bytes>,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to start pipeline: {0}")]
    Start(SagaError),
    #[error("saga not found: {0}")]
    NotFound(SagaId),
    #[error("timed out after {waited:?} waiting for saga {saga_id}")]
    WaitTimeout { saga_id: SagaId, waited: Duration },
    #[error("saga {saga_id} compensated: {}", describe(.failure))]
    Failed {
        saga_id: SagaId,
        failure: Option<SagaFailure>,
    },
}

impl PipelineError {
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            PipelineError::Failed { failure, .. } => failure.as_ref().map(|f| f.kind),
            PipelineError::WaitTimeout { .. } => Some(FailureKind::Timeout),
            PipelineError::Start(_) | PipelineError::NotFound(_) => None,
        }
    }
}

fn describe(failure: &Option<SagaFailure>) -> String {
    match failure {
        Some(f) => format!("step {} failed: {}", f.step_id, f.message),
        None => "unknown failure".to_string(),
    }
}
