use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{FailureKind, StepId};

pub type StepOutcome = Result<serde_json::Value, StepError>;

/// One stage of a saga. `execute` may write its output into the shared
/// request record; `compensate` undoes whatever `execute` made visible.
#[async_trait]
pub trait Step<D: Send + 'static>: Send + Sync {
    fn id(&self) -> StepId;

    async fn execute(&self, data: &mut D) -> StepOutcome;

    async fn compensate(&self, data: &mut D) -> Result<(), StepError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StepError {
    #[error("capability call failed: {0}")]
    Capability(String),
    #[error("content rejected: {0}")]
    ContentRejected(String),
    #[error("missing input: {0}")]
    MissingInput(&'static str),
    #[error("deadline of {0:?} exceeded")]
    Timeout(Duration),
}

impl StepError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StepError::Capability(_) => FailureKind::Capability,
            StepError::ContentRejected(_) => FailureKind::ContentRejected,
            StepError::MissingInput(_) => FailureKind::MissingInput,
            StepError::Timeout(_) => FailureKind::Timeout,
        }
    }
}

pub struct SagaDefinition<D: Send + 'static> {
    name: String,
    steps: Vec<Arc<dyn Step<D>>>,
    timeout: Duration,
}

impl<D: Send + 'static> SagaDefinition<D> {
    pub fn new(name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            timeout,
        }
    }

    pub fn with_step(mut self, step: Arc<dyn Step<D>>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Arc<dyn Step<D>>] {
        &self.steps
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
