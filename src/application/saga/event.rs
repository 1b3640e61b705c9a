use chrono::{DateTime, Utc};

use super::{SagaId, StepId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SagaEventType {
    SagaStarted,
    SagaCompleted,
    SagaFailed,
    SagaCompensated,
    StepStarted,
    StepCompleted,
    StepFailed,
    StepCompensated,
}

impl SagaEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaEventType::SagaStarted => "saga_started",
            SagaEventType::SagaCompleted => "saga_completed",
            SagaEventType::SagaFailed => "saga_failed",
            SagaEventType::SagaCompensated => "saga_compensated",
            SagaEventType::StepStarted => "step_started",
            SagaEventType::StepCompleted => "step_completed",
            SagaEventType::StepFailed => "step_failed",
            SagaEventType::StepCompensated => "step_compensated",
        }
    }
}

/// Best-effort lifecycle notification. Dropped when the consumer lags.
#[derive(Debug, Clone)]
pub struct SagaEvent {
    pub saga_id: SagaId,
    pub step_id: Option<StepId>,
    pub event_type: SagaEventType,
    pub timestamp: DateTime<Utc>,
    pub payload: Option<serde_json::Value>,
}

impl SagaEvent {
    pub fn saga(saga_id: &SagaId, event_type: SagaEventType) -> Self {
        Self {
            saga_id: saga_id.clone(),
            step_id: None,
            event_type,
            timestamp: Utc::now(),
            payload: None,
        }
    }

    pub fn step(saga_id: &SagaId, step_id: &StepId, event_type: SagaEventType) -> Self {
        Self {
            step_id: Some(step_id.clone()),
            ..Self::saga(saga_id, event_type)
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}
