//! Sequential step orchestrator with reverse compensation.
//!
//! A [`SagaDefinition`] is a named, ordered list of [`Step`]s plus a deadline.
//! [`SagaManager::start`] returns immediately and runs the steps on their own
//! task; [`SagaManager::get`] exposes a snapshot that callers poll until the
//! instance reaches [`SagaState::Completed`] or [`SagaState::Compensated`].

mod definition;
mod event;
mod manager;
mod types;

pub use definition::{SagaDefinition, Step, StepError, StepOutcome};
pub use event::{SagaEvent, SagaEventType};
pub use manager::{DEFAULT_EVENT_BUFFER, SagaError, SagaManager};
pub use types::{FailureKind, SagaFailure, SagaId, SagaInstance, SagaState, StepExecution, StepId, StepState};
