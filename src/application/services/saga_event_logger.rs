use tokio::sync::mpsc;

use crate::application::saga::{SagaEvent, SagaEventType};

/// Drains the orchestrator's event stream into the log until the manager
/// is dropped.
pub async fn log_saga_events(mut receiver: mpsc::Receiver<SagaEvent>) {
    while let Some(event) = receiver.recv().await {
        let saga_id = event.saga_id.as_str();
        let step_id = event.step_id.as_ref().map(|s| s.as_str()).unwrap_or("");
        let payload = event
            .payload
            .as_ref()
            .map(|p| p.to_string())
            .unwrap_or_default();

        match event.event_type {
            SagaEventType::SagaStarted | SagaEventType::SagaCompleted => {
                tracing::info!(saga_id, event_type = event.event_type.as_str(), "Saga event");
            }
            SagaEventType::SagaFailed | SagaEventType::StepFailed => {
                tracing::warn!(
                    saga_id,
                    step_id,
                    payload = %payload,
                    event_type = event.event_type.as_str(),
                    "Saga event"
                );
            }
            SagaEventType::SagaCompensated | SagaEventType::StepCompensated => {
                tracing::warn!(
                    saga_id,
                    step_id,
                    event_type = event.event_type.as_str(),
                    "Saga event"
                );
            }
            SagaEventType::StepStarted | SagaEventType::StepCompleted => {
                tracing::debug!(
                    saga_id,
                    step_id,
                    event_type = event.event_type.as_str(),
                    "Saga event"
                );
            }
        }
    }
    tracing::info!("Saga event logger stopped: channel closed");
}
