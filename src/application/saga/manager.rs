use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{RwLock, mpsc};
use tokio::time::Instant;

use super::{
    SagaDefinition, SagaEvent, SagaEventType, SagaFailure, SagaId, SagaInstance, SagaState,
    StepError, StepExecution, StepState,
};

pub const DEFAULT_EVENT_BUFFER: usize = 100;

pub struct SagaManager<D: Send + 'static> {
    definitions: RwLock<HashMap<String, Arc<SagaDefinition<D>>>>,
    instances: RwLock<HashMap<SagaId, SagaInstance<D>>>,
    events: mpsc::Sender<SagaEvent>,
    event_receiver: Mutex<Option<mpsc::Receiver<SagaEvent>>>,
}

impl<D> SagaManager<D>
where
    D: Clone + Send + Sync + 'static,
{
    pub fn new(event_buffer: usize) -> Self {
        let (events, receiver) = mpsc::channel(event_buffer.max(1));
        Self {
            definitions: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
            events,
            event_receiver: Mutex::new(Some(receiver)),
        }
    }

    pub async fn register_definition(&self, definition: SagaDefinition<D>) {
        let name = definition.name().to_string();
        self.definitions
            .write()
            .await
            .insert(name.clone(), Arc::new(definition));
        tracing::info!(definition = %name, "Saga definition registered");
    }

    /// Hands out the single consumer end of the event stream.
    pub fn take_event_receiver(&self) -> Option<mpsc::Receiver<SagaEvent>> {
        self.event_receiver.lock().ok()?.take()
    }

    /// Creates an instance and runs it on its own task. Returns as soon as
    /// the instance is registered.
    pub async fn start(self: &Arc<Self>, definition: &str, data: D) -> Result<SagaId, SagaError> {
        let definition = self
            .definitions
            .read()
            .await
            .get(definition)
            .cloned()
            .ok_or_else(|| SagaError::DefinitionNotFound(definition.to_string()))?;

        let saga_id = SagaId::generate(definition.name());
        let instance = SagaInstance {
            id: saga_id.clone(),
            definition: definition.name().to_string(),
            state: SagaState::Started,
            data: data.clone(),
            steps: definition
                .steps()
                .iter()
                .map(|step| StepExecution::pending(step.id()))
                .collect(),
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        };

        self.instances
            .write()
            .await
            .insert(saga_id.clone(), instance);
        self.emit(SagaEvent::saga(&saga_id, SagaEventType::SagaStarted));

        tracing::info!(
            saga_id = %saga_id,
            definition = %definition.name(),
            "Saga started"
        );

        let manager = Arc::clone(self);
        let id = saga_id.clone();
        tokio::spawn(async move {
            manager.execute(id, definition, data).await;
        });

        Ok(saga_id)
    }

    pub async fn get(&self, id: &SagaId) -> Option<SagaInstance<D>> {
        self.instances.read().await.get(id).cloned()
    }

    pub async fn instance_count(&self) -> usize {
        self.instances.read().await.len()
    }

    /// Drops terminal instances that finished more than `retention` ago.
    pub async fn prune_finished(&self, retention: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
        else {
            return 0;
        };
        let mut instances = self.instances.write().await;
        let before = instances.len();
        instances.retain(|_, instance| {
            !(instance.state.is_terminal()
                && instance.completed_at.is_some_and(|done| done < cutoff))
        });
        before - instances.len()
    }

    async fn execute(&self, id: SagaId, definition: Arc<SagaDefinition<D>>, mut data: D) {
        self.update(&id, |instance| instance.state = SagaState::Running)
            .await;

        let deadline = Instant::now() + definition.timeout();
        let mut completed: Vec<usize> = Vec::new();
        let mut failure: Option<(usize, StepError)> = None;

        for (index, step) in definition.steps().iter().enumerate() {
            let step_id = step.id();
            self.update(&id, |instance| {
                let execution = &mut instance.steps[index];
                execution.state = StepState::Running;
                execution.started_at = Some(Utc::now());
            })
            .await;
            self.emit(SagaEvent::step(&id, &step_id, SagaEventType::StepStarted));

            let outcome = match tokio::time::timeout_at(deadline, step.execute(&mut data)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(StepError::Timeout(definition.timeout())),
            };

            match outcome {
                Ok(result) => {
                    let snapshot = data.clone();
                    let payload = result.clone();
                    self.update(&id, move |instance| {
                        let execution = &mut instance.steps[index];
                        execution.state = StepState::Completed;
                        execution.completed_at = Some(Utc::now());
                        execution.result = Some(result);
                        instance.data = snapshot;
                    })
                    .await;
                    self.emit(
                        SagaEvent::step(&id, &step_id, SagaEventType::StepCompleted)
                            .with_payload(payload),
                    );
                    tracing::debug!(saga_id = %id, step_id = %step_id, "Step completed");
                    completed.push(index);
                }
                Err(error) => {
                    tracing::error!(
                        saga_id = %id,
                        step_id = %step_id,
                        error = %error,
                        "Step failed"
                    );
                    let snapshot = data.clone();
                    let message = error.to_string();
                    self.update(&id, |instance| {
                        let execution = &mut instance.steps[index];
                        execution.state = StepState::Failed;
                        execution.completed_at = Some(Utc::now());
                        execution.error = Some(message.clone());
                        instance.data = snapshot;
                    })
                    .await;
                    self.emit(
                        SagaEvent::step(&id, &step_id, SagaEventType::StepFailed)
                            .with_payload(serde_json::Value::String(message)),
                    );
                    failure = Some((index, error));
                    break;
                }
            }
        }

        match failure {
            None => self.complete(&id, data).await,
            Some((index, error)) => {
                let failure = SagaFailure {
                    step_id: definition.steps()[index].id(),
                    kind: error.kind(),
                    message: error.to_string(),
                };
                self.update(&id, |instance| {
                    instance.state = SagaState::Failed;
                    instance.error = Some(failure);
                })
                .await;
                self.emit(SagaEvent::saga(&id, SagaEventType::SagaFailed));
                self.compensate(&id, &definition, &completed, data).await;
            }
        }
    }

    /// Every completed step gets exactly one compensation attempt, last
    /// completed first. A failing compensation leaves its step `Completed`.
    async fn compensate(
        &self,
        id: &SagaId,
        definition: &SagaDefinition<D>,
        completed: &[usize],
        mut data: D,
    ) {
        tracing::info!(saga_id = %id, steps = completed.len(), "Starting compensation");

        for &index in completed.iter().rev() {
            let step = &definition.steps()[index];
            let step_id = step.id();

            match step.compensate(&mut data).await {
                Ok(()) => {
                    self.update(id, |instance| {
                        instance.steps[index].state = StepState::Compensated;
                    })
                    .await;
                    self.emit(SagaEvent::step(id, &step_id, SagaEventType::StepCompensated));
                }
                Err(error) => {
                    tracing::error!(
                        saga_id = %id,
                        step_id = %step_id,
                        error = %error,
                        "Compensation failed"
                    );
                }
            }
        }

        self.update(id, move |instance| {
            instance.state = SagaState::Compensated;
            instance.completed_at = Some(Utc::now());
            instance.data = data;
        })
        .await;
        self.emit(SagaEvent::saga(id, SagaEventType::SagaCompensated));
        tracing::info!(saga_id = %id, "Saga compensated");
    }

    async fn complete(&self, id: &SagaId, data: D) {
        self.update(id, move |instance| {
            instance.state = SagaState::Completed;
            instance.completed_at = Some(Utc::now());
            instance.data = data;
        })
        .await;
        self.emit(SagaEvent::saga(id, SagaEventType::SagaCompleted));
        tracing::info!(saga_id = %id, "Saga completed");
    }

    async fn update<F>(&self, id: &SagaId, apply: F)
    where
        F: FnOnce(&mut SagaInstance<D>),
    {
        if let Some(instance) = self.instances.write().await.get_mut(id) {
            apply(instance);
        }
    }

    fn emit(&self, event: SagaEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(
                    saga_id = %event.saga_id,
                    event_type = event.event_type.as_str(),
                    "Saga event buffer full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SagaError {
    #[error("saga definition not found: {0}")]
    DefinitionNotFound(String),
}
