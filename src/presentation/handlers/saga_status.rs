use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::application::saga::{SagaId, StepExecution};
use crate::presentation::state::AppState;

#[derive(Serialize)]
pub struct SagaStatusResponse {
    pub id: String,
    pub definition: String,
    pub state: String,
    pub steps: Vec<StepStatusResponse>,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub error: Option<SagaErrorResponse>,
}

#[derive(Serialize)]
pub struct StepStatusResponse {
    pub id: String,
    pub state: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct SagaErrorResponse {
    pub step_id: String,
    pub kind: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<&StepExecution> for StepStatusResponse {
    fn from(step: &StepExecution) -> Self {
        Self {
            id: step.id.to_string(),
            state: step.state.as_str().to_string(),
            started_at: step.started_at.map(|t| t.to_rfc3339()),
            completed_at: step.completed_at.map(|t| t.to_rfc3339()),
            result: step.result.clone(),
            error: step.error.clone(),
        }
    }
}

#[tracing::instrument(skip(state))]
pub async fn saga_status_handler(
    State(state): State<AppState>,
    Path(saga_id): Path<String>,
) -> impl IntoResponse {
    if saga_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Saga ID must not be empty".to_string(),
            }),
        )
            .into_response();
    }

    match state.saga_manager.get(&SagaId::from_string(saga_id.clone())).await {
        Some(instance) => {
            let response = SagaStatusResponse {
                id: instance.id.to_string(),
                definition: instance.definition,
                state: instance.state.as_str().to_string(),
                steps: instance.steps.iter().map(StepStatusResponse::from).collect(),
                started_at: instance.started_at.to_rfc3339(),
                completed_at: instance.completed_at.map(|t| t.to_rfc3339()),
                error: instance.error.map(|failure| SagaErrorResponse {
                    step_id: failure.step_id.to_string(),
                    kind: failure.kind.as_str().to_string(),
                    message: failure.message,
                }),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Saga not found: {}", saga_id),
            }),
        )
            .into_response(),
    }
}
