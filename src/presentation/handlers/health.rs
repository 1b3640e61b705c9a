use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::presentation::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub connected_devices: usize,
}

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.hub.connected_count().await {
        Ok(connected_devices) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                connected_devices,
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded".to_string(),
                    connected_devices: 0,
                }),
            )
        }
    }
}
