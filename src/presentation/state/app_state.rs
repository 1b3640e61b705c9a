use std::sync::Arc;

use crate::application::realtime::{ConnectionServices, Hub};
use crate::application::saga::SagaManager;
use crate::application::services::ConversationRequest;
use crate::presentation::config::WebSocketSettings;

#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub saga_manager: Arc<SagaManager<ConversationRequest>>,
    pub connection_services: ConnectionServices,
    pub websocket: WebSocketSettings,
}
