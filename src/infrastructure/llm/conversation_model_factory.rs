use std::sync::Arc;

use crate::application::ports::{ConversationError, ConversationModel};
use crate::presentation::config::{ProviderKind, ProvidersSettings};

use super::{MockConversationModel, OpenAiConversationModel};

pub struct ConversationModelFactory;

impl ConversationModelFactory {
    pub fn create(
        settings: &ProvidersSettings,
    ) -> Result<Arc<dyn ConversationModel>, ConversationError> {
        match settings.kind {
            ProviderKind::Mock => Ok(Arc::new(MockConversationModel)),
            ProviderKind::OpenAi => {
                if settings.api_key.trim().is_empty() {
                    return Err(ConversationError::ApiRequestFailed(
                        "providers.api_key is required for the openai provider".to_string(),
                    ));
                }
                Ok(Arc::new(OpenAiConversationModel::new(settings)?))
            }
        }
    }
}
