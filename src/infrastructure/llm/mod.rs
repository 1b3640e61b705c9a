mod conversation_model_factory;
mod mock_conversation_model;
mod openai_conversation_model;

pub use conversation_model_factory::ConversationModelFactory;
pub use mock_conversation_model::{MockConversation, MockConversationModel};
pub use openai_conversation_model::{DEFAULT_SYSTEM_PROMPT, OpenAiConversationModel};
