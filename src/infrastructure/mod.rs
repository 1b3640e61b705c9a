pub mod audio;
pub mod llm;
pub mod moderation;
pub mod observability;
pub mod persistence;
