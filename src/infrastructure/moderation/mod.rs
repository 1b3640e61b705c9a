mod keyword_content_moderator;

pub use keyword_content_moderator::KeywordContentModerator;
