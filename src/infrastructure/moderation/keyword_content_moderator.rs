use async_trait::async_trait;

use crate::application::ports::{ContentModerator, ModerationError};

/// Flags text containing any blocked term as a whole word, ignoring case.
pub struct KeywordContentModerator {
    blocked_terms: Vec<String>,
}

impl KeywordContentModerator {
    pub fn new<I, S>(blocked_terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            blocked_terms: blocked_terms
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    fn contains_blocked_term(&self, text: &str) -> Option<&str> {
        let normalized = text.to_lowercase();
        let words: Vec<&str> = normalized
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        self.blocked_terms
            .iter()
            .find(|term| {
                let term_words: Vec<&str> = term.split_whitespace().collect();
                !term_words.is_empty()
                    && words
                        .windows(term_words.len())
                        .any(|window| window == term_words.as_slice())
            })
            .map(String::as_str)
    }
}

#[async_trait]
impl ContentModerator for KeywordContentModerator {
    async fn is_safe(&self, text: &str) -> Result<bool, ModerationError> {
        match self.contains_blocked_term(text) {
            Some(term) => {
                tracing::info!(term, "Blocked term found in content");
                Ok(false)
            }
            None => Ok(true),
        }
    }
}
