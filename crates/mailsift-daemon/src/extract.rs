//! Fallback address extraction for text captures over IPC.
//!
//! The page scraper normally submits already-extracted addresses; this
//! token scan only backs the `text` form of `capture.record`.

use mailsift_sync::EmailExtractor;

pub struct TokenExtractor;

impl EmailExtractor for TokenExtractor {
    fn extract(&self, text: &str) -> Vec<String> {
        text.split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '<' | '>' | '(' | ')'))
            .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric() && c != '@'))
            .filter(|token| {
                token
                    .split_once('@')
                    .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
                    .unwrap_or(false)
            })
            .map(|token| token.to_string())
            .collect()
    }
}
