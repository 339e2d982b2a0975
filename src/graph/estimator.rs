//! How many triples to ask for.

use crate::config::KnowledgeGraphSettings;

/// Rough characters-per-token ratio used for sizing.
pub const CHARS_PER_TOKEN: usize = 4;

/// Approximate token count of `text`, never below 1.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN).max(1)
}

/// Target triple count for `text`: `triples_per_k_tokens` per thousand
/// estimated tokens, clamped into `[min_triples, max_triples]`.
///
/// Monotonic in text length for fixed settings.
pub fn compute_target_triples(text: &str, settings: &KnowledgeGraphSettings) -> usize {
    let per_k = settings.triples_per_k_tokens.max(1);
    let target = (estimate_tokens(text) * per_k).div_ceil(1000);
    target.min(settings.max_triples).max(settings.min_triples)
}
