//! Fuzzy string scoring for administrative name matching.
//!
//! Two primitives feed the ensemble: a token-sort ratio (order-insensitive,
//! catches "hien pham the" vs "pham the hien") and plain normalized
//! Levenshtein similarity (catches single-character typos and the
//! letter/digit spacing variants).

use crate::config::EnsembleWeights;

/// Normalized Levenshtein similarity in [0, 1].
pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b).clamp(0.0, 1.0)
}

/// Token-sort ratio: sort the whitespace tokens of both strings, rejoin,
/// and take the normalized Levenshtein similarity of the sorted forms.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    levenshtein_similarity(&sort_tokens(a), &sort_tokens(b))
}

/// Weighted ensemble of token-sort ratio and Levenshtein similarity.
pub fn ensemble_score(a: &str, b: &str, weights: &EnsembleWeights) -> f64 {
    weights.token_sort * token_sort_ratio(a, b)
        + weights.levenshtein * levenshtein_similarity(a, b)
}

fn sort_tokens(value: &str) -> String {
    let mut tokens: Vec<&str> = value.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}
