//! Phase 5 output: the single result record returned for every request.

use serde::{Deserialize, Serialize};

/// Overall match quality classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Fuzzy,
    Fallback,
    External,
    None,
}

/// Coarse usefulness flag derived from which levels resolved and the
/// final confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    FullAddress,
    PartialAddress,
    ProvinceOnly,
    Failed,
}

/// Wall-clock milliseconds spent in each phase.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PhaseTimings {
    pub preprocess_ms: f64,
    pub extract_ms: f64,
    pub assemble_ms: f64,
    pub rank_ms: f64,
    pub postprocess_ms: f64,
    pub total_ms: f64,
}

/// The pipeline's answer for one input address.
///
/// Every failure mode surfaces here as populated fields; `resolve` never
/// returns an error to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    /// Chosen display names; absent where no confident match exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ward: Option<String>,
    pub confidence: f64,
    pub match_type: MatchType,
    pub quality_flag: QualityFlag,
    /// Residual of the original input after removing matched spans.
    pub remaining_text: String,
    pub timings: PhaseTimings,
}

impl MatchResult {
    /// The well-formed "nothing matched" record used for empty input and
    /// reference-store failures.
    pub fn failed(remaining_text: String) -> Self {
        Self {
            province: None,
            district: None,
            ward: None,
            confidence: 0.0,
            match_type: MatchType::None,
            quality_flag: QualityFlag::Failed,
            remaining_text,
            timings: PhaseTimings::default(),
        }
    }
}
