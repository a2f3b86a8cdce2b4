//! Phase 3 output: assembled (province, district, ward) combinations.

use serde::{Deserialize, Serialize};

use super::{AdminLevel, MatchSource, Span};

/// Where an assembled candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSource {
    /// Assembled from locally extracted potentials.
    Local,
    /// Kept alive by the numeric-ward disambiguation band.
    Disambiguation,
    /// Backed only by a street span plus hint-derived admin levels.
    Street,
    /// Resolved by the external geocoder.
    External,
}

/// One resolved level of a candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelMatch {
    /// Normalized canonical name, e.g. "ha noi".
    pub name: String,
    /// Display name per the numeric-prefix rule, e.g. "Hà Nội" / "Quận 8".
    pub display: String,
    pub raw_score: f64,
    pub source: MatchSource,
    /// Token span in the normalized stream; absent for derived levels
    /// (hint-pinned province, geocoder results).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

/// A full (province, district, ward) combination. Any level may be absent;
/// absent levels act as wildcards during hierarchy validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub province: Option<LevelMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<LevelMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ward: Option<LevelMatch>,
    pub source: CandidateSource,
    /// True iff `(province, district, ward)` forms a real triple in the
    /// reference store, absent levels treated as wildcards.
    pub hierarchy_valid: bool,
}

impl Candidate {
    pub fn level(&self, level: AdminLevel) -> Option<&LevelMatch> {
        match level {
            AdminLevel::Province => self.province.as_ref(),
            AdminLevel::District => self.district.as_ref(),
            AdminLevel::Ward => self.ward.as_ref(),
            AdminLevel::Street => None,
        }
    }

    /// Weighted average of per-level raw scores (0.3 / 0.35 / 0.35),
    /// renormalized over the levels actually present. Zero when empty.
    pub fn combined_score(&self) -> f64 {
        const WEIGHTS: [(AdminLevel, f64); 3] = [
            (AdminLevel::Province, 0.30),
            (AdminLevel::District, 0.35),
            (AdminLevel::Ward, 0.35),
        ];
        let mut total = 0.0;
        let mut weight_sum = 0.0;
        for (level, weight) in WEIGHTS {
            if let Some(m) = self.level(level) {
                total += weight * m.raw_score;
                weight_sum += weight;
            }
        }
        if weight_sum > 0.0 {
            total / weight_sum
        } else {
            0.0
        }
    }
}
