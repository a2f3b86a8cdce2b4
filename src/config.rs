//! Matcher configuration.
//!
//! Every tuning knob recognized by the pipeline lives here with its default;
//! a TOML file can override any subset of fields.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::models::AdminLevel;

/// Relative weights of the two ensemble components. Should sum to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EnsembleWeights {
    pub token_sort: f64,
    pub levenshtein: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            token_sort: 0.65,
            levenshtein: 0.35,
        }
    }
}

/// Candidate breadth per level for Phase 3 assembly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TopKPerLevel {
    pub province: usize,
    pub district: usize,
    pub ward: usize,
}

impl Default for TopKPerLevel {
    fn default() -> Self {
        Self {
            province: 3,
            district: 3,
            ward: 5,
        }
    }
}

/// Pipeline configuration with the documented defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Minimum adjusted Phase 2 score for a province potential.
    pub fuzzy_threshold_province: f64,
    /// Minimum adjusted Phase 2 score for a district potential.
    pub fuzzy_threshold_district: f64,
    /// Minimum adjusted Phase 2 score for a ward potential.
    pub fuzzy_threshold_ward: f64,
    pub ensemble_weights: EnsembleWeights,
    /// Multiplier for a 1-2 digit numeric n-gram preceded by an admin keyword.
    pub numeric_keyword_bonus: f64,
    /// Multiplier for a 1-2 digit numeric n-gram with no preceding keyword.
    pub numeric_no_keyword_penalty: f64,
    /// Combined local confidence below which the external geocoder is consulted.
    pub external_threshold: f64,
    /// Hard timeout for the external geocoder call.
    pub external_timeout_ms: u64,
    pub top_k_per_level: TopKPerLevel,
    /// Score band within which a numeric ward keeps its non-numeric twin alive.
    pub disambiguation_band: f64,
    /// Phase 1 normalization LRU size.
    pub preprocess_cache_size: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold_province: 0.88,
            fuzzy_threshold_district: 0.85,
            fuzzy_threshold_ward: 0.80,
            ensemble_weights: EnsembleWeights::default(),
            numeric_keyword_bonus: 1.2,
            numeric_no_keyword_penalty: 0.7,
            external_threshold: 0.7,
            external_timeout_ms: 2000,
            top_k_per_level: TopKPerLevel::default(),
            disambiguation_band: 0.05,
            preprocess_cache_size: 10_000,
        }
    }
}

impl MatcherConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: MatcherConfig = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Phase 2 retention threshold for an administrative level.
    pub fn threshold_for(&self, level: AdminLevel) -> f64 {
        match level {
            AdminLevel::Province => self.fuzzy_threshold_province,
            AdminLevel::District => self.fuzzy_threshold_district,
            AdminLevel::Ward => self.fuzzy_threshold_ward,
            AdminLevel::Street => 0.0,
        }
    }

    pub fn top_k_for(&self, level: AdminLevel) -> usize {
        match level {
            AdminLevel::Province => self.top_k_per_level.province,
            AdminLevel::District => self.top_k_per_level.district,
            AdminLevel::Ward => self.top_k_per_level.ward,
            AdminLevel::Street => 1,
        }
    }
}
