//! The five-phase matching pipeline.
//!
//! `AddressMatcher` owns the process-wide read handles (reference store,
//! configuration, optional geocoder) and exposes a single synchronous
//! `resolve` entry point. All per-request state lives on the stack of that
//! call; concurrent requests share nothing but the immutable store and the
//! normalization cache.

pub mod assemble;
pub mod extract;
pub mod postprocess;
pub mod preprocess;
pub mod rank;

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::MatcherConfig;
use crate::geocoder::ExternalGeocoder;
use crate::models::{AdminLevel, MatchResult, PhaseTimings};
use crate::store::ReferenceStore;
use crate::text;

use preprocess::Preprocessed;

/// Caller-supplied context. Hints only scope the search; they are never
/// corrected and never override an extracted match.
#[derive(Debug, Clone, Default)]
pub struct Hints {
    pub province: Option<String>,
    pub district: Option<String>,
}

impl Hints {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn province(name: &str) -> Self {
        Self {
            province: Some(name.to_string()),
            district: None,
        }
    }
}

type PreprocessKey = (String, Option<String>, Option<String>);

/// The pipeline entry point. Construct once at startup, share freely.
pub struct AddressMatcher {
    store: Arc<ReferenceStore>,
    config: MatcherConfig,
    geocoder: Option<Box<dyn ExternalGeocoder>>,
    preprocess_cache: Mutex<LruCache<PreprocessKey, Arc<Preprocessed>>>,
}

impl AddressMatcher {
    pub fn new(store: Arc<ReferenceStore>, config: MatcherConfig) -> Self {
        let cache_size = NonZeroUsize::new(config.preprocess_cache_size.max(1)).unwrap();
        Self {
            store,
            config,
            geocoder: None,
            preprocess_cache: Mutex::new(LruCache::new(cache_size)),
        }
    }

    pub fn with_geocoder(mut self, geocoder: Box<dyn ExternalGeocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn store(&self) -> &ReferenceStore {
        &self.store
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Normalize a hint and resolve it to a canonical store name where
    /// possible; an unknown hint is kept in normalized form (it will simply
    /// scope the search down to nothing, which is the documented behavior
    /// for a wrong hint).
    fn canonical_hint(&self, level: AdminLevel, hint: Option<&str>) -> Option<String> {
        let normalized = text::normalize_admin_name(hint?);
        if normalized.is_empty() {
            return None;
        }
        Some(
            self.store
                .canonical_name(level, &normalized)
                .map(str::to_string)
                .unwrap_or(normalized),
        )
    }

    fn preprocess_cached(
        &self,
        raw: &str,
        province_hint: Option<&str>,
        district_hint: Option<&str>,
    ) -> Arc<Preprocessed> {
        let key = (
            raw.to_string(),
            province_hint.map(str::to_string),
            district_hint.map(str::to_string),
        );
        if let Some(cached) = self.preprocess_cache.lock().get(&key) {
            return Arc::clone(cached);
        }
        let pre = Arc::new(preprocess::preprocess(
            raw,
            province_hint,
            district_hint,
            &self.store,
        ));
        self.preprocess_cache.lock().put(key, Arc::clone(&pre));
        pre
    }

    /// Resolve one address. Never returns an error: every failure mode
    /// surfaces as a well-formed result record.
    pub fn resolve(&self, raw: &str, hints: &Hints) -> MatchResult {
        let total_start = Instant::now();

        if raw.trim().is_empty() {
            return MatchResult::failed(String::new());
        }

        let province_hint = self.canonical_hint(AdminLevel::Province, hints.province.as_deref());
        let district_hint = self.canonical_hint(AdminLevel::District, hints.district.as_deref());
        let province_hint = province_hint.as_deref();
        let district_hint = district_hint.as_deref();

        let mut timings = PhaseTimings::default();

        let phase_start = Instant::now();
        let pre = self.preprocess_cached(raw, province_hint, district_hint);
        timings.preprocess_ms = phase_start.elapsed().as_secs_f64() * 1000.0;

        let phase_start = Instant::now();
        let lists =
            extract::extract_potentials(&self.store, &self.config, &pre, province_hint, district_hint);
        timings.extract_ms = phase_start.elapsed().as_secs_f64() * 1000.0;

        let phase_start = Instant::now();
        let candidates = assemble::assemble_candidates(
            &self.store,
            &self.config,
            &lists,
            province_hint,
            district_hint,
            self.geocoder.as_deref(),
            raw,
        );
        timings.assemble_ms = phase_start.elapsed().as_secs_f64() * 1000.0;

        let phase_start = Instant::now();
        let ranked = rank::rank_candidates(candidates, province_hint, district_hint);
        let chosen = rank::choose(ranked);
        timings.rank_ms = phase_start.elapsed().as_secs_f64() * 1000.0;

        let phase_start = Instant::now();
        let mut result = postprocess::postprocess(&self.store, &pre, chosen, timings);
        result.timings.postprocess_ms = phase_start.elapsed().as_secs_f64() * 1000.0;
        result.timings.total_ms = total_start.elapsed().as_secs_f64() * 1000.0;

        debug!(
            confidence = result.confidence,
            match_type = ?result.match_type,
            quality = ?result.quality_flag,
            total_ms = result.timings.total_ms,
            "Resolved address"
        );
        result
    }
}
