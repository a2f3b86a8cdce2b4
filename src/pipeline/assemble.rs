//! Phase 3 - candidate assembly.
//!
//! Combines the ranked potential lists into full (province, district, ward)
//! candidates: top-K cartesian product pruned by hierarchy validation,
//! display-name attachment, numeric-ward disambiguation, optional rewrite
//! of legacy names through the migration map, and the external geocoder
//! fallback when local confidence is low.

use tracing::{debug, warn};

use crate::config::MatcherConfig;
use crate::geocoder::ExternalGeocoder;
use crate::models::{
    AdminLevel, Candidate, CandidateSource, LevelMatch, MatchSource, Potential,
};
use crate::store::ReferenceStore;
use crate::text;

use super::extract::PotentialLists;

fn level_match(store: &ReferenceStore, level: AdminLevel, potential: &Potential) -> LevelMatch {
    let display = store
        .level_entry(level, &potential.canonical_name)
        .map(|name| name.display().to_string())
        .unwrap_or_else(|| potential.canonical_name.clone());
    LevelMatch {
        name: potential.canonical_name.clone(),
        display,
        raw_score: potential.raw_score.min(1.0),
        source: potential.source,
        span: Some(potential.span),
    }
}

fn derived_match(store: &ReferenceStore, level: AdminLevel, name: &str, score: f64) -> LevelMatch {
    let display = store
        .level_entry(level, name)
        .map(|n| n.display().to_string())
        .unwrap_or_else(|| name.to_string());
    LevelMatch {
        name: name.to_string(),
        display,
        raw_score: score,
        source: MatchSource::Exact,
        span: None,
    }
}

/// The ward pool is the top-K list plus any ward beyond K whose score lies
/// within the disambiguation band of a numeric ward already in the pool;
/// the Phase 4 ranker decides between them.
fn ward_pool(config: &MatcherConfig, wards: &[Potential]) -> Vec<(Potential, bool)> {
    let k = config.top_k_for(AdminLevel::Ward);
    let mut pool: Vec<(Potential, bool)> = wards.iter().take(k).cloned().map(|p| (p, false)).collect();

    let numeric_scores: Vec<f64> = pool
        .iter()
        .filter(|(p, _)| text::is_numeric_token(&p.canonical_name))
        .map(|(p, _)| p.adjusted_score)
        .collect();
    if numeric_scores.is_empty() {
        return pool;
    }

    for extra in wards.iter().skip(k) {
        let within_band = numeric_scores
            .iter()
            .any(|score| (score - extra.adjusted_score).abs() <= config.disambiguation_band);
        if within_band {
            pool.push((extra.clone(), true));
        }
    }
    pool
}

/// Fill in levels the combination left absent when the evidence pins them:
/// the caller's province hint, or a unique row set consistent with the
/// chosen inner levels.
fn derive_missing_levels(
    store: &ReferenceStore,
    candidate: &mut Candidate,
    province_hint: Option<&str>,
    district_hint: Option<&str>,
) {
    let ward_name = candidate.ward.as_ref().map(|w| w.name.clone());
    let district_name = candidate.district.as_ref().map(|d| d.name.clone());
    let evidence_score = candidate
        .ward
        .as_ref()
        .or(candidate.district.as_ref())
        .map_or(1.0, |m| m.raw_score);

    if candidate.province.is_none() {
        if let Some(hint) = province_hint {
            if let Some(canonical) = store.canonical_name(AdminLevel::Province, hint) {
                let canonical = canonical.to_string();
                candidate.province =
                    Some(derived_match(store, AdminLevel::Province, &canonical, 1.0));
            }
        }
    }
    if candidate.province.is_none() && (district_name.is_some() || ward_name.is_some()) {
        let mut provinces: Vec<&str> = store
            .candidates_in_scope(None, district_name.as_deref())
            .filter(|row| match &ward_name {
                Some(w) => &row.ward.name_normalized == w,
                None => true,
            })
            .map(|row| row.province.name_normalized.as_str())
            .collect();
        provinces.sort_unstable();
        provinces.dedup();
        if let [unique] = provinces.as_slice() {
            let unique = unique.to_string();
            candidate.province = Some(derived_match(
                store,
                AdminLevel::Province,
                &unique,
                evidence_score,
            ));
        }
    }

    if candidate.district.is_none() {
        if let Some(hint) = district_hint {
            let province = candidate.province.as_ref().map(|p| p.name.clone());
            if let Some(canonical) = store.canonical_name(AdminLevel::District, hint) {
                let canonical = canonical.to_string();
                if store.validate_triple(
                    province.as_deref(),
                    Some(&canonical),
                    ward_name.as_deref(),
                ) {
                    candidate.district =
                        Some(derived_match(store, AdminLevel::District, &canonical, 1.0));
                }
            }
        }
    }
    if candidate.district.is_none() {
        if let (Some(w), province) = (
            ward_name.as_deref(),
            candidate.province.as_ref().map(|p| p.name.clone()),
        ) {
            let mut districts: Vec<&str> = store
                .candidates_in_scope(province.as_deref(), None)
                .filter(|row| row.ward.name_normalized == w)
                .map(|row| row.district.name_normalized.as_str())
                .collect();
            districts.sort_unstable();
            districts.dedup();
            if let [unique] = districts.as_slice() {
                let unique = unique.to_string();
                candidate.district = Some(derived_match(
                    store,
                    AdminLevel::District,
                    &unique,
                    evidence_score,
                ));
            }
        }
    }
}

/// Rewrite a legacy triple through the migration map when the combination
/// is not directly valid, then refresh display names from the store.
fn apply_migration(store: &ReferenceStore, candidate: &mut Candidate) {
    let Some(province) = candidate.province.as_ref().map(|p| p.name.clone()) else {
        return;
    };
    let district = candidate.district.as_ref().map(|d| d.name.clone());
    let ward = candidate.ward.as_ref().map(|w| w.name.clone());

    let Some(migration) = store.migrate_triple(&province, district.as_deref(), ward.as_deref())
    else {
        return;
    };

    let new_province = migration.new_province.clone();
    let new_district = migration.new_district.clone();
    let new_ward = migration.new_ward.clone();

    if let Some(p) = candidate.province.as_mut() {
        p.display = store
            .level_entry(AdminLevel::Province, &new_province)
            .map(|n| n.display().to_string())
            .unwrap_or_else(|| new_province.clone());
        p.name = new_province;
    }
    if let (Some(d), Some(new_name)) = (candidate.district.as_mut(), new_district) {
        d.display = store
            .level_entry(AdminLevel::District, &new_name)
            .map(|n| n.display().to_string())
            .unwrap_or_else(|| new_name.clone());
        d.name = new_name;
    }
    if let (Some(w), Some(new_name)) = (candidate.ward.as_mut(), new_ward) {
        w.display = store
            .level_entry(AdminLevel::Ward, &new_name)
            .map(|n| n.display().to_string())
            .unwrap_or_else(|| new_name.clone());
        w.name = new_name;
    }
}

fn validate(store: &ReferenceStore, candidate: &Candidate) -> bool {
    store.validate_triple(
        candidate.province.as_ref().map(|m| m.name.as_str()),
        candidate.district.as_ref().map(|m| m.name.as_str()),
        candidate.ward.as_ref().map(|m| m.name.as_str()),
    )
}

/// Run Phase 3.
#[allow(clippy::too_many_arguments)]
pub fn assemble_candidates(
    store: &ReferenceStore,
    config: &MatcherConfig,
    lists: &PotentialLists,
    province_hint: Option<&str>,
    district_hint: Option<&str>,
    geocoder: Option<&dyn ExternalGeocoder>,
    raw: &str,
) -> Vec<Candidate> {
    let provinces: Vec<Option<&Potential>> = pool_options(
        &lists.provinces,
        config.top_k_for(AdminLevel::Province),
    );
    let districts: Vec<Option<&Potential>> = pool_options(
        &lists.districts,
        config.top_k_for(AdminLevel::District),
    );
    let wards = ward_pool(config, &lists.wards);
    let mut ward_options: Vec<Option<(&Potential, bool)>> =
        wards.iter().map(|(p, d)| Some((p, *d))).collect();
    ward_options.push(None);

    let mut valid_candidates = Vec::new();
    let mut invalid_candidates = Vec::new();

    for province in &provinces {
        for district in &districts {
            for ward in &ward_options {
                if province.is_none() && district.is_none() && ward.is_none() {
                    continue;
                }
                let mut candidate = Candidate {
                    province: province.map(|p| level_match(store, AdminLevel::Province, p)),
                    district: district.map(|d| level_match(store, AdminLevel::District, d)),
                    ward: ward.map(|(w, _)| level_match(store, AdminLevel::Ward, w)),
                    source: match ward {
                        Some((_, true)) => CandidateSource::Disambiguation,
                        _ => CandidateSource::Local,
                    },
                    hierarchy_valid: false,
                };

                derive_missing_levels(store, &mut candidate, province_hint, district_hint);

                candidate.hierarchy_valid = validate(store, &candidate);
                if !candidate.hierarchy_valid {
                    apply_migration(store, &mut candidate);
                    candidate.hierarchy_valid = validate(store, &candidate);
                }

                if candidate.hierarchy_valid {
                    valid_candidates.push(candidate);
                } else {
                    invalid_candidates.push(candidate);
                }
            }
        }
    }

    // Invalid hierarchies are pruned while any valid combination exists;
    // otherwise the best of them is kept for diagnostics (Phase 4 applies
    // the penalty and will never prefer it over a valid candidate).
    let mut candidates = if valid_candidates.is_empty() {
        invalid_candidates.sort_by(|a, b| b.combined_score().total_cmp(&a.combined_score()));
        invalid_candidates.truncate(3);
        invalid_candidates
    } else {
        valid_candidates
    };

    // Street fallback: nothing matched locally but the caller pinned the
    // province and the input still carries street-like text.
    if candidates.is_empty() && !lists.streets.is_empty() {
        if let Some(hint) = province_hint {
            if let Some(canonical) = store.canonical_name(AdminLevel::Province, hint) {
                let canonical = canonical.to_string();
                candidates.push(Candidate {
                    province: Some(derived_match(store, AdminLevel::Province, &canonical, 1.0)),
                    district: None,
                    ward: None,
                    source: CandidateSource::Street,
                    hierarchy_valid: true,
                });
            }
        }
    }

    // External geocoder: consulted once when the best local candidate is
    // not confident enough. Failures are logged and skipped.
    if let Some(geocoder) = geocoder {
        let best_local = candidates
            .iter()
            .map(Candidate::combined_score)
            .fold(0.0_f64, f64::max);
        if best_local < config.external_threshold {
            match geocoder.resolve(raw) {
                Ok(Some(resolved)) => {
                    let candidate = external_candidate(store, &resolved);
                    debug!(
                        province = candidate
                            .province
                            .as_ref()
                            .map_or("-", |p| p.name.as_str()),
                        "External geocoder produced a candidate"
                    );
                    candidates.push(candidate);
                }
                Ok(None) => {}
                Err(err) => warn!("External geocoder failed: {err:#}"),
            }
        }
    }

    candidates
}

fn pool_options(list: &[Potential], k: usize) -> Vec<Option<&Potential>> {
    let mut options: Vec<Option<&Potential>> = list.iter().take(k).map(Some).collect();
    options.push(None);
    options
}

fn external_candidate(
    store: &ReferenceStore,
    resolved: &crate::geocoder::GeocodedAddress,
) -> Candidate {
    let make = |level: AdminLevel, value: &str| {
        let normalized = text::normalize_admin_name(value);
        let name = store
            .canonical_name(level, &normalized)
            .map(str::to_string)
            .unwrap_or(normalized);
        derived_match(store, level, &name, 1.0)
    };

    let mut candidate = Candidate {
        province: Some(make(AdminLevel::Province, &resolved.province)),
        district: resolved
            .district
            .as_deref()
            .map(|d| make(AdminLevel::District, d)),
        ward: resolved.ward.as_deref().map(|w| make(AdminLevel::Ward, w)),
        source: CandidateSource::External,
        hierarchy_valid: false,
    };
    candidate.hierarchy_valid = validate(store, &candidate);

    // A provider triple the store cannot confirm is degraded inner-level
    // first; a resolved ward must never survive without a real triple
    // behind it.
    if !candidate.hierarchy_valid && candidate.ward.is_some() {
        candidate.ward = None;
        candidate.hierarchy_valid = validate(store, &candidate);
    }
    if !candidate.hierarchy_valid && candidate.district.is_some() {
        candidate.district = None;
        candidate.hierarchy_valid = validate(store, &candidate);
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AdminName, AdminRow, Span};
    use crate::pipeline::extract::extract_potentials;
    use crate::pipeline::preprocess::Preprocessed;

    fn store() -> ReferenceStore {
        let rows = vec![
            AdminRow::new(
                AdminName::new("Thành phố", "Hà Nội"),
                AdminName::new("Quận", "Ba Đình"),
                AdminName::new("Phường", "Điện Biên"),
            ),
            AdminRow::new(
                AdminName::new("Thành phố", "Hà Nội"),
                AdminName::new("Quận", "Bắc Từ Liêm"),
                AdminName::new("Phường", "Cổ Nhuế 1"),
            ),
            AdminRow::new(
                AdminName::new("Thành phố", "Hồ Chí Minh"),
                AdminName::new("Quận", "8"),
                AdminName::new("Phường", "4"),
            ),
        ];
        ReferenceStore::from_parts(rows, Vec::new(), Vec::new())
    }

    fn pre(tokens: &str) -> Preprocessed {
        let tokens: Vec<String> = tokens.split_whitespace().map(String::from).collect();
        Preprocessed {
            origins: (0..tokens.len()).collect(),
            raw_tokens: tokens.clone(),
            tokens,
        }
    }

    fn assemble(input: &str, province_hint: Option<&str>) -> Vec<Candidate> {
        let store = store();
        let config = MatcherConfig::default();
        let pre = pre(input);
        let lists = extract_potentials(&store, &config, &pre, province_hint, None);
        assemble_candidates(&store, &config, &lists, province_hint, None, None, input)
    }

    #[test]
    fn test_invalid_combinations_pruned() {
        // "dien bien" belongs to Ba Dinh; a combination with Bac Tu Liem
        // must not survive while the valid one exists.
        let candidates = assemble("phuong dien bien quan ba dinh ha noi", None);
        assert!(!candidates.is_empty());
        assert!(candidates.iter().all(|c| c.hierarchy_valid));
    }

    #[test]
    fn test_display_names_attached() {
        let candidates = assemble("phuong 4 quan 8", Some("ho chi minh"));
        let full = candidates
            .iter()
            .find(|c| c.ward.is_some() && c.district.is_some())
            .unwrap();
        assert_eq!(full.ward.as_ref().unwrap().display, "Phường 4");
        assert_eq!(full.district.as_ref().unwrap().display, "Quận 8");
    }

    #[test]
    fn test_province_derived_from_hint() {
        let candidates = assemble("phuong 4 quan 8", Some("ho chi minh"));
        let best = candidates
            .iter()
            .find(|c| c.ward.is_some() && c.district.is_some())
            .unwrap();
        let province = best.province.as_ref().unwrap();
        assert_eq!(province.name, "ho chi minh");
        assert!(province.span.is_none());
    }

    #[test]
    fn test_province_and_district_derived_from_unique_ward() {
        let candidates = assemble("co nhue 1", None);
        let best = candidates.iter().find(|c| c.ward.is_some()).unwrap();
        assert_eq!(best.province.as_ref().unwrap().name, "ha noi");
        assert_eq!(best.district.as_ref().unwrap().name, "bac tu liem");
        assert!(best.hierarchy_valid);
    }

    #[test]
    fn test_external_candidate_validated() {
        let store = store();
        let resolved = crate::geocoder::GeocodedAddress {
            province: "Hà Nội".into(),
            district: Some("Ba Đình".into()),
            ward: Some("Điện Biên".into()),
        };
        let candidate = external_candidate(&store, &resolved);
        assert!(candidate.hierarchy_valid);
        assert_eq!(candidate.source, CandidateSource::External);
        assert_eq!(candidate.province.as_ref().unwrap().name, "ha noi");
    }

    #[test]
    fn test_ward_span_carried_for_residual() {
        let candidates = assemble("phuong dien bien quan ba dinh ha noi", None);
        let best = candidates.iter().find(|c| c.ward.is_some()).unwrap();
        assert_eq!(best.ward.as_ref().unwrap().span, Some(Span::new(0, 3)));
    }
}
