//! Phase 4 - validation and ranking.
//!
//! Scores every assembled candidate with the ensemble confidence formula,
//! penalizes invalid hierarchies, and picks the best match. A top candidate
//! below the confidence floor demotes the whole request to `none`.

use crate::models::{AdminLevel, Candidate, MatchSource, MatchType};

/// Confidence floor below which the request reports no match.
const LOW_CONFIDENCE: f64 = 0.4;
/// Per-level score below which a cleared request drops the level entirely.
const LEVEL_CLEAR_THRESHOLD: f64 = 0.5;

const GEO_CONTEXT_BONUS: f64 = 1.1;
const INVALID_HIERARCHY_PENALTY: f64 = 0.8;

/// A candidate with its Phase 4 scoring attached.
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    pub match_type: MatchType,
    pub confidence: f64,
    pub at_rule_score: f64,
    pub geo_multiplier: f64,
}

fn match_type_of(candidate: &Candidate) -> MatchType {
    match candidate.source {
        crate::models::CandidateSource::External => MatchType::External,
        crate::models::CandidateSource::Street => MatchType::Fallback,
        _ => {
            let all_exact = AdminLevel::admin_levels().iter().all(|level| {
                candidate
                    .level(*level)
                    .is_none_or(|m| matches!(m.source, MatchSource::Exact | MatchSource::Abbrev))
            });
            if all_exact {
                MatchType::Exact
            } else {
                MatchType::Fuzzy
            }
        }
    }
}

fn match_type_score(match_type: MatchType) -> f64 {
    match match_type {
        MatchType::Exact => 50.0,
        MatchType::Fuzzy => 30.0,
        MatchType::External => 25.0,
        MatchType::Fallback => 20.0,
        MatchType::None => 0.0,
    }
}

fn match_type_priority(match_type: MatchType) -> u8 {
    match match_type {
        MatchType::Exact => 1,
        MatchType::Fuzzy => 2,
        MatchType::External => 3,
        MatchType::Fallback => 4,
        MatchType::None => 5,
    }
}

fn at_rule_score(candidate: &Candidate) -> f64 {
    if candidate.ward.is_some() {
        30.0
    } else if candidate.district.is_some() {
        20.0
    } else if candidate.province.is_some() {
        10.0
    } else {
        0.0
    }
}

/// All supplied hints match their candidate level. No hints, no bonus.
fn hints_match(
    candidate: &Candidate,
    province_hint: Option<&str>,
    district_hint: Option<&str>,
) -> bool {
    if province_hint.is_none() && district_hint.is_none() {
        return false;
    }
    let province_ok = province_hint.is_none_or(|hint| {
        candidate
            .province
            .as_ref()
            .is_some_and(|p| p.name == hint)
    });
    let district_ok = district_hint.is_none_or(|hint| {
        candidate
            .district
            .as_ref()
            .is_some_and(|d| d.name == hint)
    });
    province_ok && district_ok
}

fn score(candidate: Candidate, province_hint: Option<&str>, district_hint: Option<&str>) -> RankedCandidate {
    let match_type = match_type_of(&candidate);
    let at_rule = at_rule_score(&candidate);
    let similarity = 20.0 * candidate.combined_score();
    let mut base = match_type_score(match_type) + at_rule + similarity;

    let geo_multiplier = if hints_match(&candidate, province_hint, district_hint) {
        GEO_CONTEXT_BONUS
    } else {
        1.0
    };
    base *= geo_multiplier;
    if !candidate.hierarchy_valid {
        base *= INVALID_HIERARCHY_PENALTY;
    }

    RankedCandidate {
        candidate,
        match_type,
        confidence: (base / 100.0).min(1.0),
        at_rule_score: at_rule,
        geo_multiplier,
    }
}

/// Score and sort candidates; the ranking key is lexicographic:
/// confidence desc, at-rule desc, match-type priority asc, geo bonus desc.
pub fn rank_candidates(
    candidates: Vec<Candidate>,
    province_hint: Option<&str>,
    district_hint: Option<&str>,
) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = candidates
        .into_iter()
        .map(|c| score(c, province_hint, district_hint))
        .collect();
    ranked.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then(b.at_rule_score.total_cmp(&a.at_rule_score))
            .then(match_type_priority(a.match_type).cmp(&match_type_priority(b.match_type)))
            .then(b.geo_multiplier.total_cmp(&a.geo_multiplier))
    });
    ranked
}

/// Pick the winner: the best-ranked valid candidate, falling back to the
/// best invalid one only when no valid candidate exists. Below the
/// confidence floor the request reports `none` and weak inner levels are
/// cleared.
pub fn choose(mut ranked: Vec<RankedCandidate>) -> Option<RankedCandidate> {
    if ranked.is_empty() {
        return None;
    }
    let winner = ranked
        .iter()
        .position(|r| r.candidate.hierarchy_valid)
        .unwrap_or(0);
    let mut best = ranked.swap_remove(winner);
    if best.confidence < LOW_CONFIDENCE {
        best.match_type = MatchType::None;
        if best
            .candidate
            .ward
            .as_ref()
            .is_some_and(|w| w.raw_score < LEVEL_CLEAR_THRESHOLD)
        {
            best.candidate.ward = None;
        }
        if best
            .candidate
            .district
            .as_ref()
            .is_some_and(|d| d.raw_score < LEVEL_CLEAR_THRESHOLD)
        {
            best.candidate.district = None;
        }
    }
    Some(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateSource, LevelMatch};

    fn level(name: &str, score: f64, source: MatchSource) -> LevelMatch {
        LevelMatch {
            name: name.to_string(),
            display: name.to_string(),
            raw_score: score,
            source,
            span: None,
        }
    }

    fn full_candidate(valid: bool, source: MatchSource) -> Candidate {
        Candidate {
            province: Some(level("ha noi", 1.0, source)),
            district: Some(level("ba dinh", 1.0, source)),
            ward: Some(level("dien bien", 1.0, source)),
            source: CandidateSource::Local,
            hierarchy_valid: valid,
        }
    }

    #[test]
    fn test_exact_full_address_scores_one() {
        let ranked = rank_candidates(vec![full_candidate(true, MatchSource::Exact)], None, None);
        // 50 + 30 + 20 = 100 -> 1.0
        assert_eq!(ranked[0].match_type, MatchType::Exact);
        assert!((ranked[0].confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_hierarchy_never_chosen_over_valid() {
        // 100 * 0.8 = 80 for the invalid exact, 30+30+20 = 80 for the
        // valid fuzzy: a dead tie that priority would hand to the invalid
        // candidate. It is still never chosen while a valid one exists.
        let ranked = rank_candidates(
            vec![
                full_candidate(false, MatchSource::Exact),
                full_candidate(true, MatchSource::Fuzzy),
            ],
            None,
            None,
        );
        let chosen = choose(ranked).unwrap();
        assert!(chosen.candidate.hierarchy_valid);
        assert_eq!(chosen.match_type, MatchType::Fuzzy);
    }

    #[test]
    fn test_geo_bonus_applies_when_hints_match() {
        let ranked = rank_candidates(
            vec![full_candidate(true, MatchSource::Fuzzy)],
            Some("ha noi"),
            None,
        );
        // (30 + 30 + 20) * 1.1 = 88
        assert!((ranked[0].confidence - 0.88).abs() < 1e-9);
        assert_eq!(ranked[0].geo_multiplier, 1.1);
    }

    #[test]
    fn test_province_only_exact() {
        let candidate = Candidate {
            province: Some(level("ha noi", 1.0, MatchSource::Exact)),
            district: None,
            ward: None,
            source: CandidateSource::Local,
            hierarchy_valid: true,
        };
        let ranked = rank_candidates(vec![candidate], None, None);
        // 50 + 10 + 20 = 80
        assert!((ranked[0].confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_low_confidence_demotes_and_clears() {
        let candidate = Candidate {
            province: Some(level("ha noi", 0.6, MatchSource::Fuzzy)),
            district: Some(level("ba dinh", 0.2, MatchSource::Fuzzy)),
            ward: None,
            source: CandidateSource::Street,
            hierarchy_valid: false,
        };
        // (20 + 20 + 20*0.38) * 0.8 = 38.2, below the 0.4 floor
        let chosen = choose(rank_candidates(vec![candidate], None, None)).unwrap();
        assert_eq!(chosen.match_type, MatchType::None);
        assert!(chosen.candidate.district.is_none());
        assert!(chosen.candidate.province.is_some());
    }

    #[test]
    fn test_empty_input_chooses_nothing() {
        assert!(choose(Vec::new()).is_none());
    }
}
