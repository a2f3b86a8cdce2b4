//! Phase 5 - postprocessing.
//!
//! Maps the chosen spans back onto the original token list to produce the
//! unmatched residual, derives the quality flag, and emits the final
//! result record.

use hashbrown::HashSet;

use crate::models::{AdminLevel, LevelMatch, MatchResult, MatchType, PhaseTimings, QualityFlag, Span};
use crate::store::ReferenceStore;

use super::preprocess::Preprocessed;
use super::rank::RankedCandidate;

fn quality_flag(result_levels: (bool, bool, bool), confidence: f64) -> QualityFlag {
    match result_levels {
        (true, true, true) if confidence >= 0.8 => QualityFlag::FullAddress,
        (true, true, _) if confidence >= 0.6 => QualityFlag::PartialAddress,
        (true, _, _) if confidence >= 0.6 => QualityFlag::ProvinceOnly,
        _ => QualityFlag::Failed,
    }
}

/// How many tokens immediately before `span` spell the administrative
/// prefix of the matched name ("phuong" before a matched "4", "thanh pho"
/// before a matched "ho chi minh"). Those tokens belong to the match and
/// are removed with it.
fn absorbed_prefix_len(
    store: &ReferenceStore,
    pre: &Preprocessed,
    level: AdminLevel,
    matched: &LevelMatch,
    span: Span,
) -> usize {
    let Some(entry) = store.level_entry(level, &matched.name) else {
        return 0;
    };
    let Some(prefix) = entry.full_normalized.strip_suffix(entry.name_normalized.as_str()) else {
        return 0;
    };
    let prefix_tokens: Vec<&str> = prefix.split_whitespace().collect();

    for take in (1..=prefix_tokens.len().min(span.start)).rev() {
        let from = span.start - take;
        let tail = &prefix_tokens[prefix_tokens.len() - take..];
        if pre.tokens[from..span.start]
            .iter()
            .zip(tail.iter())
            .all(|(token, expected)| token == expected)
        {
            return take;
        }
    }
    0
}

/// Remove the original tokens covered by the chosen potentials' spans
/// (plus their absorbed prefixes) and rejoin the rest. The residual can
/// never be longer than the input.
fn remaining_text(
    store: &ReferenceStore,
    pre: &Preprocessed,
    chosen: Option<&RankedCandidate>,
) -> String {
    let mut removed: HashSet<usize> = HashSet::new();
    if let Some(ranked) = chosen {
        let levels = [
            (AdminLevel::Province, ranked.candidate.province.as_ref()),
            (AdminLevel::District, ranked.candidate.district.as_ref()),
            (AdminLevel::Ward, ranked.candidate.ward.as_ref()),
        ];
        for (level, matched) in levels {
            let Some(matched) = matched else { continue };
            let Some(span) = matched.span else { continue };
            let start = span.start - absorbed_prefix_len(store, pre, level, matched, span);
            for token_idx in start..span.end.min(pre.origins.len()) {
                removed.insert(pre.origins[token_idx]);
            }
        }
    }

    pre.raw_tokens
        .iter()
        .enumerate()
        .filter(|(idx, _)| !removed.contains(idx))
        .map(|(_, token)| token.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run Phase 5: assemble the final result record.
pub fn postprocess(
    store: &ReferenceStore,
    pre: &Preprocessed,
    chosen: Option<RankedCandidate>,
    timings: PhaseTimings,
) -> MatchResult {
    let remaining = remaining_text(store, pre, chosen.as_ref());

    let Some(ranked) = chosen else {
        let mut result = MatchResult::failed(remaining);
        result.timings = timings;
        return result;
    };

    let province = ranked.candidate.province.as_ref().map(|m| m.display.clone());
    let district = ranked.candidate.district.as_ref().map(|m| m.display.clone());
    let ward = ranked.candidate.ward.as_ref().map(|m| m.display.clone());

    let quality = if ranked.match_type == MatchType::None {
        QualityFlag::Failed
    } else {
        quality_flag(
            (province.is_some(), district.is_some(), ward.is_some()),
            ranked.confidence,
        )
    };

    MatchResult {
        province,
        district,
        ward,
        confidence: ranked.confidence,
        match_type: ranked.match_type,
        quality_flag: quality,
        remaining_text: remaining,
        timings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AdminName, AdminRow, Candidate, CandidateSource, MatchSource,
    };

    fn store() -> ReferenceStore {
        let rows = vec![AdminRow::new(
            AdminName::new("Thành phố", "Hà Nội"),
            AdminName::new("Quận", "Ba Đình"),
            AdminName::new("Phường", "Điện Biên"),
        )];
        ReferenceStore::from_parts(rows, Vec::new(), Vec::new())
    }

    fn pre(raw: &str, tokens: &str, origins: Vec<usize>) -> Preprocessed {
        Preprocessed {
            tokens: tokens.split_whitespace().map(String::from).collect(),
            origins,
            raw_tokens: raw.split_whitespace().map(String::from).collect(),
        }
    }

    fn ranked(candidate: Candidate, confidence: f64, match_type: MatchType) -> RankedCandidate {
        RankedCandidate {
            candidate,
            match_type,
            confidence,
            at_rule_score: 0.0,
            geo_multiplier: 1.0,
        }
    }

    fn level(name: &str, span: Option<Span>) -> LevelMatch {
        LevelMatch {
            name: name.to_string(),
            display: name.to_string(),
            raw_score: 1.0,
            source: MatchSource::Exact,
            span,
        }
    }

    #[test]
    fn test_residual_removes_matched_origins() {
        // "HN" expanded to "ha noi": both normalized tokens share origin 2.
        let pre = pre("so 9 HN", "so 9 ha noi", vec![0, 1, 2, 2]);
        let candidate = Candidate {
            province: Some(level("ha noi", Some(Span::new(2, 4)))),
            district: None,
            ward: None,
            source: CandidateSource::Local,
            hierarchy_valid: true,
        };
        let result = postprocess(
            &store(),
            &pre,
            Some(ranked(candidate, 0.8, MatchType::Exact)),
            PhaseTimings::default(),
        );
        assert_eq!(result.remaining_text, "so 9");
        assert_eq!(result.quality_flag, QualityFlag::ProvinceOnly);
    }

    #[test]
    fn test_residual_absorbs_admin_prefix() {
        // The matched span covers only "ha noi"; the preceding "thanh pho"
        // tokens spell the province prefix and are absorbed into the match.
        let pre = pre(
            "gui ve thanh pho ha noi",
            "gui ve thanh pho ha noi",
            vec![0, 1, 2, 3, 4, 5],
        );
        let candidate = Candidate {
            province: Some(level("ha noi", Some(Span::new(4, 6)))),
            district: None,
            ward: None,
            source: CandidateSource::Local,
            hierarchy_valid: true,
        };
        let result = postprocess(
            &store(),
            &pre,
            Some(ranked(candidate, 0.8, MatchType::Exact)),
            PhaseTimings::default(),
        );
        assert_eq!(result.remaining_text, "gui ve");
    }

    #[test]
    fn test_residual_never_longer_than_input() {
        let raw = "so 9 HN";
        let pre = pre(raw, "so 9 ha noi", vec![0, 1, 2, 2]);
        let result = postprocess(&store(), &pre, None, PhaseTimings::default());
        assert!(result.remaining_text.len() <= raw.len());
        assert_eq!(result.quality_flag, QualityFlag::Failed);
    }

    #[test]
    fn test_quality_flag_thresholds() {
        assert_eq!(quality_flag((true, true, true), 0.85), QualityFlag::FullAddress);
        assert_eq!(quality_flag((true, true, true), 0.7), QualityFlag::PartialAddress);
        assert_eq!(quality_flag((true, true, false), 0.65), QualityFlag::PartialAddress);
        assert_eq!(quality_flag((true, false, false), 0.65), QualityFlag::ProvinceOnly);
        assert_eq!(quality_flag((true, false, false), 0.5), QualityFlag::Failed);
        assert_eq!(quality_flag((false, false, false), 0.9), QualityFlag::Failed);
    }

    #[test]
    fn test_demoted_match_reports_failed() {
        let pre = pre("abc", "abc", vec![0]);
        let candidate = Candidate {
            province: Some(level("ha noi", None)),
            district: None,
            ward: None,
            source: CandidateSource::Local,
            hierarchy_valid: true,
        };
        let result = postprocess(
            &store(),
            &pre,
            Some(ranked(candidate, 0.3, MatchType::None)),
            PhaseTimings::default(),
        );
        assert_eq!(result.quality_flag, QualityFlag::Failed);
        // The surviving province is still reported for diagnostics.
        assert_eq!(result.province.as_deref(), Some("ha noi"));
    }
}
