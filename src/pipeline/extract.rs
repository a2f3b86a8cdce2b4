//! Phase 2 - potential extraction.
//!
//! Enumerates n-grams over the normalized token stream and scores them
//! against the administrative hierarchy, level by level. Search is scoped
//! by the best match of the previous level (or the caller's hints) and
//! pre-filtered through the token index so the ensemble scorer only ever
//! sees rows sharing at least one token with the n-gram.

use hashbrown::{HashMap, HashSet};

use crate::config::MatcherConfig;
use crate::models::{AdminLevel, MatchSource, Potential, Span};
use crate::store::ReferenceStore;
use crate::text::{self, fuzzy};

use super::preprocess::Preprocessed;

/// Full administrative keywords that establish numeric context.
/// Abbreviated forms are intentionally not counted here.
const ADMIN_KEYWORDS: &[&str] = &[
    "phuong", "xa", "quan", "huyen", "thanh", "thi", "tran", "pho",
];

const MAX_NGRAM: usize = 4;
const MAX_STREET_SPAN: usize = 3;

/// Ranked potential lists, one per level.
#[derive(Debug, Default)]
pub struct PotentialLists {
    pub provinces: Vec<Potential>,
    pub districts: Vec<Potential>,
    pub wards: Vec<Potential>,
    pub streets: Vec<Potential>,
}

impl PotentialLists {
    pub fn for_level(&self, level: AdminLevel) -> &[Potential] {
        match level {
            AdminLevel::Province => &self.provinces,
            AdminLevel::District => &self.districts,
            AdminLevel::Ward => &self.wards,
            AdminLevel::Street => &self.streets,
        }
    }
}

struct Ngram {
    text: String,
    span: Span,
    /// True iff the token immediately before the span is an admin keyword.
    keyword_context: bool,
}

impl Ngram {
    fn tokens(&self) -> impl Iterator<Item = &str> {
        self.text.split_whitespace()
    }

    /// The digit count for a single-token numeric n-gram, `None` otherwise.
    fn numeric_len(&self) -> Option<usize> {
        if !self.text.contains(' ') && text::is_numeric_token(&self.text) {
            Some(self.text.len())
        } else {
            None
        }
    }
}

fn build_ngrams(tokens: &[String]) -> Vec<Ngram> {
    let mut ngrams = Vec::new();
    for n in 1..=MAX_NGRAM {
        for start in 0..tokens.len().saturating_sub(n - 1) {
            let end = start + n;
            let keyword_context =
                start > 0 && ADMIN_KEYWORDS.contains(&tokens[start - 1].as_str());
            ngrams.push(Ngram {
                text: tokens[start..end].join(" "),
                span: Span::new(start, end),
                keyword_context,
            });
        }
    }
    ngrams
}

fn shares_token(ngram: &Ngram, name_tokens: &HashSet<&str>) -> bool {
    ngram.tokens().any(|t| name_tokens.contains(t))
}

/// Keep the strongest potential per canonical name: higher adjusted score,
/// then longer span, then earlier start.
fn consider(best: &mut HashMap<String, Potential>, potential: Potential) {
    match best.get_mut(&potential.canonical_name) {
        Some(current) if rank_cmp(current, &potential).is_le() => {}
        Some(current) => *current = potential,
        None => {
            best.insert(potential.canonical_name.clone(), potential);
        }
    }
}

/// Descending rank order: negative means `a` ranks better than `b`.
fn rank_cmp(a: &Potential, b: &Potential) -> std::cmp::Ordering {
    b.adjusted_score
        .total_cmp(&a.adjusted_score)
        .then(b.span.len().cmp(&a.span.len()))
        .then(a.span.start.cmp(&b.span.start))
}

fn extract_level(
    store: &ReferenceStore,
    config: &MatcherConfig,
    ngrams: &[Ngram],
    level: AdminLevel,
    scope_province: Option<&str>,
    scope_district: Option<&str>,
    exclusions: &[Span],
) -> Vec<Potential> {
    let scope = store.scope_indices(scope_province, scope_district);
    let scope_set: HashSet<u32> = scope.iter().copied().collect();
    let threshold = config.threshold_for(level);
    let weights = &config.ensemble_weights;

    let mut best: HashMap<String, Potential> = HashMap::new();

    for ngram in ngrams {
        if exclusions.iter().any(|span| ngram.span.overlaps(span)) {
            continue;
        }

        let numeric_len = ngram.numeric_len();
        if numeric_len.is_some_and(|len| len >= 3) {
            // 3+ digit numbers are street numbers, never admin names.
            continue;
        }
        let multiplier = match numeric_len {
            Some(_) if ngram.keyword_context => config.numeric_keyword_bonus,
            Some(_) => config.numeric_no_keyword_penalty,
            None => 1.0,
        };

        for row_idx in store.token_index().rows_containing_any(ngram.tokens()) {
            if !scope_set.contains(&row_idx) {
                continue;
            }
            let name = store.row(row_idx).name_at(level);
            let name_tokens: HashSet<&str> = name
                .name_normalized
                .split_whitespace()
                .chain(name.full_normalized.split_whitespace())
                .collect();
            if !shares_token(ngram, &name_tokens) {
                continue;
            }

            let raw = fuzzy::ensemble_score(&ngram.text, &name.name_normalized, weights)
                .max(fuzzy::ensemble_score(&ngram.text, &name.full_normalized, weights));
            let source = if ngram.text == name.name_normalized || ngram.text == name.full_normalized
            {
                MatchSource::Exact
            } else {
                MatchSource::Fuzzy
            };
            let adjusted = raw * multiplier;
            if adjusted < threshold {
                continue;
            }
            consider(
                &mut best,
                Potential {
                    level,
                    canonical_name: name.name_normalized.clone(),
                    span: ngram.span,
                    raw_score: raw,
                    adjusted_score: adjusted,
                    source,
                    keyword_context: ngram.keyword_context,
                },
            );
        }

        // An n-gram that is itself a resolvable abbreviation key counts as
        // an alternative n-gram for the key's word, at a fixed score of 1.0.
        if let Some(word) = store.lookup_abbreviation(&ngram.text, scope_province, scope_district) {
            let word = word.to_string();
            for row_idx in scope {
                let name = store.row(*row_idx).name_at(level);
                if name.name_normalized == word {
                    consider(
                        &mut best,
                        Potential {
                            level,
                            canonical_name: name.name_normalized.clone(),
                            span: ngram.span,
                            raw_score: 1.0,
                            adjusted_score: 1.0,
                            source: MatchSource::Abbrev,
                            keyword_context: ngram.keyword_context,
                        },
                    );
                }
            }
        }
    }

    let mut list: Vec<Potential> = best.into_values().collect();
    list.sort_by(rank_cmp);
    list
}

fn extract_streets(tokens: &[String], admin_potentials: &[&[Potential]]) -> Vec<Potential> {
    let mut covered = vec![false; tokens.len()];
    for list in admin_potentials {
        for potential in *list {
            for idx in potential.span.start..potential.span.end.min(tokens.len()) {
                covered[idx] = true;
            }
        }
    }

    let mut streets = Vec::new();
    for n in 1..=MAX_STREET_SPAN {
        for start in 0..tokens.len().saturating_sub(n - 1) {
            let end = start + n;
            if (start..end).any(|idx| covered[idx]) {
                continue;
            }
            if text::is_numeric_token(&tokens[start]) {
                continue;
            }
            streets.push(Potential {
                level: AdminLevel::Street,
                canonical_name: tokens[start..end].join(" "),
                span: Span::new(start, end),
                raw_score: 1.0,
                adjusted_score: 1.0,
                source: MatchSource::Exact,
                keyword_context: false,
            });
        }
    }
    streets.sort_by(rank_cmp);
    streets
}

/// Run Phase 2 over a normalized token stream.
pub fn extract_potentials(
    store: &ReferenceStore,
    config: &MatcherConfig,
    pre: &Preprocessed,
    province_hint: Option<&str>,
    district_hint: Option<&str>,
) -> PotentialLists {
    let ngrams = build_ngrams(&pre.tokens);
    let mut lists = PotentialLists::default();
    let mut exclusions: Vec<Span> = Vec::new();

    // Province: the hint, when present, only scopes the search.
    lists.provinces = extract_level(
        store,
        config,
        &ngrams,
        AdminLevel::Province,
        province_hint,
        None,
        &exclusions,
    );
    let best_province = lists
        .provinces
        .first()
        .map(|p| p.canonical_name.clone());
    if let Some(best) = lists.provinces.first() {
        exclusions.push(best.span);
    }

    // District: scoped to the matched province, falling back to the hint.
    let district_scope_province = best_province.as_deref().or(province_hint);
    lists.districts = extract_level(
        store,
        config,
        &ngrams,
        AdminLevel::District,
        district_scope_province,
        district_hint,
        &exclusions,
    );
    let best_district = lists
        .districts
        .first()
        .map(|p| p.canonical_name.clone());
    if let Some(best) = lists.districts.first() {
        exclusions.push(best.span);
    }

    // Ward: chained through the selected district so only rows forming a
    // real (province, district, ward) triple are reachable.
    lists.wards = extract_level(
        store,
        config,
        &ngrams,
        AdminLevel::Ward,
        district_scope_province,
        best_district.as_deref().or(district_hint),
        &exclusions,
    );

    lists.streets = extract_streets(
        &pre.tokens,
        &[&lists.provinces, &lists.districts, &lists.wards],
    );

    lists
}
