//! Phase 1 - input normalization.
//!
//! Turns a raw address string into a normalized token stream while keeping,
//! for every normalized token, the index of the original whitespace token it
//! came from. Phase 5 uses that alignment to cut matched spans out of the
//! original text.
//!
//! The transformation runs in four passes over the token stream:
//! punctuated administrative patterns, character cleanup with letter/digit
//! splitting, the Ho Chi Minh district dictionary, and context-scoped
//! abbreviations from the reference store. Each pass only produces tokens
//! that are fixpoints of the earlier passes, which makes the whole
//! procedure idempotent. It is pure and deterministic, so results are
//! cached by the matcher on `(raw, province_hint, district_hint)`.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::store::ReferenceStore;
use crate::text;

/// `p.` / `p4` / `p.4` and the `q`/`f` variants.
static WARD_SHORT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^p\.?([0-9]+)?$").unwrap());
static DISTRICT_SHORT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^q\.?([0-9]+)?$").unwrap());
static DISTRICT_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(quan|q\.|q\.?[0-9]+)$").unwrap());
static F_WARD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^f([0-9]+)$").unwrap());
static CITY_SHORT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^tp(?:\.(.*)|([0-9]+))?$").unwrap());
static TOWN_SHORT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^tt\.(.*)$").unwrap());
static HCM_GLUED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^q\.?(tb|gv|bt|td|pn)$").unwrap());

/// Frozen Ho Chi Minh district dictionary. Active only when HCM province
/// context is established (hint, or a trailing `q <abbr>` pattern).
const HCM_DISTRICTS: &[(&str, &str)] = &[
    ("tb", "tan binh"),
    ("gv", "go vap"),
    ("bt", "binh thanh"),
    ("td", "thu duc"),
    ("pn", "phu nhuan"),
];

/// Phase 1 output.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// Normalized tokens (lowercase ASCII).
    pub tokens: Vec<String>,
    /// For each normalized token, the index of the original whitespace
    /// token it derives from.
    pub origins: Vec<usize>,
    /// The original whitespace tokens, verbatim.
    pub raw_tokens: Vec<String>,
}

impl Preprocessed {
    pub fn normalized(&self) -> String {
        self.tokens.join(" ")
    }
}

/// A token mid-normalization, tagged with its origin and whether it was
/// produced by an expansion (expansion output is final and never expanded
/// again).
#[derive(Debug)]
struct Tok {
    text: String,
    origin: usize,
    expanded: bool,
}

fn hcm_lookup(token: &str) -> Option<&'static str> {
    HCM_DISTRICTS
        .iter()
        .find(|(abbr, _)| *abbr == token)
        .map(|(_, full)| *full)
}

fn push_words(out: &mut Vec<Tok>, words: &str, origin: usize, expanded: bool) {
    for word in words.split_whitespace() {
        out.push(Tok {
            text: word.to_string(),
            origin,
            expanded,
        });
    }
}

/// True if any token establishes district context for the `f<digit>` rule.
fn has_district_marker(tokens: &[String]) -> bool {
    tokens.iter().any(|t| DISTRICT_MARKER.is_match(t))
}

/// Punctuated administrative abbreviations, applied to the raw lowered
/// token stream where glued forms ("p4", "q.tb") are still visible.
fn expand_patterns(lowered_tokens: &[String], raw_token_count: usize, hcm_glued_active: bool) -> Vec<Tok> {
    let district_marker = has_district_marker(lowered_tokens);
    let mut toks: Vec<Tok> = Vec::with_capacity(lowered_tokens.len());

    for (i, token) in lowered_tokens.iter().enumerate() {
        let origin = i.min(raw_token_count.saturating_sub(1));

        if hcm_glued_active {
            if let Some(caps) = HCM_GLUED.captures(token) {
                push_words(&mut toks, "quan", origin, true);
                push_words(&mut toks, hcm_lookup(&caps[1]).unwrap(), origin, true);
                continue;
            }
        }
        if let Some(caps) = WARD_SHORT.captures(token) {
            // Bare "p" stays; only "p." and "p<digit>" expand.
            if token != "p" {
                push_words(&mut toks, "phuong", origin, true);
                if let Some(digits) = caps.get(1) {
                    push_words(&mut toks, digits.as_str(), origin, true);
                }
                continue;
            }
        }
        if let Some(caps) = DISTRICT_SHORT.captures(token) {
            if token != "q" {
                push_words(&mut toks, "quan", origin, true);
                if let Some(digits) = caps.get(1) {
                    push_words(&mut toks, digits.as_str(), origin, true);
                }
                continue;
            }
        }
        if let Some(caps) = F_WARD.captures(token) {
            // "f4" means "phuong 4" only when district context exists.
            if district_marker {
                push_words(&mut toks, "phuong", origin, true);
                push_words(&mut toks, &caps[1], origin, true);
                continue;
            }
        }
        if let Some(caps) = CITY_SHORT.captures(token) {
            // "tp", "tp.", "tp.hcm", "tp2": the remainder stays a live
            // token (it may itself be an abbreviation).
            push_words(&mut toks, "thanh pho", origin, true);
            let rest = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map_or("", |m| m.as_str());
            if !rest.is_empty() {
                push_words(&mut toks, rest, origin, false);
            }
            continue;
        }
        if let Some(caps) = TOWN_SHORT.captures(token) {
            push_words(&mut toks, "thi tran", origin, true);
            let rest = caps.get(1).map_or("", |m| m.as_str());
            if !rest.is_empty() {
                push_words(&mut toks, rest, origin, false);
            }
            continue;
        }

        push_words(&mut toks, token, origin, false);
    }
    toks
}

/// Diacritics, separator replacement, character cleanup, letter/digit
/// splitting and leading-zero canonicalization. Splitting can surface a
/// bare "tp" (e.g. from "tp44"); that one form is expanded here so the
/// output stream is a fixpoint of the pattern pass.
fn cleanup_and_split(toks: Vec<Tok>) -> Vec<Tok> {
    let mut clean: Vec<Tok> = Vec::with_capacity(toks.len());
    for tok in toks {
        let ascii = text::strip_diacritics(&tok.text);
        let cleaned: String = ascii
            .chars()
            .map(|c| match c {
                ',' | '-' | '_' | '/' => ' ',
                c if c.is_ascii_lowercase() || c.is_ascii_digit() || c == ' ' => c,
                _ => '\u{0}',
            })
            .filter(|c| *c != '\u{0}')
            .collect();
        let spaced = text::space_letter_digit_boundaries(&cleaned);
        for piece in spaced.split_whitespace() {
            if !tok.expanded && piece == "tp" {
                push_words(&mut clean, "thanh pho", tok.origin, true);
                continue;
            }
            clean.push(Tok {
                text: text::strip_leading_zeros(piece).to_string(),
                origin: tok.origin,
                expanded: tok.expanded,
            });
        }
    }
    clean
}

/// Ho Chi Minh district dictionary over the clean token stream. With an
/// HCM hint every dictionary token expands; with only the trailing-marker
/// activation, a token expands when a district marker precedes it.
fn expand_hcm_districts(toks: Vec<Tok>, by_hint: bool) -> Vec<Tok> {
    let trailing_active = matches!(
        toks.as_slice(),
        [.., prev, last]
            if hcm_lookup(&last.text).is_some()
                && (prev.text == "q" || prev.text == "quan")
    );
    if !by_hint && !trailing_active {
        return toks;
    }

    let mut out: Vec<Tok> = Vec::with_capacity(toks.len());
    for tok in toks {
        if !tok.expanded {
            if let Some(full) = hcm_lookup(&tok.text) {
                let preceded = matches!(
                    out.last(),
                    Some(prev) if prev.text == "q" || prev.text == "quan"
                );
                if by_hint || preceded {
                    push_words(&mut out, full, tok.origin, true);
                    continue;
                }
            }
        }
        out.push(tok);
    }
    out
}

/// Run the full Phase 1 normalization.
///
/// `province_hint` / `district_hint` must already be normalized names; they
/// scope the store abbreviation lookup and gate the Ho Chi Minh dictionary.
pub fn preprocess(
    raw: &str,
    province_hint: Option<&str>,
    district_hint: Option<&str>,
    store: &ReferenceStore,
) -> Preprocessed {
    // NFC normalize, lowercase, whitespace tokenize. Original tokens are
    // kept verbatim for residual reporting.
    let lowered: String = raw.nfc().collect::<String>().to_lowercase();
    let raw_tokens: Vec<String> = raw.split_whitespace().map(String::from).collect();
    let lowered_tokens: Vec<String> = lowered.split_whitespace().map(String::from).collect();

    let hcm_by_hint = province_hint == Some("ho chi minh");
    let hcm_glued_active = hcm_by_hint
        || lowered_tokens
            .last()
            .is_some_and(|last| HCM_GLUED.is_match(last));

    let toks = expand_patterns(&lowered_tokens, raw_tokens.len(), hcm_glued_active);
    let toks = cleanup_and_split(toks);
    let toks = expand_hcm_districts(toks, hcm_by_hint);

    // Context-scoped abbreviations from the reference store, one
    // left-to-right pass; expansion output is never re-expanded. Keys and
    // words are stored pre-normalized, so they need no further processing.
    let scoped = store.load_abbreviations(province_hint, district_hint);
    let mut tokens = Vec::with_capacity(toks.len());
    let mut origins = Vec::with_capacity(toks.len());
    for tok in toks {
        if !tok.expanded {
            if let Some(word) = scoped.get(&tok.text) {
                for piece in word.split_whitespace() {
                    tokens.push(piece.to_string());
                    origins.push(tok.origin);
                }
                continue;
            }
        }
        tokens.push(tok.text);
        origins.push(tok.origin);
    }

    Preprocessed {
        tokens,
        origins,
        raw_tokens,
    }
}
