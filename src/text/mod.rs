//! Text normalization primitives shared by the reference store and Phase 1.

pub mod fuzzy;

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

static LETTER_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-z])([0-9])").unwrap());
static DIGIT_LETTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9])([a-z])").unwrap());

/// Remove Vietnamese diacritics: NFD decompose, drop combining marks,
/// and map the non-decomposable `đ`/`Đ` to plain `d`.
///
/// - "Hà Nội" → "Ha Noi"
/// - "Điện Biên" → "Dien Bien"
pub fn strip_diacritics(value: &str) -> String {
    value
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c {
            'đ' => 'd',
            'Đ' => 'D',
            other => other,
        })
        .collect()
}

/// Insert a space at every letter↔digit boundary.
///
/// Applied twice so interleaved runs are fully split: "a1b2" → "a 1 b 2".
pub fn space_letter_digit_boundaries(value: &str) -> String {
    let pass = |s: &str| {
        let s = LETTER_DIGIT.replace_all(s, "$1 $2");
        DIGIT_LETTER.replace_all(&s, "$1 $2").into_owned()
    };
    pass(&pass(value))
}

/// True if the token consists solely of ASCII digits.
pub fn is_numeric_token(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// Strip leading zeros from a numeric token ("04" → "4", "0" → "0").
/// Non-numeric tokens pass through unchanged.
pub fn strip_leading_zeros(token: &str) -> &str {
    if !is_numeric_token(token) {
        return token;
    }
    let stripped = token.trim_start_matches('0');
    if stripped.is_empty() {
        "0"
    } else {
        stripped
    }
}

/// Canonical normalization for administrative names: lowercase ASCII,
/// diacritics removed, separators collapsed, digits space-separated from
/// letters, numeric tokens without leading zeros.
///
/// This is the form stored in every `*_normalized` column and the form the
/// pipeline compares against, so both sides must go through this function.
pub fn normalize_admin_name(value: &str) -> String {
    let lowered = value.nfc().collect::<String>().to_lowercase();
    let ascii = strip_diacritics(&lowered);

    let cleaned: String = ascii
        .chars()
        .map(|c| match c {
            ',' | '-' | '_' | '/' => ' ',
            c if c.is_ascii_lowercase() || c.is_ascii_digit() || c == ' ' => c,
            _ => '\u{0}',
        })
        .filter(|c| *c != '\u{0}')
        .collect();

    let spaced = space_letter_digit_boundaries(&cleaned);

    spaced
        .split_whitespace()
        .map(strip_leading_zeros)
        .collect::<Vec<_>>()
        .join(" ")
}
