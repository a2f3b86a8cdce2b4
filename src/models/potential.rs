//! Phase 2 output: scored single-level candidates with token spans.

use serde::{Deserialize, Serialize};

use super::AdminLevel;

/// Half-open token span `[start, end)` into the normalized token stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, token: usize) -> bool {
        token >= self.start && token < self.end
    }
}

/// How a potential was matched against the reference store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchSource {
    Exact,
    Abbrev,
    Fuzzy,
}

/// A scored candidate for a single administrative level, extracted from a
/// specific n-gram of the input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Potential {
    pub level: AdminLevel,
    /// Normalized canonical name of the matched store entry (or the covered
    /// text itself for street potentials).
    pub canonical_name: String,
    pub span: Span,
    /// Ensemble score in [0, 1], before numeric context multipliers.
    pub raw_score: f64,
    /// Score after the numeric keyword-context multiplier; this is what
    /// thresholds and ranking operate on.
    pub adjusted_score: f64,
    pub source: MatchSource,
    /// True iff the token immediately before the span is a full
    /// administrative keyword.
    pub keyword_context: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_overlap() {
        let a = Span::new(0, 2);
        let b = Span::new(1, 3);
        let c = Span::new(2, 4);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_span_is_half_open() {
        let span = Span::new(1, 3);
        assert!(span.contains(1));
        assert!(span.contains(2));
        assert!(!span.contains(3));
        assert_eq!(span.len(), 2);
    }
}
