//! Inverted token index over the administrative hierarchy.
//!
//! Maps each distinct token appearing in any normalized administrative name
//! to the sorted set of row indices containing it. Built once during store
//! initialization and never mutated; Phase 2 uses it to bound fuzzy-search
//! cost by narrowing 13,814 rows down to the union over query tokens.

use hashbrown::HashMap;
use tracing::info;

use crate::models::AdminRow;

pub struct TokenIndex {
    /// token -> sorted, deduplicated row indices
    postings: HashMap<String, Vec<u32>>,
}

impl TokenIndex {
    /// Build the index from the full row set.
    pub fn build(rows: &[AdminRow]) -> Self {
        let mut postings: HashMap<String, Vec<u32>> = HashMap::new();

        for (idx, row) in rows.iter().enumerate() {
            let idx = idx as u32;
            let names = [
                &row.province.name_normalized,
                &row.province.full_normalized,
                &row.district.name_normalized,
                &row.district.full_normalized,
                &row.ward.name_normalized,
                &row.ward.full_normalized,
            ];
            for name in names {
                for token in name.split_whitespace() {
                    let posting = postings.entry(token.to_string()).or_default();
                    if posting.last() != Some(&idx) {
                        posting.push(idx);
                    }
                }
            }
        }

        info!(
            tokens = postings.len(),
            rows = rows.len(),
            "Token index built"
        );

        Self { postings }
    }

    /// Row indices containing at least one of the tokens (sorted union).
    pub fn rows_containing_any<'a, I>(&self, tokens: I) -> Vec<u32>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut result: Vec<u32> = Vec::new();
        for token in tokens {
            if let Some(posting) = self.postings.get(token) {
                result.extend_from_slice(posting);
            }
        }
        result.sort_unstable();
        result.dedup();
        result
    }

    /// Row indices containing every token (sorted intersection). Returns an
    /// empty set as soon as any token is unknown.
    pub fn rows_containing_all<'a, I>(&self, tokens: I) -> Vec<u32>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut acc: Option<Vec<u32>> = None;
        for token in tokens {
            let Some(posting) = self.postings.get(token) else {
                return Vec::new();
            };
            acc = Some(match acc {
                None => posting.clone(),
                Some(current) => intersect_sorted(&current, posting),
            });
            if acc.as_ref().is_some_and(Vec::is_empty) {
                return Vec::new();
            }
        }
        acc.unwrap_or_default()
    }

    pub fn token_count(&self) -> usize {
        self.postings.len()
    }
}

fn intersect_sorted(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut result = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                result.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AdminName;

    fn rows() -> Vec<AdminRow> {
        vec![
            AdminRow::new(
                AdminName::new("Thành phố", "Hà Nội"),
                AdminName::new("Quận", "Ba Đình"),
                AdminName::new("Phường", "Điện Biên"),
            ),
            AdminRow::new(
                AdminName::new("Thành phố", "Hà Nội"),
                AdminName::new("Quận", "Cầu Giấy"),
                AdminName::new("Phường", "Trung Hòa"),
            ),
            AdminRow::new(
                AdminName::new("Thành phố", "Hồ Chí Minh"),
                AdminName::new("Quận", "8"),
                AdminName::new("Phường", "4"),
            ),
        ]
    }

    #[test]
    fn test_any_is_union() {
        let rows = rows();
        let index = TokenIndex::build(&rows);
        assert_eq!(index.rows_containing_any(["noi"]), vec![0, 1]);
        assert_eq!(index.rows_containing_any(["noi", "minh"]), vec![0, 1, 2]);
        assert!(index.rows_containing_any(["saigon"]).is_empty());
    }

    #[test]
    fn test_all_is_intersection() {
        let rows = rows();
        let index = TokenIndex::build(&rows);
        assert_eq!(index.rows_containing_all(["ha", "giay"]), vec![1]);
        assert!(index.rows_containing_all(["ha", "minh"]).is_empty());
        assert!(index.rows_containing_all(["ha", "saigon"]).is_empty());
    }

    #[test]
    fn test_prefix_tokens_are_indexed() {
        let rows = rows();
        let index = TokenIndex::build(&rows);
        // "phuong" appears in every full_normalized ward name.
        assert_eq!(index.rows_containing_any(["phuong"]).len(), 3);
    }
}
