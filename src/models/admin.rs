//! Administrative hierarchy types.

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::xxh64;

use crate::text;

/// The levels the pipeline extracts candidates for.
///
/// `Street` is a pseudo-level: street potentials are never matched against
/// the reference store, they only cover tokens and shape the residual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AdminLevel {
    Province,
    District,
    Ward,
    Street,
}

impl AdminLevel {
    /// The three store-backed levels in search order, outermost first.
    pub fn admin_levels() -> &'static [AdminLevel] {
        &[AdminLevel::Province, AdminLevel::District, AdminLevel::Ward]
    }

    /// Get the field name for this level
    pub fn field_name(&self) -> &'static str {
        match self {
            AdminLevel::Province => "province",
            AdminLevel::District => "district",
            AdminLevel::Ward => "ward",
            AdminLevel::Street => "street",
        }
    }
}

/// One administrative name in all the representations the pipeline needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminName {
    /// Prefixed display form, e.g. "Thành phố Hà Nội".
    pub full: String,
    /// Unit prefix, e.g. "Thành phố", "Quận", "Phường".
    pub prefix: String,
    /// Bare proper-cased name, e.g. "Hà Nội", "4".
    pub name: String,
    /// Lowercase ASCII form of `name`, e.g. "ha noi".
    pub name_normalized: String,
    /// Lowercase ASCII form of `full`, e.g. "thanh pho ha noi".
    pub full_normalized: String,
}

impl AdminName {
    /// Build from the display prefix and bare name, deriving the normalized forms.
    pub fn new(prefix: &str, name: &str) -> Self {
        let full = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{} {}", prefix, name)
        };
        Self {
            prefix: prefix.to_string(),
            name: name.to_string(),
            name_normalized: text::normalize_admin_name(name),
            full_normalized: text::normalize_admin_name(&full),
            full,
        }
    }

    /// Reconstruct from already-persisted columns without re-normalizing.
    pub fn from_columns(
        full: String,
        prefix: String,
        name: String,
        name_normalized: String,
        full_normalized: String,
    ) -> Self {
        Self {
            full,
            prefix,
            name,
            name_normalized,
            full_normalized,
        }
    }

    /// Name shown in results: numeric names are meaningless without their
    /// prefix ("Quận 8", "Phường 4"), everything else reads better bare
    /// ("Hà Nội", "Trung Hòa").
    pub fn display(&self) -> &str {
        if text::is_numeric_token(&self.name_normalized) {
            &self.full
        } else {
            &self.name
        }
    }
}

/// One row of the administrative hierarchy: a (province, district, ward)
/// triple. The triple is unique across the store; `id` is an xxh64 hash of
/// the normalized triple and therefore stable across rebuilds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminRow {
    pub id: u64,
    pub province: AdminName,
    pub district: AdminName,
    pub ward: AdminName,
}

impl AdminRow {
    pub fn new(province: AdminName, district: AdminName, ward: AdminName) -> Self {
        let key = format!(
            "{}|{}|{}",
            province.full_normalized, district.full_normalized, ward.full_normalized
        );
        Self {
            id: xxh64(key.as_bytes(), 0),
            province,
            district,
            ward,
        }
    }

    pub fn name_at(&self, level: AdminLevel) -> &AdminName {
        match level {
            AdminLevel::Province | AdminLevel::Street => &self.province,
            AdminLevel::District => &self.district,
            AdminLevel::Ward => &self.ward,
        }
    }
}
