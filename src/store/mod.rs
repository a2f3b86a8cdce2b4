//! Read-only access to the administrative hierarchy and the abbreviation
//! dictionary.
//!
//! The whole reference database is read into immutable in-memory indexes at
//! startup; the hot path never touches SQLite. Scoped candidate listings,
//! hierarchy validation, and abbreviation lookups are all answered from
//! these indexes, so concurrent reads need no locking (the one exception is
//! the LRU cache over scoped abbreviation dictionaries).

pub mod bootstrap;
pub mod schema;

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use lru::LruCache;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::index::TokenIndex;
use crate::models::{AdminLevel, AdminRow};

const ABBREV_CACHE_SIZE: usize = 256;

/// Canonicalize an optional scope name: `None` stays a wildcard, a known
/// name maps to its canonical form, an unknown name is an error.
fn resolve<'a>(
    name: Option<&str>,
    canonical: impl Fn(&str) -> Option<&'a str>,
) -> Result<Option<&'a str>, ()> {
    match name {
        None => Ok(None),
        Some(value) => canonical(value).map(Some).ok_or(()),
    }
}

/// A context-scoped abbreviation mapping `key → word`. Either context may
/// be absent; `(key, province_context, district_context)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbbrevEntry {
    pub key: String,
    pub word: String,
    pub province_context: Option<String>,
    pub district_context: Option<String>,
}

/// A legacy administrative name mapped to its current form. Old district
/// and ward may be absent, in which case the entry renames a whole prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationEntry {
    pub old_province: String,
    pub old_district: Option<String>,
    pub old_ward: Option<String>,
    pub new_province: String,
    pub new_district: Option<String>,
    pub new_ward: Option<String>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open reference database at {path}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to load reference data")]
    Load(#[from] rusqlite::Error),
    #[error("reference database contains no administrative rows")]
    Empty,
}

/// Process-wide, immutable-after-construction reference store.
pub struct ReferenceStore {
    rows: Vec<AdminRow>,
    all_indices: Vec<u32>,

    by_province: HashMap<String, Vec<u32>>,
    by_district: HashMap<String, Vec<u32>>,
    by_ward: HashMap<String, Vec<u32>>,
    by_province_district: HashMap<(String, String), Vec<u32>>,

    triples: HashSet<(String, String, String)>,
    province_ward: HashSet<(String, String)>,
    district_ward: HashSet<(String, String)>,

    /// full_normalized → name_normalized, per level, so callers may scope
    /// by either form ("thanh pho ha noi" and "ha noi" are the same scope).
    alias_province: HashMap<String, String>,
    alias_district: HashMap<String, String>,
    alias_ward: HashMap<String, String>,

    token_index: TokenIndex,

    abbreviations: HashMap<String, Vec<AbbrevEntry>>,
    abbrev_scope_cache: Mutex<LruCache<(String, String), Arc<HashMap<String, String>>>>,

    migrations: Vec<MigrationEntry>,
    migration_exact: HashMap<(String, String, String), usize>,
    migration_pd: HashMap<(String, String), usize>,
    migration_p: HashMap<String, usize>,
}

impl ReferenceStore {
    /// Open the reference database and load everything into memory.
    /// A read failure here is fatal: the pipeline cannot run without
    /// reference data.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| StoreError::Open {
            path: path.display().to_string(),
            source,
        })?;

        let rows = schema::read_admin_rows(&conn)?;
        if rows.is_empty() {
            return Err(StoreError::Empty);
        }
        let abbreviations = schema::read_abbreviations(&conn)?;
        let migrations = schema::read_migrations(&conn)?;

        if let Some(built_at) = schema::read_meta(&conn, "built_at")? {
            info!("Reference database built at {}", built_at);
        }

        Ok(Self::from_parts(rows, abbreviations, migrations))
    }

    /// Build a store from already-loaded data. Used by `open`, by the
    /// ingest path, and by tests with fixture hierarchies.
    pub fn from_parts(
        rows: Vec<AdminRow>,
        abbreviations: Vec<AbbrevEntry>,
        migrations: Vec<MigrationEntry>,
    ) -> Self {
        let mut by_province: HashMap<String, Vec<u32>> = HashMap::new();
        let mut by_district: HashMap<String, Vec<u32>> = HashMap::new();
        let mut by_ward: HashMap<String, Vec<u32>> = HashMap::new();
        let mut by_province_district: HashMap<(String, String), Vec<u32>> = HashMap::new();
        let mut triples = HashSet::new();
        let mut province_ward = HashSet::new();
        let mut district_ward = HashSet::new();
        let mut alias_province = HashMap::new();
        let mut alias_district = HashMap::new();
        let mut alias_ward = HashMap::new();

        for (idx, row) in rows.iter().enumerate() {
            let idx = idx as u32;
            let p = row.province.name_normalized.clone();
            let d = row.district.name_normalized.clone();
            let w = row.ward.name_normalized.clone();

            by_province.entry(p.clone()).or_default().push(idx);
            by_district.entry(d.clone()).or_default().push(idx);
            by_ward.entry(w.clone()).or_default().push(idx);
            by_province_district
                .entry((p.clone(), d.clone()))
                .or_default()
                .push(idx);

            triples.insert((p.clone(), d.clone(), w.clone()));
            province_ward.insert((p.clone(), w.clone()));
            district_ward.insert((d.clone(), w.clone()));

            alias_province.insert(row.province.full_normalized.clone(), p);
            alias_district.insert(row.district.full_normalized.clone(), d);
            alias_ward.insert(row.ward.full_normalized.clone(), w);
        }

        let mut abbrev_map: HashMap<String, Vec<AbbrevEntry>> = HashMap::new();
        for entry in abbreviations {
            abbrev_map.entry(entry.key.clone()).or_default().push(entry);
        }

        let mut migration_exact = HashMap::new();
        let mut migration_pd = HashMap::new();
        let mut migration_p = HashMap::new();
        for (idx, m) in migrations.iter().enumerate() {
            match (&m.old_district, &m.old_ward) {
                (Some(d), Some(w)) => {
                    migration_exact.insert((m.old_province.clone(), d.clone(), w.clone()), idx);
                }
                (Some(d), None) => {
                    migration_pd.insert((m.old_province.clone(), d.clone()), idx);
                }
                _ => {
                    migration_p.insert(m.old_province.clone(), idx);
                }
            }
        }

        let token_index = TokenIndex::build(&rows);
        let all_indices = (0..rows.len() as u32).collect();

        info!(
            rows = rows.len(),
            provinces = by_province.len(),
            abbreviations = abbrev_map.len(),
            migrations = migrations.len(),
            "Reference store loaded"
        );

        Self {
            rows,
            all_indices,
            by_province,
            by_district,
            by_ward,
            by_province_district,
            triples,
            province_ward,
            district_ward,
            alias_province,
            alias_district,
            alias_ward,
            token_index,
            abbreviations: abbrev_map,
            abbrev_scope_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(ABBREV_CACHE_SIZE).unwrap(),
            )),
            migrations,
            migration_exact,
            migration_pd,
            migration_p,
        }
    }

    pub fn load_all_rows(&self) -> &[AdminRow] {
        &self.rows
    }

    pub fn row(&self, idx: u32) -> &AdminRow {
        &self.rows[idx as usize]
    }

    pub fn token_index(&self) -> &TokenIndex {
        &self.token_index
    }

    /// Resolve a caller-supplied normalized name (bare or full form) to the
    /// canonical `name_normalized` for a level.
    pub fn canonical_name(&self, level: AdminLevel, name: &str) -> Option<&str> {
        let (by_name, alias) = match level {
            AdminLevel::Province => (&self.by_province, &self.alias_province),
            AdminLevel::District => (&self.by_district, &self.alias_district),
            AdminLevel::Ward => (&self.by_ward, &self.alias_ward),
            AdminLevel::Street => return None,
        };
        if let Some((key, _)) = by_name.get_key_value(name) {
            return Some(key);
        }
        alias.get(name).map(String::as_str)
    }

    /// Row indices consistent with the given scope; the full row set when
    /// the scope is empty. A supplied scope name unknown to the store
    /// selects nothing. Backed by the by-name indexes, never a scan.
    pub fn scope_indices(&self, province: Option<&str>, district: Option<&str>) -> &[u32] {
        let Ok(province) = resolve(province, |p| self.canonical_name(AdminLevel::Province, p))
        else {
            return &[];
        };
        let Ok(district) = resolve(district, |d| self.canonical_name(AdminLevel::District, d))
        else {
            return &[];
        };

        let indices = match (province, district) {
            (Some(p), Some(d)) => self
                .by_province_district
                .get(&(p.to_string(), d.to_string()))
                .map(Vec::as_slice),
            (Some(p), None) => self.by_province.get(p).map(Vec::as_slice),
            (None, Some(d)) => self.by_district.get(d).map(Vec::as_slice),
            (None, None) => Some(self.all_indices.as_slice()),
        };
        indices.unwrap_or(&[])
    }

    /// Administrative rows filtered by matching normalized province and/or
    /// district names; all rows when the scope is empty.
    pub fn candidates_in_scope<'a>(
        &'a self,
        province: Option<&str>,
        district: Option<&str>,
    ) -> impl Iterator<Item = &'a AdminRow> {
        self.scope_indices(province, district)
            .iter()
            .map(move |idx| self.row(*idx))
    }

    /// True iff at least one administrative row matches all supplied
    /// normalized names; absent arguments act as wildcards.
    pub fn validate_triple(
        &self,
        province: Option<&str>,
        district: Option<&str>,
        ward: Option<&str>,
    ) -> bool {
        // A supplied name that resolves to nothing can never form a triple.
        let Ok(province) = resolve(province, |p| self.canonical_name(AdminLevel::Province, p))
        else {
            return false;
        };
        let Ok(district) = resolve(district, |d| self.canonical_name(AdminLevel::District, d))
        else {
            return false;
        };
        let Ok(ward) = resolve(ward, |w| self.canonical_name(AdminLevel::Ward, w)) else {
            return false;
        };

        match (province, district, ward) {
            (Some(p), Some(d), Some(w)) => {
                self.triples
                    .contains(&(p.to_string(), d.to_string(), w.to_string()))
            }
            (Some(p), Some(d), None) => self
                .by_province_district
                .contains_key(&(p.to_string(), d.to_string())),
            (Some(p), None, Some(w)) => self
                .province_ward
                .contains(&(p.to_string(), w.to_string())),
            (None, Some(d), Some(w)) => self
                .district_ward
                .contains(&(d.to_string(), w.to_string())),
            (Some(p), None, None) => self.by_province.contains_key(p),
            (None, Some(d), None) => self.by_district.contains_key(d),
            (None, None, Some(w)) => self.by_ward.contains_key(w),
            (None, None, None) => !self.rows.is_empty(),
        }
    }

    /// First row matching all supplied normalized names, if any.
    pub fn find_row(
        &self,
        province: Option<&str>,
        district: Option<&str>,
        ward: Option<&str>,
    ) -> Option<&AdminRow> {
        let ward = resolve(ward, |w| self.canonical_name(AdminLevel::Ward, w)).ok()?;
        self.scope_indices(province, district)
            .iter()
            .map(|idx| self.row(*idx))
            .find(|row| match ward {
                Some(w) => row.ward.name_normalized == w,
                None => true,
            })
    }

    /// Resolve an abbreviation key for the given context. Resolution order:
    /// district-scoped, then province-scoped, then global; first hit wins.
    pub fn lookup_abbreviation(
        &self,
        key: &str,
        province: Option<&str>,
        district: Option<&str>,
    ) -> Option<&str> {
        let entries = self.abbreviations.get(key)?;
        let province = province.and_then(|p| self.canonical_name(AdminLevel::Province, p));
        let district = district.and_then(|d| self.canonical_name(AdminLevel::District, d));

        if let (Some(p), Some(d)) = (province, district) {
            if let Some(entry) = entries.iter().find(|e| {
                e.province_context.as_deref() == Some(p) && e.district_context.as_deref() == Some(d)
            }) {
                return Some(&entry.word);
            }
        }
        if let Some(p) = province {
            if let Some(entry) = entries
                .iter()
                .find(|e| e.province_context.as_deref() == Some(p) && e.district_context.is_none())
            {
                return Some(&entry.word);
            }
        }
        entries
            .iter()
            .find(|e| e.province_context.is_none() && e.district_context.is_none())
            .map(|e| e.word.as_str())
    }

    /// All keys visible in scope with the same precedence as
    /// `lookup_abbreviation`. Deterministic and cached per scope.
    pub fn load_abbreviations(
        &self,
        province: Option<&str>,
        district: Option<&str>,
    ) -> Arc<HashMap<String, String>> {
        let cache_key = (
            province.unwrap_or("").to_string(),
            district.unwrap_or("").to_string(),
        );
        if let Some(cached) = self.abbrev_scope_cache.lock().get(&cache_key) {
            return Arc::clone(cached);
        }

        let mut scoped = HashMap::new();
        for key in self.abbreviations.keys() {
            if let Some(word) = self.lookup_abbreviation(key, province, district) {
                scoped.insert(key.clone(), word.to_string());
            }
        }
        debug!(
            keys = scoped.len(),
            province = province.unwrap_or("-"),
            district = district.unwrap_or("-"),
            "Scoped abbreviation dictionary built"
        );

        let scoped = Arc::new(scoped);
        self.abbrev_scope_cache
            .lock()
            .put(cache_key, Arc::clone(&scoped));
        scoped
    }

    /// Rewrite a legacy triple into current names, most specific prefix
    /// first. Returns `None` when no migration applies.
    pub fn migrate_triple(
        &self,
        province: &str,
        district: Option<&str>,
        ward: Option<&str>,
    ) -> Option<&MigrationEntry> {
        if let (Some(d), Some(w)) = (district, ward) {
            if let Some(idx) = self
                .migration_exact
                .get(&(province.to_string(), d.to_string(), w.to_string()))
            {
                return Some(&self.migrations[*idx]);
            }
        }
        if let Some(d) = district {
            if let Some(idx) = self.migration_pd.get(&(province.to_string(), d.to_string())) {
                return Some(&self.migrations[*idx]);
            }
        }
        self.migration_p.get(province).map(|idx| &self.migrations[*idx])
    }

    /// The display record for a province known by normalized name.
    pub fn province_entry(&self, name_normalized: &str) -> Option<&AdminRow> {
        let canonical = self.canonical_name(AdminLevel::Province, name_normalized)?;
        self.by_province
            .get(canonical)
            .and_then(|indices| indices.first())
            .map(|idx| self.row(*idx))
    }

    /// The display record for any level known by normalized name (the first
    /// row carrying the name; display forms are identical across rows).
    pub fn level_entry(&self, level: AdminLevel, name_normalized: &str) -> Option<&crate::models::AdminName> {
        let canonical = self.canonical_name(level, name_normalized)?;
        let by_name = match level {
            AdminLevel::Province => &self.by_province,
            AdminLevel::District => &self.by_district,
            AdminLevel::Ward => &self.by_ward,
            AdminLevel::Street => return None,
        };
        by_name
            .get(canonical)
            .and_then(|indices| indices.first())
            .map(|idx| self.row(*idx).name_at(level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AdminName;

    fn fixture() -> ReferenceStore {
        let rows = vec![
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
        ];
        let abbrevs = vec![
            AbbrevEntry {
                key: "hn".into(),
                word: "ha noi".into(),
                province_context: None,
                district_context: None,
            },
            AbbrevEntry {
                key: "db".into(),
                word: "dien bien".into(),
                province_context: Some("ha noi".into()),
                district_context: Some("ba dinh".into()),
            },
            AbbrevEntry {
                key: "db".into(),
                word: "doi binh".into(),
                province_context: None,
                district_context: None,
            },
        ];
        ReferenceStore::from_parts(rows, abbrevs, Vec::new())
    }

    #[test]
    fn test_scope_filters_rows() {
        let store = fixture();
        assert_eq!(store.candidates_in_scope(None, None).count(), 3);
        assert_eq!(store.candidates_in_scope(Some("ha noi"), None).count(), 2);
        assert_eq!(
            store
                .candidates_in_scope(Some("ha noi"), Some("cau giay"))
                .count(),
            1
        );
        assert_eq!(store.candidates_in_scope(Some("hue"), None).count(), 0);
    }

    #[test]
    fn test_scope_accepts_full_form() {
        let store = fixture();
        assert_eq!(
            store
                .candidates_in_scope(Some("thanh pho ha noi"), None)
                .count(),
            2
        );
    }

    #[test]
    fn test_validate_triple_wildcards() {
        let store = fixture();
        assert!(store.validate_triple(Some("ha noi"), Some("ba dinh"), Some("dien bien")));
        assert!(store.validate_triple(Some("ha noi"), None, Some("trung hoa")));
        assert!(store.validate_triple(None, Some("8"), Some("4")));
        assert!(store.validate_triple(None, None, None));
        assert!(!store.validate_triple(Some("ho chi minh"), None, Some("trung hoa")));
        assert!(!store.validate_triple(Some("ha noi"), Some("8"), None));
    }

    #[test]
    fn test_abbreviation_precedence() {
        let store = fixture();
        // District scope beats the global entry.
        assert_eq!(
            store.lookup_abbreviation("db", Some("ha noi"), Some("ba dinh")),
            Some("dien bien")
        );
        // Outside the scoped context the global entry wins.
        assert_eq!(
            store.lookup_abbreviation("db", Some("ho chi minh"), None),
            Some("doi binh")
        );
        assert_eq!(store.lookup_abbreviation("db", None, None), Some("doi binh"));
        assert_eq!(store.lookup_abbreviation("zz", None, None), None);
    }

    #[test]
    fn test_scoped_dictionary_honors_precedence() {
        let store = fixture();
        let scoped = store.load_abbreviations(Some("ha noi"), Some("ba dinh"));
        assert_eq!(scoped.get("db").map(String::as_str), Some("dien bien"));
        assert_eq!(scoped.get("hn").map(String::as_str), Some("ha noi"));

        // Cached: the same Arc comes back for the same scope.
        let again = store.load_abbreviations(Some("ha noi"), Some("ba dinh"));
        assert!(Arc::ptr_eq(&scoped, &again));
    }

    #[test]
    fn test_migration_prefix_order() {
        let rows = vec![AdminRow::new(
            AdminName::new("Thành phố", "Thủ Đức"),
            AdminName::new("Phường", "Linh Xuân"),
            AdminName::new("Khu phố", "1"),
        )];
        let migrations = vec![
            MigrationEntry {
                old_province: "ho chi minh".into(),
                old_district: Some("thu duc".into()),
                old_ward: None,
                new_province: "thu duc".into(),
                new_district: None,
                new_ward: None,
            },
            MigrationEntry {
                old_province: "ho chi minh".into(),
                old_district: Some("thu duc".into()),
                old_ward: Some("linh xuan".into()),
                new_province: "thu duc".into(),
                new_district: Some("linh xuan".into()),
                new_ward: None,
            },
        ];
        let store = ReferenceStore::from_parts(rows, Vec::new(), migrations);

        let hit = store
            .migrate_triple("ho chi minh", Some("thu duc"), Some("linh xuan"))
            .unwrap();
        assert_eq!(hit.new_district.as_deref(), Some("linh xuan"));

        let hit = store
            .migrate_triple("ho chi minh", Some("thu duc"), Some("binh chieu"))
            .unwrap();
        assert_eq!(hit.new_district, None);

        assert!(store.migrate_triple("ha noi", None, None).is_none());
    }
}
