//! Builds the SQLite reference database from CSV inputs.
//!
//! This is the build-time data pipeline: it normalizes every name, strips
//! leading zeros from numeric names, deduplicates triples, and enforces the
//! abbreviation-key invariants before anything reaches the runtime store.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use csv::ReaderBuilder;
use flate2::read::GzDecoder;
use hashbrown::HashSet;
use rayon::prelude::*;
use rusqlite::Connection;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::models::{AdminName, AdminRow};
use crate::text;

use super::schema;
use super::{AbbrevEntry, MigrationEntry};

#[derive(Debug, Default)]
pub struct BuildStats {
    pub admin_rows: usize,
    pub duplicate_rows: usize,
    pub abbreviations: usize,
    pub migrations: usize,
}

/// Open a CSV file, transparently decompressing `.gz`.
fn open_csv(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open input file: {}", path.display()))?;
    if path.extension().is_some_and(|e| e == "gz") {
        Ok(Box::new(GzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

fn column(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .with_context(|| format!("Column '{}' not found", name))
}

fn optional_column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

fn non_empty(record: &csv::StringRecord, idx: usize) -> Option<String> {
    record
        .get(idx)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Numeric names are persisted without leading zeros ("4", never "04");
/// this is the build-time migration of equivalent legacy rows.
fn canonical_bare_name(name: &str) -> String {
    text::strip_leading_zeros(name.trim()).to_string()
}

/// Read administrative rows from a CSV with columns
/// `province_prefix, province_name, district_prefix, district_name,
/// ward_prefix, ward_name`.
pub fn read_admin_csv(path: &Path) -> Result<Vec<AdminRow>> {
    info!("Loading administrative divisions from {}", path.display());

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(open_csv(path)?);
    let headers = reader.headers()?.clone();

    let pp = column(&headers, "province_prefix")?;
    let pn = column(&headers, "province_name")?;
    let dp = column(&headers, "district_prefix")?;
    let dn = column(&headers, "district_name")?;
    let wp = column(&headers, "ward_prefix")?;
    let wn = column(&headers, "ward_name")?;

    let mut raw: Vec<[String; 6]> = Vec::new();
    for result in reader.records() {
        let record = result?;
        raw.push([
            record.get(pp).unwrap_or("").trim().to_string(),
            canonical_bare_name(record.get(pn).unwrap_or("")),
            record.get(dp).unwrap_or("").trim().to_string(),
            canonical_bare_name(record.get(dn).unwrap_or("")),
            record.get(wp).unwrap_or("").trim().to_string(),
            canonical_bare_name(record.get(wn).unwrap_or("")),
        ]);
    }

    // Name normalization dominates build time; do it across cores.
    let rows: Vec<AdminRow> = raw
        .par_iter()
        .filter(|r| !r[1].is_empty() && !r[3].is_empty() && !r[5].is_empty())
        .map(|r| {
            AdminRow::new(
                AdminName::new(&r[0], &r[1]),
                AdminName::new(&r[2], &r[3]),
                AdminName::new(&r[4], &r[5]),
            )
        })
        .collect();

    info!("Loaded {} administrative rows", rows.len());
    Ok(rows)
}

/// Read abbreviation entries from a CSV with columns
/// `key, word, province_context, district_context` (contexts may be empty).
pub fn read_abbrev_csv(path: &Path) -> Result<Vec<AbbrevEntry>> {
    info!("Loading abbreviations from {}", path.display());

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(open_csv(path)?);
    let headers = reader.headers()?.clone();

    let key = column(&headers, "key")?;
    let word = column(&headers, "word")?;
    let pc = optional_column(&headers, "province_context");
    let dc = optional_column(&headers, "district_context");

    let mut entries = Vec::new();
    for result in reader.records() {
        let record = result?;
        let Some(k) = non_empty(&record, key) else {
            continue;
        };
        let Some(w) = non_empty(&record, word) else {
            continue;
        };
        entries.push(AbbrevEntry {
            key: text::normalize_admin_name(&k),
            word: text::normalize_admin_name(&w),
            province_context: pc
                .and_then(|idx| non_empty(&record, idx))
                .map(|v| text::normalize_admin_name(&v)),
            district_context: dc
                .and_then(|idx| non_empty(&record, idx))
                .map(|v| text::normalize_admin_name(&v)),
        });
    }

    info!("Loaded {} abbreviation entries", entries.len());
    Ok(entries)
}

/// Read migration entries from a CSV with columns
/// `old_province, old_district, old_ward, new_province, new_district,
/// new_ward` (all but the provinces may be empty).
pub fn read_migration_csv(path: &Path) -> Result<Vec<MigrationEntry>> {
    info!("Loading division migrations from {}", path.display());

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(open_csv(path)?);
    let headers = reader.headers()?.clone();

    let op = column(&headers, "old_province")?;
    let od = column(&headers, "old_district")?;
    let ow = column(&headers, "old_ward")?;
    let np = column(&headers, "new_province")?;
    let nd = column(&headers, "new_district")?;
    let nw = column(&headers, "new_ward")?;

    let mut entries = Vec::new();
    for result in reader.records() {
        let record = result?;
        let Some(old_province) = non_empty(&record, op) else {
            continue;
        };
        let Some(new_province) = non_empty(&record, np) else {
            continue;
        };
        entries.push(MigrationEntry {
            old_province: text::normalize_admin_name(&old_province),
            old_district: non_empty(&record, od).map(|v| text::normalize_admin_name(&v)),
            old_ward: non_empty(&record, ow).map(|v| text::normalize_admin_name(&v)),
            new_province: text::normalize_admin_name(&new_province),
            new_district: non_empty(&record, nd).map(|v| text::normalize_admin_name(&v)),
            new_ward: non_empty(&record, nw).map(|v| text::normalize_admin_name(&v)),
        });
    }

    info!("Loaded {} migration entries", entries.len());
    Ok(entries)
}

/// Reject abbreviation entries that violate the dictionary invariants:
/// duplicate `(key, province_context, district_context)` scopes, and keys
/// colliding with any whole token of a normalized administrative name.
fn validate_abbreviations(entries: &[AbbrevEntry], rows: &[AdminRow]) -> Result<()> {
    let mut name_tokens: HashSet<&str> = HashSet::new();
    for row in rows {
        for name in [&row.province, &row.district, &row.ward] {
            name_tokens.extend(name.name_normalized.split_whitespace());
            name_tokens.extend(name.full_normalized.split_whitespace());
        }
    }

    let mut seen: HashSet<(&str, &str, &str)> = HashSet::new();
    for entry in entries {
        if name_tokens.contains(entry.key.as_str()) {
            bail!(
                "abbreviation key '{}' collides with an administrative name token",
                entry.key
            );
        }
        let scope = (
            entry.key.as_str(),
            entry.province_context.as_deref().unwrap_or(""),
            entry.district_context.as_deref().unwrap_or(""),
        );
        if !seen.insert(scope) {
            bail!(
                "duplicate abbreviation scope: key '{}' (province '{}', district '{}')",
                entry.key,
                scope.1,
                scope.2
            );
        }
    }
    Ok(())
}

/// Build the reference database at `db_path` from the CSV inputs.
pub fn build_database(
    db_path: &Path,
    admin_csv: &Path,
    abbrev_csv: Option<&Path>,
    migration_csv: Option<&Path>,
) -> Result<BuildStats> {
    let rows = read_admin_csv(admin_csv)?;
    if rows.is_empty() {
        bail!("no administrative rows in {}", admin_csv.display());
    }

    let abbreviations = match abbrev_csv {
        Some(path) => read_abbrev_csv(path)?,
        None => Vec::new(),
    };
    validate_abbreviations(&abbreviations, &rows)?;

    let migrations = match migration_csv {
        Some(path) => read_migration_csv(path)?,
        None => Vec::new(),
    };

    let mut conn = Connection::open(db_path)
        .with_context(|| format!("Failed to create database at {}", db_path.display()))?;
    schema::init_schema(&conn).context("Failed to initialize schema")?;

    let mut stats = BuildStats::default();
    let tx = conn.transaction()?;
    {
        let mut seen_triples: HashSet<(&str, &str, &str)> = HashSet::new();
        for row in &rows {
            let triple = (
                row.province.name_normalized.as_str(),
                row.district.name_normalized.as_str(),
                row.ward.name_normalized.as_str(),
            );
            if !seen_triples.insert(triple) {
                stats.duplicate_rows += 1;
                continue;
            }
            schema::insert_admin_row(&tx, row).context("Failed to insert administrative row")?;
            stats.admin_rows += 1;
        }
        for entry in &abbreviations {
            schema::insert_abbreviation(&tx, entry).context("Failed to insert abbreviation")?;
            stats.abbreviations += 1;
        }
        for entry in &migrations {
            schema::insert_migration(&tx, entry).context("Failed to insert migration entry")?;
            stats.migrations += 1;
        }
        schema::write_meta(&tx, "built_at", &Utc::now().to_rfc3339())?;
        schema::write_meta(&tx, "admin_rows", &stats.admin_rows.to_string())?;
    }
    tx.commit()?;

    if stats.duplicate_rows > 0 {
        warn!(
            "Skipped {} duplicate triples during ingest",
            stats.duplicate_rows
        );
    }
    info!(
        "Reference database written to {}: {} rows, {} abbreviations, {} migrations",
        db_path.display(),
        stats.admin_rows,
        stats.abbreviations,
        stats.migrations
    );
    Ok(stats)
}
