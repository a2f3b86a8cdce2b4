//! Reference database schema and row mapping.
//!
//! Column names are authoritative: additions are allowed, removals are
//! breaking for downstream data pipelines.

use rusqlite::{params, Connection, Row};

use crate::models::{AdminName, AdminRow};

use super::{AbbrevEntry, MigrationEntry};

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS admin_divisions (
    id                          INTEGER PRIMARY KEY,
    province_full               TEXT NOT NULL,
    province_prefix             TEXT NOT NULL,
    province_name               TEXT NOT NULL,
    province_name_normalized    TEXT NOT NULL,
    province_full_normalized    TEXT NOT NULL,
    district_full               TEXT NOT NULL,
    district_prefix             TEXT NOT NULL,
    district_name               TEXT NOT NULL,
    district_name_normalized    TEXT NOT NULL,
    district_full_normalized    TEXT NOT NULL,
    ward_full                   TEXT NOT NULL,
    ward_prefix                 TEXT NOT NULL,
    ward_name                   TEXT NOT NULL,
    ward_name_normalized        TEXT NOT NULL,
    ward_full_normalized        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_admin_province ON admin_divisions(province_name_normalized);
CREATE INDEX IF NOT EXISTS idx_admin_district ON admin_divisions(district_name_normalized);
CREATE INDEX IF NOT EXISTS idx_admin_ward     ON admin_divisions(ward_name_normalized);
CREATE UNIQUE INDEX IF NOT EXISTS idx_admin_triple ON admin_divisions(
    province_name_normalized, district_name_normalized, ward_name_normalized
);

CREATE TABLE IF NOT EXISTS abbreviations (
    key                 TEXT NOT NULL,
    word                TEXT NOT NULL,
    province_context    TEXT NULL,
    district_context    TEXT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_abbrev_scope ON abbreviations(
    key, COALESCE(province_context, ''), COALESCE(district_context, '')
);

CREATE TABLE IF NOT EXISTS admin_division_migration (
    old_province    TEXT NOT NULL,
    old_district    TEXT NULL,
    old_ward        TEXT NULL,
    new_province    TEXT NOT NULL,
    new_district    TEXT NULL,
    new_ward        TEXT NULL
);
CREATE INDEX IF NOT EXISTS idx_migration_p   ON admin_division_migration(old_province);
CREATE INDEX IF NOT EXISTS idx_migration_pd  ON admin_division_migration(old_province, old_district);
CREATE INDEX IF NOT EXISTS idx_migration_pdw ON admin_division_migration(old_province, old_district, old_ward);

CREATE TABLE IF NOT EXISTS meta (
    key     TEXT PRIMARY KEY,
    value   TEXT NOT NULL
);
"#;

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}

fn admin_name_from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<AdminName> {
    Ok(AdminName::from_columns(
        row.get(base)?,
        row.get(base + 1)?,
        row.get(base + 2)?,
        row.get(base + 3)?,
        row.get(base + 4)?,
    ))
}

pub fn read_admin_rows(conn: &Connection) -> rusqlite::Result<Vec<AdminRow>> {
    let mut stmt = conn.prepare(
        "SELECT id,
                province_full, province_prefix, province_name,
                province_name_normalized, province_full_normalized,
                district_full, district_prefix, district_name,
                district_name_normalized, district_full_normalized,
                ward_full, ward_prefix, ward_name,
                ward_name_normalized, ward_full_normalized
         FROM admin_divisions",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(AdminRow {
            id: row.get::<_, i64>(0)? as u64,
            province: admin_name_from_row(row, 1)?,
            district: admin_name_from_row(row, 6)?,
            ward: admin_name_from_row(row, 11)?,
        })
    })?;
    rows.collect()
}

pub fn insert_admin_row(conn: &Connection, row: &AdminRow) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO admin_divisions (
            id,
            province_full, province_prefix, province_name,
            province_name_normalized, province_full_normalized,
            district_full, district_prefix, district_name,
            district_name_normalized, district_full_normalized,
            ward_full, ward_prefix, ward_name,
            ward_name_normalized, ward_full_normalized
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            row.id as i64,
            row.province.full,
            row.province.prefix,
            row.province.name,
            row.province.name_normalized,
            row.province.full_normalized,
            row.district.full,
            row.district.prefix,
            row.district.name,
            row.district.name_normalized,
            row.district.full_normalized,
            row.ward.full,
            row.ward.prefix,
            row.ward.name,
            row.ward.name_normalized,
            row.ward.full_normalized,
        ],
    )?;
    Ok(())
}

pub fn read_abbreviations(conn: &Connection) -> rusqlite::Result<Vec<AbbrevEntry>> {
    let mut stmt = conn.prepare(
        "SELECT key, word, province_context, district_context FROM abbreviations",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(AbbrevEntry {
            key: row.get(0)?,
            word: row.get(1)?,
            province_context: row.get(2)?,
            district_context: row.get(3)?,
        })
    })?;
    rows.collect()
}

pub fn insert_abbreviation(conn: &Connection, entry: &AbbrevEntry) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO abbreviations (key, word, province_context, district_context)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            entry.key,
            entry.word,
            entry.province_context,
            entry.district_context
        ],
    )?;
    Ok(())
}

pub fn read_migrations(conn: &Connection) -> rusqlite::Result<Vec<MigrationEntry>> {
    let mut stmt = conn.prepare(
        "SELECT old_province, old_district, old_ward,
                new_province, new_district, new_ward
         FROM admin_division_migration",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(MigrationEntry {
            old_province: row.get(0)?,
            old_district: row.get(1)?,
            old_ward: row.get(2)?,
            new_province: row.get(3)?,
            new_district: row.get(4)?,
            new_ward: row.get(5)?,
        })
    })?;
    rows.collect()
}

pub fn insert_migration(conn: &Connection, entry: &MigrationEntry) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO admin_division_migration (
            old_province, old_district, old_ward,
            new_province, new_district, new_ward
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.old_province,
            entry.old_district,
            entry.old_ward,
            entry.new_province,
            entry.new_district,
            entry.new_ward,
        ],
    )?;
    Ok(())
}

pub fn write_meta(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

pub fn read_meta(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT value FROM meta WHERE key = ?1")?;
    let mut rows = stmt.query(params![key])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}
