//! Schema loading.
//!
//! Files are applied in numeric filename order, in three phases: tables,
//! then views, then indexes. Any error in the first two phases aborts the
//! load. Index statements are rewritten to their `IF NOT EXISTS` form, so
//! the index phase can be applied again without error.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

/// Schema files every source must provide, in application order.
pub const REQUIRED_FILES: [&str; 13] = [
    "01_core_architecture.sql",
    "02_raw_materials_suppliers.sql",
    "03_preprocessing_operations.sql",
    "04_manufacturing_process.sql",
    "05_aging_maturation.sql",
    "06_quality_control_testing.sql",
    "07_sensory_analysis.sql",
    "08_packaging_operations.sql",
    "09_labeling_regulatory.sql",
    "10_weighing_pricing_distribution.sql",
    "11_shipping_logistics.sql",
    "12_advanced_relationships_views.sql",
    "13_performance_optimization.sql",
];

const EMBEDDED: [(&str, &str); 13] = [
    (REQUIRED_FILES[0], include_str!("../sql/01_core_architecture.sql")),
    (REQUIRED_FILES[1], include_str!("../sql/02_raw_materials_suppliers.sql")),
    (REQUIRED_FILES[2], include_str!("../sql/03_preprocessing_operations.sql")),
    (REQUIRED_FILES[3], include_str!("../sql/04_manufacturing_process.sql")),
    (REQUIRED_FILES[4], include_str!("../sql/05_aging_maturation.sql")),
    (REQUIRED_FILES[5], include_str!("../sql/06_quality_control_testing.sql")),
    (REQUIRED_FILES[6], include_str!("../sql/07_sensory_analysis.sql")),
    (REQUIRED_FILES[7], include_str!("../sql/08_packaging_operations.sql")),
    (REQUIRED_FILES[8], include_str!("../sql/09_labeling_regulatory.sql")),
    (REQUIRED_FILES[9], include_str!("../sql/10_weighing_pricing_distribution.sql")),
    (REQUIRED_FILES[10], include_str!("../sql/11_shipping_logistics.sql")),
    (REQUIRED_FILES[11], include_str!("../sql/12_advanced_relationships_views.sql")),
    (REQUIRED_FILES[12], include_str!("../sql/13_performance_optimization.sql")),
];

/// Files numbered at or above these prefixes belong to the later phases.
const VIEW_PHASE_PREFIX: u32 = 12;
const INDEX_PHASE_PREFIX: u32 = 13;

/// Where schema SQL comes from.
#[derive(Debug, Clone, Default)]
pub enum SchemaSource {
    /// The schema files compiled into this crate.
    #[default]
    Embedded,
    /// A directory of `NN_name.sql` files replacing the embedded ones.
    Directory(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaPhase {
    Tables,
    Views,
    Indexes,
}

#[derive(Debug, Clone)]
pub struct SchemaFile {
    pub name: String,
    pub sql: Cow<'static, str>,
}

impl SchemaFile {
    /// Numeric filename prefix, `None` when the name does not start with digits.
    pub fn ordinal(&self) -> Option<u32> {
        file_ordinal(&self.name)
    }

    pub fn phase(&self) -> SchemaPhase {
        match self.ordinal() {
            Some(n) if n >= INDEX_PHASE_PREFIX => SchemaPhase::Indexes,
            Some(n) if n >= VIEW_PHASE_PREFIX => SchemaPhase::Views,
            _ => SchemaPhase::Tables,
        }
    }
}

impl SchemaSource {
    /// Resolves the ordered list of schema files.
    pub fn files(&self) -> StoreResult<Vec<SchemaFile>> {
        match self {
            SchemaSource::Embedded => Ok(EMBEDDED
                .iter()
                .map(|(name, sql)| SchemaFile {
                    name: (*name).to_string(),
                    sql: Cow::Borrowed(*sql),
                })
                .collect()),
            SchemaSource::Directory(dir) => read_directory(dir),
        }
    }
}

fn read_directory(dir: &Path) -> StoreResult<Vec<SchemaFile>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_sql = path.extension().is_some_and(|ext| ext == "sql");
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !is_sql || file_ordinal(name).is_none() {
            debug!(event = "schema_file_ignored", file = %path.display());
            continue;
        }
        files.push(SchemaFile {
            name: name.to_string(),
            sql: Cow::Owned(fs::read_to_string(&path)?),
        });
    }

    for required in REQUIRED_FILES {
        if !files.iter().any(|file| file.name == required) {
            return Err(StoreError::MissingSchemaFile {
                name: required.to_string(),
                dir: dir.to_path_buf(),
            });
        }
    }

    files.sort_by(|a, b| (a.ordinal(), &a.name).cmp(&(b.ordinal(), &b.name)));
    Ok(files)
}

fn file_ordinal(name: &str) -> Option<u32> {
    let digits: String = name.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// What a schema load applied and what the store holds afterwards.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub files_applied: Vec<String>,
    pub tables: usize,
    pub views: usize,
    pub indexes: usize,
}

/// Applies every schema file to `conn`.
///
/// There is no rollback: a failure leaves whatever the earlier files
/// created. Callers load into a freshly reset store.
pub fn load_schema(conn: &Connection, source: &SchemaSource) -> StoreResult<LoadReport> {
    let files = source.files()?;
    let mut report = LoadReport::default();

    for phase in [SchemaPhase::Tables, SchemaPhase::Views, SchemaPhase::Indexes] {
        for file in files.iter().filter(|file| file.phase() == phase) {
            let sql = match phase {
                SchemaPhase::Indexes => Cow::Owned(make_index_idempotent(&file.sql)),
                _ => Cow::Borrowed(file.sql.as_ref()),
            };
            conn.execute_batch(&sql)
                .map_err(|source| StoreError::SchemaStatement {
                    file: file.name.clone(),
                    source,
                })?;
            debug!(event = "schema_file_applied", file = %file.name, phase = ?phase);
            report.files_applied.push(file.name.clone());
        }
    }

    report.tables = count_objects(conn, "table")?;
    report.views = count_objects(conn, "view")?;
    report.indexes = count_objects(conn, "index")?;
    info!(
        event = "schema_loaded",
        files = report.files_applied.len(),
        tables = report.tables,
        views = report.views,
        indexes = report.indexes
    );
    Ok(report)
}

/// Re-applies only the index phase. Safe to call on a loaded store.
pub fn apply_indexes(conn: &Connection, source: &SchemaSource) -> StoreResult<usize> {
    let mut applied = 0;
    for file in source.files()?.iter().filter(|f| f.phase() == SchemaPhase::Indexes) {
        conn.execute_batch(&make_index_idempotent(&file.sql))
            .map_err(|source| StoreError::SchemaStatement {
                file: file.name.clone(),
                source,
            })?;
        applied += 1;
    }
    Ok(applied)
}

fn count_objects(conn: &Connection, kind: &str) -> StoreResult<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = ?1 AND name NOT LIKE 'sqlite_%'",
        [kind],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

/// Rewrites `CREATE [UNIQUE] INDEX name` to `CREATE [UNIQUE] INDEX IF NOT EXISTS name`.
///
/// Statements are expected to start on their own line.
pub fn make_index_idempotent(sql: &str) -> String {
    const KEYWORDS: [&str; 2] = ["CREATE UNIQUE INDEX", "CREATE INDEX"];

    let mut out = String::with_capacity(sql.len() + 64);
    for line in sql.lines() {
        let body = line.trim_start();
        let indent = &line[..line.len() - body.len()];
        let upper = body.to_ascii_uppercase();
        let keyword = KEYWORDS.iter().find(|kw| {
            upper.starts_with(*kw)
                && upper[kw.len()..].starts_with(char::is_whitespace)
                && !upper[kw.len()..].trim_start().starts_with("IF NOT EXISTS")
        });
        match keyword {
            Some(kw) => {
                out.push_str(indent);
                out.push_str(&body[..kw.len()]);
                out.push_str(" IF NOT EXISTS");
                out.push_str(&body[kw.len()..]);
            }
            None => out.push_str(line),
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_plain_and_unique_indexes() {
        let sql = "CREATE INDEX idx_a ON a (x);\n  create unique index idx_b ON b (y);\n";
        let out = make_index_idempotent(sql);
        assert!(out.contains("CREATE INDEX IF NOT EXISTS idx_a ON a (x);"));
        assert!(out.contains("  create unique index IF NOT EXISTS idx_b ON b (y);"));
    }

    #[test]
    fn leaves_existing_guard_and_other_statements_alone() {
        let sql = "CREATE INDEX IF NOT EXISTS idx_a ON a (x);\n-- CREATE INDEXES later\n";
        assert_eq!(make_index_idempotent(sql), sql);
    }

    #[test]
    fn phases_follow_filename_prefix() {
        let file = |name: &str| SchemaFile {
            name: name.to_string(),
            sql: Cow::Borrowed(""),
        };
        assert_eq!(file("01_core_architecture.sql").phase(), SchemaPhase::Tables);
        assert_eq!(file("12_advanced_relationships_views.sql").phase(), SchemaPhase::Views);
        assert_eq!(file("13_performance_optimization.sql").phase(), SchemaPhase::Indexes);
    }

    #[test]
    fn embedded_files_are_in_required_order() {
        let files = SchemaSource::Embedded.files().expect("files");
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, REQUIRED_FILES);
    }
}
