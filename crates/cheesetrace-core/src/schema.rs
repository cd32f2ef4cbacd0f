use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Snapshot of a generated store's schema, as read back from SQLite.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StoreSchema {
    /// Contract version for this schema format.
    pub schema_version: String,
    /// Storage engine identifier (always `sqlite` today).
    pub engine: String,
    /// Store file path when the store is file-backed.
    pub database: Option<String>,
    /// Tables and views, ordered by name.
    pub tables: Vec<Table>,
}

/// A table or view in the store.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Table {
    pub name: String,
    pub kind: TableKind,
    pub columns: Vec<Column>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<Index>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Table,
    View,
}

/// Column metadata from `pragma_table_info`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Column {
    pub ordinal_position: i64,
    pub name: String,
    /// Declared type as written in the DDL, empty for untyped view columns.
    pub declared_type: String,
    pub is_nullable: bool,
    pub default: Option<String>,
    pub is_primary_key: bool,
}

/// Foreign key from `pragma_foreign_key_list`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct ForeignKey {
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub on_update: String,
    pub on_delete: String,
}

/// Index from `pragma_index_list` / `pragma_index_info`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
    /// `c` for `CREATE INDEX`, `u` for UNIQUE constraints, `pk` for primary keys.
    pub origin: String,
}

impl StoreSchema {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|table| table.name == name)
    }

    pub fn base_tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter().filter(|table| table.kind == TableKind::Table)
    }

    pub fn views(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter().filter(|table| table.kind == TableKind::View)
    }

    pub fn foreign_key_count(&self) -> usize {
        self.tables.iter().map(|table| table.foreign_keys.len()).sum()
    }

    /// Checks that every foreign key points at a known table and column.
    pub fn validate(&self) -> Result<()> {
        for table in self.base_tables() {
            for fk in &table.foreign_keys {
                if fk.columns.len() != fk.referenced_columns.len() {
                    return Err(Error::InvalidSchema(format!(
                        "foreign key on {}({}) has mismatched column counts",
                        table.name,
                        fk.columns.join(", ")
                    )));
                }
                let target = self.table(&fk.referenced_table).ok_or_else(|| {
                    Error::InvalidSchema(format!(
                        "{} references missing table {}",
                        table.name, fk.referenced_table
                    ))
                })?;
                for column in &fk.referenced_columns {
                    if !target.columns.iter().any(|c| &c.name == column) {
                        return Err(Error::InvalidSchema(format!(
                            "{} references missing column {}.{}",
                            table.name, fk.referenced_table, column
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

impl Table {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column.name == name)
    }
}
