//! Reads the store's own catalog back into a [`StoreSchema`].

use cheesetrace_core::{Column, ForeignKey, Index, SCHEMA_VERSION, StoreSchema, Table, TableKind};
use rusqlite::{Connection, params};

use crate::error::StoreResult;

pub fn introspect_store(conn: &Connection, database: Option<String>) -> StoreResult<StoreSchema> {
    let mut stmt = conn.prepare(
        "SELECT name, type FROM sqlite_master \
         WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
         ORDER BY name",
    )?;
    let objects = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut tables = Vec::with_capacity(objects.len());
    for (name, kind) in objects {
        let kind = if kind == "view" {
            TableKind::View
        } else {
            TableKind::Table
        };
        let columns = load_columns(conn, &name)?;
        let (foreign_keys, indexes) = match kind {
            TableKind::Table => (load_foreign_keys(conn, &name)?, load_indexes(conn, &name)?),
            TableKind::View => (Vec::new(), Vec::new()),
        };
        tables.push(Table {
            name,
            kind,
            columns,
            foreign_keys,
            indexes,
        });
    }

    Ok(StoreSchema {
        schema_version: SCHEMA_VERSION.to_string(),
        engine: "sqlite".to_string(),
        database,
        tables,
    })
}

fn load_columns(conn: &Connection, table: &str) -> StoreResult<Vec<Column>> {
    let mut stmt = conn.prepare(
        "SELECT cid, name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
    )?;
    let columns = stmt
        .query_map(params![table], |row| {
            Ok(Column {
                ordinal_position: row.get(0)?,
                name: row.get(1)?,
                declared_type: row.get(2)?,
                is_nullable: row.get::<_, i64>(3)? == 0,
                default: row.get(4)?,
                is_primary_key: row.get::<_, i64>(5)? > 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

fn load_foreign_keys(conn: &Connection, table: &str) -> StoreResult<Vec<ForeignKey>> {
    let mut stmt = conn.prepare(
        "SELECT id, \"table\", \"from\", \"to\", on_update, on_delete \
         FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
    )?;
    let rows = stmt
        .query_map(params![table], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut keys: Vec<(i64, ForeignKey)> = Vec::new();
    for (id, referenced_table, from, to, on_update, on_delete) in rows {
        // `to` is NULL when the key references the parent's primary key implicitly.
        let to = match to {
            Some(to) => to,
            None => primary_key_column(conn, &referenced_table)?.unwrap_or_default(),
        };
        match keys.last_mut() {
            Some((last_id, fk)) if *last_id == id => {
                fk.columns.push(from);
                fk.referenced_columns.push(to);
            }
            _ => keys.push((
                id,
                ForeignKey {
                    columns: vec![from],
                    referenced_table,
                    referenced_columns: vec![to],
                    on_update,
                    on_delete,
                },
            )),
        }
    }
    Ok(keys.into_iter().map(|(_, fk)| fk).collect())
}

fn primary_key_column(conn: &Connection, table: &str) -> StoreResult<Option<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) WHERE pk = 1")?;
    let mut rows = stmt.query(params![table])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

fn load_indexes(conn: &Connection, table: &str) -> StoreResult<Vec<Index>> {
    let mut stmt = conn.prepare(
        "SELECT name, \"unique\", origin FROM pragma_index_list(?1) ORDER BY name",
    )?;
    let listed = stmt
        .query_map(params![table], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)? != 0,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut columns_stmt =
        conn.prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;
    let mut indexes = Vec::with_capacity(listed.len());
    for (name, is_unique, origin) in listed {
        let columns = columns_stmt
            .query_map(params![name], |row| row.get::<_, Option<String>>(0))?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect();
        indexes.push(Index {
            name,
            columns,
            is_unique,
            origin,
        });
    }
    Ok(indexes)
}
