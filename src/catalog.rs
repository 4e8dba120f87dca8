//! Schema catalog: turns a live connection into a `SchemaModel` snapshot
//! using read-only metadata queries only; no row data is ever touched.
//!
//! Built-in introspection covers SQLite. Server engines (MySQL/Postgres)
//! are owned by the collaborator holding the connection, which assembles
//! the snapshot from the descriptor types directly; asking the built-in
//! path for them yields `UnsupportedDialect`.

use crate::dialect::Dialect;
use crate::error::IntrospectionError;
use crate::schema::{
    ColumnDescriptor, ForeignKeyDescriptor, SchemaModel, TableDescriptor, TypeCategory,
};
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

/// Where and what to introspect. `location` is a file path for SQLite and
/// a server URL for the other engines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub name: String,
    pub dialect: Dialect,
    pub location: String,
}

/// Introspect the database behind `descriptor` into a snapshot.
/// `timeout` bounds how long metadata queries may wait on engine locks.
pub fn introspect(
    descriptor: &ConnectionDescriptor,
    timeout: Duration,
) -> Result<SchemaModel, IntrospectionError> {
    match descriptor.dialect {
        Dialect::Sqlite => {
            let conn = Connection::open_with_flags(
                &descriptor.location,
                OpenFlags::SQLITE_OPEN_READ_ONLY,
            )
            .map_err(|e| IntrospectionError::ConnectionFailed(e.to_string()))?;
            conn.busy_timeout(timeout)
                .map_err(|e| IntrospectionError::ConnectionFailed(e.to_string()))?;
            introspect_connection(&conn, &descriptor.name)
        }
        other => Err(IntrospectionError::UnsupportedDialect(format!(
            "built-in introspection covers sqlite only; {} snapshots are assembled by the \
             connection owner",
            other
        ))),
    }
}

/// Introspect an already-open SQLite handle. Exposed so embedded callers
/// and tests can skip the file round trip.
pub fn introspect_connection(
    conn: &Connection,
    name: &str,
) -> Result<SchemaModel, IntrospectionError> {
    let table_names = list_tables(conn)?;
    debug!("found {} tables in {}", table_names.len(), name);

    let mut tables = Vec::with_capacity(table_names.len());
    for table_name in &table_names {
        // Primary keys come out of table_info, so they land before
        // foreign-key detection runs for this table.
        let columns = load_columns(conn, table_name)?;
        let foreign_keys = load_foreign_keys(conn, table_name)?;
        tables.push(TableDescriptor {
            name: table_name.clone(),
            columns,
            foreign_keys,
        });
    }

    resolve_implicit_fk_targets(&mut tables);
    infer_foreign_keys(&mut tables);

    let model = SchemaModel::new(name, Dialect::Sqlite, tables);
    info!(
        "introspected schema {} ({} tables, partial={})",
        name,
        model.tables.len(),
        model.partial
    );
    Ok(model)
}

fn map_sqlite_err(e: rusqlite::Error) -> IntrospectionError {
    let message = e.to_string();
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("authoriz") || lowered.contains("access") {
        IntrospectionError::PermissionDenied(message)
    } else {
        IntrospectionError::ConnectionFailed(message)
    }
}

fn list_tables(conn: &Connection) -> Result<Vec<String>, IntrospectionError> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .map_err(map_sqlite_err)?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(map_sqlite_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(map_sqlite_err)?;
    Ok(names)
}

fn load_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnDescriptor>, IntrospectionError> {
    let mut stmt = conn
        .prepare(
            "SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1) ORDER BY cid",
        )
        .map_err(map_sqlite_err)?;
    let columns = stmt
        .query_map([table], |row| {
            let name: String = row.get(0)?;
            let declared: String = row.get(1)?;
            let not_null: i64 = row.get(2)?;
            let pk: i64 = row.get(3)?;
            Ok(ColumnDescriptor {
                category: TypeCategory::from_declared(&declared),
                name,
                declared_type: declared,
                nullable: not_null == 0 && pk == 0,
                primary_key: pk > 0,
            })
        })
        .map_err(map_sqlite_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(map_sqlite_err)?;
    Ok(columns)
}

fn load_foreign_keys(
    conn: &Connection,
    table: &str,
) -> Result<Vec<ForeignKeyDescriptor>, IntrospectionError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, \"table\", \"from\", \"to\" FROM pragma_foreign_key_list(?1) \
             ORDER BY id, seq",
        )
        .map_err(map_sqlite_err)?;
    let rows = stmt
        .query_map([table], |row| {
            let id: i64 = row.get(0)?;
            let referenced_table: String = row.get(1)?;
            let from: String = row.get(2)?;
            let to: Option<String> = row.get(3)?;
            Ok((id, referenced_table, from, to))
        })
        .map_err(map_sqlite_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(map_sqlite_err)?;

    // Multi-column constraints arrive as one row per column, grouped by id.
    let mut grouped: BTreeMap<i64, ForeignKeyDescriptor> = BTreeMap::new();
    for (id, referenced_table, from, to) in rows {
        let entry = grouped.entry(id).or_insert_with(|| ForeignKeyDescriptor {
            columns: Vec::new(),
            referenced_table,
            referenced_columns: Vec::new(),
            inferred: false,
        });
        entry.columns.push(from);
        if let Some(to) = to {
            entry.referenced_columns.push(to);
        }
    }
    Ok(grouped.into_values().collect())
}

/// A declared FK with no explicit target column references the target's
/// primary key. Fill those in once every table is loaded.
fn resolve_implicit_fk_targets(tables: &mut [TableDescriptor]) {
    let pk_map: BTreeMap<String, Vec<String>> = tables
        .iter()
        .map(|t| {
            (
                t.name.to_ascii_lowercase(),
                t.primary_keys().iter().map(|c| c.name.clone()).collect(),
            )
        })
        .collect();
    for table in tables.iter_mut() {
        for fk in table.foreign_keys.iter_mut() {
            if fk.referenced_columns.is_empty() {
                if let Some(pks) = pk_map.get(&fk.referenced_table.to_ascii_lowercase()) {
                    fk.referenced_columns = pks.clone();
                }
            }
        }
    }
}

/// Naming-convention fallback for databases with no declared constraints:
/// a column named `<table>_id` or `<singular-table>_id` pointing at a
/// table with a matching key becomes an inferred foreign key. Declared
/// constraints always win; a column they already cover is skipped.
fn infer_foreign_keys(tables: &mut [TableDescriptor]) {
    let candidates: Vec<(String, Vec<String>)> = tables
        .iter()
        .map(|t| {
            let mut names = vec![t.name.to_ascii_lowercase()];
            let singular = singularize(&t.name);
            if singular != names[0] {
                names.push(singular);
            }
            (t.name.clone(), names)
        })
        .collect();
    let key_columns: BTreeMap<String, Option<String>> = tables
        .iter()
        .map(|t| {
            let pks = t.primary_keys();
            let key = if pks.len() == 1 {
                Some(pks[0].name.clone())
            } else {
                t.column("id").map(|c| c.name.clone())
            };
            (t.name.to_ascii_lowercase(), key)
        })
        .collect();

    for table in tables.iter_mut() {
        let declared: Vec<String> = table
            .foreign_key_columns()
            .iter()
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let mut inferred = Vec::new();
        for column in &table.columns {
            let lowered = column.name.to_ascii_lowercase();
            if column.primary_key || declared.contains(&lowered) {
                continue;
            }
            for (target, names) in &candidates {
                if target.eq_ignore_ascii_case(&table.name) {
                    continue;
                }
                let hit = names.iter().any(|n| lowered == format!("{}_id", n));
                if !hit {
                    continue;
                }
                let target_key = key_columns
                    .get(&target.to_ascii_lowercase())
                    .cloned()
                    .flatten();
                if let Some(key) = target_key {
                    debug!(
                        "inferred foreign key {}.{} -> {}.{}",
                        table.name, column.name, target, key
                    );
                    inferred.push(ForeignKeyDescriptor {
                        columns: vec![column.name.clone()],
                        referenced_table: target.clone(),
                        referenced_columns: vec![key],
                        inferred: true,
                    });
                    break;
                }
            }
        }
        table.foreign_keys.extend(inferred);
    }
}

fn singularize(name: &str) -> String {
    let lowered = name.to_ascii_lowercase();
    if let Some(stem) = lowered.strip_suffix("ies") {
        format!("{}y", stem)
    } else if let Some(stem) = lowered.strip_suffix('s') {
        stem.to_string()
    } else {
        lowered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE customers (
                 customer_id INTEGER PRIMARY KEY,
                 name TEXT NOT NULL,
                 email VARCHAR(255)
             );
             CREATE TABLE orders (
                 order_id INTEGER PRIMARY KEY,
                 customer_id INTEGER NOT NULL REFERENCES customers(customer_id),
                 total DECIMAL(10,2)
             );
             CREATE TABLE shipments (
                 shipment_id INTEGER PRIMARY KEY,
                 order_id INTEGER,
                 carrier TEXT
             );",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_introspects_tables_and_columns() {
        let model = introspect_connection(&fixture_connection(), "shop").unwrap();
        assert_eq!(model.tables.len(), 3);
        let customers = model.table("customers").unwrap();
        assert!(customers.column("customer_id").unwrap().primary_key);
        assert_eq!(
            customers.column("email").unwrap().category,
            TypeCategory::Text
        );
        assert!(!model.partial);
    }

    #[test]
    fn test_declared_foreign_key_detected() {
        let model = introspect_connection(&fixture_connection(), "shop").unwrap();
        let orders = model.table("orders").unwrap();
        let fk = orders
            .foreign_keys
            .iter()
            .find(|fk| !fk.inferred)
            .expect("declared fk");
        assert_eq!(fk.referenced_table, "customers");
        assert_eq!(fk.referenced_columns, vec!["customer_id".to_string()]);
    }

    #[test]
    fn test_naming_convention_inference_without_constraint() {
        let model = introspect_connection(&fixture_connection(), "shop").unwrap();
        let shipments = model.table("shipments").unwrap();
        let fk = shipments
            .foreign_keys
            .iter()
            .find(|fk| fk.inferred)
            .expect("inferred fk");
        assert_eq!(fk.referenced_table, "orders");
        assert_eq!(fk.columns, vec!["order_id".to_string()]);
    }

    #[test]
    fn test_inference_never_overrides_declared() {
        let model = introspect_connection(&fixture_connection(), "shop").unwrap();
        let orders = model.table("orders").unwrap();
        // customer_id already has a declared constraint; no inferred twin.
        let inferred_on_customer = orders
            .foreign_keys
            .iter()
            .filter(|fk| fk.inferred && fk.columns == vec!["customer_id".to_string()])
            .count();
        assert_eq!(inferred_on_customer, 0);
    }

    #[test]
    fn test_unsupported_dialect_is_refused() {
        let descriptor = ConnectionDescriptor {
            name: "warehouse".to_string(),
            dialect: Dialect::Postgres,
            location: "postgres://localhost/warehouse".to_string(),
        };
        let err = introspect(&descriptor, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, IntrospectionError::UnsupportedDialect(_)));
    }

    #[test]
    fn test_singularize() {
        assert_eq!(singularize("customers"), "customer");
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("staff"), "staff");
    }
}
