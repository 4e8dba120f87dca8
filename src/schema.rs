//! Dialect-neutral schema model produced by introspection.
//!
//! Tables and columns are plain data discovered at runtime, so everything
//! here is mapping-based; no per-table generated types anywhere. Lookups
//! are case-insensitive to match how the supported engines resolve
//! identifiers.

use crate::dialect::Dialect;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

lazy_static! {
    static ref SIZE_SPEC_RE: Regex = Regex::new(r"\([^)]*\)").unwrap();
}

/// Normalized type category for a column, independent of how the engine
/// spells the declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeCategory {
    Integer,
    Decimal,
    Text,
    Datetime,
    Boolean,
    Binary,
    Unknown,
}

impl TypeCategory {
    /// Map a declared type like `VARCHAR(255)` or `BIGINT UNSIGNED` to a
    /// category. Size specs are stripped first, then the base keyword wins.
    pub fn from_declared(declared: &str) -> Self {
        let base = SIZE_SPEC_RE.replace_all(declared, "");
        let base = base.trim().to_ascii_uppercase();
        let head = base.split_whitespace().next().unwrap_or("");
        match head {
            "INT" | "INTEGER" | "BIGINT" | "SMALLINT" | "TINYINT" | "MEDIUMINT" | "INT2"
            | "INT4" | "INT8" | "SERIAL" | "BIGSERIAL" => TypeCategory::Integer,
            "REAL" | "FLOAT" | "DOUBLE" | "DECIMAL" | "NUMERIC" | "MONEY" => TypeCategory::Decimal,
            "TEXT" | "VARCHAR" | "CHAR" | "NVARCHAR" | "NCHAR" | "CLOB" | "LONGTEXT"
            | "MEDIUMTEXT" | "TINYTEXT" | "STRING" | "ENUM" | "UUID" | "JSON" | "JSONB" => {
                TypeCategory::Text
            }
            "DATE" | "TIME" | "DATETIME" | "TIMESTAMP" | "TIMESTAMPTZ" => TypeCategory::Datetime,
            "BOOL" | "BOOLEAN" => TypeCategory::Boolean,
            "BLOB" | "BYTEA" | "BINARY" | "VARBINARY" | "LONGBLOB" | "MEDIUMBLOB" => {
                TypeCategory::Binary
            }
            _ => TypeCategory::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub declared_type: String,
    pub category: TypeCategory,
    pub nullable: bool,
    pub primary_key: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKeyDescriptor {
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    /// true when derived from naming conventions rather than a declared
    /// constraint. Inferred keys never override declared ones.
    pub inferred: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
}

impl TableDescriptor {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn primary_keys(&self) -> Vec<&ColumnDescriptor> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }

    /// Columns participating in any foreign key, declared or inferred.
    pub fn foreign_key_columns(&self) -> Vec<&str> {
        self.foreign_keys
            .iter()
            .flat_map(|fk| fk.columns.iter().map(String::as_str))
            .collect()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

/// Immutable snapshot of an introspected database. A refresh produces a
/// new snapshot; in-flight validations keep seeing the old one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaModel {
    pub database_name: String,
    pub dialect: Dialect,
    pub tables: Vec<TableDescriptor>,
    /// Set when a foreign key references a table or column outside the
    /// introspected scope (e.g. cross-schema references).
    pub partial: bool,
    pub introspected_at: DateTime<Utc>,
}

impl SchemaModel {
    pub fn new(database_name: impl Into<String>, dialect: Dialect, tables: Vec<TableDescriptor>) -> Self {
        let mut model = Self {
            database_name: database_name.into(),
            dialect,
            tables,
            partial: false,
            introspected_at: Utc::now(),
        };
        model.partial = model.has_dangling_foreign_key();
        model
    }

    fn has_dangling_foreign_key(&self) -> bool {
        self.tables.iter().any(|t| {
            t.foreign_keys.iter().any(|fk| match self.table(&fk.referenced_table) {
                Some(target) => fk
                    .referenced_columns
                    .iter()
                    .any(|c| !target.has_column(c)),
                None => true,
            })
        })
    }

    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Stable hash over the structural content of the snapshot, usable as
    /// a cache key for derived artifacts. Excludes the snapshot timestamp.
    pub fn fingerprint(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        for table in &self.tables {
            for col in &table.columns {
                lines.push(format!(
                    "{}|{}|{}|{}|{}",
                    table.name.to_ascii_lowercase(),
                    col.name.to_ascii_lowercase(),
                    col.declared_type.to_ascii_lowercase(),
                    col.nullable,
                    col.primary_key,
                ));
            }
            for fk in &table.foreign_keys {
                lines.push(format!(
                    "{}|fk|{}|{}|{}|{}",
                    table.name.to_ascii_lowercase(),
                    fk.columns.join(",").to_ascii_lowercase(),
                    fk.referenced_table.to_ascii_lowercase(),
                    fk.referenced_columns.join(",").to_ascii_lowercase(),
                    fk.inferred,
                ));
            }
        }
        lines.sort();
        let mut hasher = Sha256::new();
        for line in &lines {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    pub fn search_tables(&self, term: &str) -> Vec<&TableDescriptor> {
        let term = term.to_ascii_lowercase();
        self.tables
            .iter()
            .filter(|t| t.name.to_ascii_lowercase().contains(&term))
            .collect()
    }

    pub fn search_columns(&self, term: &str) -> Vec<(&str, &ColumnDescriptor)> {
        let term = term.to_ascii_lowercase();
        self.tables
            .iter()
            .flat_map(|t| {
                t.columns
                    .iter()
                    .filter(|c| c.name.to_ascii_lowercase().contains(&term))
                    .map(move |c| (t.name.as_str(), c))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, declared: &str, pk: bool) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            declared_type: declared.to_string(),
            category: TypeCategory::from_declared(declared),
            nullable: !pk,
            primary_key: pk,
        }
    }

    fn sample_model() -> SchemaModel {
        SchemaModel::new(
            "shop",
            Dialect::Sqlite,
            vec![
                TableDescriptor {
                    name: "customers".to_string(),
                    columns: vec![
                        column("customer_id", "INTEGER", true),
                        column("name", "TEXT", false),
                        column("email", "VARCHAR(255)", false),
                    ],
                    foreign_keys: vec![],
                },
                TableDescriptor {
                    name: "orders".to_string(),
                    columns: vec![
                        column("order_id", "INTEGER", true),
                        column("customer_id", "INTEGER", false),
                        column("total", "DECIMAL(10,2)", false),
                    ],
                    foreign_keys: vec![ForeignKeyDescriptor {
                        columns: vec!["customer_id".to_string()],
                        referenced_table: "customers".to_string(),
                        referenced_columns: vec!["customer_id".to_string()],
                        inferred: false,
                    }],
                },
            ],
        )
    }

    #[test]
    fn test_type_category_normalization() {
        assert_eq!(TypeCategory::from_declared("VARCHAR(255)"), TypeCategory::Text);
        assert_eq!(TypeCategory::from_declared("bigint"), TypeCategory::Integer);
        assert_eq!(TypeCategory::from_declared("DECIMAL(10,2)"), TypeCategory::Decimal);
        assert_eq!(TypeCategory::from_declared("timestamp"), TypeCategory::Datetime);
        assert_eq!(TypeCategory::from_declared("GEOMETRY"), TypeCategory::Unknown);
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let model = sample_model();
        assert!(model.has_table("CUSTOMERS"));
        assert!(model.table("Orders").unwrap().has_column("Customer_ID"));
        assert!(!model.has_table("ghost_table"));
    }

    #[test]
    fn test_fingerprint_is_stable_and_sensitive() {
        let a = sample_model();
        let b = sample_model();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let mut c = sample_model();
        c.tables[0].columns[1].nullable = false;
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_dangling_foreign_key_marks_partial() {
        let mut tables = sample_model().tables;
        tables[1].foreign_keys[0].referenced_table = "archived_customers".to_string();
        let model = SchemaModel::new("shop", Dialect::Sqlite, tables);
        assert!(model.partial);
        assert!(!sample_model().partial);
    }

    #[test]
    fn test_search() {
        let model = sample_model();
        assert_eq!(model.search_tables("ord").len(), 1);
        let hits = model.search_columns("customer");
        assert_eq!(hits.len(), 2);
    }
}
