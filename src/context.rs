//! Schema context for the upstream generator.
//!
//! The generator collaborator prompts an LLM with whatever we hand it, so
//! the context has to fit a token budget: tables are ranked by how much
//! structure they carry and the tail is cut with an explicit marker,
//! never silently.

use crate::dialect::Dialect;
use crate::relationships::RelationshipGraph;
use crate::schema::{SchemaModel, TableDescriptor};
use itertools::Itertools;
use std::cmp::Reverse;

/// Rough chars-per-token factor used to convert the budget.
const CHARS_PER_TOKEN: usize = 4;
const RELATIONSHIP_TABLES: usize = 5;

pub fn schema_context(
    schema: &SchemaModel,
    graph: &RelationshipGraph,
    max_tokens: usize,
) -> String {
    let budget = max_tokens * CHARS_PER_TOKEN;
    let mut parts = vec![format!(
        "Database: {} ({})\nTables: {}",
        schema.database_name,
        schema.dialect,
        schema.tables.len()
    )];
    let mut used = parts[0].len();

    let ranked: Vec<&TableDescriptor> = schema
        .tables
        .iter()
        .sorted_by_key(|t| (Reverse(importance(t)), t.name.clone()))
        .collect();

    let mut truncated = false;
    for table in &ranked {
        let block = table_block(table);
        if used + block.len() > budget {
            truncated = true;
            break;
        }
        used += block.len();
        parts.push(block);
    }

    if truncated {
        parts.push("... (schema truncated to fit the context budget)".to_string());
    } else {
        let lines: Vec<String> = ranked
            .iter()
            .take(RELATIONSHIP_TABLES)
            .filter_map(|table| {
                let related = graph.related_tables(&table.name);
                if related.is_empty() {
                    None
                } else {
                    Some(format!("{} -> {}", table.name, related.join(", ")))
                }
            })
            .collect();
        if !lines.is_empty() {
            let block = format!("Key Relationships:\n{}", lines.join("\n"));
            if used + block.len() <= budget {
                parts.push(block);
            }
        }
    }

    parts.join("\n\n")
}

/// Per-dialect hints the generator needs to emit runnable SQL.
pub fn dialect_guidance(dialect: Dialect) -> String {
    format!(
        "- Target dialect: {}\n\
         - Quote identifiers like {}\n\
         - Current date: {}\n\
         - Seven days ago: {}\n\
         - Page results with LIMIT <n>",
        dialect,
        dialect.quote_identifier("example"),
        dialect.current_date_expr(),
        dialect.date_offset_expr(-7),
    )
}

fn importance(table: &TableDescriptor) -> usize {
    let pk_count = table.primary_keys().len();
    let fk_count = table.foreign_keys.len();
    pk_count * 3 + fk_count * 2
}

fn table_block(table: &TableDescriptor) -> String {
    let mut lines = vec![format!("Table: {}", table.name)];
    for column in &table.columns {
        let mut line = format!("  - {}: {}", column.name, column.declared_type);
        if column.primary_key {
            line.push_str(" (PK)");
        }
        if let Some(fk) = table
            .foreign_keys
            .iter()
            .find(|fk| fk.columns.iter().any(|c| c.eq_ignore_ascii_case(&column.name)))
        {
            let target_column = fk
                .referenced_columns
                .first()
                .map(String::as_str)
                .unwrap_or("?");
            line.push_str(&format!(" (FK -> {}.{})", fk.referenced_table, target_column));
        }
        if !column.nullable && !column.primary_key {
            line.push_str(" (NOT NULL)");
        }
        lines.push(line);
    }
    lines.join("\n")
}
