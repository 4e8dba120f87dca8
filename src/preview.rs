//! Preview rewriter.
//!
//! Produces a bounded-cost preview of a validated statement without ever
//! touching its filters, join conditions or projections: the preview is a
//! true prefix of the full result, never an approximation. The count-only
//! probe is a separate, explicitly requested operation.

use crate::dialect::Dialect;
use crate::parse::{ParsedStatement, StatementKind};
use serde::{Deserialize, Serialize};
use sqlparser::ast::{Expr, Query, Statement, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewMode {
    /// Row-limited prefix of the full result.
    RowPrefix,
    /// The full statement already bounds its own result size.
    Full,
    /// Explicitly requested `COUNT(*)` probe.
    CountOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewPlan {
    pub preview_statement: String,
    pub full_statement: String,
    /// Upper bound on preview rows, when one can be stated.
    pub estimated_preview_rows: Option<u32>,
    pub mode: PreviewMode,
    pub dialect: Dialect,
}

enum LimitShape {
    Absent,
    Literal(u64),
    Dynamic,
}

/// Rewrite a statement into its row-limited preview. Returns None for
/// write statements, which never reach this on the Pass path.
pub fn rewrite_for_preview(parsed: &ParsedStatement, max_preview_rows: u32) -> Option<PreviewPlan> {
    let dialect = parsed.dialect;
    let full_statement = dialect.render_statement(&parsed.statement);

    match parsed.kind {
        StatementKind::Select => {}
        StatementKind::Other => {
            // Introspection forms (EXPLAIN/SHOW) are already cheap.
            return Some(PreviewPlan {
                preview_statement: full_statement.clone(),
                full_statement,
                estimated_preview_rows: None,
                mode: PreviewMode::Full,
                dialect,
            });
        }
        _ => return None,
    }

    // A top-level aggregate without GROUP BY collapses to a single row;
    // adding a limit would change nothing.
    if parsed.summary.top_level_aggregates > 0 && !parsed.summary.has_group_by {
        return Some(PreviewPlan {
            preview_statement: full_statement.clone(),
            full_statement,
            estimated_preview_rows: Some(1),
            mode: PreviewMode::Full,
            dialect,
        });
    }

    let mut statement = parsed.statement.clone();
    let mut estimated = Some(max_preview_rows);
    if let Statement::Query(query) = &mut statement {
        match current_limit(query) {
            LimitShape::Absent => set_limit(query, max_preview_rows),
            LimitShape::Literal(existing) => {
                if existing <= u64::from(max_preview_rows) {
                    // Never relax an existing limit upward.
                    estimated = Some(existing as u32);
                } else {
                    set_limit(query, max_preview_rows);
                }
            }
            // A parameterized limit cannot be compared; leave it alone.
            LimitShape::Dynamic => estimated = None,
        }
    }

    Some(PreviewPlan {
        preview_statement: dialect.render_statement(&statement),
        full_statement,
        estimated_preview_rows: estimated,
        mode: PreviewMode::RowPrefix,
        dialect,
    })
}

/// Count-only probe over the full result, used when the caller asks for a
/// cardinality check instead of sample rows.
pub fn rewrite_for_count(parsed: &ParsedStatement) -> Option<PreviewPlan> {
    if parsed.kind != StatementKind::Select {
        return None;
    }
    let dialect = parsed.dialect;
    let full_statement = dialect.render_statement(&parsed.statement);
    Some(PreviewPlan {
        preview_statement: dialect.count_wrapper(&full_statement),
        full_statement,
        estimated_preview_rows: Some(1),
        mode: PreviewMode::CountOnly,
        dialect,
    })
}

fn current_limit(query: &Query) -> LimitShape {
    match &query.limit {
        None => LimitShape::Absent,
        Some(Expr::Value(Value::Number(text, _))) => match text.parse::<u64>() {
            Ok(value) => LimitShape::Literal(value),
            Err(_) => LimitShape::Dynamic,
        },
        Some(_) => LimitShape::Dynamic,
    }
}

fn set_limit(query: &mut Query, rows: u32) {
    query.limit = Some(Expr::Value(Value::Number(rows.to_string(), false)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    fn plan(sql: &str, max: u32) -> PreviewPlan {
        let parsed = parse(sql, Dialect::Sqlite).unwrap();
        rewrite_for_preview(&parsed, max).unwrap()
    }

    #[test]
    fn test_limit_appended_when_absent() {
        let plan = plan("SELECT * FROM customers", 50);
        assert_eq!(plan.preview_statement, "SELECT * FROM customers LIMIT 50");
        assert_eq!(plan.full_statement, "SELECT * FROM customers");
        assert_eq!(plan.estimated_preview_rows, Some(50));
        assert_eq!(plan.mode, PreviewMode::RowPrefix);
    }

    #[test]
    fn test_lower_existing_limit_preserved() {
        let plan = plan("SELECT * FROM customers LIMIT 10", 50);
        assert_eq!(plan.preview_statement, "SELECT * FROM customers LIMIT 10");
        assert_eq!(plan.estimated_preview_rows, Some(10));
    }

    #[test]
    fn test_higher_existing_limit_capped() {
        let plan = plan("SELECT * FROM customers LIMIT 500", 50);
        assert_eq!(plan.preview_statement, "SELECT * FROM customers LIMIT 50");
        assert_eq!(plan.estimated_preview_rows, Some(50));
    }

    #[test]
    fn test_single_aggregate_row_needs_no_limit() {
        let plan = plan("SELECT COUNT(*) FROM customers", 50);
        assert_eq!(plan.mode, PreviewMode::Full);
        assert_eq!(plan.preview_statement, plan.full_statement);
        assert_eq!(plan.estimated_preview_rows, Some(1));
    }

    #[test]
    fn test_grouped_aggregate_still_limited() {
        let plan = plan(
            "SELECT customer_id, COUNT(*) FROM orders GROUP BY customer_id",
            50,
        );
        assert_eq!(plan.mode, PreviewMode::RowPrefix);
        assert!(plan.preview_statement.ends_with("LIMIT 50"));
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let first = plan("SELECT * FROM customers", 50);
        let again = plan(&first.preview_statement, 50);
        assert_eq!(first.preview_statement, again.preview_statement);
        assert_eq!(first.estimated_preview_rows, again.estimated_preview_rows);
    }

    #[test]
    fn test_filters_and_projection_untouched() {
        let plan = plan(
            "SELECT name, email FROM customers WHERE email LIKE '%@example.com'",
            25,
        );
        assert!(plan.preview_statement.contains("WHERE email LIKE '%@example.com'"));
        assert!(plan.preview_statement.starts_with("SELECT name, email FROM customers"));
        assert!(plan.preview_statement.ends_with("LIMIT 25"));
    }

    #[test]
    fn test_write_statement_has_no_preview() {
        let parsed = parse("DELETE FROM customers", Dialect::Sqlite).unwrap();
        assert!(rewrite_for_preview(&parsed, 50).is_none());
        assert!(rewrite_for_count(&parsed).is_none());
    }

    #[test]
    fn test_count_probe_wraps_full_statement() {
        let parsed = parse("SELECT * FROM customers WHERE name = 'x'", Dialect::Sqlite).unwrap();
        let plan = rewrite_for_count(&parsed).unwrap();
        assert_eq!(plan.mode, PreviewMode::CountOnly);
        assert_eq!(
            plan.preview_statement,
            "SELECT COUNT(*) FROM (SELECT * FROM customers WHERE name = 'x') AS row_probe"
        );
    }
}
