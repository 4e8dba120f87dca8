//! SQL parser / AST builder.
//!
//! Wraps `sqlparser` with the dialect's grammar profile and walks the tree
//! once at parse time, collecting everything the validator, estimator and
//! preview rewriter need so none of them re-walk the AST. Exactly one
//! top-level statement is accepted; statement stacking is rejected here
//! because it is the classic injection vector, not merely a parsing limit.

use crate::dialect::Dialect;
use crate::error::ParseError;
use sqlparser::ast::{
    BinaryOperator, Expr, FunctionArg, FunctionArgExpr, GroupByExpr, JoinConstraint, JoinOperator,
    ObjectName, Query, Select, SelectItem, SetExpr, Statement, TableFactor, TableWithJoins,
};
use sqlparser::parser::Parser;
use std::collections::{BTreeMap, BTreeSet};

const SNIPPET_CHARS: usize = 48;

const AGGREGATE_FUNCTIONS: &[&str] = &[
    "count",
    "sum",
    "avg",
    "min",
    "max",
    "total",
    "group_concat",
    "string_agg",
    "array_agg",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

/// Everything extracted from the tree in the single parse-time walk.
/// Identifiers are lowercased; table names keep their schema qualifier
/// as a dotted string.
#[derive(Debug, Clone, Default)]
pub struct StatementSummary {
    pub tables: BTreeSet<String>,
    pub columns: BTreeSet<String>,
    pub qualified_columns: BTreeSet<(String, String)>,
    /// alias -> dotted table name
    pub aliases: BTreeMap<String, String>,
    /// CTE and derived-table aliases; not checkable against the schema
    pub derived_aliases: BTreeSet<String>,
    /// output names introduced by `AS` in the projection
    pub projection_aliases: BTreeSet<String>,
    pub functions: BTreeSet<String>,
    /// columns compared for equality (or IN) in predicates
    pub equality_columns: BTreeSet<String>,
    /// first table of the top-level FROM clause
    pub driving_table: Option<String>,
    pub join_count: usize,
    pub unconstrained_joins: usize,
    pub subquery_count: usize,
    pub subquery_depth: usize,
    pub aggregate_count: usize,
    pub top_level_aggregates: usize,
    pub window_count: usize,
    pub has_group_by: bool,
    pub has_order_by: bool,
    pub has_limit: bool,
    pub has_selection: bool,
    pub select_star: bool,
}

#[derive(Debug, Clone)]
pub struct ParsedStatement {
    pub statement: Statement,
    pub kind: StatementKind,
    pub summary: StatementSummary,
    pub dialect: Dialect,
    /// Original input, kept solely for the validator's quote-aware
    /// injection scan. Never rendered back to callers.
    pub raw: String,
}

impl ParsedStatement {
    /// Read-only introspection forms that may be allowlisted through
    /// validation (EXPLAIN / SHOW variants).
    pub fn is_read_only_introspection(&self) -> bool {
        matches!(
            self.statement,
            Statement::Explain { .. }
                | Statement::ShowTables { .. }
                | Statement::ShowColumns { .. }
                | Statement::ShowVariable { .. }
                | Statement::ShowVariables { .. }
        )
    }
}

pub fn parse(text: &str, dialect: Dialect) -> Result<ParsedStatement, ParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ParseError {
            message: "empty statement".to_string(),
            snippet: String::new(),
        });
    }

    let profile = dialect.parser_profile();
    let mut statements = Parser::parse_sql(profile.as_ref(), trimmed).map_err(|e| ParseError {
        message: e.to_string(),
        snippet: snippet_of(trimmed),
    })?;

    if statements.is_empty() {
        return Err(ParseError {
            message: "input contains no statement".to_string(),
            snippet: snippet_of(trimmed),
        });
    }
    if statements.len() > 1 {
        return Err(ParseError {
            message: format!("expected a single statement, found {}", statements.len()),
            snippet: snippet_of(trimmed),
        });
    }
    let statement = statements.remove(0);

    let kind = match &statement {
        Statement::Query(_) => StatementKind::Select,
        Statement::Insert { .. } => StatementKind::Insert,
        Statement::Update { .. } => StatementKind::Update,
        Statement::Delete { .. } => StatementKind::Delete,
        _ => StatementKind::Other,
    };

    let mut summary = StatementSummary::default();
    summarize_statement(&statement, &mut summary);

    Ok(ParsedStatement {
        statement,
        kind,
        summary,
        dialect,
        raw: trimmed.to_string(),
    })
}

fn snippet_of(text: &str) -> String {
    let head: String = text.chars().take(SNIPPET_CHARS).collect();
    if text.chars().count() > SNIPPET_CHARS {
        format!("{}...", head)
    } else {
        head
    }
}

fn object_name_string(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|ident| ident.value.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join(".")
}

fn summarize_statement(statement: &Statement, s: &mut StatementSummary) {
    match statement {
        Statement::Query(query) => walk_query(query, 0, s),
        Statement::Insert { table_name, .. } => {
            s.tables.insert(object_name_string(table_name));
        }
        Statement::Update {
            table, selection, ..
        } => {
            walk_table_with_joins(table, 0, s);
            if let Some(expr) = selection {
                s.has_selection = true;
                walk_expr(expr, 0, s);
            }
        }
        Statement::Delete {
            from, selection, ..
        } => {
            for twj in from {
                walk_table_with_joins(twj, 0, s);
            }
            if let Some(expr) = selection {
                s.has_selection = true;
                walk_expr(expr, 0, s);
            }
        }
        Statement::Explain { statement, .. } => summarize_statement(statement, s),
        _ => {}
    }
}

fn walk_query(query: &Query, depth: usize, s: &mut StatementSummary) {
    if depth > 0 {
        s.subquery_count += 1;
    }
    s.subquery_depth = s.subquery_depth.max(depth);

    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            s.derived_aliases.insert(cte.alias.name.value.to_ascii_lowercase());
            walk_query(&cte.query, depth + 1, s);
        }
    }

    walk_set_expr(&query.body, depth, s);

    if depth == 0 {
        s.has_order_by = !query.order_by.is_empty();
        s.has_limit = query.limit.is_some();
    }
    for order in &query.order_by {
        walk_expr(&order.expr, depth, s);
    }
    if let Some(offset) = &query.offset {
        walk_expr(&offset.value, depth, s);
    }
}

fn walk_set_expr(body: &SetExpr, depth: usize, s: &mut StatementSummary) {
    match body {
        SetExpr::Select(select) => walk_select(select, depth, s),
        SetExpr::Query(query) => walk_query(query, depth + 1, s),
        SetExpr::SetOperation { left, right, .. } => {
            walk_set_expr(left, depth, s);
            walk_set_expr(right, depth, s);
        }
        SetExpr::Values(values) => {
            for row in &values.rows {
                for expr in row {
                    walk_expr(expr, depth, s);
                }
            }
        }
        _ => {}
    }
}

fn walk_select(select: &Select, depth: usize, s: &mut StatementSummary) {
    for item in &select.projection {
        match item {
            SelectItem::UnnamedExpr(expr) => walk_expr(expr, depth, s),
            SelectItem::ExprWithAlias { expr, alias } => {
                s.projection_aliases.insert(alias.value.to_ascii_lowercase());
                walk_expr(expr, depth, s);
            }
            SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(_, _) => {
                s.select_star = true;
            }
        }
    }
    for twj in &select.from {
        walk_table_with_joins(twj, depth, s);
    }
    if let Some(selection) = &select.selection {
        s.has_selection = true;
        collect_equality(selection, s);
        walk_expr(selection, depth, s);
    }
    match &select.group_by {
        GroupByExpr::Expressions(exprs) => {
            if !exprs.is_empty() && depth == 0 {
                s.has_group_by = true;
            }
            for expr in exprs {
                walk_expr(expr, depth, s);
            }
        }
        GroupByExpr::All => {
            if depth == 0 {
                s.has_group_by = true;
            }
        }
    }
    if let Some(having) = &select.having {
        walk_expr(having, depth, s);
    }
}

fn walk_table_with_joins(twj: &TableWithJoins, depth: usize, s: &mut StatementSummary) {
    walk_table_factor(&twj.relation, depth, s);
    for join in &twj.joins {
        s.join_count += 1;
        walk_table_factor(&join.relation, depth, s);
        match &join.join_operator {
            JoinOperator::Inner(constraint)
            | JoinOperator::LeftOuter(constraint)
            | JoinOperator::RightOuter(constraint)
            | JoinOperator::FullOuter(constraint) => {
                if matches!(constraint, JoinConstraint::None) {
                    s.unconstrained_joins += 1;
                }
                walk_join_constraint(constraint, depth, s);
            }
            JoinOperator::CrossJoin => s.unconstrained_joins += 1,
            _ => {}
        }
    }
}

fn walk_join_constraint(constraint: &JoinConstraint, depth: usize, s: &mut StatementSummary) {
    match constraint {
        JoinConstraint::On(expr) => walk_expr(expr, depth, s),
        JoinConstraint::Using(idents) => {
            for ident in idents {
                s.columns.insert(ident.value.to_ascii_lowercase());
            }
        }
        JoinConstraint::Natural | JoinConstraint::None => {}
    }
}

fn walk_table_factor(factor: &TableFactor, depth: usize, s: &mut StatementSummary) {
    match factor {
        TableFactor::Table { name, alias, .. } => {
            let table = object_name_string(name);
            if depth == 0 && s.driving_table.is_none() {
                s.driving_table = Some(table.clone());
            }
            if let Some(alias) = alias {
                s.aliases
                    .insert(alias.name.value.to_ascii_lowercase(), table.clone());
            }
            s.tables.insert(table);
        }
        TableFactor::Derived {
            subquery, alias, ..
        } => {
            if let Some(alias) = alias {
                s.derived_aliases.insert(alias.name.value.to_ascii_lowercase());
            }
            walk_query(subquery, depth + 1, s);
        }
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => walk_table_with_joins(table_with_joins, depth, s),
        _ => {}
    }
}

fn walk_expr(expr: &Expr, depth: usize, s: &mut StatementSummary) {
    match expr {
        Expr::Identifier(ident) => {
            s.columns.insert(ident.value.to_ascii_lowercase());
        }
        Expr::CompoundIdentifier(parts) => {
            if parts.len() >= 2 {
                let qualifier = parts[parts.len() - 2].value.to_ascii_lowercase();
                let column = parts[parts.len() - 1].value.to_ascii_lowercase();
                s.qualified_columns.insert((qualifier, column));
            }
        }
        Expr::BinaryOp { left, right, .. } => {
            walk_expr(left, depth, s);
            walk_expr(right, depth, s);
        }
        Expr::UnaryOp { expr, .. } => walk_expr(expr, depth, s),
        Expr::Nested(inner) => walk_expr(inner, depth, s),
        Expr::IsNull(inner) | Expr::IsNotNull(inner) => walk_expr(inner, depth, s),
        Expr::Between {
            expr, low, high, ..
        } => {
            walk_expr(expr, depth, s);
            walk_expr(low, depth, s);
            walk_expr(high, depth, s);
        }
        Expr::InList { expr, list, .. } => {
            walk_expr(expr, depth, s);
            for item in list {
                walk_expr(item, depth, s);
            }
        }
        Expr::InSubquery { expr, subquery, .. } => {
            walk_expr(expr, depth, s);
            walk_query(subquery, depth + 1, s);
        }
        Expr::Exists { subquery, .. } => walk_query(subquery, depth + 1, s),
        Expr::Subquery(query) => walk_query(query, depth + 1, s),
        Expr::Cast { expr, .. } => walk_expr(expr, depth, s),
        Expr::Like {
            expr, pattern, ..
        }
        | Expr::ILike {
            expr, pattern, ..
        } => {
            walk_expr(expr, depth, s);
            walk_expr(pattern, depth, s);
        }
        Expr::Case {
            operand,
            conditions,
            results,
            else_result,
        } => {
            if let Some(operand) = operand {
                walk_expr(operand, depth, s);
            }
            for expr in conditions.iter().chain(results.iter()) {
                walk_expr(expr, depth, s);
            }
            if let Some(else_result) = else_result {
                walk_expr(else_result, depth, s);
            }
        }
        Expr::Function(function) => {
            let name = object_name_string(&function.name);
            let base = name.rsplit('.').next().unwrap_or(&name).to_string();
            if AGGREGATE_FUNCTIONS.contains(&base.as_str()) {
                s.aggregate_count += 1;
                if depth == 0 {
                    s.top_level_aggregates += 1;
                }
            }
            if function.over.is_some() {
                s.window_count += 1;
            }
            s.functions.insert(name);
            for arg in &function.args {
                let arg_expr = match arg {
                    FunctionArg::Unnamed(inner) => inner,
                    FunctionArg::Named { arg, .. } => arg,
                };
                if let FunctionArgExpr::Expr(expr) = arg_expr {
                    walk_expr(expr, depth, s);
                }
            }
        }
        Expr::Tuple(exprs) => {
            for expr in exprs {
                walk_expr(expr, depth, s);
            }
        }
        _ => {}
    }
}

fn collect_equality(expr: &Expr, s: &mut StatementSummary) {
    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            BinaryOperator::And | BinaryOperator::Or => {
                collect_equality(left, s);
                collect_equality(right, s);
            }
            BinaryOperator::Eq => {
                for side in [left.as_ref(), right.as_ref()] {
                    if let Some(column) = column_of(side) {
                        s.equality_columns.insert(column);
                    }
                }
            }
            _ => {}
        },
        Expr::Nested(inner) => collect_equality(inner, s),
        Expr::InList { expr, .. } => {
            if let Some(column) = column_of(expr) {
                s.equality_columns.insert(column);
            }
        }
        _ => {}
    }
}

fn column_of(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_ascii_lowercase()),
        Expr::CompoundIdentifier(parts) => {
            parts.last().map(|ident| ident.value.to_ascii_lowercase())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_select_parses() {
        let parsed = parse("SELECT * FROM customers", Dialect::Sqlite).unwrap();
        assert_eq!(parsed.kind, StatementKind::Select);
        assert!(parsed.summary.select_star);
        assert!(parsed.summary.tables.contains("customers"));
        assert_eq!(parsed.summary.driving_table.as_deref(), Some("customers"));
    }

    #[test]
    fn test_multiple_statements_rejected() {
        let err = parse(
            "SELECT * FROM customers; DROP TABLE customers",
            Dialect::Sqlite,
        )
        .unwrap_err();
        assert!(err.message.contains("single statement"));
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(parse("   ", Dialect::Sqlite).is_err());
    }

    #[test]
    fn test_garbage_yields_bounded_snippet() {
        let long_garbage = format!("SELEKT {}", "x".repeat(200));
        let err = parse(&long_garbage, Dialect::Sqlite).unwrap_err();
        assert!(err.snippet.len() <= SNIPPET_CHARS + 3);
        assert!(err.snippet.ends_with("..."));
    }

    #[test]
    fn test_statement_kinds() {
        let cases = [
            ("INSERT INTO t (a) VALUES (1)", StatementKind::Insert),
            ("UPDATE t SET a = 1", StatementKind::Update),
            ("DELETE FROM t WHERE a = 1", StatementKind::Delete),
            ("EXPLAIN SELECT 1", StatementKind::Other),
        ];
        for (sql, expected) in cases {
            assert_eq!(parse(sql, Dialect::Sqlite).unwrap().kind, expected, "{}", sql);
        }
    }

    #[test]
    fn test_join_and_alias_summary() {
        let parsed = parse(
            "SELECT c.name, o.total FROM customers AS c \
             JOIN orders o ON c.customer_id = o.customer_id",
            Dialect::Sqlite,
        )
        .unwrap();
        assert_eq!(parsed.summary.join_count, 1);
        assert_eq!(parsed.summary.unconstrained_joins, 0);
        assert_eq!(
            parsed.summary.aliases.get("c").map(String::as_str),
            Some("customers")
        );
        assert!(parsed
            .summary
            .qualified_columns
            .contains(&("o".to_string(), "total".to_string())));
    }

    #[test]
    fn test_subquery_depth_and_count() {
        let parsed = parse(
            "SELECT name FROM customers WHERE customer_id IN \
             (SELECT customer_id FROM orders WHERE total > \
              (SELECT AVG(total) FROM orders))",
            Dialect::Sqlite,
        )
        .unwrap();
        assert_eq!(parsed.summary.subquery_count, 2);
        assert_eq!(parsed.summary.subquery_depth, 2);
        assert_eq!(parsed.summary.aggregate_count, 1);
        assert_eq!(parsed.summary.top_level_aggregates, 0);
    }

    #[test]
    fn test_cte_alias_not_treated_as_table() {
        let parsed = parse(
            "WITH big AS (SELECT * FROM orders WHERE total > 100) SELECT * FROM big",
            Dialect::Sqlite,
        )
        .unwrap();
        assert!(parsed.summary.derived_aliases.contains("big"));
        assert!(parsed.summary.tables.contains("orders"));
    }

    #[test]
    fn test_mysql_backtick_identifiers() {
        let parsed = parse("SELECT `name` FROM `customers`", Dialect::MySql).unwrap();
        assert!(parsed.summary.tables.contains("customers"));
        assert!(parsed.summary.columns.contains("name"));
    }

    #[test]
    fn test_equality_columns_collected() {
        let parsed = parse(
            "SELECT * FROM orders WHERE customer_id = 7 AND total > 10",
            Dialect::Sqlite,
        )
        .unwrap();
        assert!(parsed.summary.equality_columns.contains("customer_id"));
        assert!(!parsed.summary.equality_columns.contains("total"));
    }

    #[test]
    fn test_cross_join_counted_unconstrained() {
        let parsed = parse(
            "SELECT * FROM a CROSS JOIN b",
            Dialect::Sqlite,
        )
        .unwrap();
        assert_eq!(parsed.summary.join_count, 1);
        assert_eq!(parsed.summary.unconstrained_joins, 1);
    }

    #[test]
    fn test_top_level_aggregate_detection() {
        let parsed = parse("SELECT COUNT(*) FROM orders", Dialect::Sqlite).unwrap();
        assert_eq!(parsed.summary.top_level_aggregates, 1);
        assert!(!parsed.summary.has_group_by);
    }
}
