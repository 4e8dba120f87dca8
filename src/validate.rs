//! Safety validator.
//!
//! Pure and deterministic: identical (statement, schema, config) inputs
//! always produce the identical verdict. Rules run in a fixed order; a
//! failed kind check skips the structural rules but the independent
//! text-level rules still run, so a verdict can carry several reasons and
//! no failure is ever silently dropped.

use crate::config::EngineConfig;
use crate::parse::{ParsedStatement, StatementKind};
use crate::schema::SchemaModel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strsim::jaro_winkler;
use tracing::debug;

const SUGGESTION_THRESHOLD: f64 = 0.8;

/// Functions known to touch files, privileges, processes or timing.
const DENIED_FUNCTIONS: &[&str] = &[
    "load_file",
    "load_extension",
    "readfile",
    "writefile",
    "fts3_tokenizer",
    "sleep",
    "benchmark",
    "pg_sleep",
    "pg_read_file",
    "pg_read_binary_file",
    "pg_ls_dir",
    "pg_reload_conf",
    "pg_terminate_backend",
    "pg_cancel_backend",
    "lo_import",
    "lo_export",
    "dblink",
    "dblink_exec",
    "current_setting",
    "set_config",
    "sys_exec",
    "sys_eval",
    "xp_cmdshell",
];

/// Administrative schemas that leak credentials or server state.
const DENIED_SCHEMAS: &[&str] = &[
    "information_schema",
    "pg_catalog",
    "performance_schema",
    "mysql",
    "sys",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReasonKind {
    WriteOperationForbidden,
    InjectionPattern,
    DisallowedConstruct,
    UnknownObject,
    ComplexityExceeded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reason {
    pub kind: ReasonKind,
    pub detail: String,
    /// The offending identifier, when one exists.
    pub object: Option<String>,
    /// A close known name, when one exists.
    pub suggestion: Option<String>,
}

impl Reason {
    fn new(kind: ReasonKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            object: None,
            suggestion: None,
        }
    }

    fn with_object(kind: ReasonKind, detail: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            object: Some(object.into()),
            suggestion: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub outcome: Outcome,
    pub reasons: Vec<Reason>,
    /// The statement re-rendered from its AST, present iff the verdict is
    /// Pass. Downstream execution never sees the raw candidate text.
    pub sanitized_statement: Option<String>,
}

impl ValidationVerdict {
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Pass
    }
}

pub fn validate(
    parsed: &ParsedStatement,
    schema: &SchemaModel,
    config: &EngineConfig,
) -> ValidationVerdict {
    let mut reasons: Vec<Reason> = Vec::new();

    // Rule 1: statement kind. Exhaustive over the closed sum type.
    let kind_ok = match parsed.kind {
        StatementKind::Select => true,
        StatementKind::Insert => {
            reasons.push(Reason::new(
                ReasonKind::WriteOperationForbidden,
                "INSERT statements modify data",
            ));
            false
        }
        StatementKind::Update => {
            reasons.push(Reason::new(
                ReasonKind::WriteOperationForbidden,
                "UPDATE statements modify data",
            ));
            false
        }
        StatementKind::Delete => {
            reasons.push(Reason::new(
                ReasonKind::WriteOperationForbidden,
                "DELETE statements modify data",
            ));
            false
        }
        StatementKind::Other => {
            if config.allow_introspection_statements && parsed.is_read_only_introspection() {
                true
            } else {
                reasons.push(Reason::new(
                    ReasonKind::WriteOperationForbidden,
                    "statement is not a read-only SELECT",
                ));
                false
            }
        }
    };

    // Rule 2: quote-aware separator/comment scan of the raw input, as
    // defense in depth behind the single-statement parser.
    for finding in injection_findings(&parsed.raw) {
        reasons.push(Reason::new(ReasonKind::InjectionPattern, finding));
    }

    // Rule 3: denylisted functions and administrative schemas.
    for function in &parsed.summary.functions {
        let base = function.rsplit('.').next().unwrap_or(function);
        if DENIED_FUNCTIONS.contains(&base) {
            reasons.push(Reason::with_object(
                ReasonKind::DisallowedConstruct,
                format!("function {} is denylisted", base),
                base,
            ));
        }
    }
    for table in &parsed.summary.tables {
        let head = table.split('.').next().unwrap_or(table);
        if DENIED_SCHEMAS.contains(&head) || head.starts_with("sqlite_") || head.starts_with("pg_")
        {
            reasons.push(Reason::with_object(
                ReasonKind::DisallowedConstruct,
                format!("{} belongs to an administrative schema", table),
                table.clone(),
            ));
        }
    }

    // Structural rules only make sense for readable statements.
    if kind_ok {
        check_object_existence(parsed, schema, &mut reasons);

        // Rule 5: structural bounds.
        if parsed.summary.join_count > config.max_join_count {
            reasons.push(Reason::new(
                ReasonKind::ComplexityExceeded,
                format!(
                    "join count {} exceeds the configured maximum of {}",
                    parsed.summary.join_count, config.max_join_count
                ),
            ));
        }
        if parsed.summary.subquery_depth > config.max_subquery_depth {
            reasons.push(Reason::new(
                ReasonKind::ComplexityExceeded,
                format!(
                    "subquery depth {} exceeds the configured maximum of {}",
                    parsed.summary.subquery_depth, config.max_subquery_depth
                ),
            ));
        }
    }

    if reasons.is_empty() {
        ValidationVerdict {
            outcome: Outcome::Pass,
            reasons,
            sanitized_statement: Some(parsed.dialect.render_statement(&parsed.statement)),
        }
    } else {
        debug!("rejecting statement with {} reason(s)", reasons.len());
        ValidationVerdict {
            outcome: Outcome::Reject,
            reasons,
            sanitized_statement: None,
        }
    }
}

/// Rule 4: every referenced table and column must exist in the snapshot,
/// case-insensitively. Aliases resolve through the summary; CTE/derived
/// aliases and projection output names are exempt.
fn check_object_existence(parsed: &ParsedStatement, schema: &SchemaModel, reasons: &mut Vec<Reason>) {
    let summary = &parsed.summary;

    let mut known_tables: BTreeSet<String> = BTreeSet::new();
    for table in &summary.tables {
        let base = table.rsplit('.').next().unwrap_or(table);
        if summary.derived_aliases.contains(table) || summary.derived_aliases.contains(base) {
            continue;
        }
        match schema.table(base) {
            Some(_) => {
                known_tables.insert(base.to_string());
            }
            None => {
                let table_names: Vec<&str> = schema.table_names();
                let suggestion = best_suggestion(base, table_names.iter().copied());
                reasons.push(Reason {
                    kind: ReasonKind::UnknownObject,
                    detail: format!("table {} does not exist in the schema", base),
                    object: Some(base.to_string()),
                    suggestion,
                });
            }
        }
    }

    // Columns belonging to any referenced table that does exist.
    let mut known_columns: BTreeSet<String> = BTreeSet::new();
    for table in &known_tables {
        if let Some(descriptor) = schema.table(table) {
            for column in &descriptor.columns {
                known_columns.insert(column.name.to_ascii_lowercase());
            }
        }
    }

    for column in &summary.columns {
        if summary.projection_aliases.contains(column)
            || summary.derived_aliases.contains(column)
        {
            continue;
        }
        if !known_columns.contains(column) {
            let suggestion = best_suggestion(column, known_columns.iter().map(String::as_str));
            reasons.push(Reason {
                kind: ReasonKind::UnknownObject,
                detail: format!("column {} does not exist in any referenced table", column),
                object: Some(column.clone()),
                suggestion,
            });
        }
    }

    for (qualifier, column) in &summary.qualified_columns {
        if summary.derived_aliases.contains(qualifier) {
            continue;
        }
        let table_name = summary
            .aliases
            .get(qualifier)
            .map(String::as_str)
            .unwrap_or(qualifier.as_str());
        let base = table_name.rsplit('.').next().unwrap_or(table_name);
        let Some(descriptor) = schema.table(base) else {
            // The table rule already reported unknown tables.
            continue;
        };
        if !descriptor.has_column(column) {
            let suggestion = best_suggestion(
                column,
                descriptor.columns.iter().map(|c| c.name.as_str()),
            );
            reasons.push(Reason {
                kind: ReasonKind::UnknownObject,
                detail: format!("column {}.{} does not exist", base, column),
                object: Some(format!("{}.{}", base, column)),
                suggestion,
            });
        }
    }
}

/// Scan raw text for separators and comment tokens outside quoted
/// literals. Returns each distinct finding once.
fn injection_findings(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let mut findings: Vec<String> = Vec::new();
    let push = |findings: &mut Vec<String>, finding: &str| {
        if !findings.iter().any(|f| f == finding) {
            findings.push(finding.to_string());
        }
    };

    let mut i = 0;
    let mut in_single = false;
    let mut in_double = false;
    let mut in_backtick = false;
    while i < n {
        let c = chars[i];
        if in_single {
            if c == '\'' {
                if i + 1 < n && chars[i + 1] == '\'' {
                    i += 2;
                    continue;
                }
                in_single = false;
            }
            i += 1;
            continue;
        }
        if in_double {
            if c == '"' {
                if i + 1 < n && chars[i + 1] == '"' {
                    i += 2;
                    continue;
                }
                in_double = false;
            }
            i += 1;
            continue;
        }
        if in_backtick {
            if c == '`' {
                in_backtick = false;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' => in_single = true,
            '"' => in_double = true,
            '`' => in_backtick = true,
            ';' => {
                push(&mut findings, "statement separator in candidate statement");
            }
            '-' if i + 1 < n && chars[i + 1] == '-' => {
                push(&mut findings, "line comment in candidate statement");
            }
            '/' if i + 1 < n && chars[i + 1] == '*' => {
                push(&mut findings, "block comment in candidate statement");
            }
            _ => {}
        }
        i += 1;
    }
    findings
}

fn best_suggestion<'a>(target: &str, candidates: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut best: Option<(f64, String)> = None;
    for candidate in candidates {
        let score = jaro_winkler(&target.to_ascii_lowercase(), &candidate.to_ascii_lowercase());
        if score < SUGGESTION_THRESHOLD {
            continue;
        }
        let better = match &best {
            Some((best_score, _)) => score > *best_score,
            None => true,
        };
        if better {
            best = Some((score, candidate.to_string()));
        }
    }
    best.map(|(_, name)| name)
}
