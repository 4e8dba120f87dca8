//! Dialect adapter: the single home of SQL surface-syntax divergence.
//!
//! Every other component stays dialect-agnostic: the parser asks this
//! module for a grammar profile, the validator and preview rewriter render
//! statements through it, and the generator context asks it for the
//! dialect-specific hints (quoting, dates, paging).

use serde::{Deserialize, Serialize};
use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect as GrammarProfile, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sqlite,
    MySql,
    Postgres,
}

impl Dialect {
    /// Grammar profile handed to the parser so backticks, `LIMIT` forms
    /// and the other per-engine quirks tokenize correctly.
    pub fn parser_profile(&self) -> Box<dyn GrammarProfile> {
        match self {
            Dialect::Sqlite => Box::new(SQLiteDialect {}),
            Dialect::MySql => Box::new(MySqlDialect {}),
            Dialect::Postgres => Box::new(PostgreSqlDialect {}),
        }
    }

    /// Quote an identifier the way this engine expects.
    pub fn quote_identifier(&self, name: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", name.replace('`', "``")),
            Dialect::Sqlite | Dialect::Postgres => {
                format!("\"{}\"", name.replace('"', "\"\""))
            }
        }
    }

    /// Render an AST node back to statement text. This is the only way
    /// statement text leaves the engine; raw candidate input never does.
    pub fn render_statement(&self, statement: &Statement) -> String {
        statement.to_string()
    }

    /// Wrap a rendered SELECT in a count-only probe.
    pub fn count_wrapper(&self, inner: &str) -> String {
        format!("SELECT COUNT(*) FROM ({}) AS row_probe", inner)
    }

    /// Cheap cardinality probe for a single table.
    pub fn table_count_statement(&self, table: &str) -> String {
        format!("SELECT COUNT(*) FROM {}", self.quote_identifier(table))
    }

    /// Expression yielding the current date.
    pub fn current_date_expr(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "date('now')",
            Dialect::MySql => "CURDATE()",
            Dialect::Postgres => "CURRENT_DATE",
        }
    }

    /// Expression yielding the current date shifted by `days`.
    pub fn date_offset_expr(&self, days: i64) -> String {
        match self {
            Dialect::Sqlite => format!("date('now', '{} days')", days),
            Dialect::MySql => format!("DATE_ADD(CURDATE(), INTERVAL {} DAY)", days),
            Dialect::Postgres => format!("CURRENT_DATE + INTERVAL '{} days'", days),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::Sqlite => "sqlite",
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            other => Err(format!("unknown dialect: {}", other)),
        }
    }
}
