use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Engine tuning knobs. Every request carries one of these; defaults suit
/// an interactive assistant previewing against a shared database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Row cap appended to previews that carry no LIMIT of their own.
    pub max_preview_rows: u32,
    /// Hard bound on total join count before rejection.
    pub max_join_count: usize,
    /// Hard bound on subquery nesting depth before rejection.
    pub max_subquery_depth: usize,
    /// Static complexity score above which the estimator warns.
    pub complexity_threshold: u32,
    /// Column count above which `SELECT *` draws a warning.
    pub wide_table_columns: usize,
    /// Allow read-only introspection forms (EXPLAIN / SHOW) through
    /// validation. Off by default; everything but SELECT is rejected.
    pub allow_introspection_statements: bool,
    /// Upper bound for the optional live count probe.
    pub probe_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_preview_rows: 50,
            max_join_count: 5,
            max_subquery_depth: 3,
            complexity_threshold: 10,
            wide_table_columns: 15,
            allow_introspection_statements: false,
            probe_timeout: Duration::from_secs(2),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `QUERYGUARD_*` environment variables,
    /// loading a `.env` file first when present.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let defaults = Self::default();
        Self {
            max_preview_rows: env_parse("QUERYGUARD_MAX_PREVIEW_ROWS", defaults.max_preview_rows),
            max_join_count: env_parse("QUERYGUARD_MAX_JOIN_COUNT", defaults.max_join_count),
            max_subquery_depth: env_parse(
                "QUERYGUARD_MAX_SUBQUERY_DEPTH",
                defaults.max_subquery_depth,
            ),
            complexity_threshold: env_parse(
                "QUERYGUARD_COMPLEXITY_THRESHOLD",
                defaults.complexity_threshold,
            ),
            wide_table_columns: env_parse(
                "QUERYGUARD_WIDE_TABLE_COLUMNS",
                defaults.wide_table_columns,
            ),
            allow_introspection_statements: env_parse(
                "QUERYGUARD_ALLOW_INTROSPECTION",
                defaults.allow_introspection_statements,
            ),
            probe_timeout: Duration::from_millis(env_parse(
                "QUERYGUARD_PROBE_TIMEOUT_MS",
                defaults.probe_timeout.as_millis() as u64,
            )),
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
