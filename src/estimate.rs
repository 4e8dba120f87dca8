//! Cost and complexity estimation.
//!
//! The static phase is pure and deterministic so tests can assert exact
//! scores. The dynamic phase is an optional capability: the caller
//! injects an `Executor` and a timeout, and any failure degrades the
//! estimate instead of failing the request.

use crate::config::EngineConfig;
use crate::exec::Executor;
use crate::parse::ParsedStatement;
use crate::schema::SchemaModel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

const SMALL_ROWS: u64 = 1_000;
const MEDIUM_ROWS: u64 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowBand {
    Small,
    Medium,
    Large,
    Unknown,
}

impl RowBand {
    fn from_count(rows: u64) -> Self {
        if rows < SMALL_ROWS {
            RowBand::Small
        } else if rows < MEDIUM_ROWS {
            RowBand::Medium
        } else {
            RowBand::Large
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Warning {
    FullScan,
    MissingIndexHint,
    UnboundedJoin,
    SelectStarWide,
    UnboundedOrderBy,
    HighComplexity,
    EstimateUnavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub row_band: RowBand,
    /// Driving-table cardinality from the live probe, when one ran.
    pub sampled_rows: Option<u64>,
    pub complexity_score: u32,
    pub warnings: BTreeSet<Warning>,
}

/// Static estimate: no I/O, always available.
pub fn estimate(
    parsed: &ParsedStatement,
    schema: &SchemaModel,
    config: &EngineConfig,
) -> CostEstimate {
    let summary = &parsed.summary;
    let score = 1u32
        + 2 * summary.join_count as u32
        + 3 * summary.subquery_count as u32
        + summary.aggregate_count as u32
        + summary.window_count as u32;

    let mut warnings = BTreeSet::new();

    let referenced: Vec<_> = summary
        .tables
        .iter()
        .filter_map(|t| schema.table(t.rsplit('.').next().unwrap_or(t)))
        .collect();

    if !referenced.is_empty() {
        if !summary.has_selection {
            warnings.insert(Warning::FullScan);
        } else {
            // Indexability is judged from key presence, not real index
            // metadata: an equality on a PK or FK column counts.
            let indexed_equality = summary.equality_columns.iter().any(|column| {
                referenced.iter().any(|table| {
                    table
                        .primary_keys()
                        .iter()
                        .any(|pk| pk.name.eq_ignore_ascii_case(column))
                        || table
                            .foreign_key_columns()
                            .iter()
                            .any(|fk| fk.eq_ignore_ascii_case(column))
                })
            });
            if !indexed_equality {
                warnings.insert(Warning::MissingIndexHint);
            }
        }
        if summary.select_star
            && referenced.iter().any(|t| t.width() > config.wide_table_columns)
        {
            warnings.insert(Warning::SelectStarWide);
        }
    }

    if summary.unconstrained_joins > 0 {
        warnings.insert(Warning::UnboundedJoin);
    }
    if summary.has_order_by && !summary.has_limit {
        warnings.insert(Warning::UnboundedOrderBy);
    }
    if score > config.complexity_threshold {
        warnings.insert(Warning::HighComplexity);
    }

    debug!("static estimate: score {} with {} warning(s)", score, warnings.len());
    CostEstimate {
        row_band: RowBand::Unknown,
        sampled_rows: None,
        complexity_score: score,
        warnings,
    }
}

/// Static estimate refined by a live count of the driving table. The
/// probe is capped by the configured timeout; if it fails or there is no
/// driving table, the static result gains `EstimateUnavailable` instead.
pub fn estimate_with_probe(
    parsed: &ParsedStatement,
    schema: &SchemaModel,
    config: &EngineConfig,
    executor: &dyn Executor,
) -> CostEstimate {
    let mut result = estimate(parsed, schema, config);

    let driving = parsed
        .summary
        .driving_table
        .as_deref()
        .map(|t| t.rsplit('.').next().unwrap_or(t).to_string())
        .filter(|t| schema.has_table(t));
    let Some(driving) = driving else {
        result.warnings.insert(Warning::EstimateUnavailable);
        return result;
    };

    let statement = parsed.dialect.table_count_statement(&driving);
    match executor.count(&statement, config.probe_timeout) {
        Ok(rows) => {
            let fanout = parsed.summary.join_count as u64 + 1;
            result.sampled_rows = Some(rows);
            result.row_band = RowBand::from_count(rows.saturating_mul(fanout));
        }
        Err(e) => {
            warn!("count probe against {} failed: {}", driving, e);
            result.warnings.insert(Warning::EstimateUnavailable);
        }
    }
    result
}
