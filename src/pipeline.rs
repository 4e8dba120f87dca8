//! The review pipeline: parse -> validate -> estimate + preview.
//!
//! Stateless and safe to call concurrently; every request works on an
//! immutable schema snapshot and its own candidate.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::estimate::{self, CostEstimate};
use crate::exec::Executor;
use crate::parse;
use crate::preview::{self, PreviewPlan};
use crate::schema::SchemaModel;
use crate::validate::{self, ValidationVerdict};
use crate::dialect::Dialect;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// A generated statement under review. The confidence score is untrusted
/// annotation: it is logged and surfaced, never used to relax a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryCandidate {
    pub text: String,
    pub confidence: f64,
    pub dialect: Dialect,
}

impl QueryCandidate {
    pub fn new(text: impl Into<String>, confidence: f64, dialect: Dialect) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            dialect,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub verdict: ValidationVerdict,
    /// Present only when the verdict is Pass.
    pub estimate: Option<CostEstimate>,
    /// Present only when the verdict is Pass.
    pub preview: Option<PreviewPlan>,
}

pub struct ReviewEngine {
    config: EngineConfig,
}

impl ReviewEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Review a candidate with the static estimator only.
    pub fn review(&self, candidate: &QueryCandidate, schema: &SchemaModel) -> Result<ReviewOutcome> {
        self.review_inner(candidate, schema, None)
    }

    /// Review a candidate and refine the estimate with a live count probe
    /// through the injected executor.
    pub fn review_with_probe(
        &self,
        candidate: &QueryCandidate,
        schema: &SchemaModel,
        executor: &dyn Executor,
    ) -> Result<ReviewOutcome> {
        self.review_inner(candidate, schema, Some(executor))
    }

    fn review_inner(
        &self,
        candidate: &QueryCandidate,
        schema: &SchemaModel,
        executor: Option<&dyn Executor>,
    ) -> Result<ReviewOutcome> {
        info!(
            "reviewing {} candidate (confidence {:.2})",
            candidate.dialect, candidate.confidence
        );
        let parsed = parse::parse(&candidate.text, candidate.dialect)?;
        let verdict = validate::validate(&parsed, schema, &self.config);
        if !verdict.passed() {
            warn!("candidate rejected with {} reason(s)", verdict.reasons.len());
            return Ok(ReviewOutcome {
                verdict,
                estimate: None,
                preview: None,
            });
        }

        let estimate = match executor {
            Some(executor) => estimate::estimate_with_probe(&parsed, schema, &self.config, executor),
            None => estimate::estimate(&parsed, schema, &self.config),
        };
        let preview = preview::rewrite_for_preview(&parsed, self.config.max_preview_rows);

        Ok(ReviewOutcome {
            verdict,
            estimate: Some(estimate),
            preview,
        })
    }

    /// Explicitly requested count-only probe plan: validates the candidate
    /// and returns the `COUNT(*)` wrapper instead of a row preview.
    pub fn review_count_probe(
        &self,
        candidate: &QueryCandidate,
        schema: &SchemaModel,
    ) -> Result<ReviewOutcome> {
        let parsed = parse::parse(&candidate.text, candidate.dialect)?;
        let verdict = validate::validate(&parsed, schema, &self.config);
        if !verdict.passed() {
            return Ok(ReviewOutcome {
                verdict,
                estimate: None,
                preview: None,
            });
        }
        let estimate = estimate::estimate(&parsed, schema, &self.config);
        let preview = preview::rewrite_for_count(&parsed);
        Ok(ReviewOutcome {
            verdict,
            estimate: Some(estimate),
            preview,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::preview::PreviewMode;
    use crate::schema::{ColumnDescriptor, TableDescriptor, TypeCategory};

    fn column(name: &str, pk: bool) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            declared_type: "TEXT".to_string(),
            category: TypeCategory::Text,
            nullable: !pk,
            primary_key: pk,
        }
    }

    fn schema() -> SchemaModel {
        SchemaModel::new(
            "shop",
            Dialect::Sqlite,
            vec![TableDescriptor {
                name: "customers".to_string(),
                columns: vec![
                    column("customer_id", true),
                    column("name", false),
                    column("email", false),
                ],
                foreign_keys: vec![],
            }],
        )
    }

    #[test]
    fn test_pass_carries_estimate_and_preview() {
        let engine = ReviewEngine::with_defaults();
        let candidate = QueryCandidate::new("SELECT * FROM customers", 0.9, Dialect::Sqlite);
        let outcome = engine.review(&candidate, &schema()).unwrap();
        assert!(outcome.verdict.passed());
        assert!(outcome.estimate.is_some());
        assert_eq!(
            outcome.preview.unwrap().preview_statement,
            "SELECT * FROM customers LIMIT 50"
        );
    }

    #[test]
    fn test_reject_carries_neither() {
        let engine = ReviewEngine::with_defaults();
        let candidate =
            QueryCandidate::new("DELETE FROM customers WHERE customer_id = 1", 0.99, Dialect::Sqlite);
        let outcome = engine.review(&candidate, &schema()).unwrap();
        assert!(!outcome.verdict.passed());
        assert!(outcome.estimate.is_none());
        assert!(outcome.preview.is_none());
    }

    #[test]
    fn test_unparsable_input_is_an_error() {
        let engine = ReviewEngine::with_defaults();
        let candidate = QueryCandidate::new("SELEKT everything", 1.0, Dialect::Sqlite);
        let err = engine.review(&candidate, &schema()).unwrap_err();
        assert!(matches!(err, EngineError::Parse(_)));
    }

    #[test]
    fn test_count_probe_plan() {
        let engine = ReviewEngine::with_defaults();
        let candidate = QueryCandidate::new("SELECT * FROM customers", 0.5, Dialect::Sqlite);
        let outcome = engine.review_count_probe(&candidate, &schema()).unwrap();
        let plan = outcome.preview.unwrap();
        assert_eq!(plan.mode, PreviewMode::CountOnly);
        assert!(plan.preview_statement.starts_with("SELECT COUNT(*) FROM ("));
    }

    #[test]
    fn test_confidence_is_clamped() {
        let candidate = QueryCandidate::new("SELECT 1", 7.5, Dialect::Sqlite);
        assert_eq!(candidate.confidence, 1.0);
    }
}
