use anyhow::Result;
use clap::Parser;
use queryguard::catalog::{self, ConnectionDescriptor};
use queryguard::config::EngineConfig;
use queryguard::context;
use queryguard::dialect::Dialect;
use queryguard::exec::SqliteExecutor;
use queryguard::pipeline::{QueryCandidate, ReviewEngine};
use queryguard::relationships::RelationshipGraph;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Validate, cost-estimate and preview an AI-generated SQL statement
/// against a SQLite database.
#[derive(Parser)]
#[command(name = "review-query")]
#[command(about = "Review a generated SQL statement against an introspected schema")]
struct Args {
    /// Candidate SQL statement to review
    sql: String,

    /// Path to the SQLite database to introspect
    #[arg(long)]
    db: PathBuf,

    /// Logical name for the database (defaults to the file name)
    #[arg(long)]
    name: Option<String>,

    /// Confidence reported by the generator (0.0 - 1.0)
    #[arg(long, default_value_t = 1.0)]
    confidence: f64,

    /// Run a live COUNT(*) probe to refine the row estimate
    #[arg(long)]
    probe: bool,

    /// Ask for a count-only probe plan instead of a row preview
    #[arg(long)]
    count_only: bool,

    /// Print the generator schema context instead of reviewing
    #[arg(long)]
    show_context: bool,

    /// Token budget for --show-context
    #[arg(long, default_value_t = 3000)]
    context_tokens: usize,
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let name = args.name.clone().unwrap_or_else(|| {
        args.db
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "database".to_string())
    });
    let descriptor = ConnectionDescriptor {
        name,
        dialect: Dialect::Sqlite,
        location: args.db.to_string_lossy().into_owned(),
    };

    let config = EngineConfig::from_env();
    let schema = catalog::introspect(&descriptor, config.probe_timeout)?;

    if args.show_context {
        let graph = RelationshipGraph::build(&schema);
        println!("{}", context::schema_context(&schema, &graph, args.context_tokens));
        println!();
        println!("{}", context::dialect_guidance(schema.dialect));
        return Ok(());
    }

    let engine = ReviewEngine::new(config);
    let candidate = QueryCandidate::new(&args.sql, args.confidence, Dialect::Sqlite);

    let outcome = if args.count_only {
        engine.review_count_probe(&candidate, &schema)?
    } else if args.probe {
        let executor = SqliteExecutor::open(&args.db)?;
        engine.review_with_probe(&candidate, &schema, &executor)?
    } else {
        engine.review(&candidate, &schema)?
    };

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
