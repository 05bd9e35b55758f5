use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::Value;
use tracing::{debug, info};

use thesis_metrics::metrics::collect_analytics;
use thesis_metrics::metrics::AggregationLimits;
use thesis_metrics::record::{build_records, ExtractionContext, FileMetrics};
use thesis_metrics::{ConceptDictionary, DomainDictionary, Filters, DEFAULT_RELOAD_INTERVAL};

/// Thesis Metrics - concept analytics payload generator
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON file holding an array of raw document metadata objects
    input: PathBuf,

    /// Data directory holding concepts/latest.json (default: "data")
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    /// Path to a JSON filter configuration (stop words, low-signal lists)
    #[arg(long)]
    filters: Option<PathBuf>,

    /// Path to a JSON map of document id -> extracted file metrics
    #[arg(long)]
    file_metrics: Option<PathBuf>,

    /// Path to a JSON map of document id -> committee member names
    #[arg(long)]
    committee: Option<PathBuf>,

    /// Output file for the analytics payload
    #[arg(short, long, default_value = "out/analytics.json")]
    output: PathBuf,

    /// Maximum number of concepts in the per-concept stats table
    #[arg(long, default_value_t = 25)]
    subject_limit: usize,
}

fn load_json_map<T: serde::de::DeserializeOwned>(
    path: Option<&PathBuf>,
    what: &str,
) -> Result<HashMap<String, T>> {
    let Some(path) = path else {
        debug!("No {} file given, skipping overlay", what);
        return Ok(HashMap::new());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading {} from {}", what, path.display()))?;
    let map: HashMap<String, T> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {} map", what))?;
    info!("Loaded {} - entries={}, path={}", what, map.len(), path.display());
    Ok(map)
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(true)
        .init();

    info!("Starting thesis_metrics");

    let args = Args::parse();

    let raw = fs::read_to_string(&args.input)
        .with_context(|| format!("reading documents from {}", args.input.display()))?;
    let docs: Vec<Value> = serde_json::from_str(&raw).context("parsing document array")?;
    if docs.is_empty() {
        bail!("no documents in {}", args.input.display());
    }
    info!("Loaded documents - count={}, path={}", docs.len(), args.input.display());

    let concepts_path = args.data_dir.join("concepts").join("latest.json");
    let filters = match args.filters {
        Some(ref path) => Filters::from_path(path),
        None => Filters::default(),
    };
    let ctx = ExtractionContext {
        domain: DomainDictionary::with_overlay(&concepts_path, DEFAULT_RELOAD_INTERVAL),
        concepts: ConceptDictionary::load_or_default(&concepts_path),
        filters,
    };

    let file_metrics: HashMap<String, FileMetrics> =
        load_json_map(args.file_metrics.as_ref(), "file metrics")?;
    let committee: HashMap<String, Vec<String>> =
        load_json_map(args.committee.as_ref(), "committee")?;

    let start = std::time::Instant::now();
    let records = build_records(&docs, &file_metrics, &committee, &ctx);
    info!(
        "Built records - count={}, duration={:.2}s",
        records.len(),
        start.elapsed().as_secs_f32()
    );

    let limits = AggregationLimits {
        subject_limit: args.subject_limit,
        ..AggregationLimits::default()
    };
    let payload = collect_analytics(records, &limits, &ctx);

    if let Some(parent) = args.output.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(&payload).context("serializing payload")?;
    fs::write(&args.output, json)
        .with_context(|| format!("writing payload to {}", args.output.display()))?;
    info!("Wrote analytics payload - path={}", args.output.display());

    Ok(())
}
