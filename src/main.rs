mod debug_report;

use chrono::{DateTime, Utc};
use clap::Parser;
use ctaflow::engine::{MemoryStorage, RecordStore};
use ctaflow::{Context, CtaId, DocumentContext, EngineConfig, render_document, view_document_verbose};
use std::collections::HashMap;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const LOG_ENV: &str = "CTAFLOW_LOG";

/// Render a CTA fallback chain into a page and run the view-time inserter on it.
#[derive(Parser, Debug)]
#[command(name = "ctaflow")]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON array of CTA records
    #[arg(long)]
    records: PathBuf,

    /// Id of the CTA the chain starts from
    #[arg(long)]
    start: u64,

    /// Rendered page HTML; `-` or omitted reads stdin
    #[arg(long)]
    content: Option<PathBuf>,

    /// Document context JSON (`content_type`, `taxonomy_terms`, `opt_out`)
    #[arg(long)]
    document: Option<PathBuf>,

    /// Visitor storage snapshot as a JSON object of strings
    #[arg(long)]
    storage: Option<PathBuf>,

    /// Engine config JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Reference time for date conditions (RFC 3339); defaults to now
    #[arg(long, value_parser = parse_now)]
    now: Option<DateTime<Utc>>,

    /// Force ANSI color output
    #[arg(long, conflicts_with = "no_color")]
    color: bool,

    /// Disable ANSI color output
    #[arg(long)]
    no_color: bool,

    /// Print the final HTML instead of the report
    #[arg(long)]
    emit_html: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("error: {0}")]
    Input(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Input(_) => 2,
            CliError::Internal(_) => 1,
        }
    }
}

fn main() {
    init_logging();
    let args = Args::parse();
    if let Err(err) = run(&args) {
        eprintln!("{err}");
        std::process::exit(err.exit_code());
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer().with_writer(io::stderr)).init();
}

fn run(args: &Args) -> Result<(), CliError> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path),
        None => Ok(EngineConfig::default()),
    }
    .and_then(EngineConfig::with_env_overrides)
    .map_err(|err| CliError::Input(err.to_string()))?;

    let store = RecordStore::from_file(&args.records).map_err(|err| CliError::Input(err.to_string()))?;
    let document = match &args.document {
        Some(path) => read_json::<DocumentContext>(path)?,
        None => DocumentContext::new("post"),
    };
    let storage: MemoryStorage = match &args.storage {
        Some(path) => read_json::<HashMap<String, String>>(path)?.into_iter().collect(),
        None => MemoryStorage::new(),
    };
    let html = read_content(args.content.as_deref())?;
    if html.trim().is_empty() {
        return Err(CliError::Input("no content provided".to_string()));
    }
    let context = match args.now {
        Some(now) => Context { now },
        None => Context::default(),
    };

    let rendered = render_document(&html, Some(CtaId(args.start)), &store, &document, &config)
        .map_err(|err| CliError::Internal(err.to_string()))?;
    let mut viewed = view_document_verbose(&rendered.html, &storage, &context, &config);
    viewed.details.metrics.build = rendered.elapsed;

    if args.emit_html {
        println!("{}", viewed.html);
    } else {
        let color = if args.no_color { false } else { args.color || io::stdout().is_terminal() };
        debug_report::print_run(CtaId(args.start), &rendered, &viewed, color);
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| CliError::Input(format!("failed to read {}: {err}", path.display())))?;
    serde_json::from_str(&raw).map_err(|err| CliError::Input(format!("invalid JSON in {}: {err}", path.display())))
}

fn read_content(path: Option<&Path>) -> Result<String, CliError> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .map_err(|err| CliError::Input(format!("failed to read {}: {err}", path.display()))),
        _ => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|err| CliError::Input(format!("failed to read stdin: {err}")))?;
            Ok(buffer)
        }
    }
}

fn parse_now(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| format!("invalid timestamp '{value}' (expected RFC 3339, e.g. 2024-05-01T12:00:00Z)"))
}
