//! Summarize documents into a bounded number of tokens.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable.
//!
//! # Examples
//!
//! ```sh
//! # Summarize local files to ~1000 tokens
//! distill notes.md chapter1.txt
//!
//! # A Wikipedia article, larger budget, JSON output
//! distill --wikipedia https://en.wikipedia.org/wiki/Nikola_Tesla --words 1500 --json
//!
//! # Pipe content from stdin, count budget in words
//! cat report.txt | distill --stdin --tokenizer words
//! ```

use std::io::{self, Read};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use distill_rs::api::{OpenRouterClient, RetryConfig};
use distill_rs::loader::{DocumentLoader, FileLoader, WikipediaLoader};
use distill_rs::pipeline::{LoggingHandler, Summarizer, SummarizerConfig};
use distill_rs::reduce::{LlmReducer, LlmReducerConfig, Reducer};
use distill_rs::text::{CounterKind, create_counter};
use futures::future::try_join_all;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Smallest budget the CLI accepts; lower values are raised to it.
const MIN_WORDS: usize = 1000;

/// Summarize documents into a bounded number of tokens.
///
/// Reads the API key from the OPENROUTER_KEY environment variable.
#[derive(Parser)]
#[command(name = "distill", version)]
struct Cli {
    // ── Inputs ─────────────────────────────────────────────────
    /// Text files to summarize (each one is a separate document)
    files: Vec<String>,

    /// Wikipedia article URL (https://<lang>.wikipedia.org/wiki/<slug>)
    #[arg(long = "wikipedia")]
    wikipedia: Vec<String>,

    /// Read one more document from stdin
    #[arg(long)]
    stdin: bool,

    // ── Budget ─────────────────────────────────────────────────
    /// Target size of the summary (at least 1000)
    #[arg(long, default_value_t = MIN_WORDS)]
    words: usize,

    /// How the budget is measured: chars, words, or tiktoken
    #[arg(long, default_value = "chars")]
    tokenizer: CounterKind,

    // ── Model ──────────────────────────────────────────────────
    /// Model for every reduction stage
    #[arg(long, default_value = distill_rs::DEFAULT_MODEL)]
    model: String,

    /// Separate model for the final reduction
    #[arg(long)]
    final_model: Option<String>,

    // ── Limits ─────────────────────────────────────────────────
    /// Maximum collapse rounds before giving up
    #[arg(long, default_value_t = 10)]
    max_rounds: u32,

    /// Reducer attempts per chunk, bin, or final pass
    #[arg(long, default_value_t = 5)]
    attempts: u32,

    /// Reducer calls in flight at once
    #[arg(long, default_value_t = 8)]
    concurrency: usize,

    /// Timeout for a single reducer call, in seconds
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,

    // ── Output ─────────────────────────────────────────────────
    /// Print the full run report as JSON
    #[arg(long)]
    json: bool,

    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "distill_rs=debug,distill=debug"
    } else {
        "distill_rs=info,distill=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn read_stdin_content() -> Result<String, String> {
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| format!("failed to read stdin: {e}"))?;
    Ok(buf)
}

async fn load_all(loader: &dyn DocumentLoader, ids: &[String]) -> Result<Vec<String>, String> {
    try_join_all(ids.iter().map(|id| loader.load(id))).await
}

async fn collect_inputs(cli: &Cli) -> Result<Vec<String>, String> {
    let mut docs = load_all(&FileLoader, &cli.files).await?;
    if !cli.wikipedia.is_empty() {
        let wiki = WikipediaLoader::new()?;
        docs.extend(load_all(&wiki, &cli.wikipedia).await?);
    }
    if cli.stdin {
        docs.push(read_stdin_content()?);
    }
    if docs.is_empty() {
        return Err("provide files, --wikipedia, or --stdin".to_string());
    }
    Ok(docs)
}

async fn run(cli: &Cli) -> Result<String, String> {
    let budget = if cli.words < MIN_WORDS {
        warn!(
            "--words {} is below the minimum; using {MIN_WORDS}",
            cli.words
        );
        MIN_WORDS
    } else {
        cli.words
    };

    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "OPENROUTER_KEY environment variable is not set".to_string())?;
    let counter = create_counter(cli.tokenizer)?;
    let inputs = collect_inputs(cli).await?;

    let mut reducer_config = LlmReducerConfig::default().with_model(&cli.model);
    if let Some(final_model) = &cli.final_model {
        reducer_config = reducer_config.with_routing(distill_rs::api::ModelRouting::cheap_map(
            &cli.model,
            final_model,
        ));
    }
    let reducer = Arc::new(LlmReducer::new(
        OpenRouterClient::new(api_key)?,
        reducer_config,
    ));

    let config = SummarizerConfig::default()
        .with_max_collapse_rounds(cli.max_rounds)
        .with_retry(RetryConfig::with_attempts(cli.attempts))
        .with_max_concurrency(cli.concurrency)
        .with_reduce_timeout(Duration::from_secs(cli.timeout_secs));

    let summarizer = Summarizer::new(reducer.clone() as Arc<dyn Reducer>, counter, config)
        .with_event_handler(LoggingHandler);
    let result = summarizer.summarize(inputs, budget).await;
    info!("Usage: {}", reducer.usage_summary());
    let output = result.map_err(|e| e.to_string())?;

    if cli.json {
        serde_json::to_string_pretty(&output).map_err(|e| format!("failed to encode output: {e}"))
    } else {
        Ok(output.summary)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli).await {
        Ok(text) => println!("{text}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
