//! Summarize one text file with the OpenRouter-backed reducer.
//!
//! # Usage
//!
//! ```bash
//! OPENROUTER_KEY=sk-... cargo run --example basic_summarize -- README.md
//! ```

use distill_rs::prelude::*;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), String> {
    let path = std::env::args()
        .nth(1)
        .ok_or("usage: basic_summarize <file>")?;

    // 1. Reducer over the OpenRouter client.
    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "Set OPENROUTER_KEY env var to your OpenRouter API key")?;
    let reducer = LlmReducer::new(OpenRouterClient::new(api_key)?, LlmReducerConfig::default());

    // 2. Load the document.
    let text = FileLoader.load(&path).await?;

    // 3. Run the pipeline with logging.
    let summarizer = Summarizer::new(
        Arc::new(reducer),
        Arc::new(CharEstimateCounter::default()),
        SummarizerConfig::default(),
    )
    .with_event_handler(LoggingHandler);
    let output = summarizer
        .summarize(vec![text], 500)
        .await
        .map_err(|e| e.to_string())?;

    // 4. Print results.
    println!("\n{}", output.summary);
    println!(
        "\n--- {} chunks | {} collapse rounds | {}/{} tokens | {}ms ---",
        output.chunks, output.collapse_rounds, output.tokens, output.budget, output.elapsed_ms
    );

    Ok(())
}
