//! Drive the pipeline with a closure reducer, no network needed.
//!
//! The reducer keeps the first `budget` words of its input, which is enough
//! to watch chunking, routing, and the final pass in the logs.
//!
//! ```bash
//! RUST_LOG=distill_rs=debug cargo run --example offline_reducer
//! ```

use distill_rs::prelude::*;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), String> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let truncate = FnReducer::new("truncate", |req: ReduceRequest| async move {
        let joined = req.texts.join(" ");
        Ok(joined
            .split_whitespace()
            .take(req.budget)
            .collect::<Vec<_>>()
            .join(" "))
    });

    let docs: Vec<String> = (0..3)
        .map(|d| {
            (0..2_000)
                .map(|i| format!("doc{d}-word{i}"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();

    let summarizer = Summarizer::new(
        Arc::new(truncate),
        Arc::new(WordCounter),
        SummarizerConfig::default(),
    )
    .with_event_handler(LoggingHandler);

    let output = summarizer
        .summarize(docs, 200)
        .await
        .map_err(|e| e.to_string())?;

    let head: Vec<&str> = output.summary.split_whitespace().take(5).collect();
    println!("{} words: {}...", output.tokens, head.join(" "));
    for t in &output.transitions {
        println!("  {} -> {} (iteration {})", t.from, t.to, t.iteration);
    }
    Ok(())
}
