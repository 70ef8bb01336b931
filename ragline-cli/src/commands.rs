//! The `ingest`, `ask` and `query` commands.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use ragline::{
    CancellationToken, IngestionPipeline, OllamaEmbeddingProvider, OllamaLanguageModel,
    QueryPipeline, RagConfig, VectorStore, WeaviateVectorStore, tokenizer_from_config,
};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{info, warn};

use crate::args::{Cli, Command};

/// Prompt shown by the interactive loop.
pub const PROMPT: &str = "Enter your question: ";

/// What to do with one line read by the interactive loop.
#[derive(Debug, PartialEq, Eq)]
pub enum ReplInput<'a> {
    /// End the session.
    Quit,
    /// Nothing to answer.
    Skip,
    /// A question to answer.
    Question(&'a str),
}

/// Classify a line typed at the prompt.
pub fn classify(line: &str) -> ReplInput<'_> {
    let line = line.trim();
    if line.is_empty() {
        ReplInput::Skip
    } else if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
        ReplInput::Quit
    } else {
        ReplInput::Question(line)
    }
}

/// Format the elapsed-time line printed after every answer.
pub fn elapsed_line(started: Instant) -> String {
    format!("Time taken: {:.2} seconds", started.elapsed().as_secs_f64())
}

/// Run the parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    let config = cli
        .apply(RagConfig::from_env().context("invalid RAGLINE_* environment")?)
        .context("invalid command-line options")?;

    match &cli.command {
        Command::Ingest { corpus, .. } => ingest(config, corpus).await,
        Command::Ask => ask(config).await,
        Command::Query { question } => query(config, question).await,
    }
}

async fn ingest(config: RagConfig, corpus: &Path) -> Result<()> {
    let tokenizer = tokenizer_from_config(&config)?;
    let embedder = Arc::new(OllamaEmbeddingProvider::from_config(&config)?);
    let store = Arc::new(WeaviateVectorStore::from_config(&config)?);
    let pipeline = IngestionPipeline::new(config, tokenizer, embedder, store)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current units");
            on_interrupt.cancel();
        }
    });

    let report = pipeline
        .run_once(corpus, cancel)
        .await
        .with_context(|| format!("ingestion of {} failed", corpus.display()))?;

    println!("{report}");
    for failure in &report.failures {
        println!("  skipped {failure}");
    }
    Ok(())
}

/// Connect to the store and build a query pipeline around it.
async fn connect(config: RagConfig) -> Result<QueryPipeline> {
    let store = Arc::new(WeaviateVectorStore::from_config(&config)?);
    store.ping().await.context("index store is unreachable")?;

    let embedder = Arc::new(OllamaEmbeddingProvider::from_config(&config)?);
    let llm = Arc::new(OllamaLanguageModel::from_config(&config)?);
    Ok(QueryPipeline::new(config, embedder, store, llm)?)
}

async fn ask(config: RagConfig) -> Result<()> {
    let pipeline = connect(config).await?;
    let outcome = repl(&pipeline).await;
    pipeline.shutdown().await?;
    outcome
}

async fn repl(pipeline: &QueryPipeline) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    info!(collection = %pipeline.config().collection, "ready for questions");

    loop {
        let line = match tokio::task::block_in_place(|| editor.readline(PROMPT)) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let question = match classify(&line) {
            ReplInput::Quit => return Ok(()),
            ReplInput::Skip => continue,
            ReplInput::Question(question) => question,
        };
        let _ = editor.add_history_entry(question);

        let started = Instant::now();
        let answer = pipeline.answer(question).await;
        println!("\nAnswer:\n{answer}");
        println!("\n{}", elapsed_line(started));
    }
}

async fn query(config: RagConfig, question: &str) -> Result<()> {
    let pipeline = connect(config).await?;
    let started = Instant::now();
    let answer = pipeline.answer(question).await;
    println!("{answer}");
    println!("\n{}", elapsed_line(started));
    pipeline.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(classify(""), ReplInput::Skip);
        assert_eq!(classify("   \t"), ReplInput::Skip);
    }

    #[test]
    fn quit_words_end_the_session() {
        assert_eq!(classify("quit"), ReplInput::Quit);
        assert_eq!(classify(" EXIT "), ReplInput::Quit);
    }

    #[test]
    fn questions_are_trimmed() {
        assert_eq!(
            classify("  What color is the sky?\n"),
            ReplInput::Question("What color is the sky?")
        );
    }

    #[test]
    fn elapsed_line_has_two_decimals() {
        let line = elapsed_line(Instant::now());
        assert!(line.starts_with("Time taken: 0.0"));
        assert!(line.ends_with(" seconds"));
    }
}
