//! Command-line arguments.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use ragline::RagConfig;

/// Ask questions about a directory of text files.
#[derive(Debug, Parser)]
#[command(
    name = "ragline",
    version,
    about = "Index text files and answer questions from them",
    long_about = "Index a directory of text files into Weaviate with Ollama embeddings, \
                  then answer questions with hybrid retrieval and a grounded LLM prompt.\n\n\
                  Settings come from RAGLINE_* environment variables (a .env file is loaded \
                  first); the flags below override them."
)]
pub struct Cli {
    /// Weaviate base URL
    #[arg(long, global = true)]
    pub weaviate_url: Option<String>,

    /// Ollama base URL
    #[arg(long, global = true)]
    pub ollama_url: Option<String>,

    /// Collection holding the indexed chunks
    #[arg(long, global = true)]
    pub collection: Option<String>,

    /// Hybrid weighting: 0 is pure keyword, 1 is pure vector
    #[arg(long, global = true)]
    pub alpha: Option<f32>,

    /// Passages retrieved per question
    #[arg(long, global = true)]
    pub limit: Option<usize>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Index every regular file of a directory
    Ingest {
        /// Directory of plain-text files
        #[arg(long, default_value = "./data")]
        corpus: PathBuf,

        /// Concurrent embedding workers (overrides config)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Answer questions interactively until EOF or `quit`
    Ask,

    /// Answer a single question and exit
    Query {
        /// The question to answer
        question: String,
    },
}

impl Cli {
    /// Apply command-line overrides on top of `config` and validate the result.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if an override makes the config invalid.
    pub fn apply(&self, mut config: RagConfig) -> ragline::Result<RagConfig> {
        if let Some(url) = &self.weaviate_url {
            config.weaviate_url = url.clone();
        }
        if let Some(url) = &self.ollama_url {
            config.ollama_url = url.clone();
        }
        if let Some(collection) = &self.collection {
            config.collection = collection.clone();
        }
        if let Some(alpha) = self.alpha {
            config.alpha = alpha;
        }
        if let Some(limit) = self.limit {
            config.limit = limit;
        }
        if let Command::Ingest { workers: Some(workers), .. } = &self.command {
            config.workers = *workers;
        }
        config.validate()?;
        Ok(config)
    }

    /// Default log filter for the requested verbosity.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_defaults_to_data_directory() {
        let cli = Cli::try_parse_from(["ragline", "ingest"]).unwrap();
        match cli.command {
            Command::Ingest { corpus, workers } => {
                assert_eq!(corpus, PathBuf::from("./data"));
                assert_eq!(workers, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_flags_work_after_the_subcommand() {
        let cli = Cli::try_parse_from(["ragline", "ask", "--alpha", "0.5", "--limit", "5", "-vv"])
            .unwrap();
        assert_eq!(cli.alpha, Some(0.5));
        assert_eq!(cli.limit, Some(5));
        assert_eq!(cli.log_level(), "trace");
    }

    #[test]
    fn query_takes_a_question() {
        let cli = Cli::try_parse_from(["ragline", "query", "What color is the sky?"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Query { ref question } if question == "What color is the sky?"
        ));
    }

    #[test]
    fn overrides_replace_config_values() {
        let cli = Cli::try_parse_from([
            "ragline",
            "--collection",
            "Handbook",
            "--weaviate-url",
            "http://weaviate:8080",
            "ingest",
            "--workers",
            "8",
        ])
        .unwrap();
        let config = cli.apply(RagConfig::default()).unwrap();
        assert_eq!(config.collection, "Handbook");
        assert_eq!(config.weaviate_url, "http://weaviate:8080");
        assert_eq!(config.workers, 8);
        assert_eq!(config.limit, 3);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let cli = Cli::try_parse_from(["ragline", "ask", "--alpha", "1.5"]).unwrap();
        let err = cli.apply(RagConfig::default()).unwrap_err();
        assert!(err.is_fatal());
    }
}
