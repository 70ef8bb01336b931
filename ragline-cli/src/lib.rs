//! # ragline-cli
//!
//! The `ragline` command: `ingest` a corpus directory, `ask` questions in an
//! interactive loop, or `query` once.

pub mod args;
pub mod commands;

pub use args::{Cli, Command};
pub use commands::{PROMPT, ReplInput, classify, run};
