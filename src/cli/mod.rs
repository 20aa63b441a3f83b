//! Command-line interface for docbench.
//!
//! Provides commands to run, resume, re-score and summarize benchmark
//! batches, and to compare document sizes across tiers.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
