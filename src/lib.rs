//! docbench: benchmark orchestration and scoring for agents that work from
//! API documentation.
//!
//! This library runs an external agent against API integration tasks with
//! the documentation supplied in different compression tiers, checkpoints
//! every run so a batch can be resumed, and scores the agent's answers
//! against the expected operations and parameters.

// Core modules
pub mod analysis;
pub mod cli;
pub mod error;
pub mod metrics;
pub mod prompts;
pub mod registry;
pub mod runner;
pub mod scoring;

// Re-export commonly used error types
pub use error::{CheckpointError, ConfigError, ExecutorError, RegistryError};
