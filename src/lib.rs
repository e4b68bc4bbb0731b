//! Captions screenshots through an external vision service and files them
//! into albums of similar captions.

pub mod config;
pub mod core;
pub mod pipeline;

pub use config::Config;
pub use pipeline::{Pipeline, PipelineError, RunOutcome, RunSummary};
