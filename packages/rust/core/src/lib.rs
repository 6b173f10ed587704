//! Orchestration of the batched enrichment pipeline.

pub mod pipeline;

pub use pipeline::{ProgressReporter, SilentProgress, SyncConfig, SyncResult, run_sync};
