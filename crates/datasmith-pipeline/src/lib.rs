//! Strictly linear pipeline execution over a shared accumulated context.
//!
//! `Pipeline::load` resolves every step against the block registry up front,
//! so execution never discovers a missing block type or bad config mid-run.
//! `Pipeline::execute` drives the snapshot-execute-validate-merge loop and
//! records a per-step trace; `run_seeds` fans a seed list out into
//! sequential executions with cancellation and progress reporting.

pub mod engine;
pub mod progress;
pub mod runner;

pub use engine::{Pipeline, PipelineStep};
pub use progress::{
    BroadcastProgress, LogProgress, NullProgress, ProgressSink, ProgressUpdate, RecordingProgress,
};
pub use runner::{run_seeds, BatchReport, CancelFlag};
