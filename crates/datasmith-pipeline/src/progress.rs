//! Progress reporting for pipeline execution.
//!
//! The engine reports each step through a [`ProgressSink`] before running the
//! block. Sinks range from a no-op through tracing output to a broadcast
//! channel that streaming consumers subscribe to.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

/// Emitted once per step, immediately before the block executes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressUpdate {
    pub run_id: String,
    /// 1-based position within the pipeline.
    pub step: usize,
    pub total_steps: usize,
    pub block_type: String,
}

/// Receives step-by-step progress from an executing pipeline.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, update: ProgressUpdate);
}

/// Discards every update.
pub struct NullProgress;

#[async_trait]
impl ProgressSink for NullProgress {
    async fn report(&self, _update: ProgressUpdate) {}
}

/// Logs each update at info level.
pub struct LogProgress;

#[async_trait]
impl ProgressSink for LogProgress {
    async fn report(&self, update: ProgressUpdate) {
        info!(
            run_id = %update.run_id,
            step = update.step,
            total_steps = update.total_steps,
            block_type = %update.block_type,
            "pipeline step"
        );
    }
}

/// Collects updates in memory. Test helper.
#[derive(Default)]
pub struct RecordingProgress {
    updates: Mutex<Vec<ProgressUpdate>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressSink for RecordingProgress {
    async fn report(&self, update: ProgressUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

/// Fans updates out to any number of subscribers over a broadcast channel.
#[derive(Clone)]
pub struct BroadcastProgress {
    sender: broadcast::Sender<ProgressUpdate>,
}

impl BroadcastProgress {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to updates sent after this call.
    pub fn subscribe(&self) -> BroadcastStream<ProgressUpdate> {
        BroadcastStream::new(self.sender.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastProgress {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl ProgressSink for BroadcastProgress {
    async fn report(&self, update: ProgressUpdate) {
        // dropped silently when no subscriber is listening
        let _ = self.sender.send(update);
    }
}
