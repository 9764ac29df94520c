//! Batch execution: run a pipeline over a list of seeds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use datasmith_types::{Context, Record, SeedInput};

use crate::engine::Pipeline;
use crate::progress::ProgressSink;

/// Cooperative cancellation handle shared between a batch and its caller.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a batch: the records produced plus completion counts.
#[derive(Debug)]
pub struct BatchReport {
    pub records: Vec<Record>,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
    pub cancelled: bool,
}

/// Run `pipeline` once per seed repetition, in order.
///
/// Each execution starts from a clone of the seed's metadata. A failed
/// execution is logged and counted but does not stop the batch; cancellation
/// is checked before each execution and stops the batch where it stands.
pub async fn run_seeds(
    pipeline: &Pipeline,
    seeds: &[SeedInput],
    cancel: &CancelFlag,
    progress: &dyn ProgressSink,
) -> BatchReport {
    let total: usize = seeds.iter().map(|s| s.repetitions as usize).sum();
    let mut records = Vec::new();
    let mut failed = 0;
    let mut cancelled = false;
    let mut execution = 0;

    'outer: for seed in seeds {
        for _ in 0..seed.repetitions {
            if cancel.is_cancelled() {
                cancelled = true;
                break 'outer;
            }
            execution += 1;
            info!(execution, total, pipeline = %pipeline.name(), "running execution");
            match pipeline
                .execute_with_progress(seed.metadata.clone(), progress)
                .await
            {
                Ok(run) => {
                    let output = extract_output(&run.context);
                    records.push(Record::new(output, seed.metadata.clone(), Some(run.trace)));
                }
                Err(error) => {
                    failed += 1;
                    warn!(execution, %error, "execution failed");
                }
            }
        }
    }

    let completed = records.len();
    BatchReport {
        records,
        completed,
        failed,
        total,
        cancelled,
    }
}

/// The record output is the final `pipeline_output` field: strings verbatim,
/// other values as compact JSON, missing as empty.
fn extract_output(context: &Context) -> String {
    match context.get("pipeline_output") {
        None => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullProgress;
    use async_trait::async_trait;
    use datasmith_blocks::{Block, BlockRegistration, BlockRegistry, BlockSchema};
    use datasmith_types::{BlockDefinition, DatasmithError, PipelineDefinition, Result};
    use serde_json::{json, Map};

    struct EmitBlock {
        value: Value,
        fail_on_flag: bool,
    }

    #[async_trait]
    impl Block for EmitBlock {
        fn type_name(&self) -> &str {
            "Emit"
        }

        fn outputs(&self) -> &[&str] {
            &["*"]
        }

        async fn execute(&self, context: &Context) -> Result<Context> {
            if self.fail_on_flag && context.get("fail") == Some(&json!(true)) {
                return Err(DatasmithError::Other("seed asked to fail".to_string()));
            }
            let mut output = Context::new();
            output.insert("pipeline_output", self.value.clone());
            Ok(output)
        }
    }

    fn emit_pipeline(value: Value, fail_on_flag: bool) -> Pipeline {
        let mut registry = BlockRegistry::new();
        let schema = BlockSchema {
            block_type: "Emit".to_string(),
            name: "Emit".to_string(),
            description: "emits a fixed output".to_string(),
            inputs: vec![],
            outputs: vec!["*".to_string()],
            config_schema: json!({"type": "object", "properties": {}, "required": []}),
            algorithm: None,
            paper: None,
        };
        registry.register(BlockRegistration::new(schema, move |_config| {
            Ok(Box::new(EmitBlock {
                value: value.clone(),
                fail_on_flag,
            }))
        }));
        let definition = PipelineDefinition {
            name: "emit".to_string(),
            blocks: vec![BlockDefinition {
                block_type: "Emit".to_string(),
                config: Map::new(),
            }],
        };
        Pipeline::load(&definition, &registry).unwrap()
    }

    fn seed(repetitions: u32, metadata: &[(&str, Value)]) -> SeedInput {
        SeedInput {
            repetitions,
            metadata: metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn repetitions_multiply_executions() {
        let pipeline = emit_pipeline(json!("done"), false);
        let seeds = vec![seed(2, &[]), seed(3, &[])];

        let report = run_seeds(&pipeline, &seeds, &CancelFlag::new(), &NullProgress).await;

        assert_eq!(report.total, 5);
        assert_eq!(report.completed, 5);
        assert_eq!(report.failed, 0);
        assert!(!report.cancelled);
        assert_eq!(report.records.len(), 5);
        assert!(report.records.iter().all(|r| r.output == "done"));
    }

    #[tokio::test]
    async fn records_carry_seed_metadata_and_trace() {
        let pipeline = emit_pipeline(json!("out"), false);
        let seeds = vec![seed(1, &[("topic", json!("rust"))])];

        let report = run_seeds(&pipeline, &seeds, &CancelFlag::new(), &NullProgress).await;

        let record = &report.records[0];
        assert_eq!(record.metadata.get("topic"), Some(&json!("rust")));
        assert_eq!(record.trace.as_ref().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn non_string_output_is_serialized_compactly() {
        let pipeline = emit_pipeline(json!({"a": 1}), false);
        let seeds = vec![seed(1, &[])];

        let report = run_seeds(&pipeline, &seeds, &CancelFlag::new(), &NullProgress).await;
        assert_eq!(report.records[0].output, "{\"a\":1}");
    }

    #[tokio::test]
    async fn missing_pipeline_output_yields_empty_string() {
        let mut context = Context::new();
        context.insert("other", json!("x"));
        assert_eq!(extract_output(&context), "");
    }

    #[tokio::test]
    async fn failed_execution_is_counted_and_batch_continues() {
        let pipeline = emit_pipeline(json!("ok"), true);
        let seeds = vec![
            seed(1, &[("fail", json!(true))]),
            seed(1, &[]),
        ];

        let report = run_seeds(&pipeline, &seeds, &CancelFlag::new(), &NullProgress).await;

        assert_eq!(report.total, 2);
        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 1);
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn pre_cancelled_batch_runs_nothing() {
        let pipeline = emit_pipeline(json!("never"), false);
        let seeds = vec![seed(4, &[])];
        let cancel = CancelFlag::new();
        cancel.cancel();

        let report = run_seeds(&pipeline, &seeds, &cancel, &NullProgress).await;

        assert!(report.cancelled);
        assert_eq!(report.completed, 0);
        assert_eq!(report.total, 4);
        assert!(report.records.is_empty());
    }

    #[tokio::test]
    async fn zero_repetition_seeds_run_nothing() {
        let pipeline = emit_pipeline(json!("none"), false);
        let seeds = vec![seed(0, &[])];

        let report = run_seeds(&pipeline, &seeds, &CancelFlag::new(), &NullProgress).await;
        assert_eq!(report.total, 0);
        assert_eq!(report.completed, 0);
        assert!(!report.cancelled);
    }
}
