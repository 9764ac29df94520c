//! Pipeline loading and the step execution loop.

use std::time::Instant;

use tracing::{debug, info};
use uuid::Uuid;

use datasmith_blocks::{Block, BlockRegistry, WILDCARD};
use datasmith_types::{
    Context, DatasmithError, PipelineDefinition, PipelineRun, Result, TraceEntry,
};

use crate::progress::{NullProgress, ProgressSink, ProgressUpdate};

/// One resolved step: the type name from the definition plus the configured
/// block instance built for it.
#[derive(Debug)]
pub struct PipelineStep {
    block_type: String,
    block: Box<dyn Block>,
}

impl PipelineStep {
    pub fn block_type(&self) -> &str {
        &self.block_type
    }
}

/// A fully resolved, immutable pipeline.
///
/// Loading instantiates every block, so a `Pipeline` that exists can be
/// executed any number of times (and shared behind an `Arc`) without
/// re-touching the registry.
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    steps: Vec<PipelineStep>,
}

impl Pipeline {
    /// Resolve `definition` against `registry`, instantiating every block in
    /// order. Fails on the first unknown type or invalid configuration.
    pub fn load(definition: &PipelineDefinition, registry: &BlockRegistry) -> Result<Self> {
        let mut steps = Vec::with_capacity(definition.blocks.len());
        for block_def in &definition.blocks {
            let block = registry.create(&block_def.block_type, &block_def.config)?;
            steps.push(PipelineStep {
                block_type: block_def.block_type.clone(),
                block,
            });
        }
        debug!(pipeline = %definition.name, steps = steps.len(), "loaded pipeline");
        Ok(Self {
            name: definition.name.clone(),
            steps,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Execute against `input`, returning the final accumulated context, the
    /// per-step trace, and a fresh run id.
    pub async fn execute(&self, input: Context) -> Result<PipelineRun> {
        self.execute_with_progress(input, &NullProgress).await
    }

    /// Execute, reporting each step to `progress` before it runs.
    ///
    /// Per step: snapshot the accumulated context, run the block against it,
    /// check the produced fields against the block's declared outputs, merge
    /// them back (new keys append, existing keys overwrite in place), and
    /// record a trace entry. The first failing step aborts the run.
    pub async fn execute_with_progress(
        &self,
        input: Context,
        progress: &dyn ProgressSink,
    ) -> Result<PipelineRun> {
        let run_id = Uuid::new_v4().to_string();
        let total_steps = self.steps.len();
        let mut context = input;
        let mut trace = Vec::with_capacity(total_steps);

        info!(run_id = %run_id, pipeline = %self.name, steps = total_steps, "executing pipeline");

        for (index, step) in self.steps.iter().enumerate() {
            let step_number = index + 1;
            progress
                .report(ProgressUpdate {
                    run_id: run_id.clone(),
                    step: step_number,
                    total_steps,
                    block_type: step.block_type.clone(),
                })
                .await;

            let step_input = context.snapshot();
            let started = Instant::now();
            let output = step
                .block
                .execute(&context)
                .await
                .map_err(|error| wrap_step_error(error, step, step_number, &step_input))?;
            let duration_ms = started.elapsed().as_millis() as u64;

            validate_outputs(step, &output)?;

            context.merge(output.clone());
            debug!(
                run_id = %run_id,
                step = step_number,
                block_type = %step.block_type,
                duration_ms,
                "step completed"
            );
            trace.push(TraceEntry {
                block_type: step.block_type.clone(),
                input: step_input,
                output,
                accumulated_state: context.snapshot(),
                duration_ms,
            });
        }

        Ok(PipelineRun {
            context,
            trace,
            run_id,
        })
    }
}

/// A failure inside a block becomes a step-tagged execution error carrying
/// the 1-based step number and the context the block saw.
fn wrap_step_error(
    error: DatasmithError,
    step: &PipelineStep,
    step_number: usize,
    input: &Context,
) -> DatasmithError {
    DatasmithError::BlockExecution {
        block_type: step.block_type.clone(),
        step: step_number,
        message: error.to_string(),
        input: input.to_value(),
    }
}

/// Check the produced fields against the block's declaration. The `"*"`
/// wildcard opts the block out entirely. Undeclared fields are an error and
/// nothing from the output is merged; producing a subset of the declared
/// fields is allowed.
fn validate_outputs(step: &PipelineStep, output: &Context) -> Result<()> {
    let declared = step.block.outputs();
    if declared.contains(&WILDCARD) {
        return Ok(());
    }
    let extra_fields: Vec<String> = output
        .keys()
        .filter(|key| !declared.contains(&key.as_str()))
        .cloned()
        .collect();
    if extra_fields.is_empty() {
        return Ok(());
    }
    Err(DatasmithError::OutputValidation {
        block_type: step.block_type.clone(),
        declared_outputs: declared.iter().map(|s| s.to_string()).collect(),
        actual_outputs: output.keys().cloned().collect(),
        extra_fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use datasmith_blocks::{BlockRegistration, BlockRegistry, BlockSchema};
    use datasmith_types::BlockDefinition;
    use serde_json::{json, Map, Value};

    /// Test block: merges a fixed set of fields into the context, or fails.
    struct ScriptBlock {
        type_name: String,
        declared: Vec<&'static str>,
        produces: Vec<(String, Value)>,
        fail_with: Option<String>,
    }

    #[async_trait]
    impl datasmith_blocks::Block for ScriptBlock {
        fn type_name(&self) -> &str {
            &self.type_name
        }

        fn outputs(&self) -> &[&str] {
            &self.declared
        }

        async fn execute(&self, _context: &Context) -> Result<Context> {
            if let Some(message) = &self.fail_with {
                return Err(DatasmithError::Other(message.clone()));
            }
            Ok(self.produces.iter().cloned().collect())
        }
    }

    fn register_script(
        registry: &mut BlockRegistry,
        type_name: &str,
        declared: &'static [&'static str],
        produces: &[(&str, Value)],
        fail_with: Option<&str>,
    ) {
        let type_name = type_name.to_string();
        let produces: Vec<(String, Value)> =
            produces.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        let fail_with = fail_with.map(|m| m.to_string());
        let schema = BlockSchema {
            block_type: type_name.clone(),
            name: type_name.clone(),
            description: "scripted test block".to_string(),
            inputs: vec![],
            outputs: declared.iter().map(|s| s.to_string()).collect(),
            config_schema: json!({"type": "object", "properties": {}, "required": []}),
            algorithm: None,
            paper: None,
        };
        registry.register(BlockRegistration::new(schema, move |_config| {
            Ok(Box::new(ScriptBlock {
                type_name: type_name.clone(),
                declared: declared.to_vec(),
                produces: produces.clone(),
                fail_with: fail_with.clone(),
            }))
        }));
    }

    fn definition(name: &str, types: &[&str]) -> PipelineDefinition {
        PipelineDefinition {
            name: name.to_string(),
            blocks: types
                .iter()
                .map(|t| BlockDefinition {
                    block_type: t.to_string(),
                    config: Map::new(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn merges_outputs_in_order_and_overwrites_in_place() {
        let mut registry = BlockRegistry::new();
        register_script(&mut registry, "First", &["a", "b"], &[("a", json!(1)), ("b", json!(2))], None);
        register_script(&mut registry, "Second", &["b", "c"], &[("b", json!(20)), ("c", json!(3))], None);

        let pipeline = Pipeline::load(&definition("merge", &["First", "Second"]), &registry).unwrap();
        let run = pipeline.execute(Context::new()).await.unwrap();

        let keys: Vec<&String> = run.context.keys().collect();
        assert_eq!(keys, ["a", "b", "c"]);
        assert_eq!(run.context.get("b"), Some(&json!(20)));
        assert_eq!(run.trace.len(), 2);
    }

    #[tokio::test]
    async fn trace_records_input_output_and_accumulated_state() {
        let mut registry = BlockRegistry::new();
        register_script(&mut registry, "First", &["a"], &[("a", json!(1))], None);
        register_script(&mut registry, "Second", &["b"], &[("b", json!(2))], None);

        let pipeline = Pipeline::load(&definition("trace", &["First", "Second"]), &registry).unwrap();
        let mut input = Context::new();
        input.insert("seed", json!("s"));
        let run = pipeline.execute(input).await.unwrap();

        let first = &run.trace[0];
        assert_eq!(first.block_type, "First");
        assert_eq!(first.input.keys().collect::<Vec<_>>(), ["seed"]);
        assert_eq!(first.output.keys().collect::<Vec<_>>(), ["a"]);
        assert_eq!(first.accumulated_state.keys().collect::<Vec<_>>(), ["seed", "a"]);

        let second = &run.trace[1];
        assert_eq!(second.input.keys().collect::<Vec<_>>(), ["seed", "a"]);
        assert_eq!(second.accumulated_state.keys().collect::<Vec<_>>(), ["seed", "a", "b"]);
    }

    #[tokio::test]
    async fn trace_snapshots_are_isolated_from_later_steps() {
        let mut registry = BlockRegistry::new();
        register_script(&mut registry, "First", &["x"], &[("x", json!("original"))], None);
        register_script(&mut registry, "Second", &["x"], &[("x", json!("overwritten"))], None);

        let pipeline = Pipeline::load(&definition("isolate", &["First", "Second"]), &registry).unwrap();
        let run = pipeline.execute(Context::new()).await.unwrap();

        // the first entry still shows the value before the overwrite
        assert_eq!(run.trace[0].accumulated_state.get("x"), Some(&json!("original")));
        assert_eq!(run.trace[1].accumulated_state.get("x"), Some(&json!("overwritten")));
    }

    #[tokio::test]
    async fn unknown_block_type_fails_at_load_time() {
        let mut registry = BlockRegistry::new();
        register_script(&mut registry, "Known", &["a"], &[], None);

        let err = Pipeline::load(&definition("missing", &["DoesNotExist"]), &registry).unwrap_err();
        assert_eq!(err.kind(), "block_not_found");
        assert_eq!(err.detail()["available_blocks"], json!(["Known"]));
    }

    #[tokio::test]
    async fn undeclared_output_fields_abort_the_run() {
        let mut registry = BlockRegistry::new();
        register_script(
            &mut registry,
            "Sloppy",
            &["a"],
            &[("a", json!(1)), ("b", json!(2))],
            None,
        );

        let pipeline = Pipeline::load(&definition("sloppy", &["Sloppy"]), &registry).unwrap();
        let err = pipeline.execute(Context::new()).await.unwrap_err();
        match &err {
            DatasmithError::OutputValidation { extra_fields, .. } => {
                assert_eq!(extra_fields, &["b".to_string()]);
            }
            other => panic!("expected OutputValidation, got {other:?}"),
        }
        assert_eq!(err.detail()["extra_fields"], json!(["b"]));
        assert_eq!(err.detail()["declared_outputs"], json!(["a"]));
    }

    #[tokio::test]
    async fn wildcard_outputs_skip_validation() {
        let mut registry = BlockRegistry::new();
        register_script(
            &mut registry,
            "Anything",
            &["*"],
            &[("whatever", json!(true)), ("more", json!(1))],
            None,
        );

        let pipeline = Pipeline::load(&definition("wild", &["Anything"]), &registry).unwrap();
        let run = pipeline.execute(Context::new()).await.unwrap();
        assert_eq!(run.context.get("whatever"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn producing_a_subset_of_declared_outputs_is_allowed() {
        let mut registry = BlockRegistry::new();
        register_script(&mut registry, "Partial", &["a", "b"], &[("a", json!(1))], None);

        let pipeline = Pipeline::load(&definition("subset", &["Partial"]), &registry).unwrap();
        let run = pipeline.execute(Context::new()).await.unwrap();
        assert_eq!(run.context.get("a"), Some(&json!(1)));
        assert!(run.context.get("b").is_none());
    }

    #[tokio::test]
    async fn failing_step_reports_position_message_and_input() {
        let mut registry = BlockRegistry::new();
        register_script(&mut registry, "First", &["a"], &[("a", json!(1))], None);
        register_script(&mut registry, "Boom", &["b"], &[], Some("boom"));
        register_script(&mut registry, "Third", &["c"], &[("c", json!(3))], None);

        let pipeline =
            Pipeline::load(&definition("failing", &["First", "Boom", "Third"]), &registry).unwrap();
        let err = pipeline.execute(Context::new()).await.unwrap_err();

        match &err {
            DatasmithError::BlockExecution {
                block_type,
                step,
                message,
                input,
            } => {
                assert_eq!(block_type, "Boom");
                assert_eq!(*step, 2);
                assert_eq!(message, "boom");
                // the input snapshot is the state after step 1
                assert_eq!(input, &json!({"a": 1}));
            }
            other => panic!("expected BlockExecution, got {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "Block 'Boom' failed at step 2: boom"
        );
        assert_eq!(err.detail()["step"], json!(2));
    }

    #[tokio::test]
    async fn empty_pipeline_returns_the_input_unchanged() {
        let registry = BlockRegistry::new();
        let pipeline = Pipeline::load(&definition("empty", &[]), &registry).unwrap();

        let mut input = Context::new();
        input.insert("seed", json!("kept"));
        let run = pipeline.execute(input).await.unwrap();

        assert_eq!(run.context.get("seed"), Some(&json!("kept")));
        assert!(run.trace.is_empty());
        // run ids are real UUIDs
        assert_eq!(run.run_id.len(), 36);
    }

    #[tokio::test]
    async fn each_execution_gets_a_fresh_run_id() {
        let registry = BlockRegistry::new();
        let pipeline = Pipeline::load(&definition("ids", &[]), &registry).unwrap();
        let first = pipeline.execute(Context::new()).await.unwrap();
        let second = pipeline.execute(Context::new()).await.unwrap();
        assert_ne!(first.run_id, second.run_id);
    }
}
