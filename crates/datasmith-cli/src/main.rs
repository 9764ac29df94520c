//! CLI binary for running and inspecting Datasmith pipelines.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as AnyhowContext;
use clap::{Parser, Subcommand};
use serde_json::json;

use datasmith_blocks::BlockRegistry;
use datasmith_llm::OpenAiBackend;
use datasmith_pipeline::{run_seeds, CancelFlag, LogProgress, Pipeline};
use datasmith_types::{Context, PipelineDefinition, Record, SeedInput};

#[derive(Parser)]
#[command(name = "datasmith", version, about = "Block pipeline runner for synthesizing LLM text datasets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline from a JSON definition file
    Run {
        /// Path to the pipeline definition (.json)
        pipeline: PathBuf,

        /// Initial context as inline JSON (single run)
        #[arg(long, value_name = "JSON", conflicts_with_all = ["input_file", "seeds"])]
        input: Option<String>,

        /// Read the initial context from a JSON file (single run)
        #[arg(long, value_name = "PATH", conflicts_with = "seeds")]
        input_file: Option<PathBuf>,

        /// Batch mode: seed file holding one seed object or an array of seeds
        #[arg(long, value_name = "PATH")]
        seeds: Option<PathBuf>,

        /// Default model for the generation backend
        #[arg(long)]
        model: Option<String>,

        /// Chat-completions endpoint for the generation backend
        #[arg(long)]
        endpoint: Option<String>,

        /// API key for the generation backend
        #[arg(long)]
        api_key: Option<String>,

        /// Overwrite the temperature parameter of every block config
        #[arg(long)]
        temperature: Option<f32>,

        /// Overwrite the max_tokens parameter of every block config
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Write records as JSON lines to this path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Include the per-step trace in single-run output
        #[arg(long)]
        trace: bool,
    },

    /// Check that a pipeline definition loads against the built-in registry
    Validate {
        /// Path to the pipeline definition (.json)
        pipeline: PathBuf,
    },

    /// List the registered block types
    Blocks {
        /// Print full block schemas as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Backend and generation overrides from the command line.
struct Overrides {
    model: Option<String>,
    endpoint: Option<String>,
    api_key: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing: RUST_LOG wins, otherwise a default level
    let default_directive = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            pipeline,
            input,
            input_file,
            seeds,
            model,
            endpoint,
            api_key,
            temperature,
            max_tokens,
            output,
            trace,
        } => {
            let overrides = Overrides {
                model,
                endpoint,
                api_key,
                temperature,
                max_tokens,
            };
            cmd_run(
                &pipeline,
                input.as_deref(),
                input_file.as_deref(),
                seeds.as_deref(),
                &overrides,
                output.as_deref(),
                trace,
            )
            .await?;
        }
        Commands::Validate { pipeline } => {
            cmd_validate(&pipeline)?;
        }
        Commands::Blocks { json } => {
            cmd_blocks(json)?;
        }
    }

    Ok(())
}

fn load_definition(path: &Path) -> anyhow::Result<PipelineDefinition> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let definition = serde_json::from_str(&source)
        .with_context(|| format!("invalid pipeline definition in {}", path.display()))?;
    Ok(definition)
}

/// Parse the initial context from `--input` or `--input-file`; empty without either.
fn initial_context(input: Option<&str>, input_file: Option<&Path>) -> anyhow::Result<Context> {
    let raw = match (input, input_file) {
        (Some(inline), _) => inline.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => return Ok(Context::new()),
    };
    let object: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&raw).context("initial context must be a JSON object")?;
    Ok(Context::from(object))
}

/// A seed file holds either one seed object or an array of them.
fn load_seeds(path: &Path) -> anyhow::Result<Vec<SeedInput>> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&source)
        .with_context(|| format!("invalid seed JSON in {}", path.display()))?;
    let seeds = match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<SeedInput>, _>>()
            .with_context(|| format!("invalid seed entry in {}", path.display()))?,
        object => vec![serde_json::from_value(object)
            .with_context(|| format!("invalid seed in {}", path.display()))?],
    };
    Ok(seeds)
}

fn build_backend(overrides: &Overrides) -> OpenAiBackend {
    let mut backend = OpenAiBackend::from_env();
    if let Some(endpoint) = &overrides.endpoint {
        backend = backend.with_endpoint(endpoint);
    }
    if let Some(api_key) = &overrides.api_key {
        backend = backend.with_api_key(api_key);
    }
    if let Some(model) = &overrides.model {
        backend = backend.with_model(model);
    }
    backend
}

/// Temperature and max-tokens flags overwrite the matching config values on
/// every block; blocks without those parameters ignore them.
fn apply_generation_overrides(definition: &mut PipelineDefinition, overrides: &Overrides) {
    for block in &mut definition.blocks {
        if let Some(temperature) = overrides.temperature {
            block
                .config
                .insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = overrides.max_tokens {
            block
                .config
                .insert("max_tokens".to_string(), json!(max_tokens));
        }
    }
}

async fn cmd_run(
    path: &Path,
    input: Option<&str>,
    input_file: Option<&Path>,
    seeds_path: Option<&Path>,
    overrides: &Overrides,
    output: Option<&Path>,
    include_trace: bool,
) -> anyhow::Result<()> {
    let mut definition = load_definition(path)?;
    apply_generation_overrides(&mut definition, overrides);

    let backend = Arc::new(build_backend(overrides));
    let registry = BlockRegistry::builtin(backend);
    let pipeline = Pipeline::load(&definition, &registry)
        .with_context(|| format!("failed to load pipeline from {}", path.display()))?;

    if let Some(seeds_path) = seeds_path {
        let seeds = load_seeds(seeds_path)?;
        run_batch(&pipeline, &seeds, output).await
    } else {
        let initial = initial_context(input, input_file)?;
        match output {
            // JSONL requested for a single run: drive it as a one-seed batch
            Some(output_path) => {
                let seeds = vec![SeedInput {
                    repetitions: 1,
                    metadata: initial,
                }];
                run_batch(&pipeline, &seeds, Some(output_path)).await
            }
            None => run_single(&pipeline, initial, include_trace).await,
        }
    }
}

async fn run_single(
    pipeline: &Pipeline,
    initial: Context,
    include_trace: bool,
) -> anyhow::Result<()> {
    let run = pipeline
        .execute_with_progress(initial, &LogProgress)
        .await
        .context("pipeline execution failed")?;

    if include_trace {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&run.context)?);
    }
    Ok(())
}

async fn run_batch(
    pipeline: &Pipeline,
    seeds: &[SeedInput],
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let report = run_seeds(pipeline, seeds, &cancel, &LogProgress).await;

    if let Some(path) = output {
        write_records(path, &report.records)?;
        println!("Wrote {} records to {}", report.records.len(), path.display());
    }

    println!("Completed: {}/{}", report.completed, report.total);
    if report.failed > 0 {
        println!("Failed: {}", report.failed);
    }
    if report.cancelled {
        println!("Cancelled before completion");
    }
    Ok(())
}

fn write_records(path: &Path, records: &[Record]) -> anyhow::Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for record in records {
        serde_json::to_writer(&mut file, record)?;
        file.write_all(b"\n")?;
    }
    Ok(())
}

fn cmd_validate(path: &Path) -> anyhow::Result<()> {
    let definition = load_definition(path)?;
    let registry = BlockRegistry::builtin(Arc::new(OpenAiBackend::from_env()));

    match Pipeline::load(&definition, &registry) {
        Ok(pipeline) => {
            println!("ok: {} blocks", pipeline.len());
            Ok(())
        }
        Err(error) => {
            println!("{}", serde_json::to_string_pretty(&error.to_json())?);
            std::process::exit(1);
        }
    }
}

fn cmd_blocks(as_json: bool) -> anyhow::Result<()> {
    let registry = BlockRegistry::builtin(Arc::new(OpenAiBackend::from_env()));
    let schemas = registry.list_blocks();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&schemas)?);
    } else {
        for schema in &schemas {
            println!("{} [{}] {}", schema.block_type, schema.name, schema.description);
        }
    }
    Ok(())
}
