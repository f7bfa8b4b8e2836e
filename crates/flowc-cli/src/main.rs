//! flowc CLI: compile, validate, and explain YAML batch descriptions.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use flowc_compiler::context::jobflow_location;
use flowc_compiler::dsl::yaml::ConfigOverrides;
use flowc_compiler::plan::JobflowPlan;
use flowc_compiler::{
    parse_batch_description, BatchCompiler, BatchDescription, CompilerContext, CompilerTools,
    ImplicitParameterListParticipant,
};
use flowc_core::config::{CompilerConfig, FailureMode};
use flowc_core::error::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flowc")]
#[command(about = "flowc: batch DSL compiler core", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a batch description and print the compiled jobflows
    Compile {
        /// Path to the batch description YAML file
        #[arg(short, long)]
        batch: PathBuf,

        #[command(flatten)]
        flags: ConfigFlags,
    },

    /// Validate a batch description (parse, blockers, graph structure)
    Validate {
        /// Path to the batch description YAML file
        #[arg(short, long)]
        batch: PathBuf,
    },

    /// Compile a batch description and show each jobflow plan
    Explain {
        /// Path to the batch description YAML file
        #[arg(short, long)]
        batch: PathBuf,

        #[command(flatten)]
        flags: ConfigFlags,
    },
}

/// Command-line configuration; highest priority layer.
#[derive(Args, Debug, Default, Clone)]
struct ConfigFlags {
    /// Build identifier (overrides config)
    #[arg(long)]
    build_id: Option<String>,

    /// Stop at the first failing jobflow
    #[arg(long, conflicts_with = "best_effort")]
    fail_fast: bool,

    /// Compile every jobflow and report all failures
    #[arg(long)]
    best_effort: bool,

    /// Keep flow operators nested
    #[arg(long)]
    no_flatten: bool,

    /// Skip graph rewriting
    #[arg(long)]
    no_rewrite: bool,

    /// Tiny input limit in bytes (overrides config)
    #[arg(long)]
    tiny_limit: Option<u64>,

    /// Small input limit in bytes (overrides config)
    #[arg(long)]
    small_limit: Option<u64>,

    /// Compiler property as KEY=VALUE (repeatable)
    #[arg(long = "property", value_name = "KEY=VALUE")]
    properties: Vec<String>,
}

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("FLOWC_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compile { batch, flags } => {
            if let Err(e) = compile_batch(&batch, &flags) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Validate { batch } => {
            if let Err(e) = validate_batch(&batch) {
                eprintln!("Validation failed: {}", e);
                std::process::exit(1);
            }
            println!("✓ Batch description is valid");
        }
        Commands::Explain { batch, flags } => {
            if let Err(e) = explain_batch(&batch, &flags) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn load(path: &Path) -> Result<BatchDescription, Box<dyn std::error::Error>> {
    let src = fs::read_to_string(path)?;
    Ok(parse_batch_description(&src)?)
}

/// Layers environment, description, and command-line settings.
fn build_config(
    env: CompilerConfig,
    overrides: &ConfigOverrides,
    flags: &ConfigFlags,
) -> Result<CompilerConfig, Error> {
    let mut config = env;
    overrides.apply(&mut config);
    if let Some(id) = &flags.build_id {
        config.build_id = id.clone();
    }
    if flags.fail_fast {
        config.failure_mode = FailureMode::FailFast;
    }
    if flags.best_effort {
        config.failure_mode = FailureMode::BestEffort;
    }
    if flags.no_flatten {
        config.flatten = false;
    }
    if flags.no_rewrite {
        config.rewrite = false;
    }
    if let Some(limit) = flags.tiny_limit {
        config.tiny_input_limit_bytes = limit;
    }
    if let Some(limit) = flags.small_limit {
        config.small_input_limit_bytes = limit;
    }
    for pair in &flags.properties {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("property must be KEY=VALUE: {pair:?}")))?;
        config
            .properties
            .insert(key.trim().to_string(), value.trim().to_string());
    }
    config.validate()?;
    Ok(config)
}

fn run(
    path: &Path,
    flags: &ConfigFlags,
) -> Result<(CompilerContext, flowc_compiler::BatchReference), Box<dyn std::error::Error>> {
    let BatchDescription {
        mut batch,
        config,
        declarations,
    } = load(path)?;
    let config = build_config(CompilerConfig::from_env(), &config, flags)?;
    info!(batch = %batch.info.batch_id, build = %config.build_id, "compiling");

    let mut ctx = CompilerContext::new(config, declarations);
    let tools = CompilerTools::plan_backend().with_participant(ImplicitParameterListParticipant);
    let reference = BatchCompiler::new(tools).compile(&mut ctx, &mut batch)?;
    Ok((ctx, reference))
}

fn compile_batch(path: &Path, flags: &ConfigFlags) -> Result<(), Box<dyn std::error::Error>> {
    let (ctx, reference) = run(path, flags)?;

    println!("✓ Batch {} compiled", reference.batch_id);
    println!("  Build: {}", ctx.config().build_id);
    for jobflow in &reference.jobflows {
        let hash = jobflow
            .plan_hash
            .map(|h| h.to_hex())
            .unwrap_or_else(|| "-".into());
        println!(
            "  {}: {} tasks, plan hash {}",
            jobflow.flow_id,
            jobflow.tasks.len(),
            hash
        );
    }
    println!("  Resources: {}", reference.resources.len());
    if !reference.diagnostics.is_empty() {
        println!("  Diagnostics:");
        for d in &reference.diagnostics {
            println!("    {}", d);
        }
    }
    Ok(())
}

fn validate_batch(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let description = load(path)?;
    description.batch.jobflow_order()?;
    for element in &description.batch.elements {
        let graph = &element.jobflow.graph;
        graph.validate()?;
        let mut flat = graph.copy();
        flat.flatten()?;
        flat.topological_order()?;
    }
    Ok(())
}

fn explain_batch(path: &Path, flags: &ConfigFlags) -> Result<(), Box<dyn std::error::Error>> {
    let (ctx, reference) = run(path, flags)?;

    println!("Batch Compilation Plan");
    println!("======================");
    println!();
    println!("Batch: {}", reference.batch_id);
    println!("Build: {}", ctx.config().build_id);
    println!(
        "Tiny Limit: {} bytes ({:.2} MB)",
        ctx.config().tiny_input_limit_bytes,
        ctx.config().tiny_input_limit_bytes as f64 / 1_048_576.0
    );
    for jobflow in &reference.jobflows {
        let location = jobflow_location(&jobflow.flow_id).append("plan.json");
        let Some(bytes) = ctx.resource(&location) else {
            continue;
        };
        let plan: JobflowPlan = serde_json::from_slice(bytes)?;
        println!();
        println!("Jobflow {} (plan hash {})", jobflow.flow_id, plan.plan_hash);
        for op in &plan.body.operators {
            let mut line = format!("  {}. {}", op.index + 1, op.label);
            if !op.upstreams.is_empty() {
                let ups: Vec<String> = op.upstreams.iter().map(|u| (u + 1).to_string()).collect();
                line.push_str(&format!(" <- [{}]", ups.join(", ")));
            }
            if let Some(strategy) = op.join_strategy {
                line.push_str(&format!(" join={}", strategy));
            }
            if let Some(selection) = &op.master_selection {
                line.push_str(&format!(" selection={}", selection));
            }
            println!("{}", line);
            for (key, value) in &op.estimates {
                println!("       {} = {}", key, value);
            }
        }
        println!("  Tasks:");
        for task in &jobflow.tasks {
            println!("    [{}] {} -> {}", task.phase, task.module, task.location);
        }
    }

    Ok(())
}
