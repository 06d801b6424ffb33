//! Docpack CLI
//!
//! The `docpack` command runs a documentation agent over a `.docpack` bundle.
//!
//! ## Commands
//!
//! - `run`: Execute the bundle's tasks with an LLM agent (OpenAI or Ollama)
//! - `validate`: Static checks on layout, manifest, tasks and indexes
//! - `inspect`: Show manifest, constraints, content and execution order
//! - `init`: Scaffold an empty bundle

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, Level};

use docpack_agent::{AgentConfig, OpenAiCompatibleAgent};
use docpack_core::{
    list_output_files, tree_stats, validate, Bundle, BundleLayout, Orchestrator, RunConfig,
    RunSummary, TaskStatus, MANIFEST_FILE, TASKS_FILE,
};

#[derive(Parser)]
#[command(name = "docpack")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run documentation agents over .docpack bundles", long_about = None)]
struct Cli {
    /// Enable verbose output (debug logs, detailed inspect)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the documentation agent over a bundle
    Run {
        /// Bundle directory
        #[arg(env = "WORKSPACE_PATH", default_value = "/workspace")]
        bundle: PathBuf,

        /// Agent turns allowed per task
        #[arg(long, env = "DOCPACK_MAX_ITERATIONS", default_value = "15")]
        max_iterations: u32,

        /// Timeout for a single agent call, in seconds
        #[arg(long, env = "DOCPACK_AGENT_TIMEOUT_SECS", default_value = "120")]
        agent_timeout_secs: u64,

        /// Retries after a failed agent call
        #[arg(long, env = "DOCPACK_AGENT_RETRIES", default_value = "2")]
        agent_retries: u32,

        /// Cap on bytes written to output/ (defaults to the manifest memory limit)
        #[arg(long, env = "DOCPACK_MAX_OUTPUT_BYTES")]
        max_output_bytes: Option<u64>,

        /// Write the run summary as JSON to this path (outside the bundle)
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Validate a bundle's structure
    Validate {
        /// Bundle directory
        bundle: PathBuf,
    },

    /// Inspect a bundle's structure and metadata
    Inspect {
        /// Bundle directory
        bundle: PathBuf,
    },

    /// Create a new, empty bundle
    Init {
        /// Directory to create (must not exist)
        path: PathBuf,

        /// Bundle name (defaults to the directory name)
        #[arg(short, long)]
        name: Option<String>,

        /// Also write a starter tasks.json
        #[arg(long)]
        with_tasks: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    docpack_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            bundle,
            max_iterations,
            agent_timeout_secs,
            agent_retries,
            max_output_bytes,
            summary,
        } => {
            let config = RunConfig {
                max_iterations_per_task: max_iterations,
                agent_timeout: Duration::from_secs(agent_timeout_secs),
                agent_max_retries: agent_retries,
                max_output_bytes,
                ..RunConfig::default()
            };
            cmd_run(&bundle, config, summary.as_deref()).await
        }
        Commands::Validate { bundle } => cmd_validate(&bundle),
        Commands::Inspect { bundle } => cmd_inspect(&bundle, cli.verbose),
        Commands::Init {
            path,
            name,
            with_tasks,
        } => cmd_init(&path, name.as_deref(), with_tasks),
    }
}

async fn cmd_run(bundle_path: &Path, config: RunConfig, summary_path: Option<&Path>) -> Result<()> {
    if config.max_iterations_per_task == 0 {
        bail!("--max-iterations must be at least 1");
    }
    if config.agent_timeout.is_zero() {
        bail!("--agent-timeout-secs must be at least 1");
    }

    let report = validate(bundle_path);
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    if !report.is_valid() {
        for error in &report.errors {
            eprintln!("error: {error}");
        }
        bail!("bundle validation failed: {}", bundle_path.display());
    }

    let bundle = Bundle::load(bundle_path)
        .with_context(|| format!("Failed to load bundle: {}", bundle_path.display()))?;
    let summary_target = summary_path
        .map(|p| summary_destination(&bundle.layout, p))
        .transpose()?;

    let agent_config = AgentConfig::from_env().context("Failed to configure agent")?;
    println!("Running documenter on: {}", bundle_path.display());
    println!(
        "Agent: {} ({})",
        agent_config.model, agent_config.backend
    );
    let agent = OpenAiCompatibleAgent::new(agent_config).context("Failed to create agent client")?;

    let orchestrator = Orchestrator::new(bundle, agent).with_config(config);
    let summary = orchestrator.run().await.context("Run failed")?;

    print_summary(&summary, &orchestrator.bundle().layout)?;

    if let Some(target) = summary_target {
        let body = serde_json::to_string_pretty(&summary)?;
        std::fs::write(&target, body)
            .with_context(|| format!("Failed to write summary: {}", target.display()))?;
        info!(path = %target.display(), "run summary written");
    }
    Ok(())
}

/// The summary is a host-side artifact and must not land inside the bundle.
fn summary_destination(layout: &BundleLayout, requested: &Path) -> Result<PathBuf> {
    let root = std::fs::canonicalize(&layout.root)
        .with_context(|| format!("Failed to resolve bundle: {}", layout.root.display()))?;
    let file_name = requested
        .file_name()
        .with_context(|| format!("Summary path has no file name: {}", requested.display()))?;
    let parent = match requested.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let parent = std::fs::canonicalize(&parent)
        .with_context(|| format!("Summary directory does not exist: {}", parent.display()))?;
    if parent.starts_with(&root) {
        bail!(
            "summary path must be outside the bundle: {}",
            requested.display()
        );
    }
    Ok(parent.join(file_name))
}

fn print_summary(summary: &RunSummary, layout: &BundleLayout) -> Result<()> {
    println!();
    println!("{}", "=".repeat(60));
    println!("Run {} finished", summary.run_id);
    println!();
    for task in &summary.tasks {
        let marker = match task.status {
            TaskStatus::Completed => "ok",
            TaskStatus::IncompleteByIterationLimit | TaskStatus::ResourceExhausted => "!!",
            TaskStatus::SkippedDueToDependency | TaskStatus::SkippedDueToDeadline => "--",
        };
        println!(
            "  [{marker}] {:<24} {} ({} iterations, {} tool calls)",
            task.task_id, task.status, task.iterations, task.tool_calls
        );
        if let Some(detail) = &task.detail {
            println!("       {detail}");
        }
        if task.status == TaskStatus::Completed && !task.output_present {
            println!("       declared output {} was not written", task.output_path);
        }
    }

    println!();
    println!(
        "Completed {}/{} tasks, {} file reads, {} bytes written",
        summary.count(TaskStatus::Completed),
        summary.tasks.len(),
        summary.usage.reads_consumed,
        summary.usage.bytes_written
    );

    if summary.output_files.is_empty() {
        println!("No output files were written.");
    } else {
        println!("\nGenerated files:");
        for file in &summary.output_files {
            let size = std::fs::metadata(layout.output.join(file))
                .map(|m| m.len())
                .with_context(|| format!("Failed to stat output file: {file}"))?;
            println!("  - {file} ({size} bytes)");
        }
    }
    Ok(())
}

fn cmd_validate(bundle_path: &Path) -> Result<()> {
    println!("Validating .docpack: {}", bundle_path.display());
    let report = validate(bundle_path);

    for error in &report.errors {
        println!("  error:   {error}");
    }
    for warning in &report.warnings {
        println!("  warning: {warning}");
    }
    if !report.is_valid() {
        bail!(
            "validation failed with {} error(s) and {} warning(s)",
            report.errors.len(),
            report.warnings.len()
        );
    }
    if report.warnings.is_empty() {
        println!("Valid .docpack");
    } else {
        println!("Valid .docpack ({} warning(s))", report.warnings.len());
    }
    Ok(())
}

fn cmd_inspect(bundle_path: &Path, verbose: bool) -> Result<()> {
    let bundle = Bundle::load(bundle_path)
        .with_context(|| format!("Failed to load bundle: {}", bundle_path.display()))?;
    let manifest = &bundle.manifest;
    let rule = "-".repeat(60);

    println!("Inspecting .docpack: {}\n", bundle_path.display());

    println!("Docpack\n{rule}");
    println!("Name:        {}", manifest.name);
    println!("Version:     {}", manifest.version);
    println!(
        "Description: {}",
        manifest.description.as_deref().unwrap_or("none")
    );
    if let Some(metadata) = manifest.metadata.as_ref().and_then(|m| m.as_object()) {
        for key in ["created", "creator", "source_type", "language"] {
            if let Some(value) = metadata.get(key).and_then(|v| v.as_str()) {
                println!("{:<13}{value}", format!("{key}:"));
            }
        }
    }
    println!();

    let constraints = manifest.constraints();
    println!("Environment\n{rule}");
    println!("Interpreter: {}", manifest.environment.interpreter);
    println!("Tools:       {} enabled", manifest.tools().len());
    if verbose {
        for tool in manifest.tools() {
            println!("  - {tool}");
        }
    }
    println!("Constraints:");
    println!("  max_file_reads:             {}", constraints.max_file_reads);
    println!(
        "  max_execution_time_seconds: {}",
        constraints.max_execution_time_seconds
    );
    println!("  memory_limit_mb:            {}", constraints.memory_limit_mb);
    println!();

    let stats = tree_stats(&bundle.layout.content)
        .with_context(|| format!("Failed to scan {}", bundle.layout.content.display()))?;
    println!("Content\n{rule}");
    println!("Files:       {}", stats.files);
    println!(
        "Total size:  {} bytes ({:.2} MB)",
        stats.bytes,
        stats.bytes as f64 / 1_048_576.0
    );
    println!();

    let index = &bundle.layout.index;
    let mark = |present: bool| if present { "yes" } else { "no" };
    println!("Index\n{rule}");
    println!("Search index:   {}", mark(index.join("search.json").is_file()));
    println!("Semantic graph: {}", mark(index.join("graph.json").is_file()));
    println!();

    println!("Tasks\n{rule}");
    if bundle.tasks.exploration {
        println!("No {TASKS_FILE}: exploration mode");
    }
    println!("Mission: {}", bundle.tasks.mission);
    println!("Execution order:");
    for (position, task) in bundle.ordered_tasks().iter().enumerate() {
        print!("  {}. {} -> {}", position + 1, task.id, task.output.path);
        if !task.depends_on.is_empty() {
            print!(" (after {})", task.depends_on.join(", "));
        }
        println!();
        if verbose && !task.description.is_empty() {
            println!("     {}", task.description);
        }
    }
    println!();

    let outputs = list_output_files(&bundle.layout.output)
        .with_context(|| format!("Failed to list {}", bundle.layout.output.display()))?;
    if !outputs.is_empty() {
        println!("Output\n{rule}");
        println!("Generated files: {}", outputs.len());
        if verbose {
            for file in &outputs {
                println!("  - {file}");
            }
        }
        println!();
    }
    Ok(())
}

fn cmd_init(path: &Path, name: Option<&str>, with_tasks: bool) -> Result<()> {
    if path.exists() {
        bail!("Path already exists: {}", path.display());
    }
    let name = name
        .map(str::to_string)
        .or_else(|| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.trim_end_matches(".docpack").to_string())
        })
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "my-docpack".to_string());

    info!(path = %path.display(), name = %name, "initializing bundle");
    let layout = BundleLayout::new(path);
    for dir in [&layout.content, &layout.index, &layout.output] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let manifest = json!({
        "version": "1.0",
        "name": name,
        "description": "A new docpack",
        "environment": {
            "tools": ["list_files", "read_file", "write_output"],
            "interpreter": "python3.12",
            "constraints": {
                "max_file_reads": 1000,
                "max_execution_time_seconds": 300,
                "memory_limit_mb": 2048
            }
        },
        "metadata": {
            "created": chrono::Utc::now().to_rfc3339(),
            "creator": "docpack-cli",
            "source_type": "manual",
            "language": "unknown"
        }
    });
    write_json(&layout.manifest, &manifest)?;

    if with_tasks {
        let tasks = json!({
            "mission": "Explore and understand this project",
            "tasks": [{
                "id": "task_1",
                "name": "Create project overview",
                "description": "Analyze the project structure and create a comprehensive overview",
                "tools_allowed": ["list_files", "read_file", "write_output"],
                "output": {"type": "markdown", "path": "output/overview.md"}
            }],
            "constraints": {
                "forbidden_actions": ["modify_files", "execute_code"],
                "output_format": "markdown"
            },
            "evaluation": {
                "success_criteria": [
                    "All tasks completed without errors",
                    "Output files exist at specified paths"
                ]
            }
        });
        write_json(&layout.tasks, &tasks)?;
    }

    let readme = format!(
        "# {name}\n\nAdd your project files to this directory.\n\nThis .docpack was created with docpack-cli.\n"
    );
    let readme_path = layout.content.join("README.md");
    std::fs::write(&readme_path, readme)
        .with_context(|| format!("Failed to write {}", readme_path.display()))?;

    let shown = path.display();
    println!("Initialized .docpack: {shown}");
    println!("\nNext steps:");
    println!("  1. Add your source files to {shown}/content/");
    println!("  2. Customize {shown}/{MANIFEST_FILE} to enable additional tools");
    if with_tasks {
        println!("  3. Edit {shown}/{TASKS_FILE} to define your documentation goals");
    } else {
        println!("  3. Create {shown}/{TASKS_FILE} to define your documentation goals");
    }
    println!("  4. Run: docpack run {shown}");
    Ok(())
}

fn write_json(path: &Path, value: &serde_json::Value) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    std::fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))
}
