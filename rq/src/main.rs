//! rq - resumable chunked document rewriting
//!
//! CLI entry point for submitting, running and inspecting rewrite tasks.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info};

use rewriteq::cli::{Cli, Command};
use rewriteq::config::Config;
use rewriteq::llm::create_client;
use rewriteq::pipeline::{Pipeline, TaskOutcome};
use rewriteq::prompts::PromptLoader;
use rewriteq::store::{NewTask, TaskStore};
use rewriteq::{RewriteTask, SizeMetric, TaskStatus};

/// Characters of each chunk shown by `rq show`
const PREVIEW_CHARS: usize = 100;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rewriteq")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("rewriteq.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Log level comes from the config file before the full load
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(
        "rewriteq loaded config: model={}, storage={}",
        config.llm.model,
        config.storage.root.display()
    );

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Submit {
            file,
            output,
            chunk_size,
            memory_size,
            metric,
        } => cmd_submit(&config, file, output, chunk_size, memory_size, metric),
        Command::List => cmd_list(&config),
        Command::Run => cmd_run(&config).await,
        Command::Show { task } => cmd_show(&config, &task),
    }
}

fn open_pipeline(config: &Config) -> Result<Pipeline> {
    let store = TaskStore::open(&config.storage.root)
        .context(format!("Failed to open task store at {}", config.storage.root.display()))?;
    let prompts = match dirs::config_dir() {
        Some(dir) => PromptLoader::new(dir.join("rewriteq").join("prompts")),
        None => PromptLoader::embedded_only(),
    };
    Ok(Pipeline::new(store, prompts))
}

/// Queue a document
fn cmd_submit(
    config: &Config,
    file: PathBuf,
    output: Option<PathBuf>,
    chunk_size: Option<usize>,
    memory_size: Option<usize>,
    metric: Option<SizeMetric>,
) -> Result<()> {
    debug!(file = %file.display(), ?output, ?chunk_size, ?memory_size, ?metric, "cmd_submit: called");
    let mut pipeline = open_pipeline(config)?;

    let new = NewTask {
        input: file,
        output,
        chunk_size: chunk_size.unwrap_or(config.chunking.chunk_size),
        memory_size: memory_size.unwrap_or(config.chunking.memory_size),
        size_metric: metric.unwrap_or(config.chunking.metric),
    };
    let task = pipeline.submit(new).context("Failed to submit task")?;

    println!("{} Submitted task: {}", "✓".green(), task.id.cyan());
    println!("  Input:  {}", task.input_file);
    println!("  Output: {}", task.output_file);
    println!(
        "  Chunks: {} (up to {} {} each, memory {})",
        task.total_chunks,
        task.chunk_size,
        task.size_metric.unit(),
        task.memory_size
    );
    Ok(())
}

/// List all tasks
fn cmd_list(config: &Config) -> Result<()> {
    debug!("cmd_list: called");
    let pipeline = open_pipeline(config)?;
    let tasks = pipeline.list();

    if tasks.is_empty() {
        println!("No tasks found");
        return Ok(());
    }

    println!(
        "{:<32} {:<11} {:>9} {:>6} {:>6}  {:<19}  {}",
        "ID", "STATUS", "PROGRESS", "SIZE", "MEMORY", "CREATED", "INPUT"
    );
    for task in tasks {
        println!(
            "{:<32} {:<11} {:>9} {:>6} {:>6}  {:<19}  {}",
            task.id,
            colored_status(task.status),
            task.progress(),
            task.chunk_size,
            task.memory_size,
            task.created_at.format("%Y-%m-%d %H:%M:%S"),
            file_name(&task.input_file)
        );
    }
    Ok(())
}

/// Process every pending task
async fn cmd_run(config: &Config) -> Result<()> {
    debug!("cmd_run: called");
    config.validate()?;
    let client = create_client(&config.llm).context("Failed to create LLM client")?;
    let mut pipeline = open_pipeline(config)?.with_client(client, config.llm.max_tokens);

    let interrupted: Vec<&RewriteTask> = pipeline
        .list()
        .iter()
        .filter(|t| t.status == TaskStatus::Processing || (t.status == TaskStatus::Pending && t.processed_chunks > 0))
        .collect();
    if !interrupted.is_empty() {
        println!("{} Found {} interrupted task(s). Resuming...", "!".yellow(), interrupted.len());
        for task in interrupted {
            println!("  - {} ({} chunks processed)", task.id, task.progress());
        }
    }

    let summary = pipeline.run_pending().await.context("Run failed")?;
    if summary.outcomes.is_empty() {
        println!("{}", "No pending tasks to process.".yellow());
        return Ok(());
    }

    for (id, outcome) in &summary.outcomes {
        match outcome {
            TaskOutcome::Completed { chunk_errors: 0 } => {
                println!("{} Task {} completed", "✓".green(), id.cyan());
            }
            TaskOutcome::Completed { chunk_errors } => {
                println!(
                    "{} Task {} completed with {} failed chunk(s)",
                    "!".yellow(),
                    id.cyan(),
                    chunk_errors
                );
            }
            TaskOutcome::Failed(message) => {
                println!("{} Task {} failed: {}", "✗".red(), id.cyan(), message);
            }
        }
        if let Some(task) = pipeline.store().get(id) {
            println!("  Output: {}", task.output_file);
        }
    }
    println!("{}", summary);
    Ok(())
}

/// Show one task in full
fn cmd_show(config: &Config, reference: &str) -> Result<()> {
    debug!(%reference, "cmd_show: called");
    let pipeline = open_pipeline(config)?;
    let report = pipeline.describe(reference)?;
    let task = &report.task;

    println!("{}", "Task Information:".bold());
    println!("ID:          {}", task.id.cyan());
    println!("Storage ID:  {}", task.storage_id);
    println!("Status:      {}", colored_status(task.status));
    println!("Created:     {}", task.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(completed_at) = task.completed_at {
        println!("Completed:   {}", completed_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!("Input File:  {}", task.input_file);
    println!("Output File: {}", task.output_file);
    println!("Progress:    {} chunks", task.progress());
    println!("Chunk Size:  {} {}", task.chunk_size, task.size_metric.unit());
    println!("Memory Size: {}", task.memory_size);
    if let Some(error) = &task.error_message {
        println!("{}", format!("Error: {}", error).red());
    }

    if !task.qa_pairs.is_empty() {
        println!("\n{}", "Q&A Pairs:".bold());
        for qa in &task.qa_pairs {
            let label = format!("Chunk {}:", qa.chunk_index + 1);
            if qa.is_error() {
                println!("\n{} {}", label.bold(), "failed".red());
            } else {
                println!("\n{}", label.bold());
            }
            println!("Size: {} {}", qa.size, task.size_metric.unit());
            println!("Question Preview: {}", preview(&qa.question, PREVIEW_CHARS));
            println!("Answer Preview:   {}", preview(&qa.answer, PREVIEW_CHARS));
        }
    }

    println!("\n{}", "Directory Structure:".bold());
    println!("Base Directory: {}", report.task_dir.display());
    println!("Files: {}", report.files.len());
    for file in &report.files {
        println!("  - {}", file_name(&file.to_string_lossy()));
    }
    Ok(())
}

fn colored_status(status: TaskStatus) -> ColoredString {
    let label = format!("{:<11}", status.to_string());
    match status {
        TaskStatus::Pending => label.yellow(),
        TaskStatus::Processing => label.blue(),
        TaskStatus::Completed => label.green(),
        TaskStatus::Failed => label.red(),
    }
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// First `max` characters on one line, with an ellipsis if cut
fn preview(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() > max {
        let cut: String = flat.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}
