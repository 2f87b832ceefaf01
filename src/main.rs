use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use testforge::acquire::WorkspaceSource;
use testforge::ai::OpenRouterTransport;
use testforge::config::Config;
use testforge::execute::ExecutionEngine;
use testforge::pipeline::Orchestrator;
use testforge::task::store::{FileTaskStore, TaskStore};
use testforge::task::TaskStatus;
use testforge::util::{truncate, write_atomic};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(
    name = "testforge",
    about = "Generate unit tests for a repository with a language model, run them, and report coverage",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a repository, generate tests, run them and print the results
    Run(RunArgs),
    /// Show a stored task
    Status(StatusArgs),
    /// List stored tasks, newest first
    List,
    /// Show the effective configuration
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Git URL or local directory
    source: String,
    /// Write the result bundle here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
    /// Whole-task timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
    /// Generate tests for at most this many files per language
    #[arg(long)]
    max_files: Option<usize>,
    /// Also ask the model for mocks of each file's dependencies
    #[arg(long)]
    mocks: bool,
}

#[derive(Args, Debug)]
struct StatusArgs {
    task_id: Uuid,
    /// Print the stored result bundle as well
    #[arg(long)]
    results: bool,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// Read an OpenRouter API key from stdin and store it in the system keychain
    #[arg(long)]
    store_api_key: bool,
    /// Write the effective configuration to the config file
    #[arg(long, conflicts_with = "store_api_key")]
    write: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load();
    testforge::logging::init(&config.logging);

    match cli.command {
        Commands::Run(args) => run_task(config, args).await,
        Commands::Status(args) => show_status(&config, args),
        Commands::List => list_tasks(&config),
        Commands::Config(args) => show_config(&config, args),
    }
}

async fn run_task(mut config: Config, args: RunArgs) -> Result<()> {
    if let Some(timeout) = args.timeout {
        config.pipeline.task_timeout_secs = timeout;
    }
    if args.max_files.is_some() {
        config.pipeline.max_files_per_language = args.max_files;
    }
    if args.mocks {
        config.pipeline.generate_mocks = true;
    }

    let api_key = config.api_key().ok_or_else(|| {
        anyhow!("No API key configured. Set OPENROUTER_API_KEY or run `testforge config --store-api-key`.")
    })?;
    let transport = OpenRouterTransport::new(&config.ai, api_key)?;
    let store = FileTaskStore::new(config.store_dir());
    let source = WorkspaceSource::new(config.workspace_dir())
        .with_clone_timeout(std::time::Duration::from_secs(config.execution.test_timeout_secs));
    let executor = ExecutionEngine::new(config.execution.clone());

    let orchestrator = Orchestrator::new(
        config,
        Arc::new(store),
        Arc::new(transport),
        Arc::new(source),
        Arc::new(executor),
    );

    let task = orchestrator.submit(&args.source).await?;
    eprintln!("Task {} submitted for {}", task.id, args.source);
    let sink = |progress: u8, step: &str| eprintln!("  [{:>3}%] {}", progress, step);
    let outcome = orchestrator.run(task, &sink).await?;

    match (&outcome.task.status, &outcome.results) {
        (TaskStatus::Completed, Some(results)) => {
            let json = serde_json::to_string_pretty(results)?;
            match &args.output {
                Some(path) => {
                    write_atomic(path, &json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    eprintln!("Results written to {}", path.display());
                }
                None => println!("{}", json),
            }
            let summary = &results.summary;
            eprintln!(
                "Done: {} tests generated, {} passed, {} failed, {:.2}% coverage",
                summary.total_tests_generated,
                summary.tests_passed,
                summary.tests_failed,
                summary.overall_coverage
            );
            Ok(())
        }
        _ => Err(anyhow!(
            "Task {} {}: {}",
            outcome.task.id,
            outcome.task.status,
            outcome.task.error_message.as_deref().unwrap_or("unknown error")
        )),
    }
}

fn show_status(config: &Config, args: StatusArgs) -> Result<()> {
    let store = FileTaskStore::new(config.store_dir());
    let task = store
        .load_task(args.task_id)?
        .ok_or_else(|| anyhow!("No task with id {}", args.task_id))?;
    println!("{}", serde_json::to_string_pretty(&task)?);

    if args.results {
        match store.load_results(args.task_id)? {
            Some(results) => println!("{}", serde_json::to_string_pretty(&results)?),
            None => eprintln!("No results stored for task {}", args.task_id),
        }
    }
    Ok(())
}

fn list_tasks(config: &Config) -> Result<()> {
    let store = FileTaskStore::new(config.store_dir());
    let tasks = store.list_tasks()?;
    if tasks.is_empty() {
        eprintln!("No tasks stored in {}", store.dir().display());
        return Ok(());
    }
    for task in tasks {
        println!(
            "{}  {:<9}  {:>3}%  {}  {}",
            task.id,
            task.status,
            task.progress,
            task.created_at.format("%Y-%m-%d %H:%M:%S"),
            truncate(&task.source, 80)
        );
    }
    Ok(())
}

fn show_config(config: &Config, args: ConfigArgs) -> Result<()> {
    if args.store_api_key {
        eprintln!("Paste the OpenRouter API key and press enter:");
        let mut key = String::new();
        io::stdin()
            .lock()
            .read_line(&mut key)
            .context("Failed to read API key from stdin")?;
        let key = key.trim();
        if key.is_empty() {
            return Err(anyhow!("No API key given"));
        }
        Config::set_api_key(key).map_err(|e| anyhow!(e))?;
        eprintln!("API key stored in the system keychain");
        return Ok(());
    }

    if args.write {
        config.save().map_err(|e| anyhow!(e))?;
        eprintln!("Configuration written to {}", Config::config_location());
        return Ok(());
    }

    println!("# {}", Config::config_location());
    println!("{}", toml::to_string_pretty(config)?);
    println!(
        "# API key: {}",
        if config.api_key().is_some() { "configured" } else { "missing" }
    );
    Ok(())
}
