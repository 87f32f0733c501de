use anyhow::Context;
use clap::builder::PossibleValuesParser;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use task_cli::config::Config;
use task_cli::{JsonTaskRepository, Status, TaskService};
use tracing::{debug, info};
use tracing_subscriber::filter::LevelFilter;

/// Track what you need to do, what you are doing, and what you have done.
#[derive(Parser, Debug)]
#[command(version)]
struct Cli {
    /// Tasks file to use instead of $TASK_CLI_FILE or ./tasks.json
    #[arg(long, global = true)]
    file: Option<PathBuf>,

    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
enum Commands {
    /// Add a task
    Add { description: String },
    /// Replace the description of a task
    Update { id: u32, description: String },
    /// Delete a task
    Delete { id: u32 },
    /// Mark a task as in progress
    MarkInProgress { id: u32 },
    /// Mark a task as done
    MarkDone { id: u32 },
    /// List tasks, optionally only those with the given status
    List {
        #[arg(value_parser = PossibleValuesParser::new(Status::ALL.map(Status::label)))]
        status: Option<String>,
    },
}

fn init_logging(verbose: u8, configured: &str) -> anyhow::Result<()> {
    let level = match verbose {
        0 => LevelFilter::from_str(configured)
            .with_context(|| format!("invalid log level '{configured}'"))?,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let config = Config::from_env().context("cannot load configuration")?;
    init_logging(args.verbose, &config.log_level)?;

    let repository = JsonTaskRepository::new(args.file.unwrap_or(config.file));
    debug!(path = %repository.path().display(), "using tasks file");
    let service = TaskService::new(repository);

    info!(command = ?args.command, "running");
    match args.command {
        Commands::Add { description } => {
            let task = service.add_task(&description)?;
            println!("Task added successfully (ID: {})", task.id());
        }
        Commands::Update { id, description } => {
            let task = service.update_task(id, Some(&description), None)?;
            println!("Task {} updated successfully", task.id());
        }
        Commands::Delete { id } => {
            service.delete_task(id)?;
            println!("Task {id} deleted successfully");
        }
        Commands::MarkInProgress { id } => {
            let task = service.mark_in_progress(id)?;
            println!("Task {} marked as in progress", task.id());
        }
        Commands::MarkDone { id } => {
            let task = service.mark_done(id)?;
            println!("Task {} marked as done", task.id());
        }
        Commands::List { status } => {
            let tasks = service.list_tasks(status.as_deref())?;
            if tasks.is_empty() {
                println!("No tasks found");
            } else {
                println!("Tasks ({}):", tasks.len());
                for task in tasks {
                    println!(
                        "  - [ID: {}] {} (Status: {})",
                        task.id(),
                        task.description(),
                        task.status()
                    );
                }
            }
        }
    };

    Ok(())
}
