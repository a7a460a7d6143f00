use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Commands;
use crate::store::DEFAULT_TASK_FILE;

/// File-backed to-do list with due dates and reminders.
/// Storage defaults to ./tasks.json or a path passed via --db.
#[derive(Parser)]
#[command(name = "todo", version, about = "To-do list with due-date reminders")]
pub struct Cli {
    /// Path to the JSON task file.
    #[arg(long, global = true, env = "TODO_DB", default_value = DEFAULT_TASK_FILE)]
    pub db: PathBuf,

    /// Log file for the terminal UI (default: the task file with a .log extension).
    #[arg(long, global = true, env = "TODO_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Command to run; launches the terminal UI when omitted.
    #[command(subcommand)]
    pub command: Option<Commands>,
}
