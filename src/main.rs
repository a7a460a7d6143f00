//! # todo - to-do list with due-date reminders
//!
//! A single-user, file-backed to-do list. Tasks are short lines of text that
//! can be ticked off, given a due time, and given a reminder that fires a set
//! number of hours before they are due.
//!
//! ## Quick Start
//!
//! ```bash
//! # Launch the terminal UI (reminders fire while it runs)
//! todo
//!
//! # Add a task due tomorrow at 17:00 with a reminder two hours before
//! todo add "Submit report" --due "tomorrow 17:00" --remind 2
//!
//! # List, tick off, and tidy up
//! todo list
//! todo toggle 1
//! todo remove-completed
//!
//! # Print reminders as they fall due, without the UI
//! todo watch
//! ```
//!
//! Tasks live in `./tasks.json` unless `--db` or `TODO_DB` points elsewhere.
//! The file is a JSON array of `{"task", "done", "due", "reminder"}` objects
//! and is rewritten in full after every change.
//!
//! Set `TODO_LOG` (e.g. `TODO_LOG=debug`) to control logging. The UI writes its
//! log next to the task file (`tasks.log`) or to `--log-file`.

use clap::Parser;

pub mod cli;
pub mod cmd;
pub mod error;
pub mod logging;
pub mod reminder;
pub mod session;
pub mod store;
pub mod task;
pub mod timer;
pub mod tui {
    pub mod app;
    pub mod colors;
    pub mod due_form;
    pub mod enums;
    pub mod input;
    pub mod run;
    pub mod utils;
}

use cli::Cli;
use cmd::*;

fn main() {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Ui);

    // Commands that don't need the task list loaded up front
    match command {
        Commands::Ui => {
            let log_path = cli.log_file.unwrap_or_else(|| cli.db.with_extension("log"));
            let _guard = logging::init_file(&log_path, "info");
            cmd_ui(&cli.db);
            return;
        }
        Commands::Watch => {
            logging::init_stderr("info");
            cmd_watch(&cli.db);
            return;
        }
        Commands::Backup => {
            logging::init_stderr("warn");
            cmd_backup(&cli.db);
            return;
        }
        Commands::Completions { shell } => {
            cmd_completions(shell);
            return;
        }
        _ => logging::init_stderr("warn"),
    }

    let db_path = cli.db;
    let mut store = load_or_exit(&db_path);

    match command {
        Commands::Ui | Commands::Watch | Commands::Backup | Commands::Completions { .. } => {
            unreachable!("handled above")
        }
        Commands::Add { text, due, remind } => cmd_add(&mut store, &db_path, text, due, remind),
        Commands::List { pending } => cmd_list(&store, pending),
        Commands::Toggle { position } => cmd_toggle(&mut store, &db_path, position),
        Commands::Due { position, when, remind } => {
            cmd_due(&mut store, &db_path, position, when, remind)
        }
        Commands::RemoveCompleted => cmd_remove_completed(&mut store, &db_path),
        Commands::Clear { yes } => cmd_clear(&mut store, &db_path, yes),
    }
}
