//! Command implementations for the CLI interface.
//!
//! One-shot commands work on a `TaskStore` loaded from the task file and save
//! it back after mutating. `ui` and `watch` stay running and go through a
//! `Session` so reminders can fire.

use std::io::Write;
use std::path::Path;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use chrono::NaiveDateTime;
use clap::Subcommand;
use clap_complete::{generate, Shell};
use tracing::info;

use crate::reminder::{compute_fire_time, NotificationPayload, Notifier};
use crate::session::Session;
use crate::store::*;
use crate::task::TaskId;
use crate::timer::ThreadTimer;
use crate::tui::run::run_tui;

#[derive(Subcommand)]
pub enum Commands {
    /// Launch the interactive terminal UI.
    Ui,

    /// Add a new task.
    Add {
        /// What needs doing.
        text: String,
        /// Due: "YYYY-MM-DD HH:MM", "tomorrow 9:00", "fri", "in 3h", ...
        #[arg(long)]
        due: Option<String>,
        /// Remind this many hours before the due time.
        #[arg(long, value_name = "HOURS", requires = "due")]
        remind: Option<u32>,
    },

    /// List tasks in display order.
    List {
        /// Hide completed tasks.
        #[arg(long)]
        pending: bool,
    },

    /// Mark a task done, or not done again.
    Toggle {
        /// Task position as shown by `list`.
        position: usize,
    },

    /// Set or clear a task's due time and reminder.
    Due {
        /// Task position as shown by `list`.
        position: usize,
        /// New due time; omit to clear the due time and reminder.
        when: Option<String>,
        /// Remind this many hours before the due time.
        #[arg(long, value_name = "HOURS", requires = "when")]
        remind: Option<u32>,
    },

    /// Remove every completed task.
    RemoveCompleted,

    /// Delete every task.
    Clear {
        /// Confirm deleting all tasks.
        #[arg(long)]
        yes: bool,
    },

    /// Stay in the foreground and print reminders as they fall due.
    Watch,

    /// Create a timestamped backup of the task file.
    Backup,

    /// Generate shell completion scripts.
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Load the task file, exiting with a message if it cannot be read.
pub fn load_or_exit(db_path: &Path) -> TaskStore {
    match TaskStore::load(db_path) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Failed to load tasks: {e}");
            std::process::exit(1);
        }
    }
}

fn save_or_exit(store: &TaskStore, db_path: &Path) {
    if let Err(e) = store.save(db_path) {
        eprintln!("Failed to save tasks: {e}");
        std::process::exit(1);
    }
}

fn parse_when_or_exit(input: &str, now: NaiveDateTime) -> NaiveDateTime {
    match parse_due_input(input, now) {
        Some(due) => due,
        None => {
            eprintln!("Could not understand due time '{input}'.");
            std::process::exit(1);
        }
    }
}

/// Map a 1-based list position to a task id.
pub fn resolve_position(store: &TaskStore, position: usize) -> Result<TaskId, String> {
    position
        .checked_sub(1)
        .and_then(|i| store.id_at(i))
        .ok_or_else(|| match store.len() {
            0 => "There are no tasks.".to_string(),
            n => format!("No task at position {position}; choose 1 to {n}."),
        })
}

fn resolve_or_exit(store: &TaskStore, position: usize) -> TaskId {
    resolve_position(store, position).unwrap_or_else(|e| {
        eprintln!("{e}");
        std::process::exit(1);
    })
}

/// Launch the terminal user interface.
pub fn cmd_ui(db_path: &Path) {
    if let Err(e) = run_tui(db_path) {
        eprintln!("UI error: {e}");
        std::process::exit(1);
    }
}

/// Add a new task.
pub fn cmd_add(
    store: &mut TaskStore,
    db_path: &Path,
    text: String,
    due: Option<String>,
    remind: Option<u32>,
) {
    let now = local_now();
    let due = due.map(|d| parse_when_or_exit(&d, now));
    if let Err(e) = store.add(&text, due, remind) {
        eprintln!("Task not added: {e}");
        std::process::exit(1);
    }
    let position = store.len();
    save_or_exit(store, db_path);
    println!("Added task {position}");
    if let Some(at) = compute_fire_time(due, remind, now) {
        println!("Reminder at {} (while `todo ui` or `todo watch` runs)", format_due(at));
    } else if remind.is_some() {
        println!("Reminder time has already passed; no reminder will fire.");
    }
}

/// Print tasks as a table.
pub fn cmd_list(store: &TaskStore, pending: bool) {
    let rows: Vec<_> = store
        .tasks()
        .iter()
        .enumerate()
        .filter(|(_, t)| !pending || !t.done)
        .collect();
    if rows.is_empty() {
        println!("No tasks.");
        return;
    }

    let now = local_now();
    println!(
        "{:<4} {:<4} {:<16} {:<7} {:<17} {}",
        "#", "Done", "Due", "Remind", "Reminder at", "Task"
    );
    for (i, t) in rows {
        let check = if t.done { "[x]" } else { "[ ]" };
        let lead = t
            .reminder_lead_hours
            .map(|h| format!("{h}h"))
            .unwrap_or_else(|| "-".into());
        let fire = compute_fire_time(t.due, t.reminder_lead_hours, now)
            .map(format_due)
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<4} {:<4} {:<16} {:<7} {:<17} {}",
            i + 1,
            check,
            truncate(&format_due_relative(t.due, now), 16),
            lead,
            fire,
            t.text
        );
    }
}

/// Flip a task's done flag.
pub fn cmd_toggle(store: &mut TaskStore, db_path: &Path, position: usize) {
    let id = resolve_or_exit(store, position);
    let done = match store.toggle_done(id) {
        Ok(done) => done,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    save_or_exit(store, db_path);
    if done {
        println!("Completed {position}");
    } else {
        println!("Reopened {position}");
    }
}

/// Set or clear a task's due time and reminder.
pub fn cmd_due(
    store: &mut TaskStore,
    db_path: &Path,
    position: usize,
    when: Option<String>,
    remind: Option<u32>,
) {
    let id = resolve_or_exit(store, position);
    let due = when.map(|w| parse_when_or_exit(&w, local_now()));
    if let Err(e) = store.update_due(id, due, remind) {
        eprintln!("Due time not changed: {e}");
        std::process::exit(1);
    }
    save_or_exit(store, db_path);
    match due {
        Some(d) => println!("Task {position} due {}", format_due(d)),
        None => println!("Cleared due time for task {position}"),
    }
}

/// Remove completed tasks.
pub fn cmd_remove_completed(store: &mut TaskStore, db_path: &Path) {
    let removed = store.remove_completed();
    save_or_exit(store, db_path);
    println!("Removed {removed} completed task(s)");
}

/// Delete every task once confirmed.
pub fn cmd_clear(store: &mut TaskStore, db_path: &Path, yes: bool) {
    if !yes {
        eprintln!("This deletes all {} task(s). Re-run with --yes to confirm.", store.len());
        std::process::exit(1);
    }
    let removed = store.clear_all();
    save_or_exit(store, db_path);
    println!("Deleted {removed} task(s)");
}

/// Prints reminders to stdout with a terminal bell.
pub struct StdoutNotifier;

impl Notifier for StdoutNotifier {
    fn notify(&mut self, payload: &NotificationPayload) {
        let mut out = std::io::stdout();
        let _ = writeln!(out, "\x07[{}] {}", payload.title, payload.body);
        let _ = out.flush();
    }
}

/// Longest `watch` blocks before checking the clock itself.
const WATCH_POLL: Duration = Duration::from_secs(30);

/// Run until every pending reminder has fired.
pub fn cmd_watch(db_path: &Path) {
    let (timer, events) = ThreadTimer::channel();
    let (mut session, problem) = Session::open(db_path, timer, StdoutNotifier);
    if let Some(e) = problem {
        eprintln!("Failed to load tasks: {e}");
        std::process::exit(1);
    }

    let mut announced = None;
    while let Some((_, at)) = session.next_reminder() {
        if announced != Some(at) {
            info!(next = %at, "waiting for reminders");
            announced = Some(at);
        }
        let wait = (at - session.now()).to_std().unwrap_or_default().min(WATCH_POLL);
        match events.recv_timeout(wait) {
            Ok(event) => {
                session.handle_timer(event);
            }
            Err(RecvTimeoutError::Timeout) => {
                session.fire_overdue();
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    println!("No upcoming reminders.");
}

/// Copy the task file into the backup directory.
pub fn cmd_backup(db_path: &Path) {
    match create_backup(db_path) {
        Ok(backup_path) => {
            println!("Backup created: {}", backup_path.display());
        }
        Err(e) => {
            eprintln!("Failed to create backup: {}", e);
            std::process::exit(1);
        }
    }
}

/// Generate completion scripts for the given shell.
pub fn cmd_completions(shell: Shell) {
    use clap::CommandFactory;
    use crate::cli::Cli;

    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut std::io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    use crate::cli::Cli;

    #[test]
    fn test_resolve_position() {
        let mut store = TaskStore::new();
        assert_eq!(resolve_position(&store, 1).unwrap_err(), "There are no tasks.");
        store.add("a", None, None).unwrap();
        store.add("b", None, None).unwrap();
        assert_eq!(resolve_position(&store, 2), Ok(store.id_at(1).unwrap()));
        assert!(resolve_position(&store, 0).is_err());
        assert_eq!(
            resolve_position(&store, 3).unwrap_err(),
            "No task at position 3; choose 1 to 2."
        );
    }

    #[test]
    fn test_cli_parses_add() {
        let cli = Cli::try_parse_from(["todo", "--db", "x.json", "add", "Buy milk", "--due", "in 2h", "--remind", "1"]).unwrap();
        assert_eq!(cli.db, Path::new("x.json"));
        match cli.command {
            Some(Commands::Add { text, due, remind }) => {
                assert_eq!(text, "Buy milk");
                assert_eq!(due.as_deref(), Some("in 2h"));
                assert_eq!(remind, Some(1));
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_cli_remind_requires_due() {
        assert!(Cli::try_parse_from(["todo", "add", "x", "--remind", "1"]).is_err());
    }

    #[test]
    fn test_cli_defaults_to_ui() {
        let cli = Cli::try_parse_from(["todo"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_verify() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
