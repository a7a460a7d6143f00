//! Task store operations and utility functions for due dates.
//!
//! This module provides the `TaskStore` struct for holding and mutating the
//! ordered task list, its JSON (de)serialization and file persistence, along
//! with helpers for parsing and formatting due timestamps.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, SubsecRound};
use tracing::debug;

use crate::error::{Result, TodoError};
use crate::task::{parse_due_timestamp, Task, TaskId};

/// Default task file, relative to the working directory.
pub const DEFAULT_TASK_FILE: &str = "tasks.json";

/// Time of day used when a due date is given without one.
pub const DEFAULT_DUE_TIME: (u32, u32) = (9, 0);

/// Ordered, in-memory task list. Insertion order is display order.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: Vec<Task>,
    next_id: u64,
}

impl TaskStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from already-parsed records, assigning fresh ids.
    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        let mut store = TaskStore::new();
        for mut task in tasks {
            task.id = store.allocate_id();
            store.tasks.push(task);
        }
        store
    }

    /// Parse a store from the JSON file format.
    pub fn from_json(data: impl AsRef<[u8]>) -> Result<Self> {
        Ok(Self::from_tasks(Self::deserialize(data)?))
    }

    /// Load the store from a JSON file. A missing file yields an empty store.
    ///
    /// Content that is not valid UTF-8 JSON is a format error, not an I/O one.
    pub fn load(path: &Path) -> Result<Self> {
        let buf = match fs::read(path) {
            Ok(buf) => buf,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no task file yet, starting empty");
                return Ok(TaskStore::new());
            }
            Err(e) => return Err(TodoError::io(path, e)),
        };
        let store = Self::from_json(&buf)?;
        debug!(path = %path.display(), count = store.len(), "loaded tasks");
        Ok(store)
    }

    /// Save the store to a JSON file using atomic write (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = self.serialize()?;
        let tmp = temp_path(path);
        let write = || -> std::io::Result<()> {
            let mut f = File::create(&tmp)?;
            f.write_all(data.as_bytes())?;
            f.flush()?;
            fs::rename(&tmp, path)
        };
        write().map_err(|e| TodoError::io(path, e))?;
        debug!(path = %path.display(), count = self.len(), "saved tasks");
        Ok(())
    }

    /// Render the task list as a pretty-printed JSON array.
    pub fn serialize(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.tasks)?)
    }

    /// Parse the JSON file format into records, normalised to the due/reminder invariant.
    pub fn deserialize(data: impl AsRef<[u8]>) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = serde_json::from_slice(data.as_ref())?;
        for task in tasks.iter_mut() {
            task.normalise();
        }
        Ok(tasks)
    }

    fn allocate_id(&mut self) -> TaskId {
        self.next_id += 1;
        TaskId(self.next_id)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Get a task by id.
    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    fn get_mut(&mut self, id: TaskId) -> Result<&mut Task> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(TodoError::NotFound(id))
    }

    /// Id of the task at a 0-based display position.
    pub fn id_at(&self, index: usize) -> Option<TaskId> {
        self.tasks.get(index).map(|t| t.id)
    }

    /// Ids of every completed task, in display order.
    pub fn completed_ids(&self) -> Vec<TaskId> {
        self.tasks.iter().filter(|t| t.done).map(|t| t.id).collect()
    }

    /// Append a new, not-yet-done task.
    pub fn add(
        &mut self,
        text: &str,
        due: Option<NaiveDateTime>,
        lead: Option<u32>,
    ) -> Result<&Task> {
        let task = Task::new(TaskId::default(), text, due, lead)?;
        let id = self.allocate_id();
        self.tasks.push(Task { id, ..task });
        debug!(%id, "added task");
        Ok(&self.tasks[self.tasks.len() - 1])
    }

    /// Flip the done flag, returning the new value.
    pub fn toggle_done(&mut self, id: TaskId) -> Result<bool> {
        let task = self.get_mut(id)?;
        task.done = !task.done;
        debug!(%id, done = task.done, "toggled task");
        Ok(task.done)
    }

    /// Remove every completed task, keeping the order of the rest.
    pub fn remove_completed(&mut self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|t| !t.done);
        let removed = before - self.tasks.len();
        debug!(removed, "removed completed tasks");
        removed
    }

    /// Remove every task.
    pub fn clear_all(&mut self) -> usize {
        let removed = self.tasks.len();
        self.tasks.clear();
        debug!(removed, "cleared all tasks");
        removed
    }

    /// Set or clear a task's due timestamp and reminder lead together.
    pub fn update_due(
        &mut self,
        id: TaskId,
        due: Option<NaiveDateTime>,
        lead: Option<u32>,
    ) -> Result<&Task> {
        let task = self.get_mut(id)?;
        task.set_schedule(due, lead)?;
        debug!(%id, due = ?task.due, lead = ?task.reminder_lead_hours, "updated due date");
        Ok(task)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Copy a task file into a `backup/` directory next to it, stamped with the current time.
pub fn create_backup(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Err(TodoError::io(
            path,
            std::io::Error::new(ErrorKind::NotFound, "task file does not exist"),
        ));
    }

    let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let backup_dir = parent_dir.join("backup");
    fs::create_dir_all(&backup_dir).map_err(|e| TodoError::io(&backup_dir, e))?;

    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(DEFAULT_TASK_FILE);
    let backup_path = backup_dir.join(format!("{}_{}", timestamp, file_name));

    fs::copy(path, &backup_path).map_err(|e| TodoError::io(&backup_path, e))?;
    Ok(backup_path)
}

/// Move an unreadable task file aside as `<name>.corrupt-<timestamp>`.
pub fn preserve_corrupt(path: &Path) -> Result<PathBuf> {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".corrupt-{}", Local::now().format("%Y%m%d%H%M%S")));
    let aside = path.with_file_name(name);
    fs::copy(path, &aside).map_err(|e| TodoError::io(&aside, e))?;
    Ok(aside)
}

/// Current local wall-clock time at second precision.
pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

/// Parse human-readable due input relative to `now`.
///
/// Supports:
/// - "in 30m", "in 2h", "in 3d", "in 1w"
/// - "today", "tomorrow", weekday names, each with an optional "HH:MM"
/// - "YYYY-MM-DD" (at 09:00) and "YYYY-MM-DD HH:MM[:SS]"
pub fn parse_due_input(s: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        return None;
    }

    // "in X" patterns
    if let Some(rest) = s.strip_prefix("in ") {
        let rest = rest.trim();
        let (split, _) = rest.char_indices().last()?;
        let (n, unit) = rest.split_at(split);
        let n: i64 = n.trim().parse().ok()?;
        let delta = match unit {
            "m" => Duration::try_minutes(n)?,
            "h" => Duration::try_hours(n)?,
            "d" => Duration::try_days(n)?,
            "w" => Duration::try_weeks(n)?,
            _ => return None,
        };
        return now.checked_add_signed(delta).map(|d| d.trunc_subsecs(0));
    }

    if let Some(d) = parse_due_timestamp(&s) {
        return Some(d);
    }

    let (day, time) = match s.split_once(' ') {
        Some((day, time)) => (day, Some(time.trim())),
        None => (s.as_str(), None),
    };
    let time = match time {
        Some(t) => NaiveTime::parse_from_str(t, "%H:%M").ok()?,
        None => NaiveTime::from_hms_opt(DEFAULT_DUE_TIME.0, DEFAULT_DUE_TIME.1, 0)?,
    };
    let date = parse_day(day, now.date())?;
    Some(date.and_time(time))
}

fn parse_day(day: &str, today: NaiveDate) -> Option<NaiveDate> {
    match day {
        "today" => return Some(today),
        "tomorrow" => return Some(today + Duration::days(1)),
        _ => {}
    }

    let weekdays = [
        ("monday", 0), ("tuesday", 1), ("wednesday", 2), ("thursday", 3),
        ("friday", 4), ("saturday", 5), ("sunday", 6),
        ("mon", 0), ("tue", 1), ("wed", 2), ("thu", 3),
        ("fri", 4), ("sat", 5), ("sun", 6),
    ];
    if let Some((_, target_day)) = weekdays.iter().find(|(name, _)| *name == day) {
        // Next occurrence, today included.
        let current_day = today.weekday().num_days_from_monday() as i64;
        let days_ahead = (target_day + 7 - current_day) % 7;
        return Some(today + Duration::days(days_ahead));
    }

    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Format a due timestamp for display.
pub fn format_due(due: NaiveDateTime) -> String {
    due.format("%Y-%m-%d %H:%M").to_string()
}

/// Format a due timestamp relative to `now` ("today 14:00", "in 3d", "2h late").
pub fn format_due_relative(due: Option<NaiveDateTime>, now: NaiveDateTime) -> String {
    let Some(d) = due else {
        return "-".into();
    };
    let delta = d - now;
    if delta < Duration::zero() {
        let late = -delta;
        return if late < Duration::hours(1) {
            format!("{}m late", late.num_minutes().max(1))
        } else if late < Duration::hours(48) {
            format!("{}h late", late.num_hours())
        } else {
            format!("{}d late", late.num_days())
        };
    }
    let days = (d.date() - now.date()).num_days();
    match days {
        0 => format!("today {}", d.format("%H:%M")),
        1 => format!("tomorrow {}", d.format("%H:%M")),
        2..=6 => format!("in {}d", days),
        _ => d.format("%Y-%m-%d").to_string(),
    }
}

/// Truncate a string to a maximum width, adding ellipsis if needed.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out = String::new();
        for (i, ch) in s.chars().enumerate() {
            if i + 1 >= width {
                out.push('…');
                break;
            }
            out.push(ch);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> NaiveDateTime {
        // A Wednesday.
        NaiveDate::from_ymd_opt(2030, 1, 16).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    fn texts(store: &TaskStore) -> Vec<&str> {
        store.tasks().iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_add_appends_open_task() {
        let mut store = TaskStore::new();
        store.add("first", None, None).unwrap();
        let added = store.add("second", None, None).unwrap();
        assert!(!added.done);
        assert_eq!(store.len(), 2);
        assert_eq!(texts(&store), ["first", "second"]);
    }

    #[test]
    fn test_add_blank_leaves_store_unchanged() {
        let mut store = TaskStore::new();
        store.add("keep", None, None).unwrap();
        assert!(matches!(store.add("", None, None), Err(TodoError::Validation(_))));
        assert!(matches!(store.add("   ", None, None), Err(TodoError::Validation(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_duplicate_texts_get_distinct_ids() {
        let mut store = TaskStore::new();
        let a = store.add("same", None, None).unwrap().id;
        let b = store.add("same", None, None).unwrap().id;
        assert_ne!(a, b);
    }

    #[test]
    fn test_remove_completed_preserves_order() {
        let mut store = TaskStore::new();
        for t in ["a", "b", "c", "d", "e"] {
            store.add(t, None, None).unwrap();
        }
        store.toggle_done(store.id_at(1).unwrap()).unwrap();
        store.toggle_done(store.id_at(3).unwrap()).unwrap();
        assert_eq!(store.completed_ids().len(), 2);

        assert_eq!(store.remove_completed(), 2);
        assert_eq!(texts(&store), ["a", "c", "e"]);
        assert_eq!(store.remove_completed(), 0);
    }

    #[test]
    fn test_toggle_twice_restores() {
        let mut store = TaskStore::new();
        let id = store.add("x", None, None).unwrap().id;
        assert!(store.toggle_done(id).unwrap());
        assert!(!store.toggle_done(id).unwrap());
        assert!(matches!(store.toggle_done(TaskId(99)), Err(TodoError::NotFound(_))));
    }

    #[test]
    fn test_clear_all() {
        let mut store = TaskStore::new();
        store.add("a", None, None).unwrap();
        store.add("b", None, None).unwrap();
        assert_eq!(store.clear_all(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_due_clears_both() {
        let mut store = TaskStore::new();
        let due = now() + Duration::hours(5);
        let id = store.add("x", Some(due), Some(2)).unwrap().id;

        let t = store.update_due(id, None, Some(2)).unwrap();
        assert_eq!(t.due, None);
        assert_eq!(t.reminder_lead_hours, None);

        let t = store.update_due(id, Some(due), Some(1)).unwrap();
        assert_eq!((t.due, t.reminder_lead_hours), (Some(due), Some(1)));

        assert!(store.update_due(id, Some(due), Some(0)).is_err());
        assert_eq!(store.get(id).unwrap().reminder_lead_hours, Some(1));
    }

    #[test]
    fn test_round_trip() {
        let mut store = TaskStore::new();
        store.add("plain", None, None).unwrap();
        let id = store
            .add("dated", Some(now() + Duration::milliseconds(90_500)), Some(3))
            .unwrap()
            .id;
        store.toggle_done(id).unwrap();
        store.add("dated, no reminder", Some(now()), None).unwrap();

        let json = store.serialize().unwrap();
        let back = TaskStore::deserialize(&json).unwrap();
        assert_eq!(back, store.tasks());
        assert_eq!(back[1].due, Some(now() + Duration::seconds(90)));
    }

    #[test]
    fn test_deserialize_minimal_record() {
        let tasks = TaskStore::deserialize(r#"[{"task":"x"}]"#).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].text, "x");
        assert!(!tasks[0].done);
        assert_eq!(tasks[0].due, None);
        assert_eq!(tasks[0].reminder_lead_hours, None);
    }

    #[test]
    fn test_deserialize_format_errors() {
        assert!(matches!(TaskStore::deserialize("{\"task\":\"x\"}"), Err(TodoError::Format(_))));
        assert!(matches!(TaskStore::deserialize("[{\"done\":true}]"), Err(TodoError::Format(_))));
        assert!(matches!(TaskStore::deserialize("not json"), Err(TodoError::Format(_))));
        assert!(matches!(
            TaskStore::deserialize(b"[{\"task\":\"Caf\xe9\"}]"),
            Err(TodoError::Format(_))
        ));
    }

    #[test]
    fn test_toggle_then_remove_serializes_empty() {
        let mut store = TaskStore::from_json(r#"[{"task":"Buy milk","done":false}]"#).unwrap();
        store.toggle_done(store.id_at(0).unwrap()).unwrap();
        store.remove_completed();
        assert!(store.is_empty());
        assert_eq!(store.serialize().unwrap(), "[]");
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::load(&dir.path().join("tasks.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let mut store = TaskStore::new();
        store.add("persist me", Some(now()), Some(1)).unwrap();
        store.save(&path).unwrap();

        assert!(!dir.path().join("tasks.json.tmp").exists());
        let loaded = TaskStore::load(&path).unwrap();
        assert_eq!(loaded.tasks(), store.tasks());
    }

    #[test]
    fn test_save_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("tasks.json");
        assert!(matches!(TaskStore::new().save(&path), Err(TodoError::Io { .. })));
    }

    #[test]
    fn test_backup_copies_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        assert!(create_backup(&path).is_err());

        fs::write(&path, "[]").unwrap();
        let backup = create_backup(&path).unwrap();
        assert!(backup.starts_with(dir.path().join("backup")));
        assert_eq!(fs::read_to_string(backup).unwrap(), "[]");
    }

    #[test]
    fn test_parse_due_input() {
        let n = now();
        assert_eq!(parse_due_input("in 2h", n), Some(n + Duration::hours(2)));
        assert_eq!(parse_due_input("in 30m", n), Some(n + Duration::minutes(30)));
        assert_eq!(parse_due_input("in 1w", n), Some(n + Duration::weeks(1)));
        assert_eq!(
            parse_due_input("tomorrow 17:30", n),
            NaiveDate::from_ymd_opt(2030, 1, 17).unwrap().and_hms_opt(17, 30, 0)
        );
        assert_eq!(
            parse_due_input("Today", n),
            NaiveDate::from_ymd_opt(2030, 1, 16).unwrap().and_hms_opt(9, 0, 0)
        );
        assert_eq!(
            parse_due_input("fri", n),
            NaiveDate::from_ymd_opt(2030, 1, 18).unwrap().and_hms_opt(9, 0, 0)
        );
        assert_eq!(
            parse_due_input("2030-02-01 08:15", n),
            NaiveDate::from_ymd_opt(2030, 2, 1).unwrap().and_hms_opt(8, 15, 0)
        );
        assert_eq!(
            parse_due_input("2030-02-01", n),
            NaiveDate::from_ymd_opt(2030, 2, 1).unwrap().and_hms_opt(9, 0, 0)
        );
        assert_eq!(parse_due_input("", n), None);
        assert_eq!(parse_due_input("in 3y", n), None);
        assert_eq!(parse_due_input("in 9999999999999999m", n), None);
        assert_eq!(parse_due_input("in 9999999999999999w", n), None);
        assert_eq!(parse_due_input("in 999999999d", n), None);
        assert_eq!(parse_due_input("someday", n), None);
    }

    #[test]
    fn test_format_due_relative() {
        let n = now();
        assert_eq!(format_due_relative(None, n), "-");
        assert_eq!(format_due_relative(Some(n + Duration::hours(2)), n), "today 14:00");
        assert_eq!(format_due_relative(Some(n + Duration::hours(24)), n), "tomorrow 12:00");
        assert_eq!(format_due_relative(Some(n + Duration::days(3)), n), "in 3d");
        assert_eq!(format_due_relative(Some(n + Duration::days(30)), n), "2030-02-15");
        assert_eq!(format_due_relative(Some(n - Duration::minutes(10)), n), "10m late");
        assert_eq!(format_due_relative(Some(n - Duration::hours(5)), n), "5h late");
        assert_eq!(format_due_relative(Some(n - Duration::days(4)), n), "4d late");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer title", 6), "a lon…");
    }
}
