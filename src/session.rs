//! The editing session the presentation layers drive.
//!
//! A `Session` owns the task store, the file it persists to, the reminder
//! scheduler and the notifier. Every mutation keeps the three in step:
//! pending reminders are cancelled before the data they refer to changes,
//! re-armed afterwards, and the whole list is written back to disk.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::{error, info, warn};

use crate::error::{Result, TodoError};
use crate::reminder::{
    NotificationPayload, Notifier, ReminderScheduler, ReminderState, TimerEvent, TimerService,
};
use crate::store::{local_now, preserve_corrupt, TaskStore};
use crate::task::TaskId;

pub struct Session<T: TimerService, N: Notifier> {
    store: TaskStore,
    path: PathBuf,
    scheduler: ReminderScheduler<T>,
    notifier: N,
    clock: fn() -> NaiveDateTime,
}

impl<T: TimerService, N: Notifier> Session<T, N> {
    /// Open the task file at `path` and arm reminders for it.
    ///
    /// Loading never fails: on error the session starts empty and the error is
    /// handed back for the caller to report.
    pub fn open(path: &Path, timer: T, notifier: N) -> (Self, Option<TodoError>) {
        Self::open_with_clock(path, timer, notifier, local_now)
    }

    pub fn open_with_clock(
        path: &Path,
        timer: T,
        notifier: N,
        clock: fn() -> NaiveDateTime,
    ) -> (Self, Option<TodoError>) {
        let (store, problem) = match TaskStore::load(path) {
            Ok(store) => (store, None),
            Err(e) => {
                warn!(path = %path.display(), "failed to load tasks, starting empty: {e}");
                if matches!(e, TodoError::Format(_)) {
                    match preserve_corrupt(path) {
                        Ok(aside) => warn!(copy = %aside.display(), "kept a copy of the unreadable task file"),
                        Err(copy_err) => error!("could not keep a copy of the unreadable task file: {copy_err}"),
                    }
                }
                (TaskStore::new(), Some(e))
            }
        };

        let mut session = Session {
            store,
            path: path.to_path_buf(),
            scheduler: ReminderScheduler::new(timer),
            notifier,
            clock,
        };
        let now = session.now();
        for task in session.store.tasks() {
            session.scheduler.reschedule(task, now);
        }
        info!(
            path = %session.path.display(),
            tasks = session.store.len(),
            reminders = session.scheduler.armed_count(),
            "session opened"
        );
        (session, problem)
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    pub fn notifier_mut(&mut self) -> &mut N {
        &mut self.notifier
    }

    pub fn reminder_state(&self, id: TaskId) -> ReminderState {
        self.scheduler.state(id)
    }

    /// Earliest pending reminder.
    pub fn next_reminder(&self) -> Option<(TaskId, NaiveDateTime)> {
        self.scheduler.next_fire()
    }

    fn rearm(&mut self, id: TaskId) {
        let now = self.now();
        if let Some(task) = self.store.get(id) {
            self.scheduler.reschedule(task, now);
        }
    }

    /// Write the task list to its file.
    pub fn save(&self) -> Result<()> {
        self.store.save(&self.path).map_err(|e| {
            error!("tasks not saved: {e}");
            e
        })
    }

    /// Add a task. Blank text is rejected before anything changes.
    pub fn add(
        &mut self,
        text: &str,
        due: Option<NaiveDateTime>,
        lead: Option<u32>,
    ) -> Result<TaskId> {
        let id = self.store.add(text, due, lead)?.id;
        self.rearm(id);
        self.save()?;
        Ok(id)
    }

    /// Flip a task's done flag, returning the new value.
    pub fn toggle_done(&mut self, id: TaskId) -> Result<bool> {
        let done = self.store.toggle_done(id)?;
        self.save()?;
        Ok(done)
    }

    /// Remove completed tasks, returning how many went.
    pub fn remove_completed(&mut self) -> Result<usize> {
        for id in self.store.completed_ids() {
            self.scheduler.cancel(id);
        }
        let removed = self.store.remove_completed();
        self.save()?;
        Ok(removed)
    }

    /// Remove every task.
    pub fn clear_all(&mut self) -> Result<usize> {
        self.scheduler.cancel_all();
        let removed = self.store.clear_all();
        self.save()?;
        Ok(removed)
    }

    /// Set or clear a task's due timestamp and reminder lead.
    pub fn update_due(
        &mut self,
        id: TaskId,
        due: Option<NaiveDateTime>,
        lead: Option<u32>,
    ) -> Result<()> {
        if self.store.get(id).is_none() {
            return Err(TodoError::NotFound(id));
        }
        self.scheduler.cancel(id);
        let updated = self.store.update_due(id, due, lead).map(|_| ());
        // A rejected update leaves the old fields, so this restores their reminder.
        self.rearm(id);
        updated?;
        self.save()
    }

    /// Turn a timer callback into a notification, if it is still current.
    pub fn handle_timer(&mut self, event: TimerEvent) -> Option<NotificationPayload> {
        let payload = self.scheduler.fire(event, self.store.get(event.task))?;
        info!(task = %event.task, "{}", payload.body);
        self.notifier.notify(&payload);
        Some(payload)
    }

    /// Fire every armed reminder whose time has passed without a timer callback.
    pub fn fire_overdue(&mut self) -> usize {
        let events = self.scheduler.overdue(self.now());
        events
            .into_iter()
            .filter_map(|event| self.handle_timer(event))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::{Duration, NaiveDate};

    use super::*;
    use crate::reminder::testing::{ManualTimer, RecordingNotifier};

    type TestSession = Session<ManualTimer, RecordingNotifier>;

    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2030, 3, 10).unwrap().and_hms_opt(8, 0, 0).unwrap()
    }

    fn open(path: &Path) -> (TestSession, ManualTimer, Option<TodoError>) {
        let timer = ManualTimer::default();
        let (session, problem) =
            Session::open_with_clock(path, timer.clone(), RecordingNotifier::default(), fixed_now);
        (session, timer, problem)
    }

    #[test]
    fn test_missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (session, _, problem) = open(&dir.path().join("tasks.json"));
        assert!(problem.is_none());
        assert!(session.store().is_empty());
    }

    #[test]
    fn test_every_mutation_saves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let (mut session, _, _) = open(&path);

        let id = session.add("Buy milk", None, None).unwrap();
        assert_eq!(TaskStore::load(&path).unwrap().len(), 1);

        session.toggle_done(id).unwrap();
        assert!(TaskStore::load(&path).unwrap().tasks()[0].done);

        assert_eq!(session.remove_completed().unwrap(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
    }

    #[test]
    fn test_blank_add_does_not_touch_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let (mut session, _, _) = open(&path);
        assert!(matches!(session.add("  ", None, None), Err(TodoError::Validation(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_open_arms_future_reminders_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        fs::write(
            &path,
            r#"[
                {"task": "soon", "due": "2030-03-10T12:00:00", "reminder": 2},
                {"task": "too late", "due": "2030-03-10T08:30:00", "reminder": 1},
                {"task": "no reminder", "due": "2030-03-11T08:30:00"}
            ]"#,
        )
        .unwrap();

        let (session, timer, problem) = open(&path);
        assert!(problem.is_none());
        assert_eq!(timer.len(), 1);
        let soon = session.store().id_at(0).unwrap();
        assert_eq!(
            session.next_reminder(),
            Some((soon, fixed_now() + Duration::hours(2)))
        );
    }

    #[test]
    fn test_corrupt_file_is_kept_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        fs::write(&path, "{ not an array").unwrap();

        let (session, _, problem) = open(&path);
        assert!(matches!(problem, Some(TodoError::Format(_))));
        assert!(session.store().is_empty());

        let kept: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("tasks.json.corrupt-"))
            .collect();
        assert_eq!(kept.len(), 1);
        assert_eq!(fs::read_to_string(kept[0].path()).unwrap(), "{ not an array");
    }

    #[test]
    fn test_invalid_utf8_file_is_kept_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let original = b"[{\"task\":\"Caf\xe9 order\",\"done\":false}]";
        fs::write(&path, original).unwrap();

        let (mut session, _, problem) = open(&path);
        assert!(matches!(problem, Some(TodoError::Format(_))));
        session.add("new", None, None).unwrap();

        let kept: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("tasks.json.corrupt-"))
            .collect();
        assert_eq!(kept.len(), 1);
        assert_eq!(fs::read(kept[0].path()).unwrap(), original);
    }

    fn later() -> NaiveDateTime {
        fixed_now() + Duration::hours(5)
    }

    #[test]
    fn test_fire_overdue_catches_missed_callbacks() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _, _) = open(&dir.path().join("tasks.json"));
        session.add("Call bank", Some(fixed_now() + Duration::hours(4)), Some(1)).unwrap();
        assert_eq!(session.fire_overdue(), 0);

        // The fire time is now behind the clock, but the timer never called back.
        session.clock = later;
        assert_eq!(session.fire_overdue(), 1);
        assert_eq!(session.fire_overdue(), 0);
        assert_eq!(session.notifier_mut().received.len(), 1);
        assert_eq!(session.next_reminder(), None);
    }

    #[test]
    fn test_update_due_rearms() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, timer, _) = open(&dir.path().join("tasks.json"));
        let due = fixed_now() + Duration::hours(6);
        let id = session.add("Report", Some(due), Some(1)).unwrap();
        assert_eq!(timer.len(), 1);

        session.update_due(id, Some(due), Some(3)).unwrap();
        assert_eq!(timer.cancel_count(0), 1);
        assert_eq!(
            session.reminder_state(id),
            ReminderState::Armed { fire_at: fixed_now() + Duration::hours(3) }
        );

        session.update_due(id, None, Some(3)).unwrap();
        assert_eq!(timer.cancel_count(1), 1);
        assert_eq!(session.reminder_state(id), ReminderState::Disarmed);
        let task = session.store().get(id).unwrap();
        assert_eq!((task.due, task.reminder_lead_hours), (None, None));
    }

    #[test]
    fn test_rejected_update_keeps_reminder() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _, _) = open(&dir.path().join("tasks.json"));
        let id = session
            .add("Report", Some(fixed_now() + Duration::hours(6)), Some(1))
            .unwrap();

        assert!(session.update_due(id, Some(fixed_now()), Some(0)).is_err());
        assert!(matches!(session.reminder_state(id), ReminderState::Armed { .. }));
        assert!(matches!(
            session.update_due(TaskId(42), None, None),
            Err(TodoError::NotFound(_))
        ));
    }

    #[test]
    fn test_timer_event_notifies_once() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, timer, _) = open(&dir.path().join("tasks.json"));
        session
            .add("Dentist", Some(fixed_now() + Duration::hours(2)), Some(1))
            .unwrap();
        let (event, _) = timer.last().unwrap();

        let payload = session.handle_timer(event).unwrap();
        assert_eq!(payload.body, "'Dentist' is due at 2030-03-10 10:00");
        assert!(session.handle_timer(event).is_none());
        assert_eq!(session.notifier_mut().received, vec![payload]);
    }

    #[test]
    fn test_removed_task_does_not_notify() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, timer, _) = open(&dir.path().join("tasks.json"));
        let id = session
            .add("Dentist", Some(fixed_now() + Duration::hours(2)), Some(1))
            .unwrap();
        let (event, _) = timer.last().unwrap();

        session.toggle_done(id).unwrap();
        session.remove_completed().unwrap();
        assert_eq!(timer.cancel_count(0), 1);
        assert!(session.handle_timer(event).is_none());

        session.add("Other", Some(fixed_now() + Duration::hours(2)), Some(1)).unwrap();
        session.clear_all().unwrap();
        assert_eq!(timer.cancel_count(1), 1);
        assert!(session.notifier_mut().received.is_empty());
    }

    #[test]
    fn test_failed_save_keeps_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("tasks.json");
        let (mut session, _, _) = open(&path);

        assert!(matches!(session.add("unsaved", None, None), Err(TodoError::Io { .. })));
        assert_eq!(session.store().len(), 1);
    }
}
