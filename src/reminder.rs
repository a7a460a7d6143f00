//! Reminder scheduling.
//!
//! Each task with a due timestamp and a lead time gets at most one pending
//! reminder. The scheduler does not own a clock or a thread: it asks a
//! [`TimerService`] to call back at an instant and turns the resulting
//! [`TimerEvent`] into a [`NotificationPayload`].

use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime};
use tracing::debug;

use crate::store::format_due;
use crate::task::{Task, TaskId};

/// Title of every reminder notification.
pub const REMINDER_TITLE: &str = "Task Reminder";

/// When a reminder for `due` with `lead_hours` of notice should fire.
///
/// Returns `None` when either input is missing or the instant is not strictly
/// after `now`.
pub fn compute_fire_time(
    due: Option<NaiveDateTime>,
    lead_hours: Option<u32>,
    now: NaiveDateTime,
) -> Option<NaiveDateTime> {
    let fire_at = due?.checked_sub_signed(Duration::hours(i64::from(lead_hours?)))?;
    (fire_at > now).then_some(fire_at)
}

/// Data handed to whatever displays notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
}

/// Build the notification for a task whose reminder has fired.
pub fn on_fire(task: &Task) -> NotificationPayload {
    let body = match task.due {
        Some(due) => format!("'{}' is due at {}", task.text, format_due(due)),
        None => format!("'{}' is due", task.text),
    };
    NotificationPayload {
        title: REMINDER_TITLE.to_string(),
        body,
    }
}

/// Callback delivered by a [`TimerService`] when an instant elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    pub task: TaskId,
    pub token: u64,
}

/// A pending one-shot timer. Cancelling twice is a no-op.
pub trait TimerHandle {
    fn cancel(&self);
}

/// Registers cancellable one-shot callbacks.
pub trait TimerService {
    type Handle: TimerHandle;

    /// Arrange for `event` to be delivered at `at` unless the handle is cancelled first.
    fn schedule(&self, event: TimerEvent, at: NaiveDateTime) -> Self::Handle;
}

/// Displays notifications to the user.
pub trait Notifier {
    fn notify(&mut self, payload: &NotificationPayload);
}

/// Reminder state of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderState {
    Disarmed,
    Armed { fire_at: NaiveDateTime },
    Fired,
}

struct Slot<H> {
    state: ReminderState,
    token: u64,
    handle: Option<H>,
}

/// Tracks one reminder per task on top of a [`TimerService`].
pub struct ReminderScheduler<T: TimerService> {
    timer: T,
    slots: HashMap<TaskId, Slot<T::Handle>>,
    next_token: u64,
}

impl<T: TimerService> ReminderScheduler<T> {
    pub fn new(timer: T) -> Self {
        ReminderScheduler {
            timer,
            slots: HashMap::new(),
            next_token: 0,
        }
    }

    /// Current state for a task; unknown tasks are disarmed.
    pub fn state(&self, id: TaskId) -> ReminderState {
        self.slots
            .get(&id)
            .map_or(ReminderState::Disarmed, |slot| slot.state)
    }

    /// Cancel any pending reminder for `task` and arm a new one if its fire time is still ahead.
    pub fn reschedule(&mut self, task: &Task, now: NaiveDateTime) -> ReminderState {
        self.cancel(task.id);
        let Some(fire_at) = compute_fire_time(task.due, task.reminder_lead_hours, now) else {
            return ReminderState::Disarmed;
        };

        self.next_token += 1;
        let event = TimerEvent {
            task: task.id,
            token: self.next_token,
        };
        let handle = self.timer.schedule(event, fire_at);
        let state = ReminderState::Armed { fire_at };
        self.slots.insert(
            task.id,
            Slot {
                state,
                token: event.token,
                handle: Some(handle),
            },
        );
        debug!(id = %task.id, %fire_at, "reminder armed");
        state
    }

    /// Stop and forget any reminder for `id`.
    pub fn cancel(&mut self, id: TaskId) {
        if let Some(slot) = self.slots.remove(&id) {
            if let Some(handle) = slot.handle {
                handle.cancel();
                debug!(%id, "reminder cancelled");
            }
        }
    }

    pub fn cancel_all(&mut self) {
        let ids: Vec<TaskId> = self.slots.keys().copied().collect();
        for id in ids {
            self.cancel(id);
        }
    }

    /// Handle a timer callback. Returns the notification to show, or `None`
    /// if the event is stale (cancelled, rescheduled, already fired) or the
    /// task is gone.
    pub fn fire(&mut self, event: TimerEvent, task: Option<&Task>) -> Option<NotificationPayload> {
        let slot = self.slots.get_mut(&event.task)?;
        if slot.token != event.token || !matches!(slot.state, ReminderState::Armed { .. }) {
            debug!(id = %event.task, token = event.token, "ignoring stale timer event");
            return None;
        }
        slot.state = ReminderState::Fired;
        slot.handle = None;
        let task = task.filter(|t| t.id == event.task)?;
        debug!(id = %task.id, "reminder fired");
        Some(on_fire(task))
    }

    /// Earliest armed reminder.
    pub fn next_fire(&self) -> Option<(TaskId, NaiveDateTime)> {
        self.slots
            .iter()
            .filter_map(|(id, slot)| match slot.state {
                ReminderState::Armed { fire_at } => Some((*id, fire_at)),
                _ => None,
            })
            .min_by_key(|(_, at)| *at)
    }

    /// Events for armed reminders whose fire time is at or before `now`.
    ///
    /// Lets an owner catch up on callbacks its timer never delivered.
    pub fn overdue(&self, now: NaiveDateTime) -> Vec<TimerEvent> {
        self.slots
            .iter()
            .filter(|(_, slot)| matches!(slot.state, ReminderState::Armed { fire_at } if fire_at <= now))
            .map(|(id, slot)| TimerEvent {
                task: *id,
                token: slot.token,
            })
            .collect()
    }

    pub fn armed_count(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| matches!(slot.state, ReminderState::Armed { .. }))
            .count()
    }
}
