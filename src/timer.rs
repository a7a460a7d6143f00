//! Thread-backed one-shot timers.
//!
//! Every scheduled reminder sleeps on its own thread, waiting on a cancel
//! channel with a timeout. Dropping or cancelling the handle disconnects the
//! channel and wakes the thread without firing; a timeout posts the event to
//! the receiver returned by [`ThreadTimer::channel`], which the owning event loop
//! drains.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::thread;
use std::time::Duration as StdDuration;

use chrono::{Local, NaiveDateTime};
use tracing::error;

use crate::reminder::{TimerEvent, TimerHandle, TimerService};

pub struct ThreadTimer {
    events: Sender<TimerEvent>,
}

impl ThreadTimer {
    /// Create a timer and the receiving end for its events.
    pub fn channel() -> (Self, Receiver<TimerEvent>) {
        let (events, rx) = mpsc::channel();
        (ThreadTimer { events }, rx)
    }
}

pub struct ThreadTimerHandle {
    cancel: Mutex<Option<Sender<()>>>,
}

impl TimerHandle for ThreadTimerHandle {
    fn cancel(&self) {
        if let Ok(mut guard) = self.cancel.lock() {
            guard.take();
        }
    }
}

/// Longest single sleep. The wall clock is re-read after each one, so a
/// suspended machine does not push reminders back by the time it slept.
const MAX_WAIT: StdDuration = StdDuration::from_secs(30);

/// How long to sleep before looking at the clock again, or `None` once `at` has passed.
fn next_wait(at: NaiveDateTime, now: NaiveDateTime) -> Option<StdDuration> {
    let remaining = (at - now).to_std().ok()?;
    (!remaining.is_zero()).then(|| remaining.min(MAX_WAIT))
}

impl TimerService for ThreadTimer {
    type Handle = ThreadTimerHandle;

    fn schedule(&self, event: TimerEvent, at: NaiveDateTime) -> ThreadTimerHandle {
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
        let events = self.events.clone();

        let spawned = thread::Builder::new()
            .name(format!("reminder-{}", event.task.0))
            .spawn(move || {
                while let Some(wait) = next_wait(at, Local::now().naive_local()) {
                    match cancel_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => return,
                    }
                }
                // The receiver is gone once the UI has shut down.
                let _ = events.send(event);
            });
        if let Err(e) = spawned {
            // The owner's clock check still catches this reminder.
            error!(task = %event.task, "failed to start reminder timer: {e}");
        }

        ThreadTimerHandle {
            cancel: Mutex::new(Some(cancel_tx)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskId;
    use chrono::{Duration, NaiveDate};

    fn event(id: u64) -> TimerEvent {
        TimerEvent { task: TaskId(id), token: id * 10 }
    }

    #[test]
    fn test_next_wait_is_capped() {
        let now = NaiveDate::from_ymd_opt(2030, 4, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(next_wait(now + Duration::hours(3), now), Some(MAX_WAIT));
        assert_eq!(
            next_wait(now + Duration::seconds(5), now),
            Some(StdDuration::from_secs(5))
        );
        assert_eq!(next_wait(now, now), None);
        assert_eq!(next_wait(now - Duration::minutes(1), now), None);
    }

    #[test]
    fn test_past_instant_fires_immediately() {
        let (timer, rx) = ThreadTimer::channel();
        let _handle = timer.schedule(event(1), Local::now().naive_local() - Duration::hours(1));
        assert_eq!(rx.recv_timeout(StdDuration::from_secs(5)), Ok(event(1)));
    }

    #[test]
    fn test_fires_after_delay() {
        let (timer, rx) = ThreadTimer::channel();
        let _handle = timer.schedule(event(2), Local::now().naive_local() + Duration::milliseconds(50));
        assert_eq!(rx.recv_timeout(StdDuration::from_secs(5)), Ok(event(2)));
    }

    #[test]
    fn test_cancel_prevents_fire() {
        let (timer, rx) = ThreadTimer::channel();
        let handle = timer.schedule(event(3), Local::now().naive_local() + Duration::milliseconds(300));
        handle.cancel();
        handle.cancel();
        assert!(rx.recv_timeout(StdDuration::from_millis(600)).is_err());
    }

    #[test]
    fn test_drop_prevents_fire() {
        let (timer, rx) = ThreadTimer::channel();
        drop(timer.schedule(event(4), Local::now().naive_local() + Duration::milliseconds(300)));
        assert!(rx.recv_timeout(StdDuration::from_millis(600)).is_err());
    }
}
