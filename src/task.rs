//! Task record and its on-disk representation.
//!
//! A task is a line of text with a completion flag, an optional due timestamp
//! and an optional reminder lead time. The persisted shape is
//! `{"task": .., "done": .., "due": .., "reminder": ..}`.

use std::fmt;

use chrono::{DateTime, Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TodoError};

/// Wire format for due timestamps.
pub const DUE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Runtime identity of a task within one store. Never persisted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single to-do entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    #[serde(skip)]
    pub id: TaskId,
    #[serde(rename = "task")]
    pub text: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default, with = "due_format")]
    pub due: Option<NaiveDateTime>,
    #[serde(default, rename = "reminder")]
    pub reminder_lead_hours: Option<u32>,
}

impl Task {
    /// Build a validated, not-yet-done task.
    ///
    /// The text is trimmed and must not be empty. A lead without a due date is
    /// dropped, a zero lead is rejected.
    pub fn new(
        id: TaskId,
        text: &str,
        due: Option<NaiveDateTime>,
        lead: Option<u32>,
    ) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TodoError::Validation("Please enter a task.".into()));
        }
        let (due, reminder_lead_hours) = validate_schedule(due, lead)?;
        Ok(Task {
            id,
            text: text.to_string(),
            done: false,
            due,
            reminder_lead_hours,
        })
    }

    /// Set or clear the due timestamp and reminder lead together.
    pub fn set_schedule(&mut self, due: Option<NaiveDateTime>, lead: Option<u32>) -> Result<()> {
        let (due, lead) = validate_schedule(due, lead)?;
        self.due = due;
        self.reminder_lead_hours = lead;
        Ok(())
    }

    /// Restore the due/reminder invariant on a record read from disk.
    pub(crate) fn normalise(&mut self) {
        self.due = self.due.map(|d| d.trunc_subsecs(0));
        if self.due.is_none() || self.reminder_lead_hours == Some(0) {
            self.reminder_lead_hours = None;
        }
    }
}

/// Two records are equal when their persisted fields match; the runtime id is ignored.
impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
            && self.done == other.done
            && self.due == other.due
            && self.reminder_lead_hours == other.reminder_lead_hours
    }
}

fn validate_schedule(
    due: Option<NaiveDateTime>,
    lead: Option<u32>,
) -> Result<(Option<NaiveDateTime>, Option<u32>)> {
    if lead == Some(0) {
        return Err(TodoError::Validation(
            "Reminder lead must be at least one hour.".into(),
        ));
    }
    match due {
        Some(d) => Ok((Some(d.trunc_subsecs(0)), lead)),
        None => Ok((None, None)),
    }
}

/// Parse a stored due timestamp.
///
/// Accepts the canonical `YYYY-MM-DDTHH:MM:SS` (optionally with fractional
/// seconds), a space instead of `T`, minute precision, and RFC 3339 with an
/// offset, which is converted to local wall-clock time.
pub fn parse_due_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Local).naive_local())
        })
        .map(|d| d.trunc_subsecs(0))
}

mod due_format {
    use chrono::NaiveDateTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    use super::{parse_due_timestamp, DUE_FORMAT};

    pub fn serialize<S: Serializer>(due: &Option<NaiveDateTime>, s: S) -> Result<S::Ok, S::Error> {
        match due {
            Some(d) => s.serialize_str(&d.format(DUE_FORMAT).to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDateTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|s| {
            parse_due_timestamp(&s)
                .ok_or_else(|| de::Error::custom(format!("invalid due timestamp '{s}'")))
        })
        .transpose()
    }
}
