//! Due time and reminder editor.
//!
//! Submitting with an empty due field clears both the due time and the
//! reminder; cancelling leaves the task untouched.

use chrono::NaiveDateTime;

use crate::store::{format_due, parse_due_input};
use crate::task::{Task, TaskId};
use crate::tui::enums::DueField;
use crate::tui::input::InputField;

pub struct DueForm {
    pub task: TaskId,
    pub task_text: String,
    pub due: InputField,
    pub lead: InputField,
    pub focus: DueField,
}

impl DueForm {
    /// Open the editor pre-filled with the task's current values.
    pub fn for_task(task: &Task) -> Self {
        DueForm {
            task: task.id,
            task_text: task.text.clone(),
            due: task
                .due
                .map(|d| InputField::with_value(&format_due(d)))
                .unwrap_or_default(),
            lead: task
                .reminder_lead_hours
                .map(|h| InputField::with_value(&h.to_string()))
                .unwrap_or_default(),
            focus: DueField::Due,
        }
    }

    pub fn focused_mut(&mut self) -> &mut InputField {
        match self.focus {
            DueField::Due => &mut self.due,
            DueField::Lead => &mut self.lead,
        }
    }

    pub fn toggle_focus(&mut self) {
        self.focus = self.focus.next();
    }

    /// Validate the fields into a due time and reminder lead.
    pub fn submit(&self, now: NaiveDateTime) -> Result<(Option<NaiveDateTime>, Option<u32>), String> {
        let due_text = self.due.value.trim();
        if due_text.is_empty() {
            return Ok((None, None));
        }
        let due = parse_due_input(due_text, now)
            .ok_or_else(|| format!("Could not understand due time '{due_text}'"))?;

        let lead_text = self.lead.value.trim();
        if lead_text.is_empty() {
            return Ok((Some(due), None));
        }
        match lead_text.parse::<u32>() {
            Ok(h) if h > 0 => Ok((Some(due), Some(h))),
            _ => Err(format!("Reminder must be a whole number of hours, got '{lead_text}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2030, 8, 1).unwrap().and_hms_opt(9, 0, 0).unwrap()
    }

    fn form(due: &str, lead: &str) -> DueForm {
        let task = Task::new(TaskId(1), "x", None, None).unwrap();
        let mut form = DueForm::for_task(&task);
        form.due = InputField::with_value(due);
        form.lead = InputField::with_value(lead);
        form
    }

    #[test]
    fn test_prefill_from_task() {
        let due = now() + Duration::hours(5);
        let task = Task::new(TaskId(3), "Pay rent", Some(due), Some(2)).unwrap();
        let form = DueForm::for_task(&task);
        assert_eq!(form.due.value, "2030-08-01 14:00");
        assert_eq!(form.lead.value, "2");
        assert_eq!(form.submit(now()), Ok((Some(due), Some(2))));
    }

    #[test]
    fn test_empty_due_clears_everything() {
        assert_eq!(form("  ", "3").submit(now()), Ok((None, None)));
    }

    #[test]
    fn test_invalid_input() {
        assert!(form("whenever", "").submit(now()).is_err());
        assert!(form("in 2h", "0").submit(now()).is_err());
        assert!(form("in 2h", "-1").submit(now()).is_err());
        assert_eq!(
            form("in 2h", "").submit(now()),
            Ok((Some(now() + Duration::hours(2)), None))
        );
    }

    #[test]
    fn test_focus_switches() {
        let mut f = form("", "");
        f.toggle_focus();
        f.focused_mut().handle_char('4');
        assert_eq!(f.lead.value, "4");
        f.toggle_focus();
        assert_eq!(f.focus, DueField::Due);
    }
}
