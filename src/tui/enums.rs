//! Enumerations for TUI state management.

/// Application state for the terminal user interface.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum AppState {
    TaskList,
    AddTask,
    EditDue,
    ConfirmClear,
    Help,
}

/// Field with focus in the due/reminder editor.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum DueField {
    Due,
    Lead,
}

impl DueField {
    pub fn next(self) -> Self {
        match self {
            DueField::Due => DueField::Lead,
            DueField::Lead => DueField::Due,
        }
    }
}
