//! Main application logic for the terminal user interface.
//!
//! This module contains the `App` struct which owns the editing session,
//! handles user input, renders the task list and its dialogs, and turns
//! timer callbacks into reminder popups.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::{
    backend::Backend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use tracing::warn;

use crate::error::TodoError;
use crate::reminder::{NotificationPayload, Notifier, ReminderState, TimerEvent};
use crate::session::Session;
use crate::store::{format_due, format_due_relative};
use crate::task::TaskId;
use crate::timer::ThreadTimer;
use crate::tui::{
    colors::{ACCENT, BACKGROUND, BORDER, BUTTON_BG, DARK_RED, GOLD, INPUT_BG, ROW_BG},
    due_form::DueForm,
    enums::{AppState, DueField},
    input::InputField,
    utils::centered_rect,
};

/// Queues reminders until the UI is ready to show them.
#[derive(Default)]
pub struct ReminderInbox {
    pending: VecDeque<NotificationPayload>,
}

impl Notifier for ReminderInbox {
    fn notify(&mut self, payload: &NotificationPayload) {
        self.pending.push_back(payload.clone());
    }
}

/// Main application state for the terminal user interface.
pub struct App {
    session: Session<ThreadTimer, ReminderInbox>,
    timer_events: Receiver<TimerEvent>,
    state: AppState,
    list_state: ListState,
    input: InputField,
    due_form: Option<DueForm>,
    reminder: Option<NotificationPayload>,
    ring_bell: bool,
    status_message: String,
    status_is_error: bool,
}

impl App {
    /// Create a new App, loading tasks from the specified path.
    ///
    /// An unreadable task file is reported in the status bar; the app starts empty.
    pub fn new(db_path: &Path) -> Self {
        let (timer, timer_events) = ThreadTimer::channel();
        let (session, problem) = Session::open(db_path, timer, ReminderInbox::default());

        let mut app = App {
            session,
            timer_events,
            state: AppState::TaskList,
            list_state: ListState::default(),
            input: InputField::new(),
            due_form: None,
            reminder: None,
            ring_bell: false,
            status_message: String::new(),
            status_is_error: false,
        };
        if let Some(e) = problem {
            app.set_error(format!("Failed to load tasks: {e}"));
        }
        app.clamp_selection();
        app
    }

    fn set_status_message(&mut self, msg: String) {
        self.status_message = msg;
        self.status_is_error = false;
    }

    fn set_error(&mut self, msg: String) {
        self.status_message = msg;
        self.status_is_error = true;
    }

    fn clear_status_message(&mut self) {
        self.status_message.clear();
        self.status_is_error = false;
    }

    /// Report a failed mutation. Save failures leave the change in memory only.
    fn report(&mut self, e: TodoError) {
        match e {
            TodoError::Io { .. } => self.set_error(format!("Changes not saved: {e}")),
            TodoError::Validation(msg) => self.set_error(msg),
            other => self.set_error(other.to_string()),
        }
    }

    fn selected_id(&self) -> Option<TaskId> {
        self.list_state
            .selected()
            .and_then(|i| self.session.store().id_at(i))
    }

    fn clamp_selection(&mut self) {
        let len = self.session.store().len();
        match self.list_state.selected() {
            _ if len == 0 => self.list_state.select(None),
            Some(i) if i >= len => self.list_state.select(Some(len - 1)),
            None => self.list_state.select(Some(0)),
            _ => {}
        }
    }

    /// Hand queued timer callbacks to the session and surface the next reminder.
    fn poll_reminders(&mut self) {
        while let Ok(event) = self.timer_events.try_recv() {
            self.session.handle_timer(event);
        }
        self.session.fire_overdue();
        if self.reminder.is_none() {
            if let Some(payload) = self.session.notifier_mut().pending.pop_front() {
                self.reminder = Some(payload);
                self.ring_bell = true;
            }
        }
    }

    fn add_task(&mut self) {
        let text = self.input.value.clone();
        match self.session.add(&text, None, None) {
            Ok(_) => {
                self.input.take();
                self.state = AppState::TaskList;
                self.list_state.select(Some(self.session.store().len() - 1));
                self.set_status_message(format!("Added '{}'", text.trim()));
            }
            Err(TodoError::Validation(msg)) => {
                self.set_error(format!("Empty Task: {msg}"));
            }
            Err(e) => {
                // The task exists in memory even though it was not written out.
                self.input.take();
                self.state = AppState::TaskList;
                self.clamp_selection();
                self.report(e);
            }
        }
    }

    fn toggle_selected(&mut self) {
        let Some(id) = self.selected_id() else {
            return;
        };
        if let Err(e) = self.session.toggle_done(id) {
            self.report(e);
        }
    }

    fn remove_completed(&mut self) {
        match self.session.remove_completed() {
            Ok(0) => self.set_status_message("No completed tasks to remove".to_string()),
            Ok(n) => self.set_status_message(format!("Removed {n} completed task(s)")),
            Err(e) => self.report(e),
        }
        self.clamp_selection();
    }

    fn clear_all(&mut self) {
        match self.session.clear_all() {
            Ok(n) => self.set_status_message(format!("Deleted {n} task(s)")),
            Err(e) => self.report(e),
        }
        self.clamp_selection();
    }

    fn open_due_form(&mut self) {
        let Some(task) = self.selected_id().and_then(|id| self.session.store().get(id)) else {
            self.set_status_message("Select a task first".to_string());
            return;
        };
        self.due_form = Some(DueForm::for_task(task));
        self.state = AppState::EditDue;
    }

    fn submit_due_form(&mut self) {
        let Some(form) = self.due_form.as_ref() else {
            self.state = AppState::TaskList;
            return;
        };
        let id = form.task;
        let (due, lead) = match form.submit(self.session.now()) {
            Ok(values) => values,
            Err(msg) => {
                self.set_error(msg);
                return;
            }
        };
        if let Err(e) = self.session.update_due(id, due, lead) {
            self.report(e);
            return;
        }

        self.due_form = None;
        self.state = AppState::TaskList;
        let msg = match (due, self.session.reminder_state(id)) {
            (None, _) => "Due time cleared".to_string(),
            (Some(d), ReminderState::Armed { fire_at }) => {
                format!("Due {}; reminder at {}", format_due(d), format_due(fire_at))
            }
            (Some(d), _) if lead.is_some() => {
                format!("Due {}; reminder time already passed", format_due(d))
            }
            (Some(d), _) => format!("Due {}", format_due(d)),
        };
        self.set_status_message(msg);
    }

    fn handle_task_list_input(&mut self, key: KeyCode, modifiers: KeyModifiers) -> bool {
        let len = self.session.store().len();
        match key {
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => return true,
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Up | KeyCode::Char('k') => {
                if let Some(selected) = self.list_state.selected() {
                    self.list_state.select(Some(selected.saturating_sub(1)));
                }
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if let Some(selected) = self.list_state.selected() {
                    if selected + 1 < len {
                        self.list_state.select(Some(selected + 1));
                    }
                }
            }
            KeyCode::Home | KeyCode::Char('g') if len > 0 => self.list_state.select(Some(0)),
            KeyCode::End | KeyCode::Char('G') if len > 0 => self.list_state.select(Some(len - 1)),
            KeyCode::Char('a') | KeyCode::Char('i') => self.state = AppState::AddTask,
            KeyCode::Char(' ') | KeyCode::Char('x') | KeyCode::Enter => self.toggle_selected(),
            KeyCode::Char('d') => self.open_due_form(),
            KeyCode::Char('r') => self.remove_completed(),
            KeyCode::Char('C') => {
                if len == 0 {
                    self.set_status_message("No tasks to clear".to_string());
                } else {
                    self.state = AppState::ConfirmClear;
                }
            }
            KeyCode::Char('h') | KeyCode::Char('?') => self.state = AppState::Help,
            _ => {}
        }
        false
    }

    fn handle_add_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Esc => self.state = AppState::TaskList,
            KeyCode::Enter => self.add_task(),
            KeyCode::Char(c) => self.input.handle_char(c),
            KeyCode::Backspace => self.input.handle_backspace(),
            KeyCode::Delete => self.input.handle_delete(),
            KeyCode::Left => self.input.move_cursor_left(),
            KeyCode::Right => self.input.move_cursor_right(),
            KeyCode::Home => self.input.move_home(),
            KeyCode::End => self.input.move_end(),
            _ => {}
        }
    }

    fn handle_due_input(&mut self, key: KeyCode) {
        if key == KeyCode::Enter {
            self.submit_due_form();
            return;
        }
        let Some(form) = self.due_form.as_mut() else {
            self.state = AppState::TaskList;
            return;
        };
        match key {
            KeyCode::Esc => {
                self.due_form = None;
                self.state = AppState::TaskList;
                self.set_status_message("Due time unchanged".to_string());
            }
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => form.toggle_focus(),
            KeyCode::Char(c) => form.focused_mut().handle_char(c),
            KeyCode::Backspace => form.focused_mut().handle_backspace(),
            KeyCode::Delete => form.focused_mut().handle_delete(),
            KeyCode::Left => form.focused_mut().move_cursor_left(),
            KeyCode::Right => form.focused_mut().move_cursor_right(),
            KeyCode::Home => form.focused_mut().move_home(),
            KeyCode::End => form.focused_mut().move_end(),
            _ => {}
        }
    }

    fn handle_confirm_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                self.state = AppState::TaskList;
                self.clear_all();
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.state = AppState::TaskList;
            }
            _ => {}
        }
    }

    fn handle_help_input(&mut self, key: KeyCode) {
        if matches!(key, KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('h') | KeyCode::Char('?')) {
            self.state = AppState::TaskList;
        }
    }

    /// Poll for and handle keyboard events based on current application state.
    ///
    /// Returns true if the application should quit.
    fn handle_input(&mut self) -> io::Result<bool> {
        if !event::poll(Duration::from_millis(50))? {
            return Ok(false);
        }
        let Event::Key(key) = event::read()? else {
            return Ok(false);
        };
        if key.kind != KeyEventKind::Press {
            return Ok(false);
        }

        // A reminder popup takes the next key press.
        if self.reminder.is_some() {
            if matches!(key.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
                self.reminder = None;
            }
            return Ok(false);
        }

        if !self.status_is_error {
            self.clear_status_message();
        }
        let should_quit = match self.state {
            AppState::TaskList => {
                self.clear_status_message();
                self.handle_task_list_input(key.code, key.modifiers)
            }
            AppState::AddTask => {
                self.handle_add_input(key.code);
                false
            }
            AppState::EditDue => {
                self.handle_due_input(key.code);
                false
            }
            AppState::ConfirmClear => {
                self.handle_confirm_input(key.code);
                false
            }
            AppState::Help => {
                self.handle_help_input(key.code);
                false
            }
        };
        Ok(should_quit)
    }

    fn render_header(&self, f: &mut Frame, area: Rect) {
        let next = match self.session.next_reminder() {
            Some((id, at)) => {
                let text = self
                    .session
                    .store()
                    .get(id)
                    .map(|t| t.text.as_str())
                    .unwrap_or("?");
                format!("Next reminder: {} at {}", text, format_due(at))
            }
            None => "No reminders pending".to_string(),
        };
        let header = Paragraph::new(Line::from(vec![
            Span::styled("TO-DO LIST", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("  "),
            Span::styled(next, Style::default().fg(Color::Cyan).add_modifier(Modifier::ITALIC)),
        ]))
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(BORDER)))
        .alignment(Alignment::Center);
        f.render_widget(header, area);
    }

    fn render_input(&self, f: &mut Frame, area: Rect) {
        let active = self.state == AppState::AddTask;
        let (text, style) = if self.input.value.is_empty() && !active {
            ("Enter a new task... (press 'a')", Style::default().fg(Color::DarkGray))
        } else {
            (self.input.value.as_str(), Style::default().fg(Color::White))
        };
        let border = if active { ACCENT } else { BORDER };
        let input = Paragraph::new(text)
            .style(style.bg(INPUT_BG))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Add Task")
                    .border_style(Style::default().fg(border)),
            );
        f.render_widget(input, area);
        if active {
            let x = area.x + 1 + self.input.cursor as u16;
            f.set_cursor_position((x.min(area.right().saturating_sub(2)), area.y + 1));
        }
    }

    fn render_task_list(&mut self, f: &mut Frame, area: Rect) {
        let now = self.session.now();
        let items: Vec<ListItem> = self
            .session
            .store()
            .tasks()
            .iter()
            .map(|task| {
                let check = if task.done { "[x] " } else { "[ ] " };
                let text_style = if task.done {
                    Style::default().fg(Color::DarkGray).add_modifier(Modifier::CROSSED_OUT)
                } else {
                    Style::default().fg(Color::White)
                };
                let mut spans = vec![
                    Span::styled(check, Style::default().fg(ACCENT)),
                    Span::styled(task.text.clone(), text_style),
                ];
                if task.due.is_some() {
                    let overdue = !task.done && task.due.is_some_and(|d| d < now);
                    let due_style = if overdue {
                        Style::default().fg(Color::LightRed)
                    } else {
                        Style::default().fg(Color::Gray)
                    };
                    spans.push(Span::styled(
                        format!("  due {}", format_due_relative(task.due, now)),
                        due_style,
                    ));
                }
                if let Some(h) = task.reminder_lead_hours {
                    let marker = match self.session.reminder_state(task.id) {
                        ReminderState::Armed { .. } => format!("  remind {h}h before"),
                        ReminderState::Fired => format!("  reminded ({h}h before)"),
                        ReminderState::Disarmed => format!("  remind {h}h before (passed)"),
                    };
                    spans.push(Span::styled(marker, Style::default().fg(GOLD)));
                }
                ListItem::new(Line::from(spans)).style(Style::default().bg(ROW_BG))
            })
            .collect();

        let done = self.session.store().completed_ids().len();
        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(BORDER))
                    .title(format!(
                        "Tasks ({} done / {}) - Press 'h' for help",
                        done,
                        self.session.store().len()
                    )),
            )
            .highlight_style(Style::default().bg(ACCENT).fg(Color::White))
            .highlight_symbol(">> ");
        f.render_stateful_widget(list, area, &mut self.list_state);
    }

    fn render_key_hints(&self, f: &mut Frame, area: Rect) {
        let hints = match self.state {
            AppState::AddTask => "Enter add  Esc cancel",
            AppState::EditDue => "Tab switch field  Enter save  Esc cancel  (empty due clears)",
            AppState::ConfirmClear => "y confirm  n cancel",
            AppState::Help => "Esc close",
            AppState::TaskList => {
                "a add  space done  d due/reminder  r remove completed  C clear all  q quit"
            }
        };
        let p = Paragraph::new(hints).style(Style::default().bg(BUTTON_BG).fg(Color::White));
        f.render_widget(p, area);
    }

    fn render_due_form(&self, f: &mut Frame, area: Rect) {
        let Some(form) = self.due_form.as_ref() else {
            return;
        };
        let area = centered_rect(60, 40, area);
        f.render_widget(Clear, area);

        let block = Block::default()
            .title(format!("Due time for '{}'", form.task_text))
            .borders(Borders::ALL)
            .style(Style::default().bg(BACKGROUND).fg(Color::White));
        let inner = block.inner(area);
        f.render_widget(block, area);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Min(0),
            ])
            .split(inner);

        let fields = [
            (DueField::Due, "Due (e.g. 2030-05-01 17:00, tomorrow 9:00, in 3h)", &form.due, rows[0]),
            (DueField::Lead, "Remind hours before (empty for none)", &form.lead, rows[1]),
        ];
        for (field, label, input, rect) in fields {
            let focused = form.focus == field;
            let border = if focused { ACCENT } else { BORDER };
            let p = Paragraph::new(input.value.as_str())
                .style(Style::default().bg(INPUT_BG))
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title(label)
                        .border_style(Style::default().fg(border)),
                );
            f.render_widget(p, rect);
            if focused {
                let x = rect.x + 1 + input.cursor as u16;
                f.set_cursor_position((x.min(rect.right().saturating_sub(2)), rect.y + 1));
            }
        }

        let hint = Paragraph::new("Enter to save, Esc to cancel. Leave due empty to clear it.")
            .style(Style::default().fg(Color::Gray))
            .wrap(Wrap { trim: true });
        f.render_widget(hint, rows[2]);
    }

    fn render_confirm(&self, f: &mut Frame, area: Rect) {
        let block = Block::default()
            .title("Clear All")
            .borders(Borders::ALL)
            .style(Style::default().bg(DARK_RED));

        let area = centered_rect(50, 20, area);
        f.render_widget(Clear, area);

        let text = vec![
            Line::from(""),
            Line::from(vec![Span::styled(
                format!("Delete all {} tasks?", self.session.store().len()),
                Style::default().add_modifier(Modifier::BOLD),
            )]),
            Line::from(""),
            Line::from("This action cannot be undone."),
            Line::from(""),
            Line::from("Press 'y' to confirm, 'n' to cancel"),
        ];

        let paragraph = Paragraph::new(text)
            .block(block)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        f.render_widget(paragraph, area);
    }

    fn render_reminder(&self, f: &mut Frame, area: Rect, payload: &NotificationPayload) {
        let area = centered_rect(50, 25, area);
        f.render_widget(Clear, area);
        let block = Block::default()
            .title(payload.title.as_str())
            .borders(Borders::ALL)
            .border_style(Style::default().fg(GOLD))
            .style(Style::default().bg(BACKGROUND).fg(Color::White));
        let text = vec![
            Line::from(""),
            Line::from(Span::styled(
                payload.body.as_str(),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from("Press Enter to dismiss"),
        ];
        let paragraph = Paragraph::new(text)
            .block(block)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        f.render_widget(paragraph, area);
    }

    fn render_help(&self, f: &mut Frame, area: Rect) {
        let area = centered_rect(60, 70, area);
        f.render_widget(Clear, area);
        let key = |k: &'static str, what: &'static str| {
            Line::from(vec![
                Span::styled(format!("{k:<12}"), Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)),
                Span::raw(what),
            ])
        };
        let text = vec![
            key("a / i", "Add a task"),
            key("space / x", "Mark done / not done"),
            key("d", "Set or clear due time and reminder"),
            key("r", "Remove completed tasks"),
            key("C", "Clear all tasks"),
            key("j / k", "Move selection"),
            key("g / G", "First / last task"),
            key("h / ?", "Toggle this help"),
            key("q / Esc", "Quit"),
            Line::from(""),
            Line::from("Reminders fire while this window is open."),
            Line::from(format!("Tasks are saved to {}", self.session.path().display())),
        ];
        let p = Paragraph::new(text)
            .block(Block::default().title("Help").borders(Borders::ALL))
            .style(Style::default().bg(BACKGROUND).fg(Color::White))
            .wrap(Wrap { trim: false });
        f.render_widget(p, area);
    }

    fn render_status_bar(&self, f: &mut Frame, area: Rect) {
        let (text, bg) = if !self.status_message.is_empty() {
            let bg = if self.status_is_error { DARK_RED } else { BUTTON_BG };
            (self.status_message.clone(), bg)
        } else {
            let store = self.session.store();
            let open = store.len() - store.completed_ids().len();
            (format!("{} open task(s) | {}", open, self.session.path().display()), BUTTON_BG)
        };
        let status = Paragraph::new(text)
            .style(Style::default().bg(bg).fg(Color::White))
            .alignment(Alignment::Left);
        f.render_widget(status, area);
    }

    /// Main render function that lays out the screen and overlays dialogs.
    fn render(&mut self, f: &mut Frame) {
        let full = f.area();
        f.render_widget(Block::default().style(Style::default().bg(BACKGROUND)), full);
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // header
                Constraint::Length(3), // new task input
                Constraint::Min(0),    // task list
                Constraint::Length(1), // key hints
                Constraint::Length(1), // status bar
            ])
            .split(full);

        self.render_header(f, chunks[0]);
        self.render_input(f, chunks[1]);
        self.render_task_list(f, chunks[2]);
        self.render_key_hints(f, chunks[3]);
        self.render_status_bar(f, chunks[4]);

        match self.state {
            AppState::EditDue => self.render_due_form(f, chunks[2]),
            AppState::ConfirmClear => self.render_confirm(f, chunks[2]),
            AppState::Help => self.render_help(f, full),
            AppState::TaskList | AppState::AddTask => {}
        }
        if let Some(payload) = self.reminder.as_ref() {
            self.render_reminder(f, full, payload);
        }
    }

    /// Main event loop for the TUI application.
    ///
    /// Handles rendering, reminder delivery and input processing until the user exits.
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        loop {
            self.poll_reminders();
            terminal.draw(|f| self.render(f))?;
            if self.ring_bell {
                self.ring_bell = false;
                let mut out = io::stdout();
                if let Err(e) = out.write_all(b"\x07").and_then(|_| out.flush()) {
                    warn!("could not ring terminal bell: {e}");
                }
            }

            if self.handle_input()? {
                break;
            }
        }
        Ok(())
    }
}
