//! Color constants for the terminal user interface.

use ratatui::style::Color;

// Dark slate theme: base, raised surfaces, accent.

/// Screen background
pub const BACKGROUND: Color = Color::Rgb(30, 30, 47);
/// Input line background
pub const INPUT_BG: Color = Color::Rgb(43, 43, 60);
/// Task row background
pub const ROW_BG: Color = Color::Rgb(47, 47, 63);
/// Key hints and the status bar
pub const BUTTON_BG: Color = Color::Rgb(62, 62, 80);
/// Selection and focused fields
pub const ACCENT: Color = Color::Rgb(92, 92, 255);
/// Borders
pub const BORDER: Color = Color::Rgb(68, 68, 68);
/// Confirmation and error dialogs
pub const DARK_RED: Color = Color::Rgb(114, 0, 0);
/// Reminder popups
pub const GOLD: Color = Color::Rgb(255, 215, 0);
