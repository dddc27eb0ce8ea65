//! TUI color theme
//!
//! Recolored from the teacher's F-35 glass-cockpit palette onto this
//! dashboard's cost/burn-rate semantics: green/yellow/red track the
//! configured `display.cost_color_*` thresholds rather than CPU percentage.

use ratatui::style::Color;

pub const OK_GREEN: Color = Color::Rgb(0, 255, 0);
pub const WARN_AMBER: Color = Color::Rgb(255, 191, 0);
pub const CRITICAL_RED: Color = Color::Rgb(255, 0, 0);
pub const INFO_DIM: Color = Color::Rgb(0, 180, 0);
pub const BACKGROUND: Color = Color::Reset;

pub const MARKER_CRIT: &str = "[X]";
pub const MARKER_WARN: &str = "[!]";
pub const MARKER_OK: &str = "[-]";
const BAR_FULL: &str = "|";
const BAR_EMPTY: &str = " ";

/// Marker + color for a cost rate, given the configured green/yellow thresholds.
#[must_use]
pub fn severity_marker(color: crate::analytics::ThresholdColor) -> (&'static str, Color) {
    match color {
        crate::analytics::ThresholdColor::Green => (MARKER_OK, OK_GREEN),
        crate::analytics::ThresholdColor::Yellow => (MARKER_WARN, WARN_AMBER),
        crate::analytics::ThresholdColor::Red => (MARKER_CRIT, CRITICAL_RED),
    }
}

/// Marker + color for a session status.
#[must_use]
pub fn status_marker(status: crate::domain::SessionStatus) -> (&'static str, Color) {
    use crate::domain::SessionStatus;
    match status {
        SessionStatus::Active => (MARKER_OK, OK_GREEN),
        SessionStatus::Idle => (MARKER_WARN, WARN_AMBER),
        SessionStatus::Done | SessionStatus::Exited => ("[.]", INFO_DIM),
    }
}

/// Horizontal gauge bar, `width` characters wide.
#[must_use]
pub fn gauge_bar(percentage: f64, width: usize) -> String {
    let filled = ((percentage / 100.0) * width as f64) as usize;
    let filled = filled.min(width);
    let empty = width.saturating_sub(filled);
    format!("[{}{}]", BAR_FULL.repeat(filled), BAR_EMPTY.repeat(empty))
}
