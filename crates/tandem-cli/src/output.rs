// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! CLI output formatting with colors and styling.
//!
//! Respects NO_COLOR and FORCE_COLOR environment variables.

use colored::{ColoredString, Colorize};

/// Initialize color support based on environment.
/// Call once at startup.
pub fn init() {
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    } else if std::env::var("FORCE_COLOR").is_ok() {
        colored::control::set_override(true);
    }
}

// === Error Output ===

pub fn error_label() -> ColoredString {
    "error".red().bold()
}

pub fn hint_label() -> ColoredString {
    "hint".cyan()
}

pub fn hint_text(msg: &str) -> ColoredString {
    msg.dimmed()
}

// === Demo Output ===

/// Source tag in front of a demo line, padded to `width` columns.
pub fn tag(label: &str, width: usize) -> ColoredString {
    let padded = format!("{:<width$}", label, width = width);
    match label {
        "[main]" => padded.green(),
        "[async]" => padded.cyan(),
        "[interrupt]" => padded.yellow(),
        _ => padded.normal(),
    }
}

pub fn success(msg: &str) -> ColoredString {
    msg.green()
}

pub fn failure(msg: &str) -> ColoredString {
    msg.red()
}

// === Help Output ===

pub fn title(name: &str) -> ColoredString {
    name.bold()
}

pub fn version(v: &str) -> ColoredString {
    v.dimmed()
}

pub fn section_header(header: &str) -> ColoredString {
    header.yellow().bold()
}

pub fn command(name: &str) -> ColoredString {
    name.green()
}

pub fn arg(name: &str) -> ColoredString {
    name.cyan()
}
