//! Output helpers
//!
//! JSON goes to stdout so it can be piped; status lines go to stderr.

use std::io::Write;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;

/// Pretty-prints `value` as JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render JSON")?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{rendered}").context("Failed to write to stdout")?;
    Ok(())
}

/// Reports a successful step.
pub fn status_ok(message: &str) {
    eprintln!("{} {message}", "ok".bright_green());
}

/// Reports something the user should notice.
pub fn status_warn(message: &str) {
    eprintln!("{} {message}", "warning:".yellow());
}

/// Reports a failure.
pub fn status_error(message: &str) {
    eprintln!("{} {message}", "Error:".bright_red());
}
