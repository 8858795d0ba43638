//! Terminal output helpers shared by commands.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Steady spinner with a message. Hidden when `enabled` is false so it never
/// interleaves with streamed command output.
pub fn spinner(message: impl Into<String>, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(
            style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
    }
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Colorize status string based on value
pub fn colorize_status(status: &str) -> String {
    match status {
        "running" => status.green().to_string(),
        "stopped" => status.red().to_string(),
        "failed" => status.red().bold().to_string(),
        _ => status.to_string(),
    }
}

pub fn print_warnings(warnings: &[String]) {
    if warnings.is_empty() {
        return;
    }
    println!("{}", "Warnings:".yellow().bold());
    for warning in warnings {
        println!("  {} {}", "⚠".yellow(), warning);
    }
    println!();
}

/// Formats a duration to a human-readable string.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 1.0 {
        format!("{:.0}ms", secs * 1000.0)
    } else if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let mins = (secs / 60.0).floor();
        let remaining_secs = secs - (mins * 60.0);
        format!("{:.0}m{:.0}s", mins, remaining_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_milliseconds() {
        assert_eq!(format_duration(Duration::from_millis(123)), "123ms");
    }

    #[test]
    fn test_format_duration_seconds() {
        assert_eq!(format_duration(Duration::from_millis(5700)), "5.7s");
    }

    #[test]
    fn test_format_duration_minutes() {
        assert_eq!(format_duration(Duration::from_secs(125)), "2m5s");
    }

    #[test]
    fn test_colorize_status_keeps_text() {
        colored::control::set_override(false);
        assert_eq!(colorize_status("running"), "running");
        assert_eq!(colorize_status("unknown"), "unknown");
    }

    #[test]
    fn test_hidden_spinner() {
        let spinner = spinner("working", false);
        assert!(spinner.is_hidden());
        spinner.finish_and_clear();
    }
}
