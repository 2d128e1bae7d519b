//! Colored CLI display utilities.
//!
//! This module provides functions for printing colored, formatted status
//! lines to the terminal while a stream is supervised.

use std::io::{self, Write};
use std::path::Path;

use chrono::Utc;
use owo_colors::OwoColorize;
use uuid::Uuid;

use crate::stream::{StreamOutcome, TerminationResult};

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Maximum length for truncated display strings.
const DEFAULT_MAX_LEN: usize = 80;

/// Truncate a string to a maximum length, adding ellipsis if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        format!("{}...", &s[..max_len - 3])
    }
}

/// Print the source a stream start was requested for.
pub fn print_stream_starting(source: &str) {
    println!(
        "{} {} source={}",
        timestamp().dimmed(),
        "[STREAM]".blue().bold(),
        truncate(source, DEFAULT_MAX_LEN).cyan()
    );
    let _ = io::stdout().flush();
}

/// Print that a stream reached its serving state.
pub fn print_stream_ready(id: Uuid, playlist: &Path) {
    println!(
        "{} {} stream {} serving {}",
        timestamp().dimmed(),
        "[READY]".green().bold(),
        id.to_string().dimmed(),
        playlist.display()
    );
    let _ = io::stdout().flush();
}

/// Print how a stream ended.
pub fn print_stream_end(id: Uuid, result: &TerminationResult) {
    let ts = timestamp();
    match &result.outcome {
        StreamOutcome::Stopped => {
            println!(
                "{} {} stream {} stopped",
                ts.dimmed(),
                "[STREAM]".blue().bold(),
                id.to_string().dimmed()
            );
        }
        StreamOutcome::Crashed(exit) => {
            println!(
                "{} {} stream {} crashed ({exit})",
                ts.dimmed(),
                "[CRASH]".red().bold(),
                id.to_string().dimmed()
            );
        }
    }
    if let Some(warning) = &result.cleanup_warning {
        println!(
            "{} {} {}",
            ts.dimmed(),
            "[WARN]".yellow().bold(),
            truncate(warning, 200).yellow()
        );
    }
    let _ = io::stdout().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    println!(
        "{} {} {}",
        timestamp().dimmed(),
        "[ERROR]".red().bold(),
        truncate(message, 200).red()
    );
    let _ = io::stdout().flush();
}
