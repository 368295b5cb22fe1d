//! Shared helper functions for CLI commands
//!
//! This module contains utility functions that are used across multiple
//! command modules to avoid code duplication.

use std::io::{self, IsTerminal, Read};

/// Truncate a string to max_len characters, adding "..." if truncated
///
/// Useful for table columns that need fixed-width output.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Split a `name=value` argument
///
/// The value may itself contain `=`; only the first one separates.
pub fn parse_assignment(item: &str) -> miette::Result<(String, String)> {
    let (name, value) = item
        .split_once('=')
        .ok_or_else(|| miette::miette!("Expected name=value, got '{}'", item))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(miette::miette!("Missing property name in '{}'", item));
    }
    Ok((name.to_string(), value.to_string()))
}

/// Read a document from a file, or from stdin when the path is `-`
pub fn read_input(path: &str) -> miette::Result<String> {
    if path == "-" {
        let mut stdin = io::stdin();
        if stdin.is_terminal() {
            return Err(miette::miette!("Nothing piped on stdin"));
        }
        let mut text = String::new();
        stdin
            .read_to_string(&mut text)
            .map_err(|e| miette::miette!("Failed to read stdin: {}", e))?;
        Ok(text)
    } else {
        std::fs::read_to_string(path).map_err(|e| miette::miette!("Failed to read {}: {}", path, e))
    }
}

/// Render a boolean as a check mark for tables
pub fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "-"
    }
}
