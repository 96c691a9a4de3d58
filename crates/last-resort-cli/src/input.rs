//! Reading exception values from a line stream.
//!
//! One value per line. Lines that parse as JSON become the matching raw
//! shape (object, string, primitive); anything else is taken as a thrown
//! string verbatim. Blank lines are skipped.

use std::io::BufRead;

use anyhow::{Context, Result};
use last_resort::RawException;

/// Parse a single input line.
pub fn parse_line(line: &str) -> Option<RawException> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value) => Some(RawException::from(value)),
        Err(_) => Some(RawException::Text(trimmed.to_string())),
    }
}

/// Read every exception from `reader`.
pub fn read_exceptions(reader: impl BufRead) -> Result<Vec<RawException>> {
    let mut exceptions = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read input line {}", idx + 1))?;
        if let Some(raw) = parse_line(&line) {
            exceptions.push(raw);
        }
    }
    Ok(exceptions)
}
