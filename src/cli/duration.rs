//! Duration values for CLI arguments.
//!
//! Accepts `30s`, `5m`, `3h`, `1d` or a plain number of seconds.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid duration '{input}': {message}")]
pub struct DurationParseError {
    pub input: String,
    pub message: String,
}

impl DurationParseError {
    fn new(input: &str, message: &str) -> Self {
        Self {
            input: input.to_string(),
            message: message.to_string(),
        }
    }
}

/// Parse a single duration.
///
/// # Errors
///
/// Returns an error for empty input, unknown units, zero or overflowing values.
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let input = input.trim();

    if input.is_empty() {
        return Err(DurationParseError::new(input, "empty value"));
    }

    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(split);

    let value: u64 = number
        .parse()
        .map_err(|_| DurationParseError::new(input, "expected a number followed by s, m, h or d"))?;

    let multiplier = match unit {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return Err(DurationParseError::new(input, "unknown unit, use s, m, h or d")),
    };

    if value == 0 {
        return Err(DurationParseError::new(input, "must be greater than zero"));
    }

    value
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| DurationParseError::new(input, "too large"))
}

/// Parse a comma-separated list such as `1m,5m,10m`.
///
/// # Errors
///
/// Returns the first invalid entry's error.
pub fn parse_duration_list(input: &str) -> Result<Vec<Duration>, DurationParseError> {
    input
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_duration)
        .collect()
}
