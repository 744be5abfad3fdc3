//! Parsing for the duration strings used in subscription specs and flags.
//!
//! Supports the subset of Go duration syntax the platform uses: an integer
//! followed by `ms`, `s`, `m` or `h`, optionally repeated (`1h30m`).

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,
    #[error("invalid duration {0:?}")]
    Invalid(String),
}

/// Parse a duration string like `15s`, `10m`, `1h30m` or `500ms`.
pub fn parse(input: &str) -> Result<Duration, DurationError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DurationError::Empty);
    }

    let mut total = Duration::ZERO;
    let mut digits = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        if digits.is_empty() {
            return Err(DurationError::Invalid(input.to_string()));
        }
        let value: u64 = digits
            .parse()
            .map_err(|_| DurationError::Invalid(input.to_string()))?;
        digits.clear();

        let unit = match c {
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                Duration::from_millis(1)
            }
            's' => Duration::from_secs(1),
            'm' => Duration::from_secs(60),
            'h' => Duration::from_secs(3600),
            _ => return Err(DurationError::Invalid(input.to_string())),
        };
        total += unit * u32::try_from(value).map_err(|_| DurationError::Invalid(input.to_string()))?;
    }

    if !digits.is_empty() {
        // Trailing bare number, no unit.
        return Err(DurationError::Invalid(input.to_string()));
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_units() {
        assert_eq!(parse("15s"), Ok(Duration::from_secs(15)));
        assert_eq!(parse("10m"), Ok(Duration::from_secs(600)));
        assert_eq!(parse("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse("250ms"), Ok(Duration::from_millis(250)));
    }

    #[test]
    fn parses_compound() {
        assert_eq!(parse("1h30m"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse("2m30s"), Ok(Duration::from_secs(150)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse(""), Err(DurationError::Empty));
        assert!(parse("15").is_err());
        assert!(parse("s").is_err());
        assert!(parse("15x").is_err());
    }
}
