//! Duration-literal grammar for wire-format duration fields.
//!
//! Durations are encoded as concatenated `<count><unit>` terms, e.g. `"10s"`
//! or `"1h30m"`. Units: `u`/`µ` (microseconds), `ms`, `s`, `m`, `h`, `d`,
//! `w`. Formatting emits the largest exact units first and round-trips
//! through [`parse_duration`].

use std::time::Duration;
use thiserror::Error;

/// A literal that does not match the duration grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid duration literal {literal:?}")]
pub struct InvalidDuration {
    /// The rejected literal.
    pub literal: String,
}

const MICROS_PER_MS: u64 = 1_000;
const MICROS_PER_SECOND: u64 = 1_000_000;
const MICROS_PER_MINUTE: u64 = 60 * MICROS_PER_SECOND;
const MICROS_PER_HOUR: u64 = 60 * MICROS_PER_MINUTE;
const MICROS_PER_DAY: u64 = 24 * MICROS_PER_HOUR;
const MICROS_PER_WEEK: u64 = 7 * MICROS_PER_DAY;

/// Parses a duration literal.
///
/// # Errors
///
/// Returns [`InvalidDuration`] for an empty literal, an unknown unit, a
/// term without a count, or a value that overflows.
pub fn parse_duration(literal: &str) -> Result<Duration, InvalidDuration> {
    let invalid = || InvalidDuration {
        literal: literal.to_string(),
    };

    if literal.is_empty() {
        return Err(invalid());
    }

    let mut total_micros: u64 = 0;
    let mut rest = literal;

    while !rest.is_empty() {
        let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        if digits == 0 {
            return Err(invalid());
        }
        let count: u64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let (unit_micros, consumed) = match rest.as_bytes() {
            [b'm', b's', ..] => (MICROS_PER_MS, 2),
            [b'u', ..] => (1, 1),
            [0xC2, 0xB5, ..] => (1, 2), // µ
            [b's', ..] => (MICROS_PER_SECOND, 1),
            [b'm', ..] => (MICROS_PER_MINUTE, 1),
            [b'h', ..] => (MICROS_PER_HOUR, 1),
            [b'd', ..] => (MICROS_PER_DAY, 1),
            [b'w', ..] => (MICROS_PER_WEEK, 1),
            _ => return Err(invalid()),
        };
        rest = &rest[consumed..];

        total_micros = count
            .checked_mul(unit_micros)
            .and_then(|term| total_micros.checked_add(term))
            .ok_or_else(invalid)?;
    }

    Ok(Duration::from_micros(total_micros))
}

/// Formats a duration in the wire grammar, largest exact units first.
///
/// Sub-microsecond precision is dropped; a zero duration formats as `"0s"`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let mut micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
    if micros == 0 {
        return "0s".to_string();
    }

    let units = [
        (MICROS_PER_WEEK, "w"),
        (MICROS_PER_DAY, "d"),
        (MICROS_PER_HOUR, "h"),
        (MICROS_PER_MINUTE, "m"),
        (MICROS_PER_SECOND, "s"),
        (MICROS_PER_MS, "ms"),
        (1, "u"),
    ];

    let mut out = String::new();
    for (unit_micros, suffix) in units {
        let count = micros / unit_micros;
        if count > 0 {
            out.push_str(&count.to_string());
            out.push_str(suffix);
            micros -= count * unit_micros;
        }
    }
    out
}
