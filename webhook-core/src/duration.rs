//! Go-style duration strings.
//!
//! Several settings (user retention, session TTLs) carry durations in the
//! format accepted by Go's `time.ParseDuration`: one or more decimal numbers
//! with a unit suffix, e.g. `300ms`, `1.5h` or `2h45m`.

use std::{fmt, str::FromStr, time};

use thiserror::Error;

const EXPECTED_UNITS: &str = "expected one of 'ns', 'us', 'ms', 's', 'm', or 'h'";

/// Errors returned when parsing a [`Duration`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseDurationError {
    /// An invalid unit trailed a number.
    #[error("invalid unit: {EXPECTED_UNITS}")]
    InvalidUnit,

    /// A number was not followed by a unit.
    #[error("missing a unit: {EXPECTED_UNITS}")]
    NoUnit,

    /// A segment held no parseable number.
    #[error("invalid number in duration")]
    InvalidNumber,

    /// The summed duration does not fit.
    #[error("duration overflows the supported range")]
    Overflow,
}

/// A parsed Go-style duration.
///
/// Unlike [`std::time::Duration`] this can carry a sign, because Go durations
/// are signed; validators that require non-negative values check
/// [`Duration::is_negative`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Duration {
    duration: time::Duration,
    is_negative: bool,
}

impl Duration {
    /// Whether the parsed duration was negative.
    pub fn is_negative(&self) -> bool {
        self.is_negative
    }

    /// The absolute value of the duration.
    pub fn duration(&self) -> time::Duration {
        self.duration
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_negative {
            write!(f, "-")?;
        }
        write!(f, "{}s", self.duration.as_secs_f64())
    }
}

impl FromStr for Duration {
    type Err = ParseDurationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (is_negative, mut rest) = match input.as_bytes().first() {
            Some(b'-') => (true, &input[1..]),
            Some(b'+') => (false, &input[1..]),
            _ => (false, input),
        };
        if rest == "0" {
            return Ok(Duration {
                duration: time::Duration::ZERO,
                is_negative,
            });
        }
        if rest.is_empty() {
            return Err(ParseDurationError::InvalidNumber);
        }

        let mut total = time::Duration::ZERO;
        while !rest.is_empty() {
            let number_end = rest
                .find(|c: char| !c.is_ascii_digit() && c != '.')
                .ok_or(ParseDurationError::NoUnit)?;
            let number: f64 = rest[..number_end]
                .parse()
                .map_err(|_| ParseDurationError::InvalidNumber)?;

            let unit_str = &rest[number_end..];
            let (unit, unit_len): (time::Duration, usize) = if unit_str.starts_with("ns") {
                (time::Duration::from_nanos(1), 2)
            } else if unit_str.starts_with("us") {
                (time::Duration::from_micros(1), 2)
            } else if unit_str.starts_with("µs") {
                (time::Duration::from_micros(1), "µs".len())
            } else if unit_str.starts_with("ms") {
                (time::Duration::from_millis(1), 2)
            } else if unit_str.starts_with('s') {
                (time::Duration::from_secs(1), 1)
            } else if unit_str.starts_with('m') {
                (time::Duration::from_secs(60), 1)
            } else if unit_str.starts_with('h') {
                (time::Duration::from_secs(3600), 1)
            } else {
                return Err(ParseDurationError::InvalidUnit);
            };

            let segment = unit.mul_f64(number);
            total = total
                .checked_add(segment)
                .ok_or(ParseDurationError::Overflow)?;
            rest = &unit_str[unit_len..];
        }

        Ok(Duration {
            duration: total,
            is_negative,
        })
    }
}
