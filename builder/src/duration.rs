//! Go-style duration string parsing (`"30s"`, `"1.5h"`, `"0"`), the format
//! every timeout/interval field on HTTPProxy and Ingress annotations uses.
//!
//! Adapted from `linkerd-linkerd2/policy-controller/k8s/api/src/duration.rs`'s
//! `K8sDuration::from_str`, trimmed to parsing only since the policy
//! compiler only ever needs a `Duration` out, never a round-trippable
//! wrapper type.

use std::time::Duration;

#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid unit: expected one of 'ns', 'us', 'ms', 's', 'm', or 'h'")]
    InvalidUnit,
    #[error("missing a unit: expected one of 'ns', 'us', 'ms', 's', 'm', or 'h'")]
    NoUnit,
    #[error("invalid floating-point number: {0}")]
    NotANumber(#[from] std::num::ParseFloatError),
}

fn duration_from_units(val: f64, unit: &str) -> Result<Duration, ParseError> {
    const MINUTE: Duration = Duration::from_secs(60);
    let base = match unit {
        "ns" => Duration::from_nanos(1),
        "us" | "\u{00b5}s" | "\u{03bc}s" => Duration::from_micros(1),
        "ms" => Duration::from_millis(1),
        "s" => Duration::from_secs(1),
        "m" => MINUTE,
        "h" => MINUTE * 60,
        _ => return Err(ParseError::InvalidUnit),
    };
    Ok(base.mul_f64(val))
}

/// Parses a Go `time.Duration.String()`-shaped value. Negative durations
/// are accepted syntactically and clamped to zero, since no caller in this
/// builder has a meaningful negative duration.
pub fn parse(mut s: &str) -> Result<Duration, ParseError> {
    s = s.trim_start_matches('+').trim_start_matches('-');
    if s == "0" {
        return Ok(Duration::from_secs(0));
    }

    let mut total = Duration::from_secs(0);
    while !s.is_empty() {
        let unit_start = s
            .find(|c: char| c.is_alphabetic())
            .ok_or(ParseError::NoUnit)?;
        let (val, rest) = s.split_at(unit_start);
        let val: f64 = val.parse()?;
        let unit = if let Some(next_numeric_start) = rest.find(|c: char| !c.is_alphabetic()) {
            let (unit, rest) = rest.split_at(next_numeric_start);
            s = rest;
            unit
        } else {
            s = "";
            rest
        };
        total += duration_from_units(val, unit)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_seconds() {
        assert_eq!(parse("30s").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn parses_compound_duration() {
        assert_eq!(parse("1m30s").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn zero_has_no_unit_requirement() {
        assert_eq!(parse("0").unwrap(), Duration::from_secs(0));
    }

    #[test]
    fn rejects_missing_unit() {
        assert_eq!(parse("30"), Err(ParseError::NoUnit));
    }
}
