//! Time expression resolution
//!
//! Pure functions: expression plus reference instant in, absolute instant or
//! duration out. Trigger expressions accept RFC 3339 timestamps or a
//! wall-clock `HH:MM[:SS]` on the reference day; recurrence expressions are
//! unit-suffixed durations such as "90s", "15m", "2h30m" or bare seconds.

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use gantry_core::error::GantryError;

/// Resolves a trigger expression against a reference instant.
pub fn resolve(expr: &str, reference: DateTime<Utc>) -> Result<DateTime<Utc>, GantryError> {
    let expr = expr.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(expr) {
        return Ok(instant.with_timezone(&Utc));
    }
    for format in ["%H:%M:%S", "%H:%M"] {
        if let Ok(time) = NaiveTime::parse_from_str(expr, format) {
            return Ok(reference.date_naive().and_time(time).and_utc());
        }
    }
    Err(GantryError::InvalidArgument(format!(
        "unrecognized trigger time expression: {expr}"
    )))
}

/// Parses a recurrence expression into a duration.
pub fn parse_recurrence(expr: &str) -> Result<TimeDelta, GantryError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(GantryError::InvalidArgument(
            "empty recurrence expression".to_string(),
        ));
    }

    // bare number = seconds
    if let Ok(seconds) = expr.parse::<i64>() {
        return checked(seconds, expr);
    }

    let mut total_seconds: i64 = 0;
    let mut digits = String::new();
    for c in expr.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit_seconds = match c {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86_400,
            _ => {
                return Err(GantryError::InvalidArgument(format!(
                    "unrecognized recurrence unit '{c}' in {expr}"
                )));
            }
        };
        let count: i64 = digits.parse().map_err(|_| {
            GantryError::InvalidArgument(format!("malformed recurrence expression: {expr}"))
        })?;
        digits.clear();
        total_seconds += count * unit_seconds;
    }
    if !digits.is_empty() {
        return Err(GantryError::InvalidArgument(format!(
            "recurrence expression has a trailing number without a unit: {expr}"
        )));
    }
    checked(total_seconds, expr)
}

fn checked(seconds: i64, expr: &str) -> Result<TimeDelta, GantryError> {
    if seconds <= 0 {
        return Err(GantryError::InvalidArgument(format!(
            "recurrence must be positive: {expr}"
        )));
    }
    Ok(TimeDelta::seconds(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_rfc3339() {
        let reference = Utc::now();
        let instant = resolve("2026-08-06T12:30:00Z", reference).unwrap();
        assert_eq!(instant.to_rfc3339(), "2026-08-06T12:30:00+00:00");
    }

    #[test]
    fn test_resolve_wall_clock_on_reference_day() {
        let reference = DateTime::parse_from_rfc3339("2026-08-06T01:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let instant = resolve("14:30:00", reference).unwrap();
        assert_eq!(instant.to_rfc3339(), "2026-08-06T14:30:00+00:00");

        let short = resolve("14:30", reference).unwrap();
        assert_eq!(short, instant);
    }

    #[test]
    fn test_resolve_rejects_garbage() {
        assert!(resolve("tomorrowish", Utc::now()).is_err());
        assert!(resolve("25:99:99", Utc::now()).is_err());
    }

    #[test]
    fn test_parse_recurrence_units() {
        assert_eq!(parse_recurrence("90s").unwrap(), TimeDelta::seconds(90));
        assert_eq!(parse_recurrence("15m").unwrap(), TimeDelta::seconds(900));
        assert_eq!(parse_recurrence("2h30m").unwrap(), TimeDelta::seconds(9000));
        assert_eq!(parse_recurrence("1d").unwrap(), TimeDelta::seconds(86_400));
        assert_eq!(parse_recurrence("45").unwrap(), TimeDelta::seconds(45));
    }

    #[test]
    fn test_parse_recurrence_rejects_malformed() {
        assert!(parse_recurrence("").is_err());
        assert!(parse_recurrence("h").is_err());
        assert!(parse_recurrence("10x").is_err());
        assert!(parse_recurrence("1h30").is_err());
        assert!(parse_recurrence("0s").is_err());
        assert!(parse_recurrence("-5").is_err());
    }
}
