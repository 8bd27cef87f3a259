use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::errors::ServiceError;

const DEADLINE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parses a storage deadline that is either a relative duration (`24h`,
/// `30m`, `1h30m`) added to `now`, or an absolute `YYYY-MM-DDThh:mm:ss`
/// timestamp.
pub fn parse_deadline(value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ServiceError> {
    if let Some(duration) = parse_duration(value) {
        return Ok(now + duration);
    }

    NaiveDateTime::parse_from_str(value, DEADLINE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| ServiceError::InvalidDeadline(value.to_string()))
}

fn parse_duration(value: &str) -> Option<Duration> {
    let mut total = Duration::zero();
    let mut digits = String::new();
    let mut matched = false;

    for ch in value.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }

        let amount: i64 = digits.parse().ok()?;
        digits.clear();

        total += match ch {
            'h' => Duration::hours(amount),
            'm' => Duration::minutes(amount),
            's' => Duration::seconds(amount),
            _ => return None,
        };
        matched = true;
    }

    if !matched || !digits.is_empty() {
        return None;
    }

    Some(total)
}
