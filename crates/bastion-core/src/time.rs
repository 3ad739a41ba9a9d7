//! Timestamp coercion and time range resolution.
//!
//! Caldera and Wazuh disagree on timestamp formats: RFC 3339 with `Z`,
//! offsets without a colon (`+0000`), naive local-looking strings that are
//! really UTC, and epoch numbers. Everything is normalised to `DateTime<Utc>`.

use crate::error::{CoreError, CoreResult};
use bastion_connectors::TimeRange;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Epoch values above this are taken as milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 100_000_000_000.0;

/// Coerces a JSON value (string or number) into a UTC timestamp.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_time_str(s),
        Value::Number(n) => n.as_f64().and_then(from_epoch),
        _ => None,
    }
}

/// Parses an absolute timestamp string. Naive timestamps are read as UTC.
pub fn parse_time_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    s.parse::<f64>().ok().and_then(from_epoch)
}

fn from_epoch(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    let millis = if secs > EPOCH_MILLIS_THRESHOLD {
        secs
    } else {
        secs * 1000.0
    };
    Utc.timestamp_millis_opt(millis as i64).single()
}

/// Parses `now`, `now-15m`, `now+1h` or an absolute timestamp.
///
/// Units: `s`, `m`, `h`, `d`, `w`.
pub fn parse_time_expr(expr: &str, now: DateTime<Utc>) -> CoreResult<DateTime<Utc>> {
    let expr = expr.trim();
    let Some(rest) = expr.strip_prefix("now") else {
        return parse_time_str(expr).ok_or_else(|| CoreError::InvalidTime(expr.to_string()));
    };
    if rest.is_empty() {
        return Ok(now);
    }

    let (sign, amount): (i32, &str) = if let Some(amount) = rest.strip_prefix('-') {
        (-1, amount)
    } else if let Some(amount) = rest.strip_prefix('+') {
        (1, amount)
    } else {
        return Err(CoreError::InvalidTime(expr.to_string()));
    };
    let unit_at = amount
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| CoreError::InvalidTime(expr.to_string()))?;
    let (digits, unit) = amount.split_at(unit_at);
    let n: i64 = digits
        .parse()
        .map_err(|_| CoreError::InvalidTime(expr.to_string()))?;

    let delta = match unit {
        "s" => Duration::try_seconds(n),
        "m" => Duration::try_minutes(n),
        "h" => Duration::try_hours(n),
        "d" => Duration::try_days(n),
        "w" => Duration::try_weeks(n),
        _ => return Err(CoreError::InvalidTime(expr.to_string())),
    };
    let shifted = delta.and_then(|delta| {
        if sign < 0 {
            now.checked_sub_signed(delta)
        } else {
            now.checked_add_signed(delta)
        }
    });
    shifted.ok_or_else(|| CoreError::InvalidTime(format!("{} is out of range", expr)))
}

/// `ts` moved back by `minutes`, saturating at the earliest representable time.
fn minutes_before(ts: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    Duration::try_minutes(minutes)
        .and_then(|d| ts.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// `ts` moved forward by `minutes`, saturating at the latest representable time.
fn minutes_after(ts: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    Duration::try_minutes(minutes)
        .and_then(|d| ts.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Resolves optional `from`/`to` expressions into a range; missing bounds
/// default to the last `default_minutes` ending now.
pub fn resolve_range(
    from: Option<&str>,
    to: Option<&str>,
    default_minutes: i64,
    now: DateTime<Utc>,
) -> CoreResult<TimeRange> {
    let end = match to.filter(|s| !s.trim().is_empty()) {
        Some(expr) => parse_time_expr(expr, now)?,
        None => now,
    };
    let start = match from.filter(|s| !s.trim().is_empty()) {
        Some(expr) => parse_time_expr(expr, now)?,
        None => minutes_before(end, default_minutes),
    };
    if start > end {
        return Err(CoreError::InvalidTime(format!(
            "range start {} is after end {}",
            start.to_rfc3339(),
            end.to_rfc3339()
        )));
    }
    Ok(TimeRange::new(start, end))
}

/// Fills in missing operation bounds: an absent end is now, an absent start
/// is `default_minutes` before now. A start after the end pushes the end out.
pub fn ensure_range(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    default_minutes: i64,
    now: DateTime<Utc>,
) -> TimeRange {
    let start = start.unwrap_or_else(|| minutes_before(now, default_minutes));
    let end = end.unwrap_or(now);
    if start > end {
        TimeRange::new(start, minutes_after(start, default_minutes))
    } else {
        TimeRange::new(start, end)
    }
}

/// Minute bucket label `YYYY-MM-DDTHH:MM`.
pub fn minute_bucket(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M").to_string()
}
