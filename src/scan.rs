//! Windowed scan of one line source.
//!
//! `scan_source` is a pure fold over the lines of a single source: it returns
//! a fresh [`Accumulator`] and never touches shared state. The caller absorbs
//! the outcome into its per-metric accumulator, one source at a time.

use crate::metric::{Accumulator, MetricSpec};
use chrono::{Local, LocalResult, NaiveDateTime, TimeZone};
use std::fmt;
use std::io;

/// Scan every line of one source for a metric.
///
/// Each line is split on whitespace; the first field is normalized to epoch
/// seconds and compared against the metric's window cutoff anchored at `now`.
/// Qualifying rows contribute `fields[column]` to `values`. The last line's
/// column field is captured verbatim as `last_raw` whether or not that line
/// fell inside the window.
pub fn scan_source<I>(
    spec: &MetricSpec,
    lines: I,
    time_format: &str,
    now: i64,
) -> Result<Accumulator, ScanError>
where
    I: IntoIterator<Item = io::Result<String>>,
{
    let cutoff = spec.cutoff(now);
    let mut acc = Accumulator::default();
    let mut last_line: Option<String> = None;

    for line in lines {
        let line = line.map_err(ScanError::Io)?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        let stamp = fields
            .first()
            .ok_or(ScanError::MissingField { index: 0 })?;
        let timestamp = normalize_timestamp(stamp, time_format)?;
        if timestamp > cutoff {
            let field = fields
                .get(spec.column())
                .ok_or(ScanError::MissingField {
                    index: spec.column(),
                })?;
            let value: i64 = field
                .parse()
                .map_err(|_| ScanError::BadValue(field.to_string()))?;
            acc.values.push(value);
        }
        last_line = Some(line);
    }

    let last_line = last_line.ok_or(ScanError::EmptySource)?;
    let field = last_line
        .split_whitespace()
        .nth(spec.column())
        .ok_or(ScanError::MissingField {
            index: spec.column(),
        })?;
    acc.last_raw = Some(field.to_string());
    Ok(acc)
}

/// Normalize one timestamp token to epoch seconds.
///
/// Three strategies, tried in order, first success wins:
/// 1. strip any `+`-prefixed suffix (timezone offset) and parse the rest
///    against `time_format`, using local-time semantics;
/// 2. take the raw token as an already-numeric epoch timestamp;
/// 3. strip the last `-`-delimited segment and retry the format parse (some
///    rotated logs append a suffix to the formatted stamp).
pub fn normalize_timestamp(token: &str, time_format: &str) -> Result<i64, ScanError> {
    let head = match token.split_once('+') {
        Some((head, _)) => head,
        None => token,
    };
    if let Some(timestamp) = parse_formatted(head, time_format) {
        return Ok(timestamp);
    }

    if let Ok(timestamp) = token.parse::<i64>() {
        return Ok(timestamp);
    }

    if let Some((head, _)) = token.rsplit_once('-') {
        if let Some(timestamp) = parse_formatted(head, time_format) {
            return Ok(timestamp);
        }
    }

    Err(ScanError::BadTimestamp(token.to_string()))
}

/// Parse a formatted local timestamp to epoch seconds. A DST-ambiguous wall
/// time resolves to its earliest mapping; a nonexistent one fails the parse.
fn parse_formatted(token: &str, time_format: &str) -> Option<i64> {
    let naive = NaiveDateTime::parse_from_str(token, time_format).ok()?;
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.timestamp()),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.timestamp()),
        LocalResult::None => None,
    }
}

#[derive(Debug)]
pub enum ScanError {
    Io(io::Error),
    EmptySource,
    MissingField { index: usize },
    BadValue(String),
    BadTimestamp(String),
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::Io(e) => write!(f, "I/O error while scanning: {e}"),
            ScanError::EmptySource => write!(f, "source contains no lines"),
            ScanError::MissingField { index } => {
                write!(f, "line has no field at column {index}")
            }
            ScanError::BadValue(field) => {
                write!(f, "value field '{field}' is not an integer")
            }
            ScanError::BadTimestamp(token) => {
                write!(f, "timestamp '{token}' does not match any known format")
            }
        }
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScanError::Io(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::MetricSpec;

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    fn spec(token: &str) -> MetricSpec {
        token.parse().unwrap()
    }

    fn fmt_local(timestamp: i64) -> String {
        Local
            .timestamp_opt(timestamp, 0)
            .unwrap()
            .format(FORMAT)
            .to_string()
    }

    fn lines(raw: &[String]) -> Vec<io::Result<String>> {
        raw.iter().map(|l| Ok(l.clone())).collect()
    }

    #[test]
    fn test_window_includes_only_recent_rows() {
        let now = Local::now().timestamp();
        let raw = vec![
            format!("{} 111", fmt_local(now - 1000)),
            format!("{} 222", fmt_local(now - 10)),
        ];
        let acc = scan_source(&spec("m:1:sum:1m"), lines(&raw), FORMAT, now).unwrap();
        assert_eq!(acc.values, vec![222]);
    }

    #[test]
    fn test_last_raw_ignores_window() {
        let now = Local::now().timestamp();
        // Last line is ancient; it still provides last_raw.
        let raw = vec![
            format!("{} 222", fmt_local(now - 10)),
            format!("{} 111", fmt_local(now - 1000)),
        ];
        let acc = scan_source(&spec("m:1:sum:1m"), lines(&raw), FORMAT, now).unwrap();
        assert_eq!(acc.values, vec![222]);
        assert_eq!(acc.last_raw.as_deref(), Some("111"));
    }

    #[test]
    fn test_no_period_includes_all_rows() {
        let now = Local::now().timestamp();
        let raw = vec![
            format!("{} 1", fmt_local(now - 90000)),
            format!("{} 2", fmt_local(now - 10)),
        ];
        let acc = scan_source(&spec("m:1:sum"), lines(&raw), FORMAT, now).unwrap();
        assert_eq!(acc.values, vec![1, 2]);
    }

    #[test]
    fn test_row_exactly_at_cutoff_is_excluded() {
        let now = Local::now().timestamp();
        let raw = vec![
            format!("{} 1", fmt_local(now - 60)),
            format!("{} 2", fmt_local(now - 59)),
        ];
        let acc = scan_source(&spec("m:1:sum:1m"), lines(&raw), FORMAT, now).unwrap();
        assert_eq!(acc.values, vec![2]);
    }

    #[test]
    fn test_normalize_formatted_timestamp() {
        let now = Local::now().timestamp();
        let token = fmt_local(now);
        assert_eq!(normalize_timestamp(&token, FORMAT).unwrap(), now);
    }

    #[test]
    fn test_normalize_strips_timezone_suffix() {
        let now = Local::now().timestamp();
        let token = format!("{}+02:00", fmt_local(now));
        assert_eq!(normalize_timestamp(&token, FORMAT).unwrap(), now);
    }

    #[test]
    fn test_normalize_raw_epoch_fallback() {
        assert_eq!(
            normalize_timestamp("1700000000", FORMAT).unwrap(),
            1_700_000_000
        );
    }

    #[test]
    fn test_normalize_trailing_dash_suffix_fallback() {
        let now = Local::now().timestamp();
        let token = format!("{}-rotated", fmt_local(now));
        assert_eq!(normalize_timestamp(&token, FORMAT).unwrap(), now);
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(matches!(
            normalize_timestamp("not-a-time", FORMAT),
            Err(ScanError::BadTimestamp(_))
        ));
    }

    #[test]
    fn test_missing_value_column_is_fatal() {
        let now = Local::now().timestamp();
        let raw = vec![format!("{} 1", fmt_local(now - 1))];
        assert!(matches!(
            scan_source(&spec("m:5:sum"), lines(&raw), FORMAT, now),
            Err(ScanError::MissingField { index: 5 })
        ));
    }

    #[test]
    fn test_non_numeric_value_is_fatal() {
        let now = Local::now().timestamp();
        let raw = vec![format!("{} oops", fmt_local(now - 1))];
        assert!(matches!(
            scan_source(&spec("m:1:sum"), lines(&raw), FORMAT, now),
            Err(ScanError::BadValue(_))
        ));
    }

    #[test]
    fn test_empty_source_is_an_error() {
        let now = Local::now().timestamp();
        assert!(matches!(
            scan_source(&spec("m:1:sum"), lines(&[]), FORMAT, now),
            Err(ScanError::EmptySource)
        ));
    }

    #[test]
    fn test_blank_line_is_fatal() {
        let now = Local::now().timestamp();
        let raw = vec![format!("{} 1", fmt_local(now - 1)), String::new()];
        assert!(matches!(
            scan_source(&spec("m:1:sum"), lines(&raw), FORMAT, now),
            Err(ScanError::MissingField { index: 0 })
        ));
    }

    #[test]
    fn test_io_error_propagates() {
        let now = Local::now().timestamp();
        let lines: Vec<io::Result<String>> =
            vec![Err(io::Error::new(io::ErrorKind::Other, "boom"))];
        assert!(matches!(
            scan_source(&spec("m:1:sum"), lines, FORMAT, now),
            Err(ScanError::Io(_))
        ));
    }
}
