//! Time-range string parser (C1, spec §4.1/§6.1).
//!
//! Grammar: `range := dt "~" dt | date`, `dt := date sep time`,
//! `date := YYYY-MM-DD`, `time := HH:MM[:SS]`, `sep := "_" | "-"`.
//! A bare `-` separator between date and time is rewritten to `_` before
//! parsing, mirroring `time_parser.py`'s `normalize_datetime_format`.

use crate::utils::error::{AppError, TimeParsingKind};
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;

static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

/// A half-open `[start, end)` instant interval (spec §3). The bare-date form
/// is the one documented exception where `end` is inclusive 23:59:59, per
/// spec §6.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl TimeRange {
    /// Parses a time-range string using the given default timezone offset.
    pub fn parse(input: &str, tz: FixedOffset) -> Result<Self, AppError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(format_error(input, "empty time-range string"));
        }

        let tilde_count = trimmed.matches('~').count();
        match tilde_count {
            0 => {
                if !DATE_RE.is_match(trimmed) {
                    return Err(format_error(
                        input,
                        "expected YYYY-MM-DD, or two dates joined by '~'",
                    ));
                }
                let date = parse_date(trimmed, input)?;
                let start = date
                    .and_hms_opt(0, 0, 0)
                    .ok_or_else(|| value_error(input, "invalid calendar date"))?;
                let end = date
                    .and_hms_opt(23, 59, 59)
                    .ok_or_else(|| value_error(input, "invalid calendar date"))?;
                let start = to_tz(start, tz, input)?;
                let end = to_tz(end, tz, input)?;
                validate_logic(start, end, input)?;
                Ok(TimeRange { start, end })
            },
            1 => {
                let mut parts = trimmed.splitn(2, '~');
                let left = parts.next().unwrap().trim();
                let right = parts.next().unwrap().trim();
                let start = parse_datetime_part(left, input, tz)?;
                let end = parse_datetime_part(right, input, tz)?;
                validate_logic(start, end, input)?;
                Ok(TimeRange { start, end })
            },
            _ => Err(format_error(input, "more than one '~' separator")),
        }
    }

    /// Non-throwing wrapper (SPEC_FULL §B.3, grounded on `parse_safe`).
    pub fn parse_safe(input: &str, tz: FixedOffset) -> Option<Self> {
        Self::parse(input, tz).ok()
    }

    /// Non-throwing format check (SPEC_FULL §B.3, grounded on `is_valid_format`).
    pub fn is_valid_format(input: &str, tz: FixedOffset) -> bool {
        Self::parse(input, tz).is_ok()
    }

    /// Canonical string form, including seconds so that `parse(T.to_string())
    /// == T` (spec §8 round-trip property); minute-precision input per §6.1
    /// is still accepted by `parse`.
    pub fn to_canonical_string(&self) -> String {
        format!(
            "{}~{}",
            self.start.format("%Y-%m-%d_%H:%M:%S"),
            self.end.format("%Y-%m-%d_%H:%M:%S")
        )
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

/// Classifies a non-string value reaching the time-range field (C9's typed
/// validation layer calls this before ever handing a `&str` to `parse`).
pub fn classify_non_string_input() -> AppError {
    AppError::TimeParsing {
        kind: TimeParsingKind::Type,
        message: "time range must be a string".to_string(),
        input: String::new(),
        hint: "provide a string like '2025-01-01_00:00~2025-01-01_01:00'".to_string(),
    }
}

fn parse_datetime_part(
    part: &str,
    original_input: &str,
    tz: FixedOffset,
) -> Result<DateTime<FixedOffset>, AppError> {
    let normalized = normalize_separator(part);
    let (date_str, time_str) = split_date_time(&normalized)
        .ok_or_else(|| format_error(original_input, "expected 'YYYY-MM-DD_HH:MM' per side"))?;

    let date = parse_date(date_str, original_input)?;
    let (h, m, s) = parse_time(time_str, original_input)?;
    let naive = date
        .and_hms_opt(h, m, s)
        .ok_or_else(|| value_error(original_input, "invalid time-of-day"))?;
    to_tz(naive, tz, original_input)
}

/// Rewrites a bare `-` date/time separator to `_`, mirroring
/// `normalize_datetime_format`: only the dash immediately preceding the time
/// portion is affected, never the date's own dashes.
fn normalize_separator(s: &str) -> String {
    if s.matches('-').count() >= 3 {
        if let Some(idx) = s.rfind('-') {
            let (left, right) = s.split_at(idx);
            let right = &right[1..];
            if right.contains(':') {
                return format!("{left}_{right}");
            }
        }
    }
    s.to_string()
}

fn split_date_time(s: &str) -> Option<(&str, &str)> {
    let idx = s.find('_')?;
    let (date, rest) = s.split_at(idx);
    Some((date, &rest[1..]))
}

fn parse_date(date_str: &str, original_input: &str) -> Result<NaiveDate, AppError> {
    if !DATE_RE.is_match(date_str) {
        return Err(format_error(original_input, "date must be YYYY-MM-DD"));
    }
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .map_err(|_| value_error(original_input, "unparseable date"))
}

fn parse_time(time_str: &str, original_input: &str) -> Result<(u32, u32, u32), AppError> {
    let fields: Vec<&str> = time_str.split(':').collect();
    match fields.as_slice() {
        [h, m] => {
            let h: u32 = h.parse().map_err(|_| value_error(original_input, "unparseable hour"))?;
            let m: u32 =
                m.parse().map_err(|_| value_error(original_input, "unparseable minute"))?;
            if h > 23 || m > 59 {
                return Err(value_error(original_input, "hour/minute out of range"));
            }
            Ok((h, m, 0))
        },
        [h, m, s] => {
            let h: u32 = h.parse().map_err(|_| value_error(original_input, "unparseable hour"))?;
            let m: u32 =
                m.parse().map_err(|_| value_error(original_input, "unparseable minute"))?;
            let s: u32 =
                s.parse().map_err(|_| value_error(original_input, "unparseable second"))?;
            if h > 23 || m > 59 || s > 59 {
                return Err(value_error(original_input, "time components out of range"));
            }
            Ok((h, m, s))
        },
        _ => Err(format_error(original_input, "time must be HH:MM or HH:MM:SS")),
    }
}

fn to_tz(
    naive: chrono::NaiveDateTime,
    tz: FixedOffset,
    original_input: &str,
) -> Result<DateTime<FixedOffset>, AppError> {
    tz.from_local_datetime(&naive)
        .single()
        .ok_or_else(|| value_error(original_input, "ambiguous or nonexistent local time"))
}

fn validate_logic(
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
    original_input: &str,
) -> Result<(), AppError> {
    if start >= end {
        return Err(AppError::TimeParsing {
            kind: TimeParsingKind::Logic,
            message: "start must be strictly before end".to_string(),
            input: original_input.to_string(),
            hint: "ensure the first timestamp precedes the second".to_string(),
        });
    }
    Ok(())
}

fn format_error(input: &str, hint: &str) -> AppError {
    AppError::TimeParsing {
        kind: TimeParsingKind::Format,
        message: "malformed time-range string".to_string(),
        input: input.to_string(),
        hint: hint.to_string(),
    }
}

fn value_error(input: &str, hint: &str) -> AppError {
    AppError::TimeParsing {
        kind: TimeParsingKind::Value,
        message: "unparseable date or time value".to_string(),
        input: input.to_string(),
        hint: hint.to_string(),
    }
}
