// Cron expression parsing and minute matching
//
// This module implements the conventional five-field cron grammar
// (minute, hour, day-of-month, month, day-of-week) and answers whether a
// parsed expression fires at a given minute-aligned instant.

use crate::errors::ScheduleError;
use chrono::{DateTime, Datelike, TimeZone, Timelike};
use std::fmt;
use std::str::FromStr;

const MONTH_NAMES: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

const WEEKDAY_NAMES: &[&str] = &["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// Static description of one cron field
struct FieldKind {
    label: &'static str,
    min: u32,
    max: u32,
    /// Symbolic names, where `names[0]` maps to `min`
    names: &'static [&'static str],
}

const MINUTE: FieldKind = FieldKind {
    label: "minute",
    min: 0,
    max: 59,
    names: &[],
};

const HOUR: FieldKind = FieldKind {
    label: "hour",
    min: 0,
    max: 23,
    names: &[],
};

const DAY_OF_MONTH: FieldKind = FieldKind {
    label: "day-of-month",
    min: 1,
    max: 31,
    names: &[],
};

const MONTH: FieldKind = FieldKind {
    label: "month",
    min: 1,
    max: 12,
    names: MONTH_NAMES,
};

// 7 is accepted as an alias for Sunday and folded onto 0 after parsing.
const DAY_OF_WEEK: FieldKind = FieldKind {
    label: "day-of-week",
    min: 0,
    max: 7,
    names: WEEKDAY_NAMES,
};

/// A parsed five-field cron expression
///
/// Each field is stored as a bit set where bit `n` is set when value `n` is
/// allowed. All five fields must match for the expression to fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
}

impl CronSchedule {
    /// Parse a five-field expression or one of the `@` macros
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let trimmed = expression.trim();
        let expanded = match expand_macro(trimmed) {
            Some(Ok(expanded)) => expanded,
            Some(Err(reason)) => return Err(invalid(expression, reason)),
            None => trimmed,
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(invalid(
                expression,
                format!("expected 5 fields, found {}", fields.len()),
            ));
        }

        let parse = |raw: &str, kind: &FieldKind| {
            parse_field(raw, kind).map_err(|reason| invalid(expression, reason))
        };

        let mut days_of_week = parse(fields[4], &DAY_OF_WEEK)?;
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            expression: trimmed.to_string(),
            minutes: parse(fields[0], &MINUTE)?,
            hours: parse(fields[1], &HOUR)?,
            days_of_month: parse(fields[2], &DAY_OF_MONTH)?,
            months: parse(fields[3], &MONTH)?,
            days_of_week,
        })
    }

    /// The expression as written in the registry
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Does this expression fire at `instant`?
    ///
    /// `instant` is expected to be minute-aligned; seconds are ignored. The
    /// fields are read in the instant's own timezone, so callers convert to the
    /// scheduling timezone before asking.
    pub fn matches<Tz: TimeZone>(&self, instant: &DateTime<Tz>) -> bool {
        bit(self.minutes, instant.minute())
            && bit(self.hours, instant.hour())
            && bit(self.days_of_month, instant.day())
            && bit(self.months, instant.month())
            && bit(self.days_of_week, instant.weekday().num_days_from_sunday())
    }
}

impl FromStr for CronSchedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

/// Number of whitespace-separated tokens the schedule occupies at the start
/// of a cron line: 1 for a macro, 5 otherwise.
pub(crate) fn schedule_token_count(first_token: &str) -> usize {
    if first_token.starts_with('@') {
        1
    } else {
        5
    }
}

fn expand_macro(expression: &str) -> Option<Result<&'static str, String>> {
    if !expression.starts_with('@') {
        return None;
    }
    let expanded = match expression.to_ascii_lowercase().as_str() {
        "@yearly" | "@annually" => "0 0 1 1 *",
        "@monthly" => "0 0 1 * *",
        "@weekly" => "0 0 * * 0",
        "@daily" | "@midnight" => "0 0 * * *",
        "@hourly" => "0 * * * *",
        other => return Some(Err(format!("unsupported macro '{}'", other))),
    };
    Some(Ok(expanded))
}

fn invalid(expression: &str, reason: impl Into<String>) -> ScheduleError {
    ScheduleError::InvalidCronExpression {
        expression: expression.to_string(),
        reason: reason.into(),
    }
}

fn bit(set: u64, value: u32) -> bool {
    value < 64 && set & (1u64 << value) != 0
}

fn parse_field(raw: &str, kind: &FieldKind) -> Result<u64, String> {
    let mut set = 0u64;
    for item in raw.split(',') {
        if item.is_empty() {
            return Err(format!("empty list item in {} field '{}'", kind.label, raw));
        }
        set |= parse_item(item, kind)?;
    }
    Ok(set)
}

fn parse_item(item: &str, kind: &FieldKind) -> Result<u64, String> {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => {
            let step: u32 = step
                .parse()
                .map_err(|_| format!("invalid step '{}' in {} field", step, kind.label))?;
            if step == 0 {
                return Err(format!("step must be positive in {} field", kind.label));
            }
            (range, Some(step))
        }
        None => (item, None),
    };

    let (low, high) = if range == "*" {
        (kind.min, kind.max)
    } else if let Some((low, high)) = range.split_once('-') {
        let low = parse_value(low, kind)?;
        let high = parse_value(high, kind)?;
        if low > high {
            return Err(format!(
                "range {}-{} is reversed in {} field",
                low, high, kind.label
            ));
        }
        (low, high)
    } else {
        let value = parse_value(range, kind)?;
        // `N/S` runs from N to the end of the field
        match step {
            Some(_) => (value, kind.max),
            None => (value, value),
        }
    };

    let step = step.unwrap_or(1) as usize;
    Ok((low..=high).step_by(step).fold(0u64, |set, v| set | (1u64 << v)))
}

fn parse_value(raw: &str, kind: &FieldKind) -> Result<u32, String> {
    let value = match raw.parse::<u32>() {
        Ok(value) => value,
        Err(_) => {
            let lowered = raw.to_ascii_lowercase();
            let position = kind
                .names
                .iter()
                .position(|name| *name == lowered)
                .ok_or_else(|| format!("invalid {} value '{}'", kind.label, raw))?;
            kind.min + position as u32
        }
    };

    if value < kind.min || value > kind.max {
        return Err(format!(
            "{} value {} out of range {}-{}",
            kind.label, value, kind.min, kind.max
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_wildcard_matches_every_minute() {
        let schedule = CronSchedule::parse("* * * * *").unwrap();
        let start = at(2024, 3, 10, 0, 0);
        for offset in 0..(24 * 60) {
            assert!(schedule.matches(&(start + Duration::minutes(offset))));
        }
    }

    #[test]
    fn test_every_fifteen_minutes() {
        let schedule = CronSchedule::parse("*/15 * * * *").unwrap();
        let start = at(2024, 3, 10, 13, 0);
        let fired: Vec<u32> = (0..60)
            .map(|m| start + Duration::minutes(m))
            .filter(|t| schedule.matches(t))
            .map(|t| t.minute())
            .collect();
        assert_eq!(fired, vec![0, 15, 30, 45]);
    }

    #[test]
    fn test_weekday_mornings() {
        let schedule = CronSchedule::parse("0 9 * * 1-5").unwrap();
        // 2024-03-11 is a Monday
        for day in 11..=15 {
            assert!(schedule.matches(&at(2024, 3, day, 9, 0)));
            assert!(!schedule.matches(&at(2024, 3, day, 9, 1)));
            assert!(!schedule.matches(&at(2024, 3, day, 10, 0)));
        }
        assert!(!schedule.matches(&at(2024, 3, 16, 9, 0)));
        assert!(!schedule.matches(&at(2024, 3, 17, 9, 0)));
    }

    #[test]
    fn test_sunday_as_zero_or_seven() {
        let zero = CronSchedule::parse("0 0 * * 0").unwrap();
        let seven = CronSchedule::parse("0 0 * * 7").unwrap();
        let sunday = at(2024, 3, 17, 0, 0);
        assert!(zero.matches(&sunday));
        assert!(seven.matches(&sunday));
        assert!(!seven.matches(&at(2024, 3, 16, 0, 0)));
    }

    #[test]
    fn test_named_months_and_weekdays() {
        let schedule = CronSchedule::parse("30 6 * JAN,jul mon-FRI").unwrap();
        assert!(schedule.matches(&at(2024, 1, 2, 6, 30)));
        assert!(schedule.matches(&at(2024, 7, 1, 6, 30)));
        assert!(!schedule.matches(&at(2024, 2, 1, 6, 30)));
        assert!(!schedule.matches(&at(2024, 1, 6, 6, 30)));
    }

    #[test]
    fn test_lists_ranges_and_steps() {
        let schedule = CronSchedule::parse("5,10-20/5,50/5 * * * *").unwrap();
        let fired: Vec<u32> = (0..60)
            .map(|m| at(2024, 3, 10, 0, 0) + Duration::minutes(m))
            .filter(|t| schedule.matches(t))
            .map(|t| t.minute())
            .collect();
        assert_eq!(fired, vec![5, 10, 15, 20, 50, 55]);
    }

    #[test]
    fn test_day_of_month_and_weekday_are_conjunctive() {
        // 2024-03-13 is a Wednesday
        let schedule = CronSchedule::parse("0 0 13 * 5").unwrap();
        assert!(!schedule.matches(&at(2024, 3, 13, 0, 0)));
        // 2024-09-13 is a Friday
        assert!(schedule.matches(&at(2024, 9, 13, 0, 0)));
    }

    #[test]
    fn test_macros() {
        assert!(CronSchedule::parse("@hourly").unwrap().matches(&at(2024, 3, 10, 7, 0)));
        assert!(CronSchedule::parse("@daily").unwrap().matches(&at(2024, 3, 10, 0, 0)));
        assert!(CronSchedule::parse("@weekly").unwrap().matches(&at(2024, 3, 17, 0, 0)));
        assert!(CronSchedule::parse("@monthly").unwrap().matches(&at(2024, 4, 1, 0, 0)));
        assert!(CronSchedule::parse("@yearly").unwrap().matches(&at(2025, 1, 1, 0, 0)));
        assert!(CronSchedule::parse("@reboot").is_err());
    }

    #[test]
    fn test_matches_in_local_timezone() {
        let schedule = CronSchedule::parse("0 9 * * *").unwrap();
        let tz = chrono_tz::Asia::Ho_Chi_Minh;
        let nine_local = at(2024, 3, 10, 2, 0).with_timezone(&tz);
        assert!(schedule.matches(&nine_local));
        assert!(!schedule.matches(&at(2024, 3, 10, 2, 0)));
    }

    #[test]
    fn test_parse_errors() {
        for bad in [
            "",
            "* * * *",
            "* * * * * *",
            "60 * * * *",
            "* 24 * * *",
            "* * 0 * *",
            "* * * 13 *",
            "* * * * 8",
            "*/0 * * * *",
            "10-5 * * * *",
            "1,,2 * * * *",
            "* * * foo *",
        ] {
            assert!(CronSchedule::parse(bad).is_err(), "expected '{}' to fail", bad);
        }
    }

    #[test]
    fn test_display_keeps_expression() {
        let schedule: CronSchedule = "*/5 * * * *".parse().unwrap();
        assert_eq!(schedule.to_string(), "*/5 * * * *");
        assert_eq!(schedule_token_count("@daily"), 1);
        assert_eq!(schedule_token_count("*/5"), 5);
    }
}
