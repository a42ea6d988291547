// Property-based tests for cron expression matching and window computation

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use common::cursor::{minute_floor, ScheduleWindow};
use common::models::CronDefinition;
use common::schedule::CronSchedule;
use proptest::prelude::*;

fn instant(minutes_since_2024: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes_since_2024)
}

/// *For any* step S, `*/S` in the minute field fires exactly on multiples of S.
#[test]
fn property_minute_step_fires_on_multiples() {
    proptest!(|(step in 1u32..60, minute in 0i64..(366 * 24 * 60))| {
        let schedule = CronSchedule::parse(&format!("*/{} * * * *", step)).unwrap();
        let t = instant(minute);
        prop_assert_eq!(schedule.matches(&t), t.minute() % step == 0);
    });
}

/// *For any* instant, `0 9 * * 1-5` fires only at 09:00 on weekdays.
#[test]
fn property_weekday_nine_am() {
    proptest!(|(minute in 0i64..(366 * 24 * 60))| {
        let schedule = CronSchedule::parse("0 9 * * 1-5").unwrap();
        let t = instant(minute);
        let weekday = t.weekday().num_days_from_sunday();
        let expected = t.hour() == 9 && t.minute() == 0 && (1..=5).contains(&weekday);
        prop_assert_eq!(schedule.matches(&t), expected);
    });
}

/// *For any* exact five-field expression, it fires at the instant it names.
#[test]
fn property_exact_expression_matches_its_instant() {
    proptest!(|(minute in 0i64..(366 * 24 * 60))| {
        let t = instant(minute);
        let expression = format!(
            "{} {} {} {} {}",
            t.minute(),
            t.hour(),
            t.day(),
            t.month(),
            t.weekday().num_days_from_sunday()
        );
        let schedule = CronSchedule::parse(&expression).unwrap();
        prop_assert!(schedule.matches(&t));
        prop_assert!(!schedule.matches(&(t + Duration::minutes(1))));
    });
}

/// *For any* out-of-range minute value, parsing fails instead of wrapping.
#[test]
fn property_out_of_range_minute_rejected() {
    proptest!(|(value in 60u32..1000)| {
        let expression = format!("{} * * * *", value);
        prop_assert!(CronSchedule::parse(&expression).is_err());
    });
}

/// *For any* cursor and clock, the window is minute-aligned, ordered, ends at
/// the current minute, and never spans more than the catch-up bound.
#[test]
fn property_window_bounds() {
    proptest!(|(
        cursor_secs in 0i64..4_000_000_000,
        now_secs in 1_700_000_000i64..1_800_000_000,
        max_catchup_minutes in 1i64..(48 * 60)
    )| {
        let cursor = Utc.timestamp_opt(cursor_secs, 0).unwrap();
        let now = Utc.timestamp_opt(now_secs, 0).unwrap();
        let max_catchup = Duration::minutes(max_catchup_minutes);

        let window = ScheduleWindow::compute(cursor, now, max_catchup);

        prop_assert_eq!(window.end, minute_floor(now));
        prop_assert_eq!(window.start, minute_floor(window.start));
        prop_assert!(window.start <= window.end);
        prop_assert!(window.end - window.start <= max_catchup);
        prop_assert_eq!(window.minutes().count() as i64, window.minute_count());
    });
}

/// *For any* command, a cron line round-trips its tokens into the definition.
#[test]
fn property_cron_line_keeps_command_tokens() {
    proptest!(|(command in prop::collection::vec("[a-z0-9./-]{1,12}", 1..6), queue in "[a-z]{1,10}")| {
        let line = format!("*/5 * * * * queue:{} {}", queue, command.join(" "));
        let definition = CronDefinition::parse("job", &line).unwrap();
        prop_assert_eq!(definition.command, command);
        prop_assert_eq!(definition.queue, queue);
    });
}
