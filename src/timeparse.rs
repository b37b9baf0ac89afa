//! Fuzzy upload-time parsing.
//!
//! The site renders upload times three ways: relative ("3 days ago",
//! "An hour ago"), same-day absolute ("Today, 10:32 AM"), and full absolute
//! ("15 December 2011 - 07:32 PM"). All three map onto one comparable
//! instant so listing rows can be ranked by recency.

use chrono::{Duration, NaiveDateTime};

use crate::error::MalformedTimestamp;

const ABSOLUTE_FORMAT: &str = "%d %B %Y - %I:%M %p";

/// Turns a fuzzy or absolute site timestamp into an absolute point in time.
///
/// `now` is always supplied by the caller and never sampled here, so the
/// function is pure: the same text and reference instant give the same
/// answer. Callers ranking a whole listing must capture `now` once and reuse
/// it for every row.
///
/// Weeks is the largest relative unit the site emits before switching to
/// absolute dates, so anything coarser ("3 months ago") is rejected rather
/// than guessed at.
pub fn parse_fuzzy_time(
    text: &str,
    now: NaiveDateTime,
) -> Result<NaiveDateTime, MalformedTimestamp> {
    let stripped = strip_annotation(text.trim());
    if stripped.contains("ago") {
        parse_relative(stripped, now)
    } else {
        parse_absolute(stripped, now)
    }
}

/// Drops a trailing bracketed marker such as " [A]".
fn strip_annotation(text: &str) -> &str {
    if text.ends_with(']') {
        if let Some(idx) = text.rfind('[') {
            return text[..idx].trim_end();
        }
    }
    text
}

fn parse_relative(text: &str, now: NaiveDateTime) -> Result<NaiveDateTime, MalformedTimestamp> {
    let malformed = || MalformedTimestamp(text.to_string());

    let mut tokens = text.split_whitespace();
    let (value, unit, direction) = match (tokens.next(), tokens.next(), tokens.next(), tokens.next())
    {
        (Some(value), Some(unit), Some(direction), None) => (value, unit, direction),
        _ => return Err(malformed()),
    };
    if direction != "ago" {
        return Err(malformed());
    }

    let value: i64 = match value.to_lowercase().as_str() {
        "a" | "an" => 1,
        other => other.parse().map_err(|_| malformed())?,
    };

    let unit = unit.to_lowercase();
    let delta = match unit.strip_suffix('s').unwrap_or(&unit) {
        "second" => Duration::seconds(value),
        "minute" => Duration::minutes(value),
        "hour" => Duration::hours(value),
        "day" => Duration::days(value),
        "week" => Duration::weeks(value),
        _ => return Err(malformed()),
    };

    Ok(now - delta)
}

fn parse_absolute(text: &str, now: NaiveDateTime) -> Result<NaiveDateTime, MalformedTimestamp> {
    // "Today, 10:32 AM" borrows its date component from `now`.
    let expanded = match text.strip_prefix("Today,") {
        Some(rest) => format!("{} -{}", now.date().format("%d %B %Y"), rest),
        None => text.to_string(),
    };
    NaiveDateTime::parse_from_str(&expanded, ABSOLUTE_FORMAT)
        .map_err(|_| MalformedTimestamp(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2014, 3, 8)
            .unwrap()
            .and_hms_opt(15, 30, 0)
            .unwrap()
    }

    #[test]
    fn relative_units() {
        let n = now();
        assert_eq!(
            parse_fuzzy_time("60 seconds ago", n).unwrap(),
            n - Duration::seconds(60)
        );
        assert_eq!(
            parse_fuzzy_time("5 minutes ago", n).unwrap(),
            n - Duration::minutes(5)
        );
        assert_eq!(
            parse_fuzzy_time("2 hours ago", n).unwrap(),
            n - Duration::hours(2)
        );
        assert_eq!(
            parse_fuzzy_time("7 days ago", n).unwrap(),
            n - Duration::days(7)
        );
        assert_eq!(
            parse_fuzzy_time("4 weeks ago", n).unwrap(),
            n - Duration::weeks(4)
        );
    }

    #[test]
    fn articles_count_as_one() {
        let n = now();
        assert_eq!(parse_fuzzy_time("a day ago", n).unwrap(), n - Duration::days(1));
        assert_eq!(
            parse_fuzzy_time("An hour ago", n).unwrap(),
            n - Duration::hours(1)
        );
        assert_eq!(
            parse_fuzzy_time("a week ago", n).unwrap(),
            n - Duration::weeks(1)
        );
    }

    #[test]
    fn singular_and_plural_units_both_parse() {
        let n = now();
        assert_eq!(
            parse_fuzzy_time("1 minute ago", n).unwrap(),
            parse_fuzzy_time("1 minutes ago", n).unwrap()
        );
    }

    #[test]
    fn trailing_annotation_is_stripped() {
        let n = now();
        assert_eq!(
            parse_fuzzy_time("3 days ago [A]", n).unwrap(),
            n - Duration::days(3)
        );
    }

    #[test]
    fn today_takes_date_from_now() {
        let n = now();
        let parsed = parse_fuzzy_time("Today, 10:00 PM", n).unwrap();
        assert_eq!(parsed.date(), n.date());
        assert_eq!(parsed, n.date().and_hms_opt(22, 0, 0).unwrap());

        let parsed = parse_fuzzy_time("Today, 10:32 AM", n).unwrap();
        assert_eq!(parsed, n.date().and_hms_opt(10, 32, 0).unwrap());
    }

    #[test]
    fn full_absolute_date() {
        let parsed = parse_fuzzy_time("15 December 2011 - 07:32 PM", now()).unwrap();
        assert_eq!(
            parsed,
            NaiveDate::from_ymd_opt(2011, 12, 15)
                .unwrap()
                .and_hms_opt(19, 32, 0)
                .unwrap()
        );
    }

    #[test]
    fn units_coarser_than_weeks_are_rejected() {
        assert_eq!(
            parse_fuzzy_time("3 months ago", now()),
            Err(MalformedTimestamp("3 months ago".into()))
        );
        assert!(parse_fuzzy_time("a year ago", now()).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_fuzzy_time("", now()).is_err());
        assert!(parse_fuzzy_time("soon", now()).is_err());
        assert!(parse_fuzzy_time("3 days from now", now()).is_err());
        assert!(parse_fuzzy_time("many days ago", now()).is_err());
        assert!(parse_fuzzy_time("Today, whenever", now()).is_err());
    }
}
