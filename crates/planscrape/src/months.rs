use std::fmt::Display;
use std::str::FromStr;

use chrono::{Datelike, Local, Months, NaiveDate};
use serde::{Deserialize, Serialize};

const MONTH_FORMAT: &str = "%b %y";

#[derive(Debug, thiserror::Error)]
#[error("Invalid month '{0}'. Expected the 'Mon YY' format, e.g. 'Jan 24'")]
pub struct MonthParseError(String);

#[derive(Debug, thiserror::Error)]
#[error("Invalid direction '{0}'. Accepted values: 'ascending', 'descending'")]
pub struct DirectionParseError(String);

/// Order in which months are walked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Ascending,
    /// Most recent month first.
    #[default]
    Descending,
}

impl FromStr for Direction {
    type Err = DirectionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ascending" | "asc" => Ok(Direction::Ascending),
            "descending" | "desc" => Ok(Direction::Descending),
            _ => Err(DirectionParseError(s.to_string())),
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Ascending => write!(f, "ascending"),
            Direction::Descending => write!(f, "descending"),
        }
    }
}

/// Parses a "Mon YY" token into the first day of that month.
pub fn parse_month(token: &str) -> Result<NaiveDate, MonthParseError> {
    NaiveDate::parse_from_str(&format!("01 {}", token.trim()), "%d %b %y")
        .map_err(|_| MonthParseError(token.to_string()))
}

pub fn format_month(date: NaiveDate) -> String {
    date.format(MONTH_FORMAT).to_string()
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Lists every month between `start` and `end` inclusive as "Mon YY" tokens.
///
/// A missing `start` means the month before `today`, a missing `end` the month
/// of `today`. Reversed bounds are swapped.
pub fn month_range(
    start: Option<&str>,
    end: Option<&str>,
    direction: Direction,
    today: NaiveDate,
) -> Result<Vec<String>, MonthParseError> {
    let current = first_of_month(today);

    let mut start = match start {
        Some(token) => parse_month(token)?,
        None => current - Months::new(1),
    };
    let mut end = match end {
        Some(token) => parse_month(token)?,
        None => current,
    };

    if start > end {
        std::mem::swap(&mut start, &mut end);
    }

    let mut months = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        months.push(format_month(cursor));
        cursor = match cursor.checked_add_months(Months::new(1)) {
            Some(next) => next,
            None => break,
        };
    }

    if direction == Direction::Descending {
        months.reverse();
    }

    Ok(months)
}

/// The `count` most recent months ending with the month of `today`, newest first.
pub fn rolling_window(today: NaiveDate, count: usize) -> Vec<String> {
    let current = first_of_month(today);
    (0..count as u32)
        .filter_map(|back| current.checked_sub_months(Months::new(back)))
        .map(format_month)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_range_descending_by_default() {
        let months = month_range(
            Some("Jan 24"),
            Some("Mar 24"),
            Direction::default(),
            date(2024, 6, 15),
        )
        .expect("Valid range");
        assert_eq!(months, vec!["Mar 24", "Feb 24", "Jan 24"]);
    }

    #[test]
    fn test_month_range_swaps_reversed_bounds() {
        let months = month_range(
            Some("Mar 24"),
            Some("Jan 24"),
            Direction::Descending,
            date(2024, 6, 15),
        )
        .expect("Valid range");
        assert_eq!(months, vec!["Mar 24", "Feb 24", "Jan 24"]);
    }

    #[test]
    fn test_month_range_ascending() {
        let months = month_range(
            Some("Nov 23"),
            Some("Feb 24"),
            Direction::Ascending,
            date(2024, 6, 15),
        )
        .expect("Valid range");
        assert_eq!(months, vec!["Nov 23", "Dec 23", "Jan 24", "Feb 24"]);
    }

    #[test]
    fn test_month_range_defaults_to_previous_and_current_month() {
        let months =
            month_range(None, None, Direction::Descending, date(2024, 1, 31)).expect("Defaults");
        assert_eq!(months, vec!["Jan 24", "Dec 23"]);
    }

    #[test]
    fn test_month_range_open_end_uses_current_month() {
        let months = month_range(Some("Oct 24"), None, Direction::Ascending, date(2025, 1, 3))
            .expect("Valid range");
        assert_eq!(months, vec!["Oct 24", "Nov 24", "Dec 24", "Jan 25"]);
    }

    #[test]
    fn test_month_range_single_month() {
        let months = month_range(
            Some("May 24"),
            Some("May 24"),
            Direction::Descending,
            date(2024, 6, 15),
        )
        .expect("Valid range");
        assert_eq!(months, vec!["May 24"]);
    }

    #[test]
    fn test_month_range_is_contiguous_over_years() {
        let months = month_range(
            Some("Jan 20"),
            Some("Dec 24"),
            Direction::Ascending,
            date(2025, 1, 1),
        )
        .expect("Valid range");
        assert_eq!(months.len(), 60);

        let dates: Vec<NaiveDate> = months
            .iter()
            .map(|m| parse_month(m).expect("Round trip"))
            .collect();
        for pair in dates.windows(2) {
            assert_eq!(pair[0].checked_add_months(Months::new(1)), Some(pair[1]));
        }
    }

    #[test]
    fn test_month_range_rejects_bad_token() {
        let err = month_range(
            Some("January 2024"),
            None,
            Direction::Descending,
            date(2024, 6, 15),
        )
        .unwrap_err();
        assert!(err.to_string().contains("January 2024"));
    }

    #[test]
    fn test_parse_month_is_case_insensitive() {
        assert_eq!(parse_month("jan 24").unwrap(), date(2024, 1, 1));
        assert_eq!(parse_month(" Sep 05 ").unwrap(), date(2005, 9, 1));
    }

    #[test]
    fn test_rolling_window() {
        let months = rolling_window(date(2024, 3, 10), 12);
        assert_eq!(months.len(), 12);
        assert_eq!(months.first().map(String::as_str), Some("Mar 24"));
        assert_eq!(months.last().map(String::as_str), Some("Apr 23"));
    }

    #[test]
    fn test_direction_from_str() {
        assert_eq!(
            "Ascending".parse::<Direction>().unwrap(),
            Direction::Ascending
        );
        assert_eq!("desc".parse::<Direction>().unwrap(), Direction::Descending);
        assert!("sideways".parse::<Direction>().is_err());
    }
}
