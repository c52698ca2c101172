//! Time buckets for period reports.
//!
//! All bucketing is done in UTC. Week labels use the ISO week-numbering year, so the days
//! around New Year land in the week they belong to (2024-12-30 is `2025-W01`).

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    Day,
    Week,
    Month,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid period '{0}', expected day, week or month")]
pub struct InvalidPeriod(pub String);

impl FromStr for Period {
    type Err = InvalidPeriod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Period::Day),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            other => Err(InvalidPeriod(other.to_string())),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
        })
    }
}

impl Period {
    /// Lenient parse used below the HTTP layer: anything unrecognised buckets by day
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        raw.and_then(|p| p.parse().ok()).unwrap_or_default()
    }

    /// Bucket label for a timestamp. Labels sort chronologically as strings.
    pub fn label(&self, at: &DateTime<Utc>) -> String {
        match self {
            Period::Day => at.format("%Y-%m-%d").to_string(),
            Period::Week => {
                let week = at.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            Period::Month => at.format("%Y-%m").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ts;

    #[test]
    fn test_labels() {
        let at = ts("2024-03-07T15:30:00Z");
        assert_eq!(Period::Day.label(&at), "2024-03-07");
        assert_eq!(Period::Week.label(&at), "2024-W10");
        assert_eq!(Period::Month.label(&at), "2024-03");
    }

    #[test]
    fn test_iso_week_year_boundaries() {
        assert_eq!(Period::Week.label(&ts("2024-12-30T00:00:00Z")), "2025-W01");
        assert_eq!(Period::Week.label(&ts("2021-01-03T12:00:00Z")), "2020-W53");
    }

    #[test]
    fn test_same_iso_week_shares_a_label() {
        // Monday and Sunday of the same ISO week
        let monday = Period::Week.label(&ts("2024-03-04T00:00:00Z"));
        let sunday = Period::Week.label(&ts("2024-03-10T23:59:59Z"));
        assert_eq!(monday, sunday);
    }

    #[test]
    fn test_utc_bucketing() {
        // Late evening west of UTC is already the next day in UTC
        let at = DateTime::parse_from_rfc3339("2024-03-07T22:00:00-05:00").unwrap().with_timezone(&Utc);
        assert_eq!(Period::Day.label(&at), "2024-03-08");
    }

    #[test]
    fn test_parse_or_default() {
        assert_eq!(Period::parse_or_default(Some("month")), Period::Month);
        assert_eq!(Period::parse_or_default(Some("fortnight")), Period::Day);
        assert_eq!(Period::parse_or_default(None), Period::Day);
    }
}
