//! Canonical time-series types shared across the merger, ensemble and façade.
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of data sources observations can originate from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    StackOverflow,
    GitHub,
    Trends,
    Reddit,
}

impl SourceId {
    pub const ALL: [SourceId; 4] = [
        SourceId::StackOverflow,
        SourceId::GitHub,
        SourceId::Trends,
        SourceId::Reddit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::StackOverflow => "stackoverflow",
            SourceId::GitHub => "github",
            SourceId::Trends => "trends",
            SourceId::Reddit => "reddit",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stackoverflow" => Ok(SourceId::StackOverflow),
            "github" => Ok(SourceId::GitHub),
            "trends" => Ok(SourceId::Trends),
            "reddit" => Ok(SourceId::Reddit),
            other => Err(anyhow::anyhow!("unknown source id: {other}")),
        }
    }
}

/// Normalizes a raw tag string to its canonical identifier form.
pub fn normalize_tag(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// A single normalized mention count from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub tag: String,
    pub source: SourceId,
    pub date: NaiveDate,
    pub count: f64,
}

/// Time bucket width used to align observations across sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
}

impl Default for Granularity {
    fn default() -> Self {
        Granularity::Week
    }
}

impl Granularity {
    /// Maps a date onto its period start (weeks bucket to the ISO Monday).
    pub fn bucket(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Day => date,
            Granularity::Week => {
                date - Duration::days(date.weekday().num_days_from_monday() as i64)
            }
        }
    }

    /// Advances a period start by `steps` whole periods.
    pub fn step(&self, period: NaiveDate, steps: i64) -> NaiveDate {
        match self {
            Granularity::Day => period + Duration::days(steps),
            Granularity::Week => period + Duration::weeks(steps),
        }
    }
}

/// One merged value in a tag's canonical series. `value: None` is the
/// explicit missing marker; it is never interchangeable with zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPoint {
    pub period: NaiveDate,
    pub value: Option<f64>,
}

/// Per-tag roll-up served by the façade's tag listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSummary {
    pub tag: String,
    pub first_seen: NaiveDate,
    pub last_seen: NaiveDate,
    pub point_count: usize,
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id_round_trip() {
        for source in SourceId::ALL {
            assert_eq!(source.as_str().parse::<SourceId>().unwrap(), source);
        }
        assert!("linkedin".parse::<SourceId>().is_err());
    }

    #[test]
    fn test_tag_normalization() {
        assert_eq!(normalize_tag("  Python "), "python");
        assert_eq!(normalize_tag("C++"), "c++");
    }

    #[test]
    fn test_week_buckets_to_monday() {
        let granularity = Granularity::Week;
        // 2024-01-10 is a Wednesday; its ISO week starts 2024-01-08.
        let wednesday = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let monday = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        assert_eq!(granularity.bucket(wednesday), monday);
        assert_eq!(granularity.bucket(monday), monday);
    }

    #[test]
    fn test_period_step() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        assert_eq!(
            Granularity::Day.step(day, 3),
            NaiveDate::from_ymd_opt(2024, 1, 11).unwrap()
        );
        assert_eq!(
            Granularity::Week.step(day, 2),
            NaiveDate::from_ymd_opt(2024, 1, 22).unwrap()
        );
    }
}
