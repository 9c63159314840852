use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A calendar day without a year, rendered as `MM-DD`.
///
/// Validated against a leap year so that `02-29` is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthDay {
    month: u32,
    day: u32,
}

impl MonthDay {
    pub fn new(month: u32, day: u32) -> Result<Self, Error> {
        NaiveDate::from_ymd_opt(2000, month, day)
            .map(|_| Self { month, day })
            .ok_or_else(|| Error::InvalidDate(format!("{month:02}-{day:02}")))
    }

    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            month: date.month(),
            day: date.day(),
        }
    }

    /// Today's month and day in UTC.
    #[must_use]
    pub fn today_utc() -> Self {
        Self::from_date(Utc::now().date_naive())
    }

    #[must_use]
    pub const fn month(&self) -> u32 {
        self.month
    }

    #[must_use]
    pub const fn day(&self) -> u32 {
        self.day
    }

    /// Two-digit month, as used in feed URLs.
    #[must_use]
    pub fn month_str(&self) -> String {
        format!("{:02}", self.month)
    }

    /// Two-digit day, as used in feed URLs.
    #[must_use]
    pub fn day_str(&self) -> String {
        format!("{:02}", self.day)
    }
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

impl FromStr for MonthDay {
    type Err = Error;

    /// Accepts `MM-DD` or a full `YYYY-MM-DD` date.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(Self::from_date(date));
        }

        let (month, day) = s
            .split_once('-')
            .ok_or_else(|| Error::InvalidDate(s.to_string()))?;
        let month = month
            .parse()
            .map_err(|_| Error::InvalidDate(s.to_string()))?;
        let day = day.parse().map_err(|_| Error::InvalidDate(s.to_string()))?;
        Self::new(month, day)
    }
}

impl TryFrom<String> for MonthDay {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthDay> for String {
    fn from(md: MonthDay) -> Self {
        md.to_string()
    }
}
