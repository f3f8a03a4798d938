//! Billing periods.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BillingError;

/// A calendar billing month, written `YYYY-MM`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BillingPeriod {
    year: i32,
    month: u32,
}

impl BillingPeriod {
    /// Create a period.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidPeriod` if the month is not 1..=12.
    pub fn new(year: i32, month: u32) -> Result<Self, BillingError> {
        if !(1..=12).contains(&month) || !(1..=9999).contains(&year) {
            return Err(BillingError::InvalidPeriod(format!("{year:04}-{month:02}")));
        }
        Ok(Self { year, month })
    }

    /// The period containing `date`.
    #[must_use]
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Calendar year.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// Calendar month (1..=12).
    #[must_use]
    pub const fn month(&self) -> u32 {
        self.month
    }

    /// First day of the period.
    #[must_use]
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Number of days in the period.
    #[must_use]
    pub fn days(&self) -> u32 {
        let first = self.first_day();
        first
            .checked_add_months(Months::new(1))
            .and_then(|next| u32::try_from((next - first).num_days()).ok())
            .unwrap_or(31)
    }

    /// The period before this one.
    #[must_use]
    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// The period after this one.
    #[must_use]
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Whether `date` falls inside this period.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        Self::containing(date) == *self
    }

    /// The `count` periods before the one containing `as_of`, newest first.
    #[must_use]
    pub fn recent(as_of: NaiveDate, count: usize) -> Vec<Self> {
        std::iter::successors(Some(Self::containing(as_of).previous()), |p| {
            Some(p.previous())
        })
        .take(count)
        .collect()
    }

    /// Long label such as `"July 2024"`.
    #[must_use]
    pub fn label(&self) -> String {
        self.first_day().format("%B %Y").to_string()
    }
}

impl FromStr for BillingPeriod {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BillingError::InvalidPeriod(s.to_string());
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year = year.parse().map_err(|_| invalid())?;
        let month = month.parse().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl fmt::Debug for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BillingPeriod({self})")
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl TryFrom<String> for BillingPeriod {
    type Error = BillingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BillingPeriod> for String {
    fn from(period: BillingPeriod) -> Self {
        period.to_string()
    }
}

/// Which period a summary or statement is computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodSelector {
    /// The open period, computed from the live transaction log.
    Current,
    /// A closed period, read from its frozen snapshot.
    Past(BillingPeriod),
}

impl FromStr for PeriodSelector {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("current") {
            Ok(Self::Current)
        } else {
            s.parse().map(Self::Past)
        }
    }
}

impl fmt::Display for PeriodSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Current => f.write_str("current"),
            Self::Past(period) => period.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parse_and_display() {
        let period: BillingPeriod = "2024-07".parse().unwrap();
        assert_eq!(period.year(), 2024);
        assert_eq!(period.month(), 7);
        assert_eq!(period.to_string(), "2024-07");
        assert_eq!(period.label(), "July 2024");
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in ["2024-13", "2024-00", "24-07", "2024/07", "2024-7", "current"] {
            assert!(bad.parse::<BillingPeriod>().is_err(), "{bad}");
        }
    }

    #[test]
    fn days_in_month_handles_leap_years() {
        assert_eq!(BillingPeriod::new(2024, 2).unwrap().days(), 29);
        assert_eq!(BillingPeriod::new(2023, 2).unwrap().days(), 28);
        assert_eq!(BillingPeriod::new(2024, 12).unwrap().days(), 31);
    }

    #[test]
    fn recent_walks_back_across_years() {
        let periods = BillingPeriod::recent(date(2025, 2, 14), 3);
        let labels: Vec<_> = periods.iter().map(ToString::to_string).collect();
        assert_eq!(labels, ["2025-01", "2024-12", "2024-11"]);
    }

    #[test]
    fn next_rolls_into_january() {
        let december = BillingPeriod::new(2024, 12).unwrap();
        assert_eq!(december.next().to_string(), "2025-01");
        assert_eq!(december.next().previous(), december);
        assert!(december.contains(date(2024, 12, 31)));
        assert!(!december.contains(date(2025, 1, 1)));
    }

    #[test]
    fn selector_parses_current_and_months() {
        assert_eq!("current".parse::<PeriodSelector>().unwrap(), PeriodSelector::Current);
        assert_eq!(
            "2024-06".parse::<PeriodSelector>().unwrap(),
            PeriodSelector::Past(BillingPeriod::new(2024, 6).unwrap())
        );
        assert!("last-month".parse::<PeriodSelector>().is_err());
    }
}
