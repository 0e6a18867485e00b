use std::fmt;

use chrono::{Datelike, NaiveDate};

use crate::core::employee::Employee;
use crate::core::project::Project;
use crate::core::validation::ValidationError;

pub const MAX_MINUTES_IN_DAY: u32 = 24 * 60;
pub const MAX_DETAILS_LENGTH: usize = 500;

// Days between 0001-01-01 (chrono's common-era day 1) and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Number of whole days since 1970-01-01, the on-disk form of a date.
pub fn epoch_day(date: NaiveDate) -> i64 {
    i64::from(date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
}

pub fn date_from_epoch_day(day: i64) -> Option<NaiveDate> {
    let days_from_ce = i32::try_from(day)
        .ok()?
        .checked_add(UNIX_EPOCH_DAYS_FROM_CE)?;
    NaiveDate::from_num_days_from_ce_opt(days_from_ce)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeEntryId(u32);

impl TimeEntryId {
    pub fn new(value: u32) -> Result<Self, ValidationError> {
        if value == 0 {
            return Err(ValidationError::IdTooSmall);
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

/// Minutes worked in a single entry, at most one full day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Minutes(u32);

impl Minutes {
    pub fn new(value: u32) -> Result<Self, ValidationError> {
        if value > MAX_MINUTES_IN_DAY {
            return Err(ValidationError::MinutesOverDailyMaximum);
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

/// Free-text description of what the time was spent on. May be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Details(String);

impl Details {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.chars().count() > MAX_DETAILS_LENGTH {
            return Err(ValidationError::DetailsTooLong);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Details {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted time entry. The id is unique within the owning employee's
/// timeline, not globally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimeEntry {
    pub id: TimeEntryId,
    pub employee: Employee,
    pub project: Project,
    pub minutes: Minutes,
    pub date: NaiveDate,
    pub details: Details,
}

/// A time entry as the caller hands it over, before the store has assigned
/// it an id within the employee's timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTimeEntry {
    pub employee: Employee,
    pub project: Project,
    pub minutes: Minutes,
    pub date: NaiveDate,
    pub details: Details,
}

#[cfg(test)]
mod time_entry_tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn it_should_reject_minutes_beyond_a_full_day() {
        assert_eq!(
            Minutes::new(MAX_MINUTES_IN_DAY + 1),
            Err(ValidationError::MinutesOverDailyMaximum)
        );
    }

    #[rstest]
    fn it_should_accept_a_full_day_of_minutes() {
        assert!(Minutes::new(MAX_MINUTES_IN_DAY).is_ok());
    }

    #[rstest]
    fn it_should_reject_oversize_details() {
        let text = "x".repeat(MAX_DETAILS_LENGTH + 1);
        assert_eq!(Details::new(text), Err(ValidationError::DetailsTooLong));
    }

    #[rstest]
    #[case(1970, 1, 1, 0)]
    #[case(2020, 6, 25, 18_438)]
    #[case(1969, 12, 31, -1)]
    fn it_should_convert_dates_to_epoch_days_and_back(
        #[case] year: i32,
        #[case] month: u32,
        #[case] day: u32,
        #[case] expected: i64,
    ) {
        let date = NaiveDate::from_ymd_opt(year, month, day).unwrap();
        assert_eq!(epoch_day(date), expected);
        assert_eq!(date_from_epoch_day(expected), Some(date));
    }

    #[rstest]
    fn it_should_refuse_an_epoch_day_outside_the_calendar() {
        assert_eq!(date_from_epoch_day(i64::MAX), None);
    }
}
