//! Academic year tokens of the form `"2024/2025"`.

use super::RombelError;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MIN_START_YEAR: i32 = 1900;
const MAX_START_YEAR: i32 = 9998;

/// A school year spanning two calendar years.
///
/// Stored and serialized as the `"YYYY/YYYY"` token; the second year is
/// always the first plus one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AcademicYear {
    start: u16,
}

impl AcademicYear {
    /// Create the academic year beginning in `start_year`.
    pub fn new(start_year: i32) -> Result<Self, RombelError> {
        if !(MIN_START_YEAR..=MAX_START_YEAR).contains(&start_year) {
            return Err(RombelError::InvalidRequest(format!(
                "Academic year start {} out of range {}..={}",
                start_year, MIN_START_YEAR, MAX_START_YEAR
            )));
        }
        Ok(Self {
            start: start_year as u16,
        })
    }

    /// The academic year that a date opens, `year/year+1` of its calendar year.
    pub fn starting_in(date: NaiveDate) -> Result<Self, RombelError> {
        Self::new(date.year())
    }

    #[must_use]
    pub const fn start_year(self) -> i32 {
        self.start as i32
    }

    #[must_use]
    pub const fn end_year(self) -> i32 {
        self.start as i32 + 1
    }
}

impl fmt::Display for AcademicYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.start_year(), self.end_year())
    }
}

impl FromStr for AcademicYear {
    type Err = RombelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RombelError::InvalidRequest(format!("Invalid academic year: {:?}", s));

        let (first, second) = s.trim().split_once('/').ok_or_else(invalid)?;
        if first.len() != 4 || second.len() != 4 {
            return Err(invalid());
        }
        let start: i32 = first.parse().map_err(|_| invalid())?;
        let end: i32 = second.parse().map_err(|_| invalid())?;
        if end != start + 1 {
            return Err(invalid());
        }
        Self::new(start)
    }
}

impl TryFrom<String> for AcademicYear {
    type Error = RombelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AcademicYear> for String {
    fn from(year: AcademicYear) -> Self {
        year.to_string()
    }
}
