use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};

/// Timestamp layout used for every date literal written into report SQL.
/// Contribution dates are stored in the same layout so string comparison is
/// chronological.
pub const SQL_DATETIME: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YearMode {
    Calendar,
    Fiscal,
}

impl YearMode {
    /// Unknown modes fall back to calendar years.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "fiscal" => YearMode::Fiscal,
            _ => YearMode::Calendar,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    Current,
    Prior,
}

/// First day of the fiscal year. Feb 29 is rejected so every year has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiscalYearStart {
    month: u32,
    day: u32,
}

impl Default for FiscalYearStart {
    fn default() -> Self {
        Self { month: 1, day: 1 }
    }
}

impl FiscalYearStart {
    pub fn new(month: u32, day: u32) -> Result<Self> {
        // 2001 is not a leap year
        if NaiveDate::from_ymd_opt(2001, month, day).is_none() {
            return Err(ReportError::Configuration(format!(
                "invalid fiscal year start {month:02}-{day:02}"
            )));
        }
        Ok(Self { month, day })
    }

    /// Accepts `MM-DD`, or a bare `MM` meaning the first of that month.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let bad = || ReportError::Configuration(format!("invalid fiscal year start '{s}'"));
        match s.split_once('-') {
            Some((m, d)) => Self::new(m.parse().map_err(|_| bad())?, d.parse().map_err(|_| bad())?),
            None => Self::new(s.parse().map_err(|_| bad())?, 1),
        }
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self) -> u32 {
        self.day
    }
}

impl std::fmt::Display for FiscalYearStart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

/// A year-long span, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DateWindow {
    fn year_from(start: NaiveDateTime) -> Option<Self> {
        let end = start.checked_add_months(Months::new(12))? - Duration::seconds(1);
        Some(Self { start, end })
    }

    pub fn start_sql(&self) -> String {
        self.start.format(SQL_DATETIME).to_string()
    }

    pub fn end_sql(&self) -> String {
        self.end.format(SQL_DATETIME).to_string()
    }

    /// `<expr> BETWEEN '<start>' AND '<end>'`
    pub fn between(&self, expr: &str) -> String {
        format!("{expr} BETWEEN '{}' AND '{}'", self.start_sql(), self.end_sql())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearWindows {
    pub year: i32,
    pub mode: YearMode,
    pub current: DateWindow,
    pub prior: DateWindow,
}

impl YearWindows {
    pub fn get(&self, kind: WindowKind) -> &DateWindow {
        match kind {
            WindowKind::Current => &self.current,
            WindowKind::Prior => &self.prior,
        }
    }

    /// `2022` for calendar years, `2022-2023` for fiscal years.
    pub fn label(&self, kind: WindowKind) -> String {
        let first = self.get(kind).start.year();
        match self.mode {
            YearMode::Calendar => first.to_string(),
            YearMode::Fiscal => format!("{first}-{}", first + 1),
        }
    }

    pub fn title(&self, kind: WindowKind) -> String {
        match self.mode {
            YearMode::Calendar => format!("Total for {}", self.label(kind)),
            YearMode::Fiscal => format!("Total for Fiscal Year {}", self.label(kind)),
        }
    }
}

/// Resolve the current and prior windows for a reference year.
pub fn resolve_windows(year: i32, mode: YearMode, fiscal: FiscalYearStart) -> Result<YearWindows> {
    let (month, day) = match mode {
        YearMode::Calendar => (1, 1),
        YearMode::Fiscal => (fiscal.month, fiscal.day),
    };
    let out_of_range = || ReportError::Configuration(format!("year {year} is out of range"));

    let start = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(out_of_range)?;
    let current = DateWindow::year_from(start).ok_or_else(out_of_range)?;
    let prior_start = start.checked_sub_months(Months::new(12)).ok_or_else(out_of_range)?;
    let prior = DateWindow::year_from(prior_start).ok_or_else(out_of_range)?;

    Ok(YearWindows { year, mode, current, prior })
}
