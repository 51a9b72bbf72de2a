pub mod cache;
pub mod filter;

use chrono::{Datelike, Months, NaiveDate};

/// Canonical per-request date window. Both bounds are UTC calendar dates;
/// `from <= to` is not enforced here, out-of-order windows simply select
/// nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateWindow {
    /// Extends the window to include the calendar month before `from`, so a
    /// cohort query picks up the baseline month for its first requested
    /// month.
    pub fn widen_month_left(&self) -> DateWindow {
        let month_start = NaiveDate::from_ymd_opt(self.from.year(), self.from.month(), 1)
            .unwrap_or(self.from);
        let from = month_start
            .checked_sub_months(Months::new(1))
            .unwrap_or(month_start);
        DateWindow { from, to: self.to }
    }
}
