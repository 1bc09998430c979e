//! Trading calendar built from the union of instrument dates.

use crate::domain::series::InstrumentSeries;
use chrono::NaiveDate;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradingCalendar {
    dates: Vec<NaiveDate>,
}

impl TradingCalendar {
    pub fn from_dates<I: IntoIterator<Item = NaiveDate>>(dates: I) -> Self {
        let unique: BTreeSet<NaiveDate> = dates.into_iter().collect();
        Self {
            dates: unique.into_iter().collect(),
        }
    }

    pub fn from_series<'a, I>(series: I) -> Self
    where
        I: IntoIterator<Item = &'a InstrumentSeries>,
    {
        Self::from_dates(
            series
                .into_iter()
                .flat_map(|s| s.bars().iter().map(|bar| bar.date)),
        )
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.dates.binary_search(&date).is_ok()
    }

    /// Number of trading days `d` with `from < d <= to`.
    pub fn trading_days_between(&self, from: NaiveDate, to: NaiveDate) -> usize {
        if to <= from {
            return 0;
        }
        let start = self.dates.partition_point(|d| *d <= from);
        let end = self.dates.partition_point(|d| *d <= to);
        end.saturating_sub(start)
    }

    /// T+1 rule: true only when `check_date` falls on or after the first
    /// trading day strictly after `entry_date`.
    pub fn can_sell(&self, entry_date: NaiveDate, check_date: NaiveDate) -> bool {
        if check_date <= entry_date {
            return false;
        }
        if self.dates.is_empty() {
            return true;
        }
        let next = self.dates.partition_point(|d| *d <= entry_date);
        match self.dates.get(next) {
            Some(next_day) => *next_day <= check_date,
            // check_date lies past the known calendar
            None => true,
        }
    }

    /// Trading days in `[start, end]`.
    pub fn range(&self, start: NaiveDate, end: NaiveDate) -> &[NaiveDate] {
        let lo = self.dates.partition_point(|d| *d < start);
        let hi = self.dates.partition_point(|d| *d <= end);
        if lo >= hi {
            &[]
        } else {
            &self.dates[lo..hi]
        }
    }

    /// Every `every_n`-th trading day in `[start, end]`, beginning with the first.
    pub fn sample(&self, start: NaiveDate, end: NaiveDate, every_n: usize) -> Vec<NaiveDate> {
        let step = every_n.max(1);
        self.range(start, end).iter().step_by(step).copied().collect()
    }
}
