//! Per-instrument price history with a date index.
//!
//! Every lookup takes an `as_of` date and only ever sees bars dated at or
//! before it, which keeps scoring and replay free of lookahead.

use crate::domain::error::RotatorError;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct InstrumentSeries {
    pub symbol: String,
    bars: Vec<OhlcvBar>,
    date_index: HashMap<NaiveDate, usize>,
}

impl InstrumentSeries {
    /// Build a series, rejecting duplicate or out-of-order dates.
    pub fn new(symbol: impl Into<String>, bars: Vec<OhlcvBar>) -> Result<Self, RotatorError> {
        let symbol = symbol.into();
        for pair in bars.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(RotatorError::InvalidSeries {
                    symbol,
                    reason: format!(
                        "dates not strictly increasing at {} -> {}",
                        pair[0].date, pair[1].date
                    ),
                });
            }
        }
        let date_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        Ok(Self {
            symbol,
            bars,
            date_index,
        })
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[OhlcvBar] {
        &self.bars
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    pub fn get_bar(&self, date: NaiveDate) -> Option<&OhlcvBar> {
        self.date_index.get(&date).map(|&i| &self.bars[i])
    }

    /// All bars dated at or before `as_of`.
    pub fn bars_until(&self, as_of: NaiveDate) -> &[OhlcvBar] {
        let end = self.bars.partition_point(|b| b.date <= as_of);
        &self.bars[..end]
    }

    /// Bars strictly after `after` and at or before `until`.
    pub fn bars_between(&self, after: NaiveDate, until: NaiveDate) -> &[OhlcvBar] {
        let start = self.bars.partition_point(|b| b.date <= after);
        let end = self.bars.partition_point(|b| b.date <= until);
        if start >= end {
            &[]
        } else {
            &self.bars[start..end]
        }
    }

    /// The most recent bar at or before `as_of`.
    pub fn latest_bar(&self, as_of: NaiveDate) -> Option<&OhlcvBar> {
        self.bars_until(as_of).last()
    }

    /// Close of the most recent bar at or before `as_of`.
    pub fn close_at(&self, as_of: NaiveDate) -> Option<f64> {
        self.latest_bar(as_of).map(|b| b.close)
    }
}

/// Simple close-to-close returns; output is one shorter than the input.
pub fn daily_returns(bars: &[OhlcvBar]) -> Vec<f64> {
    bars.windows(2).map(|w| w[1].return_since(w[0].close)).collect()
}

/// Population standard deviation; zero for fewer than two samples.
pub fn population_stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}
