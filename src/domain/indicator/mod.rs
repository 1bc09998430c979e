//! Technical indicator series used by risk checks and entry signals.
//!
//! - `IndicatorPoint`: one dated value with a warmup flag
//! - `IndicatorType`: indicator identity + parameters
//! - `IndicatorSeries`: a time series aligned bar-for-bar with its input

pub mod atr;
pub mod ema;
pub mod roc;
pub mod rsi;
pub mod stddev;

pub use atr::{calculate_atr, AtrMethod};

use chrono::NaiveDate;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub valid: bool,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Atr { period: usize, method: AtrMethod },
    Ema(usize),
    Roc(usize),
    Rsi(usize),
    Stddev(usize),
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    pub(crate) fn empty(indicator_type: IndicatorType) -> Self {
        Self {
            indicator_type,
            values: Vec::new(),
        }
    }

    /// Value of the final point, if it is past warmup.
    pub fn last_valid(&self) -> Option<f64> {
        self.values.last().filter(|p| p.valid).map(|p| p.value)
    }

    pub fn value_on(&self, date: NaiveDate) -> Option<f64> {
        self.values
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|i| &self.values[i])
            .filter(|p| p.valid)
            .map(|p| p.value)
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Atr { period, method } => write!(f, "ATR({},{})", period, method),
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Roc(period) => write!(f, "ROC({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Stddev(period) => write!(f, "STDDEV({})", period),
        }
    }
}
