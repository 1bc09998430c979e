//! Entry signal strategies.
//!
//! A closed set of rules picked from configuration. The orchestrator drops
//! buy candidates whose signal is `Sell`; `Hold` and `Buy` let them through.

use crate::domain::indicator::ema::calculate_ema;
use crate::domain::indicator::roc::calculate_roc;
use crate::domain::indicator::rsi::calculate_rsi;
use crate::domain::series::InstrumentSeries;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Buy => write!(f, "buy"),
            Signal::Sell => write!(f, "sell"),
            Signal::Hold => write!(f, "hold"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum SignalStrategy {
    /// Rate of change over `period`, in percent, against `threshold`.
    Momentum { period: usize, threshold: f64 },
    /// Fast EMA above slow EMA buys, below sells.
    MovingAverageCross { fast: usize, slow: usize },
    /// Wilder RSI under `oversold` buys, over `overbought` sells.
    Rsi {
        period: usize,
        oversold: f64,
        overbought: f64,
    },
}

impl SignalStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            SignalStrategy::Momentum { .. } => "momentum",
            SignalStrategy::MovingAverageCross { .. } => "ma_cross",
            SignalStrategy::Rsi { .. } => "rsi",
        }
    }

    /// Signal from bars at or before `as_of`; `Hold` until the indicator
    /// has warmed up.
    pub fn emit_signal(&self, series: &InstrumentSeries, as_of: NaiveDate) -> Signal {
        let bars = series.bars_until(as_of);
        match *self {
            SignalStrategy::Momentum { period, threshold } => {
                match calculate_roc(bars, period).last_valid() {
                    Some(roc) if roc > threshold => Signal::Buy,
                    Some(roc) if roc < -threshold => Signal::Sell,
                    _ => Signal::Hold,
                }
            }
            SignalStrategy::MovingAverageCross { fast, slow } => {
                let fast_ema = calculate_ema(bars, fast).last_valid();
                let slow_ema = calculate_ema(bars, slow).last_valid();
                match (fast_ema, slow_ema) {
                    (Some(f), Some(s)) if f > s => Signal::Buy,
                    (Some(f), Some(s)) if f < s => Signal::Sell,
                    _ => Signal::Hold,
                }
            }
            SignalStrategy::Rsi {
                period,
                oversold,
                overbought,
            } => match calculate_rsi(bars, period).last_valid() {
                Some(rsi) if rsi < oversold => Signal::Buy,
                Some(rsi) if rsi > overbought => Signal::Sell,
                _ => Signal::Hold,
            },
        }
    }
}
