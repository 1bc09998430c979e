//! Exponential moving average of closes.
//!
//! Seeded with the simple mean of the first `period` closes, then
//! `ema = close * k + ema_prev * (1 - k)` with `k = 2 / (period + 1)`.
//! The first `period - 1` points are warmup.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_ema(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let indicator_type = IndicatorType::Ema(period);
    if period == 0 {
        return IndicatorSeries::empty(indicator_type);
    }
    let warmup = |b: &OhlcvBar| IndicatorPoint {
        date: b.date,
        valid: false,
        value: 0.0,
    };
    if bars.len() < period {
        return IndicatorSeries {
            indicator_type,
            values: bars.iter().map(warmup).collect(),
        };
    }

    let k = 2.0 / (period as f64 + 1.0);
    let seed = bars[..period].iter().map(|b| b.close).sum::<f64>() / period as f64;

    let mut values = Vec::with_capacity(bars.len());
    values.extend(bars[..period - 1].iter().map(warmup));

    let mut ema = seed;
    values.push(IndicatorPoint {
        date: bars[period - 1].date,
        valid: true,
        value: ema,
    });
    for bar in &bars[period..] {
        ema += k * (bar.close - ema);
        values.push(IndicatorPoint {
            date: bar.date,
            valid: true,
            value: ema,
        });
    }

    IndicatorSeries {
        indicator_type,
        values,
    }
}
