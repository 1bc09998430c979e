//! Rolling standard deviation of daily close-to-close returns.
//!
//! STDDEV(n)[i] = population stddev of the n returns ending at bar i.
//! Warmup: first n bars are invalid (n returns need n+1 closes).

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::series::{daily_returns, population_stddev};

pub fn calculate_stddev(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let returns = daily_returns(bars);

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let valid = period > 0 && i >= period;
            let value = if valid {
                // returns[j] is the change into bar j+1
                population_stddev(&returns[i - period..i])
            } else {
                0.0
            };
            IndicatorPoint {
                date: bar.date,
                valid,
                value,
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Stddev(period),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_bars(prices: &[f64]) -> Vec<OhlcvBar> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &close)| OhlcvBar {
                date: NaiveDate::from_ymd_opt(2024, 1, (i + 1) as u32).unwrap(),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000,
            })
            .collect()
    }

    #[test]
    fn stddev_warmup() {
        let series = calculate_stddev(&make_bars(&[10.0, 11.0, 12.0, 13.0]), 2);
        assert!(!series.values[0].valid);
        assert!(!series.values[1].valid);
        assert!(series.values[2].valid);
        assert!(series.values[3].valid);
    }

    #[test]
    fn stddev_constant_growth_is_zero() {
        let series = calculate_stddev(&make_bars(&[100.0, 110.0, 121.0]), 2);
        assert!(series.values[2].value.abs() < 1e-12);
    }

    #[test]
    fn stddev_alternating_returns() {
        // returns +10%, -10%
        let series = calculate_stddev(&make_bars(&[100.0, 110.0, 99.0]), 2);
        assert!((series.values[2].value - 0.1).abs() < 1e-12);
    }
}
