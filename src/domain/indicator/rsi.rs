//! RSI (Relative Strength Index) with Wilder's smoothing.
//!
//! - First average: simple mean of gains/losses over the first n changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! RSI = 100 - (100 / (1 + avg_gain / avg_loss)); if avg_loss == 0: RSI = 100
//! Warmup: first n bars are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

fn rsi_from(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    }
}

pub fn calculate_rsi(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let invalid = |bar: &OhlcvBar| IndicatorPoint {
        date: bar.date,
        valid: false,
        value: 0.0,
    };

    if period == 0 || bars.len() < 2 {
        return IndicatorSeries {
            indicator_type: IndicatorType::Rsi(period),
            values: bars.iter().map(invalid).collect(),
        };
    }

    let n = period as f64;
    let mut values = Vec::with_capacity(bars.len());
    values.push(invalid(&bars[0]));

    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    for (i, bar) in bars.iter().enumerate().skip(1) {
        let change = bar.close - bars[i - 1].close;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);

        if i < period {
            gain_sum += gain;
            loss_sum += loss;
            values.push(invalid(bar));
            continue;
        }

        if i == period {
            avg_gain = (gain_sum + gain) / n;
            avg_loss = (loss_sum + loss) / n;
        } else {
            avg_gain = (avg_gain * (n - 1.0) + gain) / n;
            avg_loss = (avg_loss * (n - 1.0) + loss) / n;
        }

        values.push(IndicatorPoint {
            date: bar.date,
            valid: true,
            value: rsi_from(avg_gain, avg_loss),
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Rsi(period),
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
    fn rsi_single_bar_is_invalid() {
        let series = calculate_rsi(&make_bars(&[100.0]), 14);
        assert_eq!(series.values.len(), 1);
        assert!(!series.values[0].valid);
    }

    #[test]
    fn rsi_warmup_period() {
        let series = calculate_rsi(&make_bars(&[10.0, 11.0, 12.0, 11.0]), 2);
        assert!(!series.values[0].valid);
        assert!(!series.values[1].valid);
        assert!(series.values[2].valid);
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let series = calculate_rsi(&make_bars(&[10.0, 11.0, 12.0, 13.0]), 2);
        assert!((series.values[3].value - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_wilder_smoothing() {
        // changes: +1, -1, +2
        let series = calculate_rsi(&make_bars(&[10.0, 11.0, 10.0, 12.0]), 2);
        let g1 = (1.0 + 0.0) / 2.0;
        let l1 = (0.0 + 1.0) / 2.0;
        assert!((series.values[2].value - 50.0).abs() < 1e-9);
        let g2 = (g1 * 1.0 + 2.0) / 2.0;
        let l2 = (l1 * 1.0 + 0.0) / 2.0;
        let expected = 100.0 - 100.0 / (1.0 + g2 / l2);
        assert!((series.values[3].value - expected).abs() < 1e-9);
    }
}
