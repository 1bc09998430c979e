//! Daily price bar.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl OhlcvBar {
    /// Traded amount, approximated as close * volume.
    pub fn amount(&self) -> f64 {
        self.close * self.volume as f64
    }

    /// Simple return from `prev_close` into this bar; zero when the previous
    /// close is zero.
    pub fn return_since(&self, prev_close: f64) -> f64 {
        if prev_close == 0.0 {
            0.0
        } else {
            self.close / prev_close - 1.0
        }
    }

    /// Wilder true range against the previous close.
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let span = self.high - self.low;
        span.max((self.high - prev_close).abs())
            .max((self.low - prev_close).abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn etf_bar() -> OhlcvBar {
        OhlcvBar {
            date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            open: 3.52,
            high: 3.60,
            low: 3.50,
            close: 3.58,
            volume: 2_000_000,
        }
    }

    #[test]
    fn amount_uses_close() {
        assert_relative_eq!(etf_bar().amount(), 7_160_000.0, epsilon = 1e-6);
    }

    #[test]
    fn return_since_previous_close() {
        let bar = etf_bar();
        assert_relative_eq!(bar.return_since(3.40), 3.58 / 3.40 - 1.0);
        assert_eq!(bar.return_since(0.0), 0.0);
    }

    #[test]
    fn true_range_picks_widest_leg() {
        let bar = etf_bar();
        // inside the bar's range: high - low
        assert_relative_eq!(bar.true_range(3.55), 0.10, epsilon = 1e-12);
        // gap up from 3.30: high - prev
        assert_relative_eq!(bar.true_range(3.30), 0.30, epsilon = 1e-12);
        // gap down from 3.90: prev - low
        assert_relative_eq!(bar.true_range(3.90), 0.40, epsilon = 1e-12);
    }
}
