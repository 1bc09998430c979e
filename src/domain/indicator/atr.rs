//! Average True Range.
//!
//! TR[0] = high - low, TR[i] = max(H-L, |H-C[i-1]|, |L-C[i-1]|).
//! SMA: rolling mean of the last n TRs.
//! Wilder: seed with the mean of the first n TRs, then (prev*(n-1) + TR) / n.
//! Warmup: first (n-1) bars are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AtrMethod {
    Sma,
    #[default]
    Wilder,
}

impl fmt::Display for AtrMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtrMethod::Sma => write!(f, "sma"),
            AtrMethod::Wilder => write!(f, "wilder"),
        }
    }
}

impl std::str::FromStr for AtrMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sma" => Ok(AtrMethod::Sma),
            "wilder" | "ema" => Ok(AtrMethod::Wilder),
            other => Err(format!("unknown ATR method '{other}'")),
        }
    }
}

pub fn calculate_atr(bars: &[OhlcvBar], period: usize, method: AtrMethod) -> IndicatorSeries {
    let indicator_type = IndicatorType::Atr { period, method };
    if period == 0 || bars.len() < period {
        return IndicatorSeries::empty(indicator_type);
    }

    let tr_values: Vec<f64> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            if i == 0 {
                bar.high - bar.low
            } else {
                bar.true_range(bars[i - 1].close)
            }
        })
        .collect();

    let n = period as f64;
    let mut values = Vec::with_capacity(bars.len());
    let mut atr = 0.0;

    for (i, bar) in bars.iter().enumerate() {
        if i + 1 < period {
            values.push(IndicatorPoint {
                date: bar.date,
                valid: false,
                value: 0.0,
            });
            continue;
        }

        atr = if i + 1 == period {
            tr_values[..=i].iter().sum::<f64>() / n
        } else {
            match method {
                AtrMethod::Sma => tr_values[i + 1 - period..=i].iter().sum::<f64>() / n,
                AtrMethod::Wilder => (atr * (n - 1.0) + tr_values[i]) / n,
            }
        };

        values.push(IndicatorPoint {
            date: bar.date,
            valid: true,
            value: atr,
        });
    }

    IndicatorSeries {
        indicator_type,
        values,
    }
}
