#![allow(dead_code)]

use chrono::NaiveDate;
use rotator::domain::config::EngineConfig;
use rotator::domain::error::RotatorError;
pub use rotator::domain::ohlcv::OhlcvBar;
use rotator::domain::series::InstrumentSeries;
use rotator::domain::universe::UniverseData;
use rotator::ports::data_port::DataPort;
use std::cell::RefCell;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
    pub fetches: RefCell<Vec<String>>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            fetches: RefCell::new(Vec::new()),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        _exchange: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, RotatorError> {
        self.fetches.borrow_mut().push(symbol.to_string());
        if let Some(reason) = self.errors.get(symbol) {
            return Err(RotatorError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start_date && b.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_symbols(&self, _exchange: &str) -> Result<Vec<String>, RotatorError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(date_str: &str, close: f64) -> OhlcvBar {
    OhlcvBar {
        date: NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap(),
        open: close,
        high: close * 1.01,
        low: close * 0.99,
        close,
        volume: 1_000_000,
    }
}

/// Consecutive daily bars: `drift` per bar with an alternating `wiggle` so
/// volatility never collapses to zero.
pub fn generate_bars(
    start_date: &str,
    count: usize,
    start_price: f64,
    drift: f64,
    wiggle: f64,
) -> Vec<OhlcvBar> {
    let start = NaiveDate::parse_from_str(start_date, "%Y-%m-%d").unwrap();
    (0..count)
        .map(|i| {
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            let close = start_price * (1.0 + drift).powi(i as i32) * (1.0 + sign * wiggle);
            OhlcvBar {
                date: start + chrono::Duration::days(i as i64),
                open: close,
                high: close * 1.005,
                low: close * 0.995,
                close,
                volume: 1_000_000,
            }
        })
        .collect()
}

/// Bars from an explicit close path, starting 2024-01-01.
pub fn bars_from_closes(closes: &[f64]) -> Vec<OhlcvBar> {
    let start = date(2024, 1, 1);
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| OhlcvBar {
            date: start + chrono::Duration::days(i as i64),
            open: close,
            high: close * 1.005,
            low: close * 0.995,
            close,
            volume: 1_000_000,
        })
        .collect()
}

pub fn series(symbol: &str, bars: Vec<OhlcvBar>) -> InstrumentSeries {
    InstrumentSeries::new(symbol, bars).unwrap()
}

pub fn universe_of(series: Vec<InstrumentSeries>) -> UniverseData {
    UniverseData::new(
        series.into_iter().map(|s| (s.symbol.clone(), s)).collect(),
        None,
    )
}

/// Short lookbacks so a few dozen bars are enough history.
pub fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.run.initial_capital = 1_000_000.0;
    config.momentum.periods = vec![5, 10];
    config.momentum.weights = vec![0.5, 0.5];
    config.momentum.buy_top_n = 3;
    config.momentum.hold_until_rank = 5;
    config.cluster.lookback = 15;
    config.cluster.update_frequency = 10;
    config.risk.atr_period = 5;
    config.risk.min_avg_amount = 0.0;
    config.sizing.volatility_window = 10;
    config.sizing.min_trade_amount = 0.0;
    config
}
