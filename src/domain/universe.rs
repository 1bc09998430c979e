//! Universe loading.
//!
//! Parses symbol lists from configuration and loads each symbol's history,
//! skipping (not failing on) symbols without enough usable data.

use crate::domain::calendar::TradingCalendar;
use crate::domain::error::RotatorError;
use crate::domain::series::InstrumentSeries;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

pub const MIN_OHLCV_BARS: usize = 30;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum UniverseError {
    #[error("empty token in symbol list")]
    EmptyToken,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),
}

pub fn parse_symbols(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(UniverseError::DuplicateSymbol(symbol));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoData,
    InsufficientBars { bars: usize },
    InvalidSeries(String),
}

/// Everything a cycle reads about the market on a given run.
#[derive(Debug, Clone, Default)]
pub struct UniverseData {
    pub series: BTreeMap<String, InstrumentSeries>,
    pub benchmark: Option<InstrumentSeries>,
    /// Quoted bid/ask spreads as fractions of price, where known.
    pub spreads: BTreeMap<String, f64>,
    pub calendar: TradingCalendar,
    pub skipped: Vec<SkippedSymbol>,
}

impl UniverseData {
    pub fn new(series: BTreeMap<String, InstrumentSeries>, benchmark: Option<InstrumentSeries>) -> Self {
        let calendar = TradingCalendar::from_series(series.values().chain(benchmark.as_ref()));
        UniverseData {
            series,
            benchmark,
            spreads: BTreeMap::new(),
            calendar,
            skipped: Vec::new(),
        }
    }

    pub fn with_spreads(mut self, spreads: BTreeMap<String, f64>) -> Self {
        self.spreads = spreads;
        self
    }

    /// Attach the market benchmark; its dates join the trading calendar.
    pub fn with_benchmark(mut self, benchmark: InstrumentSeries) -> Self {
        self.calendar =
            TradingCalendar::from_series(self.series.values().chain(std::iter::once(&benchmark)));
        self.benchmark = Some(benchmark);
        self
    }

    pub fn symbols(&self) -> impl Iterator<Item = &String> {
        self.series.keys()
    }

    pub fn get(&self, symbol: &str) -> Option<&InstrumentSeries> {
        self.series.get(symbol)
    }

    /// Closes at or before `as_of` for every symbol that has one.
    pub fn price_map(&self, as_of: NaiveDate) -> BTreeMap<String, f64> {
        self.series
            .iter()
            .filter_map(|(symbol, s)| s.close_at(as_of).map(|c| (symbol.clone(), c)))
            .collect()
    }
}

/// Fetch every symbol through `data_port`, keeping those with at least
/// `min_bars` bars. Fails only when no symbol survives.
pub fn load_universe(
    data_port: &dyn DataPort,
    symbols: &[String],
    exchange: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
    min_bars: usize,
) -> Result<UniverseData, RotatorError> {
    let mut series = BTreeMap::new();
    let mut skipped = Vec::new();

    for symbol in symbols {
        let bars = match data_port.fetch_ohlcv(symbol, exchange, start_date, end_date) {
            Ok(bars) if !bars.is_empty() => bars,
            Ok(_) => {
                warn!(symbol = %symbol, exchange, "skipping: no data found");
                skipped.push(SkippedSymbol {
                    symbol: symbol.clone(),
                    reason: SkipReason::NoData,
                });
                continue;
            }
            Err(e) => {
                warn!(symbol = %symbol, exchange, error = %e, "skipping: fetch failed");
                skipped.push(SkippedSymbol {
                    symbol: symbol.clone(),
                    reason: SkipReason::NoData,
                });
                continue;
            }
        };

        if bars.len() < min_bars {
            warn!(
                symbol = %symbol,
                bars = bars.len(),
                minimum = min_bars,
                "skipping: insufficient bars"
            );
            skipped.push(SkippedSymbol {
                symbol: symbol.clone(),
                reason: SkipReason::InsufficientBars { bars: bars.len() },
            });
            continue;
        }

        match InstrumentSeries::new(symbol.clone(), bars) {
            Ok(s) => {
                info!(symbol = %symbol, bars = s.len(), "loaded");
                series.insert(symbol.clone(), s);
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "skipping: invalid series");
                skipped.push(SkippedSymbol {
                    symbol: symbol.clone(),
                    reason: SkipReason::InvalidSeries(e.to_string()),
                });
            }
        }
    }

    if series.is_empty() {
        return Err(RotatorError::InsufficientData {
            symbol: "all".to_string(),
            bars: 0,
            minimum: min_bars,
        });
    }

    if !skipped.is_empty() {
        info!(
            loaded = series.len(),
            requested = symbols.len(),
            exchange,
            "universe partially loaded"
        );
    }

    let mut universe = UniverseData::new(series, None);
    universe.skipped = skipped;
    Ok(universe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::OhlcvBar;
    use std::collections::HashMap;

    struct StubPort {
        data: HashMap<String, Vec<OhlcvBar>>,
    }

    impl DataPort for StubPort {
        fn fetch_ohlcv(
            &self,
            symbol: &str,
            _exchange: &str,
            start_date: NaiveDate,
            end_date: NaiveDate,
        ) -> Result<Vec<OhlcvBar>, RotatorError> {
            match self.data.get(symbol) {
                Some(bars) => Ok(bars
                    .iter()
                    .filter(|b| b.date >= start_date && b.date <= end_date)
                    .cloned()
                    .collect()),
                None => Err(RotatorError::NoData {
                    symbol: symbol.to_string(),
                }),
            }
        }

        fn list_symbols(&self, _exchange: &str) -> Result<Vec<String>, RotatorError> {
            Ok(self.data.keys().cloned().collect())
        }
    }

    fn bars(n: usize) -> Vec<OhlcvBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n)
            .map(|i| OhlcvBar {
                date: start + chrono::Duration::days(i as i64),
                open: 10.0,
                high: 10.5,
                low: 9.5,
                close: 10.0 + i as f64 * 0.01,
                volume: 1000,
            })
            .collect()
    }

    fn range() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        )
    }

    #[test]
    fn parse_symbols_basic() {
        assert_eq!(
            parse_symbols("510300,159915,512880").unwrap(),
            vec!["510300", "159915", "512880"]
        );
    }

    #[test]
    fn parse_symbols_trims_and_uppercases() {
        assert_eq!(parse_symbols("  spy , qqq ,iwm").unwrap(), vec!["SPY", "QQQ", "IWM"]);
    }

    #[test]
    fn parse_symbols_rejects_empty_token() {
        assert_eq!(parse_symbols("SPY,,QQQ"), Err(UniverseError::EmptyToken));
    }

    #[test]
    fn parse_symbols_rejects_duplicates() {
        assert_eq!(
            parse_symbols("SPY,QQQ,spy"),
            Err(UniverseError::DuplicateSymbol("SPY".into()))
        );
    }

    #[test]
    fn load_skips_short_and_missing() {
        let mut data = HashMap::new();
        data.insert("AAA".to_string(), bars(40));
        data.insert("SHORT".to_string(), bars(5));
        let port = StubPort { data };
        let (start, end) = range();
        let symbols = vec!["AAA".to_string(), "SHORT".to_string(), "GONE".to_string()];

        let universe = load_universe(&port, &symbols, "SH", start, end, MIN_OHLCV_BARS).unwrap();
        assert_eq!(universe.symbols().collect::<Vec<_>>(), vec!["AAA"]);
        assert_eq!(universe.skipped.len(), 2);
        assert_eq!(universe.skipped[0].reason, SkipReason::InsufficientBars { bars: 5 });
        assert_eq!(universe.skipped[1].reason, SkipReason::NoData);
        assert_eq!(universe.calendar.len(), 40);
    }

    #[test]
    fn load_fails_when_nothing_survives() {
        let port = StubPort {
            data: HashMap::new(),
        };
        let (start, end) = range();
        let result = load_universe(&port, &["X".to_string()], "SH", start, end, 1);
        assert!(matches!(result, Err(RotatorError::InsufficientData { .. })));
    }

    #[test]
    fn price_map_uses_latest_close() {
        let mut series = BTreeMap::new();
        series.insert("AAA".to_string(), InstrumentSeries::new("AAA", bars(10)).unwrap());
        let universe = UniverseData::new(series, None);
        let prices = universe.price_map(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        assert!((prices["AAA"] - 10.02).abs() < 1e-12);
    }
}
