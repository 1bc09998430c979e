//! CSV file data adapter.
//!
//! One file per instrument, `<SYMBOL>_<EXCHANGE>.csv`, with a header row
//! `date,open,high,low,close,volume`.

use crate::domain::error::RotatorError;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
}

impl From<CsvRow> for OhlcvBar {
    fn from(row: CsvRow) -> Self {
        OhlcvBar {
            date: row.date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        }
    }
}

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str, exchange: &str) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", symbol, exchange))
    }
}

impl DataPort for CsvAdapter {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        exchange: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, RotatorError> {
        let path = self.csv_path(symbol, exchange);
        let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => RotatorError::NoData {
                symbol: symbol.to_string(),
            },
            _ => RotatorError::Data {
                reason: format!("failed to read {}: {}", path.display(), e),
            },
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for (line, result) in rdr.deserialize::<CsvRow>().enumerate() {
            let row = result.map_err(|e| RotatorError::Data {
                reason: format!("{} row {}: {}", path.display(), line + 1, e),
            })?;
            if row.date < start_date || row.date > end_date {
                continue;
            }
            bars.push(OhlcvBar::from(row));
        }

        bars.sort_by_key(|b| b.date);
        debug!(symbol, exchange, bars = bars.len(), "read csv");
        Ok(bars)
    }

    fn list_symbols(&self, exchange: &str) -> Result<Vec<String>, RotatorError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| RotatorError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let suffix = format!("_{}.csv", exchange);
        let mut symbols = Vec::new();

        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();

            if let Some(symbol) = name_str.strip_suffix(&suffix) {
                symbols.push(symbol.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}
