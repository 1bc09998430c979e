//! Price history access port.

use crate::domain::error::RotatorError;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;

pub trait DataPort {
    /// Daily bars for `symbol` on `exchange` within `[start_date, end_date]`,
    /// oldest first.
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        exchange: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, RotatorError>;

    fn list_symbols(&self, exchange: &str) -> Result<Vec<String>, RotatorError>;
}
