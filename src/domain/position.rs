//! Long-only position with trailing stop state.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub shares: i64,
    /// Total cash paid for the shares, commissions included.
    pub cost_basis: f64,
    pub highest_price_since_entry: f64,
    pub stop_line: f64,
    /// Close used for the latest valuation.
    pub last_price: f64,
}

impl Position {
    /// A freshly opened position. The stop starts at
    /// `entry_price - atr_multiplier * atr`, with the entry price as the high.
    pub fn open(
        symbol: impl Into<String>,
        entry_date: NaiveDate,
        entry_price: f64,
        shares: i64,
        cost_basis: f64,
        initial_stop: f64,
    ) -> Self {
        Position {
            symbol: symbol.into(),
            entry_date,
            entry_price,
            shares,
            cost_basis,
            highest_price_since_entry: entry_price,
            stop_line: initial_stop,
            last_price: entry_price,
        }
    }

    pub fn market_value(&self) -> f64 {
        self.shares as f64 * self.last_price
    }

    pub fn market_value_at(&self, price: f64) -> f64 {
        self.shares as f64 * price
    }

    /// Average cost per share including commissions.
    pub fn average_cost(&self) -> f64 {
        if self.shares == 0 {
            0.0
        } else {
            self.cost_basis / self.shares as f64
        }
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.shares as f64 * price - self.cost_basis
    }

    /// Per-share gain over the entry price.
    pub fn profit_per_share(&self, price: f64) -> f64 {
        price - self.entry_price
    }

    pub fn is_stopped_out(&self, close: f64) -> bool {
        self.stop_line > 0.0 && close <= self.stop_line
    }
}
