//! Dated portfolio snapshots and equity tracking.
//!
//! A snapshot is produced once per rebalance cycle and never edited after;
//! the next cycle builds a fresh one from it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::cluster::ClusterAssignment;
use super::position::Position;

/// Tolerance used when checking `total_value == cash + holdings`.
pub const VALUE_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub initial_capital: f64,
    /// Highest total value seen at any cycle, for the account drawdown breaker.
    pub peak_equity: f64,
    pub cycle_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub as_of: NaiveDate,
    pub holdings: BTreeMap<String, Position>,
    pub cash: f64,
    pub total_value: f64,
    pub cluster_assignment: Option<ClusterAssignment>,
    pub metadata: SnapshotMetadata,
}

impl PortfolioSnapshot {
    /// All-cash snapshot at account inception.
    pub fn inception(as_of: NaiveDate, initial_capital: f64) -> Self {
        PortfolioSnapshot {
            as_of,
            holdings: BTreeMap::new(),
            cash: initial_capital,
            total_value: initial_capital,
            cluster_assignment: None,
            metadata: SnapshotMetadata {
                initial_capital,
                peak_equity: initial_capital,
                cycle_count: 0,
            },
        }
    }

    pub fn get_position(&self, symbol: &str) -> Option<&Position> {
        self.holdings.get(symbol)
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.holdings.contains_key(symbol)
    }

    pub fn position_count(&self) -> usize {
        self.holdings.len()
    }

    pub fn held_symbols(&self) -> BTreeSet<String> {
        self.holdings.keys().cloned().collect()
    }

    /// Sum of position market values at their last prices.
    pub fn holdings_value(&self) -> f64 {
        self.holdings.values().map(Position::market_value).sum()
    }

    /// Cash plus holdings valued at `price_map`, falling back to each
    /// position's last price when a symbol has no quote.
    pub fn value_at(&self, price_map: &BTreeMap<String, f64>) -> f64 {
        let position_value: f64 = self
            .holdings
            .values()
            .map(|pos| {
                let price = price_map.get(&pos.symbol).copied().unwrap_or(pos.last_price);
                pos.market_value_at(price)
            })
            .sum();
        self.cash + position_value
    }

    /// `total_value == cash + Σ market value` within [`VALUE_TOLERANCE`]
    /// scaled by the account size.
    pub fn is_conserved(&self) -> bool {
        let expected = self.cash + self.holdings_value();
        (self.total_value - expected).abs() <= VALUE_TOLERANCE * expected.abs().max(1.0)
    }

    pub fn equity_point(&self) -> EquityPoint {
        EquityPoint {
            date: self.as_of,
            equity: self.total_value,
        }
    }
}
