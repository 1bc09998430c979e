//! Trade orders emitted by a rebalance cycle.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderAction {
    // Sell sorts first so sells always execute before buys.
    Sell,
    Buy,
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderAction::Sell => write!(f, "sell"),
            OrderAction::Buy => write!(f, "buy"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderReason {
    AtrStop,
    TimeStop,
    RankExit,
    ClusterReplacement,
    Rebalance,
    NewEntry,
    ManualClose,
}

impl fmt::Display for OrderReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderReason::AtrStop => "atr_stop",
            OrderReason::TimeStop => "time_stop",
            OrderReason::RankExit => "rank_exit",
            OrderReason::ClusterReplacement => "cluster_replacement",
            OrderReason::Rebalance => "rebalance",
            OrderReason::NewEntry => "new_entry",
            OrderReason::ManualClose => "manual_close",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOrder {
    pub symbol: String,
    pub action: OrderAction,
    pub shares: i64,
    /// Fill price after slippage.
    pub price: f64,
    pub reason: OrderReason,
    pub timestamp: NaiveDate,
}

impl TradeOrder {
    pub fn value(&self) -> f64 {
        self.shares as f64 * self.price
    }
}

/// Sells before buys, then by symbol.
pub fn sort_orders(orders: &mut [TradeOrder]) {
    orders.sort_by(|a, b| a.action.cmp(&b.action).then_with(|| a.symbol.cmp(&b.symbol)));
}
