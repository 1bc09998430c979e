//! Order application and fill simulation.
//!
//! Fills happen at the rebalance-date close with slippage against the trader
//! and a flat-plus-percentage commission. Sells settle before buys so their
//! proceeds fund the buys; buys are clipped to whole lots of available cash.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::order::{sort_orders, OrderAction, OrderReason, TradeOrder};
use super::portfolio::PortfolioSnapshot;
use super::position::Position;
use super::risk::initial_stop;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub commission_per_trade: f64,
    /// Percent of trade value, e.g. 0.03 for 3 bps.
    pub commission_pct: f64,
    /// Percent of price.
    pub slippage_pct: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            commission_per_trade: 0.0,
            commission_pct: 0.0,
            slippage_pct: 0.0,
        }
    }
}

/// Calculate commission: flat_fee + (trade_value * pct / 100).
pub fn calculate_commission(trade_value: f64, config: &ExecutionConfig) -> f64 {
    config.commission_per_trade + (trade_value * config.commission_pct / 100.0)
}

/// Buy fill: market_price * (1 + slippage_pct / 100)
pub fn apply_slippage_buy(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 + slippage_pct / 100.0)
}

/// Sell fill: market_price * (1 - slippage_pct / 100)
pub fn apply_slippage_sell(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 - slippage_pct / 100.0)
}

/// Largest lot-multiple share count whose cost plus commission fits in `cash`.
pub fn affordable_shares(cash: f64, price: f64, lot_size: i64, config: &ExecutionConfig) -> i64 {
    if price <= 0.0 {
        return 0;
    }
    let lot = lot_size.max(1);
    let budget = cash - config.commission_per_trade;
    if budget <= 0.0 {
        return 0;
    }
    let per_share = price * (1.0 + config.commission_pct / 100.0);
    let mut shares = ((budget / per_share).floor() as i64 / lot) * lot;
    // Guard the floor against rounding at the boundary.
    while shares > 0 {
        let cost = shares as f64 * price;
        if cost + calculate_commission(cost, config) <= cash {
            break;
        }
        shares -= lot;
    }
    shares.max(0)
}

/// A trade the cycle wants filled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub action: OrderAction,
    pub shares: i64,
    pub reason: OrderReason,
}

/// Market inputs for filling a batch of requests on one date.
#[derive(Debug, Clone)]
pub struct FillContext<'a> {
    pub as_of: NaiveDate,
    pub prices: &'a BTreeMap<String, f64>,
    /// ATR per symbol, used for the initial stop of new positions.
    pub atrs: &'a BTreeMap<String, f64>,
    pub atr_multiplier: f64,
    pub lot_size: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    pub snapshot: PortfolioSnapshot,
    pub orders: Vec<TradeOrder>,
    pub commissions: f64,
    pub warnings: Vec<String>,
}

/// Fill `requests` against `base`, producing a new snapshot dated
/// `ctx.as_of` and the executed orders.
///
/// `base` is not modified. Requests without a price are dropped with a
/// warning, as are buys that cannot afford a single lot.
pub fn apply_orders(
    base: &PortfolioSnapshot,
    requests: &[OrderRequest],
    ctx: &FillContext<'_>,
    config: &ExecutionConfig,
) -> ApplyOutcome {
    let mut holdings = base.holdings.clone();
    let mut cash = base.cash;
    let mut orders = Vec::new();
    let mut warnings = Vec::new();
    let mut commissions = 0.0;

    let mut sorted: Vec<&OrderRequest> = requests.iter().collect();
    sorted.sort_by(|a, b| a.action.cmp(&b.action).then_with(|| a.symbol.cmp(&b.symbol)));

    for req in sorted {
        let Some(&market_price) = ctx.prices.get(&req.symbol) else {
            warnings.push(format!("{}: no price on {}, {} dropped", req.symbol, ctx.as_of, req.action));
            warn!(symbol = %req.symbol, action = %req.action, "no price, order dropped");
            continue;
        };

        match req.action {
            OrderAction::Sell => {
                let Some(position) = holdings.get_mut(&req.symbol) else {
                    warnings.push(format!("{}: sell without a position", req.symbol));
                    continue;
                };
                let held = position.shares;
                let shares = req.shares.min(held);
                if shares <= 0 {
                    continue;
                }
                let price = apply_slippage_sell(market_price, config.slippage_pct);
                let value = shares as f64 * price;
                let commission = calculate_commission(value, config);
                cash += value - commission;
                commissions += commission;

                if shares == held {
                    holdings.remove(&req.symbol);
                } else {
                    position.cost_basis *= (held - shares) as f64 / held as f64;
                    position.shares = held - shares;
                }
                orders.push(TradeOrder {
                    symbol: req.symbol.clone(),
                    action: OrderAction::Sell,
                    shares,
                    price,
                    reason: req.reason,
                    timestamp: ctx.as_of,
                });
            }
            OrderAction::Buy => {
                let price = apply_slippage_buy(market_price, config.slippage_pct);
                let shares = req.shares.min(affordable_shares(cash, price, ctx.lot_size, config));
                let shares = (shares / ctx.lot_size.max(1)) * ctx.lot_size.max(1);
                if shares <= 0 {
                    warnings.push(format!("{}: not enough cash for one lot, buy dropped", req.symbol));
                    warn!(symbol = %req.symbol, cash, "not enough cash for one lot, buy dropped");
                    continue;
                }
                if shares < req.shares {
                    debug!(symbol = %req.symbol, requested = req.shares, filled = shares, "buy clipped to cash");
                }
                let cost = shares as f64 * price;
                let commission = calculate_commission(cost, config);
                cash -= cost + commission;
                commissions += commission;

                match holdings.get_mut(&req.symbol) {
                    Some(position) => {
                        let total = position.shares + shares;
                        position.entry_price = (position.entry_price * position.shares as f64
                            + price * shares as f64)
                            / total as f64;
                        position.shares = total;
                        position.cost_basis += cost + commission;
                    }
                    None => {
                        let stop = ctx
                            .atrs
                            .get(&req.symbol)
                            .map(|atr| initial_stop(price, *atr, ctx.atr_multiplier))
                            .unwrap_or(0.0);
                        holdings.insert(
                            req.symbol.clone(),
                            Position::open(req.symbol.clone(), ctx.as_of, price, shares, cost + commission, stop),
                        );
                    }
                }
                orders.push(TradeOrder {
                    symbol: req.symbol.clone(),
                    action: OrderAction::Buy,
                    shares,
                    price,
                    reason: req.reason,
                    timestamp: ctx.as_of,
                });
            }
        }
    }

    for position in holdings.values_mut() {
        if let Some(&close) = ctx.prices.get(&position.symbol) {
            position.last_price = close;
        }
    }
    sort_orders(&mut orders);

    let mut snapshot = PortfolioSnapshot {
        as_of: ctx.as_of,
        holdings,
        cash,
        total_value: 0.0,
        cluster_assignment: base.cluster_assignment.clone(),
        metadata: base.metadata.clone(),
    };
    snapshot.total_value = snapshot.cash + snapshot.holdings_value();

    ApplyOutcome {
        snapshot,
        orders,
        commissions,
        warnings,
    }
}
