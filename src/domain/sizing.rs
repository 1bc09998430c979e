//! Volatility-targeted position sizing under instrument, cluster and book caps.

use crate::domain::momentum::{TRADING_DAYS_PER_YEAR, VOL_EPSILON};
use crate::domain::order::OrderAction;
use crate::domain::series::{daily_returns, population_stddev, InstrumentSeries};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolatilityMethod {
    #[default]
    Std,
    Ewma,
}

impl std::str::FromStr for VolatilityMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "std" => Ok(VolatilityMethod::Std),
            "ewma" => Ok(VolatilityMethod::Ewma),
            other => Err(format!("unknown volatility method '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingConfig {
    /// Annualized risk budget per position as a fraction of capital.
    pub target_risk_pct: f64,
    pub max_position_pct: f64,
    pub max_cluster_pct: f64,
    pub max_total_exposure: f64,
    pub volatility_method: VolatilityMethod,
    pub volatility_window: usize,
    pub ewma_lambda: f64,
    pub min_trade_amount: f64,
    pub lot_size: i64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        SizingConfig {
            target_risk_pct: 0.03,
            max_position_pct: 0.2,
            max_cluster_pct: 0.4,
            max_total_exposure: 0.95,
            volatility_method: VolatilityMethod::Std,
            volatility_window: 20,
            ewma_lambda: 0.94,
            min_trade_amount: 1_000.0,
            lot_size: 100,
        }
    }
}

/// Annualized volatility of the last `window` daily returns up to `as_of`.
///
/// Uses whatever returns are available when history is shorter than the
/// window; `None` with fewer than two.
pub fn estimate_volatility(
    series: &InstrumentSeries,
    as_of: NaiveDate,
    method: VolatilityMethod,
    window: usize,
    lambda: f64,
) -> Option<f64> {
    let bars = series.bars_until(as_of);
    let tail = &bars[bars.len().saturating_sub(window + 1)..];
    let returns = daily_returns(tail);
    if returns.len() < 2 {
        return None;
    }

    let daily = match method {
        VolatilityMethod::Std => population_stddev(&returns),
        VolatilityMethod::Ewma => {
            let mut variance = returns[0] * returns[0];
            for r in &returns[1..] {
                variance = lambda * variance + (1.0 - lambda) * r * r;
            }
            variance.sqrt()
        }
    };
    Some(daily * TRADING_DAYS_PER_YEAR.sqrt())
}

/// Capital for one position: risk budget over volatility, capped.
pub fn size_position(
    volatility: f64,
    total_capital: f64,
    target_risk_pct: f64,
    max_position_pct: f64,
) -> f64 {
    let vol = volatility.max(VOL_EPSILON);
    (total_capital * target_risk_pct / vol).min(total_capital * max_position_pct)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizingCandidate {
    pub symbol: String,
    pub volatility: f64,
    pub cluster: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetAllocation {
    pub symbol: String,
    pub cluster: usize,
    pub volatility: f64,
    pub target_value: f64,
}

/// A holding that is not traded this cycle but still occupies its share of
/// the cluster and book caps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixedAllocation {
    pub symbol: String,
    pub cluster: usize,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SizingResult {
    pub allocations: Vec<TargetAllocation>,
    pub fixed: Vec<FixedAllocation>,
    /// Clusters scaled down to the cluster cap, with the factor used.
    pub cluster_scales: BTreeMap<usize, f64>,
    /// Book-level scale factor, 1.0 when the exposure cap did not bind.
    pub exposure_scale: f64,
}

impl SizingResult {
    pub fn total_target(&self) -> f64 {
        self.allocations.iter().map(|a| a.target_value).sum()
    }

    pub fn targets(&self) -> BTreeMap<String, f64> {
        self.allocations
            .iter()
            .map(|a| (a.symbol.clone(), a.target_value))
            .collect()
    }
}

/// Size every candidate, then apply the cluster and total-exposure caps.
pub fn size_portfolio(
    candidates: &[SizingCandidate],
    total_capital: f64,
    config: &SizingConfig,
) -> SizingResult {
    size_portfolio_with_fixed(candidates, &[], total_capital, config)
}

/// Like [`size_portfolio`], with `fixed` holdings taking their value out of
/// the room left under each cap. Only candidates are scaled; a cap already
/// used up by fixed value scales its candidates to zero.
pub fn size_portfolio_with_fixed(
    candidates: &[SizingCandidate],
    fixed: &[FixedAllocation],
    total_capital: f64,
    config: &SizingConfig,
) -> SizingResult {
    let mut allocations: Vec<TargetAllocation> = candidates
        .iter()
        .map(|c| TargetAllocation {
            symbol: c.symbol.clone(),
            cluster: c.cluster,
            volatility: c.volatility,
            target_value: size_position(
                c.volatility,
                total_capital,
                config.target_risk_pct,
                config.max_position_pct,
            ),
        })
        .collect();

    let mut fixed_by_cluster: BTreeMap<usize, f64> = BTreeMap::new();
    for f in fixed {
        *fixed_by_cluster.entry(f.cluster).or_insert(0.0) += f.value;
    }
    let cluster_cap = total_capital * config.max_cluster_pct;
    let mut cluster_sums: BTreeMap<usize, f64> = BTreeMap::new();
    for a in &allocations {
        *cluster_sums.entry(a.cluster).or_insert(0.0) += a.target_value;
    }
    let cluster_scales: BTreeMap<usize, f64> = cluster_sums
        .into_iter()
        .filter_map(|(cluster, sum)| {
            let room = (cluster_cap - fixed_by_cluster.get(&cluster).copied().unwrap_or(0.0)).max(0.0);
            (sum > room && sum > 0.0).then(|| (cluster, room / sum))
        })
        .collect();
    for a in &mut allocations {
        if let Some(scale) = cluster_scales.get(&a.cluster) {
            a.target_value *= scale;
        }
    }

    let fixed_total: f64 = fixed.iter().map(|f| f.value).sum();
    let exposure_room = (total_capital * config.max_total_exposure - fixed_total).max(0.0);
    let total: f64 = allocations.iter().map(|a| a.target_value).sum();
    let exposure_scale = if total > exposure_room && total > 0.0 {
        exposure_room / total
    } else {
        1.0
    };
    if exposure_scale < 1.0 {
        for a in &mut allocations {
            a.target_value *= exposure_scale;
        }
    }

    debug!(
        positions = allocations.len(),
        fixed = fixed.len(),
        scaled_clusters = cluster_scales.len(),
        exposure_scale,
        "sized portfolio"
    );

    SizingResult {
        allocations,
        fixed: fixed.to_vec(),
        cluster_scales,
        exposure_scale,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalanceTrade {
    pub symbol: String,
    pub action: OrderAction,
    pub shares: i64,
    /// Sells the whole position.
    pub full_exit: bool,
}

/// Diff current share counts against target values into lot-sized trades,
/// sells first, then by symbol.
///
/// Full exits always go through; other trades worth less than
/// `min_trade_amount` are dropped.
pub fn compute_rebalance_trades(
    current: &BTreeMap<String, i64>,
    target: &BTreeMap<String, f64>,
    prices: &BTreeMap<String, f64>,
    min_trade_amount: f64,
    lot_size: i64,
) -> Vec<RebalanceTrade> {
    let lot = lot_size.max(1);
    let mut trades = Vec::new();

    let symbols: std::collections::BTreeSet<&String> = current.keys().chain(target.keys()).collect();
    for symbol in symbols {
        let held = current.get(symbol).copied().unwrap_or(0);
        let target_value = target.get(symbol).copied().unwrap_or(0.0);

        if target_value <= 0.0 {
            if held > 0 {
                trades.push(RebalanceTrade {
                    symbol: symbol.clone(),
                    action: OrderAction::Sell,
                    shares: held,
                    full_exit: true,
                });
            }
            continue;
        }

        let Some(&price) = prices.get(symbol).filter(|p| **p > 0.0) else {
            warn!(symbol = %symbol, "no price, skipping rebalance");
            continue;
        };

        let target_shares = ((target_value / price).floor() as i64 / lot) * lot;
        if target_shares == 0 && held > 0 {
            trades.push(RebalanceTrade {
                symbol: symbol.clone(),
                action: OrderAction::Sell,
                shares: held,
                full_exit: true,
            });
            continue;
        }

        let delta = target_shares - held;
        let lots = (delta.abs() / lot) * lot;
        if lots == 0 || lots as f64 * price < min_trade_amount {
            continue;
        }
        trades.push(RebalanceTrade {
            symbol: symbol.clone(),
            action: if delta > 0 {
                OrderAction::Buy
            } else {
                OrderAction::Sell
            },
            shares: lots,
            full_exit: delta < 0 && lots == held,
        });
    }

    trades.sort_by(|a, b| a.action.cmp(&b.action).then_with(|| a.symbol.cmp(&b.symbol)));
    trades
}
