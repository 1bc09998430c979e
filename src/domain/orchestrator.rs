//! One rebalance cycle: prior snapshot in, orders and a new snapshot out.
//!
//! Steps run in a fixed order: cluster refresh, scoring with inertia, risk
//! evaluation, hysteresis selection, cluster limits, sizing, trade diff,
//! settlement deferral, fills. Nothing here holds state between cycles.

use crate::domain::calendar::TradingCalendar;
use crate::domain::cluster::{
    cluster_universe, filter_by_cluster_limit, ClusterAssignment, ClusterFilterResult,
};
use crate::domain::config::EngineConfig;
use crate::domain::error::RotatorError;
use crate::domain::execution::{apply_orders, FillContext, OrderRequest};
use crate::domain::momentum::{
    adjusted_ranking, apply_inertia_bonus, get_trading_signals, rank_universe, ScoreRecord,
    TradingSignals,
};
use crate::domain::order::{OrderAction, OrderReason, TradeOrder};
use crate::domain::portfolio::PortfolioSnapshot;
use crate::domain::risk::{atr_at, check_portfolio_risk, PortfolioRiskReport};
use crate::domain::signal::Signal;
use crate::domain::sizing::{
    compute_rebalance_trades, estimate_volatility, size_portfolio_with_fixed, FixedAllocation,
    RebalanceTrade, SizingCandidate, SizingResult,
};
use crate::domain::universe::UniverseData;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleDiagnostics {
    pub scores: Vec<ScoreRecord>,
    pub excluded: Vec<(String, String)>,
    pub cluster_assignment: Option<ClusterAssignment>,
    pub cluster_refreshed: bool,
    pub risk: PortfolioRiskReport,
    pub signals: TradingSignals,
    /// Buy candidates dropped by the entry signal.
    pub signal_rejected: Vec<String>,
    pub cluster_filter: ClusterFilterResult,
    pub sizing: SizingResult,
    /// Sells held back by the T+1 rule.
    pub deferred_sells: Vec<String>,
    /// Replacement buys cancelled because their sell was deferred.
    pub cancelled_buys: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutput {
    pub orders: Vec<TradeOrder>,
    pub snapshot: PortfolioSnapshot,
    pub diagnostics: CycleDiagnostics,
}

fn refresh_clusters(
    config: &EngineConfig,
    universe: &UniverseData,
    prior: &PortfolioSnapshot,
    as_of: NaiveDate,
) -> (Option<ClusterAssignment>, bool) {
    if !config.cluster.enabled {
        return (None, false);
    }
    match &prior.cluster_assignment {
        Some(cached)
            if universe
                .calendar
                .trading_days_between(cached.computed_on, as_of)
                < config.cluster.update_frequency =>
        {
            (Some(cached.clone()), false)
        }
        _ => (
            Some(cluster_universe(&universe.series, as_of, &config.cluster)),
            true,
        ),
    }
}

fn sell_reason(
    symbol: &str,
    trade: &RebalanceTrade,
    risk: &PortfolioRiskReport,
    rank_exits: &BTreeSet<String>,
    replaced: &BTreeSet<String>,
) -> OrderReason {
    if trade.full_exit {
        if let Some(reason) = risk.statuses.get(symbol).and_then(|s| s.exit_reason()) {
            return reason;
        }
        if replaced.contains(symbol) {
            return OrderReason::ClusterReplacement;
        }
        if rank_exits.contains(symbol) {
            return OrderReason::RankExit;
        }
    }
    OrderReason::Rebalance
}

/// Run one rebalance cycle as of `as_of`.
///
/// Fails only when `as_of` precedes the prior snapshot; data problems with
/// individual symbols degrade to warnings in the diagnostics.
pub fn run_cycle(
    config: &EngineConfig,
    universe: &UniverseData,
    prior: &PortfolioSnapshot,
    as_of: NaiveDate,
) -> Result<CycleOutput, RotatorError> {
    if as_of < prior.as_of {
        return Err(RotatorError::Snapshot {
            reason: format!("cycle date {as_of} precedes prior snapshot {}", prior.as_of),
        });
    }
    let mut diag = CycleDiagnostics::default();
    let held = prior.held_symbols();

    // 1. clusters
    let (assignment, refreshed) = refresh_clusters(config, universe, prior, as_of);
    diag.cluster_refreshed = refreshed;

    // 2. scores
    let ranking = rank_universe(&universe.series, as_of, &config.momentum);
    for (symbol, reason) in &ranking.excluded {
        debug!(symbol = %symbol, reason = %reason, "excluded from ranking");
    }
    diag.excluded = ranking.excluded.clone();
    diag.scores = apply_inertia_bonus(
        &ranking.ranked,
        &held,
        config.momentum.inertia_bonus,
        config.momentum.inertia_mode,
    );
    let adjusted = adjusted_ranking(&diag.scores);
    let scores: BTreeMap<String, f64> = adjusted
        .iter()
        .map(|r| (r.symbol.clone(), r.score))
        .collect();

    // 3. risk
    let risk = check_portfolio_risk(prior, universe, as_of, &config.risk);
    diag.warnings.extend(risk.warnings.iter().cloned());
    let forced = risk.forced_sells();

    // 4. hysteresis
    let mut signals = get_trading_signals(
        &adjusted,
        &held,
        config.momentum.buy_top_n,
        config.momentum.hold_until_rank,
        &forced,
    );
    if risk.circuit_breaker.triggered && !signals.to_buy.is_empty() {
        info!(candidates = signals.to_buy.len(), "circuit breaker active, no new entries");
        signals.to_buy.clear();
    }
    if let Some(strategy) = &config.signal {
        let (keep, rejected): (Vec<String>, Vec<String>) =
            signals.to_buy.iter().cloned().partition(|symbol| {
                universe
                    .get(symbol)
                    .map(|s| strategy.emit_signal(s, as_of) != Signal::Sell)
                    .unwrap_or(false)
            });
        if !rejected.is_empty() {
            debug!(strategy = strategy.name(), ?rejected, "entry signal rejected candidates");
        }
        signals.to_buy = keep;
        diag.signal_rejected = rejected;
    }

    // Orders fill only at a bar dated exactly on as_of.
    let fill_prices: BTreeMap<String, f64> = universe
        .series
        .iter()
        .filter_map(|(symbol, s)| s.get_bar(as_of).map(|b| (symbol.clone(), b.close)))
        .collect();

    // 5. cluster limits
    let mut to_hold: BTreeSet<String> = signals.to_hold.iter().cloned().collect();
    let labels = assignment
        .as_ref()
        .map(|a| a.resolve(universe.symbols().chain(held.iter())));
    // A holding that cannot be sold today cannot make room for a replacement.
    let replaceable_scores: BTreeMap<String, f64> = scores
        .iter()
        .filter(|(symbol, _)| !held.contains(*symbol) || fill_prices.contains_key(*symbol))
        .map(|(symbol, score)| (symbol.clone(), *score))
        .collect();
    diag.cluster_filter = match &labels {
        Some(labels) => filter_by_cluster_limit(
            &signals.to_buy,
            labels,
            &to_hold,
            config.cluster.max_per_cluster,
            Some(&replaceable_scores),
        ),
        None => ClusterFilterResult {
            approved: signals.to_buy.clone(),
            ..ClusterFilterResult::default()
        },
    };
    let replaced: BTreeSet<String> = diag
        .cluster_filter
        .replacements
        .iter()
        .map(|r| r.replaced.clone())
        .collect();
    for symbol in &replaced {
        to_hold.remove(symbol);
    }

    // 6. sizing
    let mut candidates = Vec::new();
    let mut frozen = BTreeSet::new();
    for symbol in to_hold.iter().chain(diag.cluster_filter.approved.iter()) {
        let vol = universe.get(symbol).and_then(|s| {
            estimate_volatility(
                s,
                as_of,
                config.sizing.volatility_method,
                config.sizing.volatility_window,
                config.sizing.ewma_lambda,
            )
        });
        match (vol, fill_prices.contains_key(symbol)) {
            (Some(volatility), true) => candidates.push(SizingCandidate {
                symbol: symbol.clone(),
                volatility,
                cluster: labels
                    .as_ref()
                    .and_then(|l| l.get(symbol).copied())
                    .unwrap_or(usize::MAX),
            }),
            _ if held.contains(symbol) => {
                frozen.insert(symbol.clone());
            }
            _ => {
                let msg = format!("{symbol}: no volatility or price on {as_of}, entry skipped");
                warn!(symbol = %symbol, "no volatility or price, entry skipped");
                diag.warnings.push(msg);
            }
        }
    }
    // Frozen holdings keep their value but still count against the caps.
    let mut fixed: Vec<FixedAllocation> = frozen
        .iter()
        .filter_map(|symbol| {
            let position = risk.positions.get(symbol)?;
            Some(FixedAllocation {
                symbol: symbol.clone(),
                cluster: labels
                    .as_ref()
                    .and_then(|l| l.get(symbol).copied())
                    .unwrap_or(usize::MAX),
                value: position.market_value(),
            })
        })
        .collect();
    // Without clustering every holding is its own cluster.
    if labels.is_none() {
        for (i, c) in candidates.iter_mut().enumerate() {
            c.cluster = i;
        }
        for (i, f) in fixed.iter_mut().enumerate() {
            f.cluster = candidates.len() + i;
        }
    }
    if !fixed.is_empty() {
        debug!(frozen = ?frozen, "holdings without a fill counted as fixed allocations");
    }
    diag.sizing = size_portfolio_with_fixed(&candidates, &fixed, risk.equity, &config.sizing);

    // 7. trade diff
    let current: BTreeMap<String, i64> = risk
        .positions
        .iter()
        .filter(|(symbol, _)| !frozen.contains(*symbol))
        .map(|(symbol, p)| (symbol.clone(), p.shares))
        .collect();
    let mut trades = compute_rebalance_trades(
        &current,
        &diag.sizing.targets(),
        &fill_prices,
        config.sizing.min_trade_amount,
        config.sizing.lot_size,
    );
    if risk.circuit_breaker.triggered {
        trades.retain(|t| t.action == OrderAction::Sell);
    }

    // 8. T+1 deferral
    let mut cancelled_candidates = BTreeSet::new();
    trades.retain(|t| {
        if t.action != OrderAction::Sell {
            return true;
        }
        let Some(position) = risk.positions.get(&t.symbol) else {
            return true;
        };
        if universe.calendar.can_sell(position.entry_date, as_of) {
            return true;
        }
        info!(symbol = %t.symbol, entry = %position.entry_date, "sell deferred by T+1");
        diag.deferred_sells.push(t.symbol.clone());
        for r in &diag.cluster_filter.replacements {
            if r.replaced == t.symbol {
                cancelled_candidates.insert(r.candidate.clone());
            }
        }
        false
    });
    trades.retain(|t| {
        if t.action == OrderAction::Buy && cancelled_candidates.contains(&t.symbol) {
            diag.cancelled_buys.push(t.symbol.clone());
            false
        } else {
            true
        }
    });

    // 9. fills
    let rank_exits: BTreeSet<String> = signals.to_sell.iter().cloned().collect();
    let requests: Vec<OrderRequest> = trades
        .iter()
        .map(|t| OrderRequest {
            symbol: t.symbol.clone(),
            action: t.action,
            shares: t.shares,
            reason: match t.action {
                OrderAction::Sell => sell_reason(&t.symbol, t, &risk, &rank_exits, &replaced),
                OrderAction::Buy if held.contains(&t.symbol) => OrderReason::Rebalance,
                OrderAction::Buy => OrderReason::NewEntry,
            },
        })
        .collect();
    let atrs: BTreeMap<String, f64> = requests
        .iter()
        .filter(|r| r.action == OrderAction::Buy)
        .filter_map(|r| {
            let series = universe.get(&r.symbol)?;
            atr_at(series, as_of, &config.risk).map(|atr| (r.symbol.clone(), atr))
        })
        .collect();

    let base = PortfolioSnapshot {
        as_of: prior.as_of,
        holdings: risk.positions.clone(),
        cash: prior.cash,
        total_value: risk.equity,
        cluster_assignment: assignment.clone(),
        metadata: prior.metadata.clone(),
    };
    let ctx = FillContext {
        as_of,
        prices: &fill_prices,
        atrs: &atrs,
        atr_multiplier: config.risk.atr_multiplier,
        lot_size: config.sizing.lot_size,
    };
    let outcome = apply_orders(&base, &requests, &ctx, &config.execution);
    diag.warnings.extend(outcome.warnings);

    let mut snapshot = outcome.snapshot;
    snapshot.metadata.peak_equity = risk.peak_equity.max(snapshot.total_value);
    snapshot.metadata.cycle_count += 1;

    info!(
        %as_of,
        orders = outcome.orders.len(),
        holdings = snapshot.position_count(),
        total_value = snapshot.total_value,
        "cycle complete"
    );

    diag.signals = signals;
    diag.cluster_assignment = assignment;
    diag.risk = risk;

    Ok(CycleOutput {
        orders: outcome.orders,
        snapshot,
        diagnostics: diag,
    })
}

/// Close one holding by hand at `price` on `date`.
///
/// Unlike the automated cycle, a T+1 conflict is an error here.
pub fn close_position(
    prior: &PortfolioSnapshot,
    symbol: &str,
    price: f64,
    date: NaiveDate,
    calendar: &TradingCalendar,
    config: &EngineConfig,
) -> Result<(PortfolioSnapshot, TradeOrder), RotatorError> {
    let position = prior
        .get_position(symbol)
        .ok_or_else(|| RotatorError::UnknownPosition {
            symbol: symbol.to_string(),
        })?;
    if !calendar.can_sell(position.entry_date, date) {
        return Err(RotatorError::SettlementViolation {
            symbol: symbol.to_string(),
            entry_date: position.entry_date,
            date,
        });
    }

    let prices: BTreeMap<String, f64> = [(symbol.to_string(), price)].into();
    let atrs = BTreeMap::new();
    let ctx = FillContext {
        as_of: date,
        prices: &prices,
        atrs: &atrs,
        atr_multiplier: config.risk.atr_multiplier,
        lot_size: config.sizing.lot_size,
    };
    let request = OrderRequest {
        symbol: symbol.to_string(),
        action: OrderAction::Sell,
        shares: position.shares,
        reason: OrderReason::ManualClose,
    };
    let mut outcome = apply_orders(prior, &[request], &ctx, &config.execution);
    let order = outcome.orders.pop().ok_or_else(|| RotatorError::Snapshot {
        reason: format!("manual close of {symbol} produced no fill"),
    })?;
    info!(symbol, shares = order.shares, price = order.price, "position closed manually");
    Ok((outcome.snapshot, order))
}
