//! Risk monitor: trailing stops, time stops, liquidity and circuit breakers.
//!
//! Per-position state (highest price, stop line) lives on [`Position`] and is
//! advanced bar by bar from the previous snapshot date to the current one.
//! The circuit breaker has no memory: it is recomputed every cycle from the
//! benchmark and the account's peak equity.

use crate::domain::calendar::TradingCalendar;
use crate::domain::error::RotatorError;
use crate::domain::indicator::{calculate_atr, AtrMethod};
use crate::domain::order::OrderReason;
use crate::domain::portfolio::PortfolioSnapshot;
use crate::domain::position::Position;
use crate::domain::series::InstrumentSeries;
use crate::domain::universe::UniverseData;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    pub atr_period: usize,
    pub atr_method: AtrMethod,
    /// Stop distance below the highest price, in ATRs.
    pub atr_multiplier: f64,
    /// Trading days after which a position must show progress; 0 disables.
    pub max_hold_days: usize,
    /// Required profit per share at the time stop, in ATRs.
    pub min_profit_atr_multiples: f64,
    pub market_lookback: usize,
    /// Benchmark return over `market_lookback` bars at or below which the
    /// breaker trips.
    pub market_drop_threshold: f64,
    /// Equity drawdown from peak at or below which the breaker trips.
    pub account_drawdown_threshold: f64,
    pub liquidity_window: usize,
    /// Minimum average daily traded amount; 0 disables the check.
    pub min_avg_amount: f64,
    pub max_spread_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            atr_period: 14,
            atr_method: AtrMethod::Wilder,
            atr_multiplier: 3.0,
            max_hold_days: 20,
            min_profit_atr_multiples: 1.0,
            market_lookback: 5,
            market_drop_threshold: -0.05,
            account_drawdown_threshold: -0.03,
            liquidity_window: 20,
            min_avg_amount: 1_000_000.0,
            max_spread_pct: 0.005,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskAction {
    SellAtrStop,
    SellTimeStop,
    WarningLowLiquidity,
    WarningWideSpread,
    HoldT1Locked,
}

impl fmt::Display for RiskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskAction::SellAtrStop => "sell_atr_stop",
            RiskAction::SellTimeStop => "sell_time_stop",
            RiskAction::WarningLowLiquidity => "warning_low_liquidity",
            RiskAction::WarningWideSpread => "warning_wide_spread",
            RiskAction::HoldT1Locked => "hold_t1_locked",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskStatus {
    pub symbol: String,
    pub atr_stop_triggered: bool,
    pub time_stop_triggered: bool,
    pub liquidity_ok: bool,
    pub can_sell_today: bool,
    pub atr: Option<f64>,
    pub stop_line: f64,
    pub actions: Vec<RiskAction>,
    pub warnings: Vec<String>,
}

impl RiskStatus {
    fn unevaluated(position: &Position, can_sell_today: bool, warning: String) -> Self {
        RiskStatus {
            symbol: position.symbol.clone(),
            atr_stop_triggered: false,
            time_stop_triggered: false,
            liquidity_ok: true,
            can_sell_today,
            atr: None,
            stop_line: position.stop_line,
            actions: if can_sell_today {
                Vec::new()
            } else {
                vec![RiskAction::HoldT1Locked]
            },
            warnings: vec![warning],
        }
    }

    pub fn must_exit(&self) -> bool {
        self.atr_stop_triggered || self.time_stop_triggered
    }

    /// Order reason for a risk exit; the ATR stop wins over the time stop.
    pub fn exit_reason(&self) -> Option<OrderReason> {
        if self.atr_stop_triggered {
            Some(OrderReason::AtrStop)
        } else if self.time_stop_triggered {
            Some(OrderReason::TimeStop)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CircuitBreakerState {
    pub triggered: bool,
    pub reasons: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PortfolioRiskReport {
    pub statuses: BTreeMap<String, RiskStatus>,
    /// Holdings with stop state advanced to the evaluation date.
    #[serde(skip)]
    pub positions: BTreeMap<String, Position>,
    pub circuit_breaker: CircuitBreakerState,
    /// Equity of the prior holdings marked at the evaluation date.
    pub equity: f64,
    pub peak_equity: f64,
    pub warnings: Vec<String>,
}

impl PortfolioRiskReport {
    /// Symbols a risk rule wants out, whether or not they can be sold today.
    pub fn forced_sells(&self) -> BTreeSet<String> {
        self.statuses
            .values()
            .filter(|s| s.must_exit())
            .map(|s| s.symbol.clone())
            .collect()
    }
}

/// ATR of `series` as of `as_of`, if past warmup.
pub fn atr_at(series: &InstrumentSeries, as_of: NaiveDate, config: &RiskConfig) -> Option<f64> {
    calculate_atr(series.bars_until(as_of), config.atr_period, config.atr_method).last_valid()
}

/// Stop line for a position opened at `entry_price`.
pub fn initial_stop(entry_price: f64, atr: f64, multiplier: f64) -> f64 {
    entry_price - multiplier * atr
}

/// One Chandelier step: raise the high-water mark, then ratchet the stop.
/// The stop never moves down.
pub fn ratchet_stop(position: &mut Position, high: f64, atr: f64, multiplier: f64) {
    if high > position.highest_price_since_entry {
        position.highest_price_since_entry = high;
    }
    let candidate = position.highest_price_since_entry - multiplier * atr;
    if candidate > position.stop_line {
        position.stop_line = candidate;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopAdvance {
    pub position: Position,
    /// A close at or below the stop line occurred on some advanced bar.
    pub breached: bool,
    pub atr: f64,
}

/// Advance `position` over every bar in `(since, as_of]`.
pub fn advance_stop(
    position: &Position,
    series: &InstrumentSeries,
    since: NaiveDate,
    as_of: NaiveDate,
    config: &RiskConfig,
) -> Result<StopAdvance, RotatorError> {
    let history = series.bars_until(as_of);
    let atr_series = calculate_atr(history, config.atr_period, config.atr_method);
    let atr = atr_series.last_valid().ok_or(RotatorError::InsufficientData {
        symbol: position.symbol.clone(),
        bars: history.len(),
        minimum: config.atr_period,
    })?;

    let mut advanced = position.clone();
    let mut breached = false;
    // Bars on or before the entry date do not move the stop.
    let start = since.max(position.entry_date);
    for bar in series.bars_between(start, as_of) {
        if let Some(bar_atr) = atr_series.value_on(bar.date) {
            ratchet_stop(&mut advanced, bar.high, bar_atr, config.atr_multiplier);
        }
        advanced.last_price = bar.close;
        if advanced.is_stopped_out(bar.close) {
            breached = true;
        }
    }
    if let Some(close) = series.close_at(as_of) {
        advanced.last_price = close;
        breached |= advanced.is_stopped_out(close);
    }

    Ok(StopAdvance {
        position: advanced,
        breached,
        atr,
    })
}

/// Held at least `max_hold_days` trading days without making
/// `min_profit_atr_multiples` ATRs per share.
pub fn time_stop_triggered(
    position: &Position,
    close: f64,
    atr: f64,
    as_of: NaiveDate,
    calendar: &TradingCalendar,
    config: &RiskConfig,
) -> bool {
    if config.max_hold_days == 0 {
        return false;
    }
    let held = calendar.trading_days_between(position.entry_date, as_of);
    held >= config.max_hold_days
        && position.profit_per_share(close) < config.min_profit_atr_multiples * atr
}

/// Average close × volume over the trailing window, or `None` without bars.
pub fn average_amount(series: &InstrumentSeries, as_of: NaiveDate, window: usize) -> Option<f64> {
    let bars = series.bars_until(as_of);
    let tail = &bars[bars.len().saturating_sub(window.max(1))..];
    if tail.is_empty() {
        return None;
    }
    Some(tail.iter().map(|b| b.amount()).sum::<f64>() / tail.len() as f64)
}

/// Advance one position and evaluate every per-position rule.
///
/// Evaluation failures never force a sell: the position is returned as is
/// with a warning attached.
pub fn check_position_risk(
    position: &Position,
    series: Option<&InstrumentSeries>,
    since: NaiveDate,
    as_of: NaiveDate,
    calendar: &TradingCalendar,
    spread: Option<f64>,
    config: &RiskConfig,
) -> (Position, RiskStatus) {
    let can_sell_today = calendar.can_sell(position.entry_date, as_of);

    let Some(series) = series else {
        let warning = format!("{}: no price series, risk not evaluated", position.symbol);
        warn!(symbol = %position.symbol, "no price series, risk not evaluated");
        return (
            position.clone(),
            RiskStatus::unevaluated(position, can_sell_today, warning),
        );
    };

    let advance = match advance_stop(position, series, since, as_of, config) {
        Ok(advance) => advance,
        Err(e) => {
            warn!(symbol = %position.symbol, error = %e, "risk not evaluated");
            return (
                position.clone(),
                RiskStatus::unevaluated(position, can_sell_today, format!("{}: {e}", position.symbol)),
            );
        }
    };

    let advanced = advance.position;
    let close = advanced.last_price;
    let atr_stop_triggered = advance.breached;
    let time_stop_triggered =
        time_stop_triggered(&advanced, close, advance.atr, as_of, calendar, config);

    let mut actions = Vec::new();
    let mut warnings = Vec::new();
    if atr_stop_triggered {
        actions.push(RiskAction::SellAtrStop);
    }
    if time_stop_triggered {
        actions.push(RiskAction::SellTimeStop);
    }

    let liquidity_ok = if config.min_avg_amount > 0.0 {
        match average_amount(series, as_of, config.liquidity_window) {
            Some(avg) => avg >= config.min_avg_amount,
            None => {
                warnings.push(format!("{}: no bars for liquidity check", position.symbol));
                true
            }
        }
    } else {
        true
    };
    if !liquidity_ok {
        actions.push(RiskAction::WarningLowLiquidity);
    }
    if spread.is_some_and(|s| s > config.max_spread_pct) {
        actions.push(RiskAction::WarningWideSpread);
    }
    if !can_sell_today {
        actions.push(RiskAction::HoldT1Locked);
    }

    if !actions.is_empty() {
        debug!(symbol = %position.symbol, ?actions, stop = advanced.stop_line, "risk actions");
    }

    let status = RiskStatus {
        symbol: position.symbol.clone(),
        atr_stop_triggered,
        time_stop_triggered,
        liquidity_ok,
        can_sell_today,
        atr: Some(advance.atr),
        stop_line: advanced.stop_line,
        actions,
        warnings,
    };
    (advanced, status)
}

/// Market and account circuit breakers for `as_of`.
pub fn check_circuit_breaker(
    benchmark: Option<&InstrumentSeries>,
    as_of: NaiveDate,
    equity: f64,
    peak_equity: f64,
    config: &RiskConfig,
) -> CircuitBreakerState {
    let mut state = CircuitBreakerState::default();

    if let Some(benchmark) = benchmark {
        let bars = benchmark.bars_until(as_of);
        if bars.len() > config.market_lookback && config.market_lookback > 0 {
            let last = bars[bars.len() - 1].close;
            let base = bars[bars.len() - 1 - config.market_lookback].close;
            if base > 0.0 {
                let market_return = last / base - 1.0;
                if market_return <= config.market_drop_threshold {
                    state.triggered = true;
                    state.reasons.push(format!(
                        "{} fell {:.2}% over {} bars",
                        benchmark.symbol,
                        market_return * 100.0,
                        config.market_lookback
                    ));
                    state
                        .recommendations
                        .push("suspend new entries until the market stabilizes".to_string());
                }
            }
        } else {
            debug!(
                bars = bars.len(),
                lookback = config.market_lookback,
                "benchmark history too short for market breaker"
            );
        }
    }

    if peak_equity > 0.0 {
        let drawdown = equity / peak_equity - 1.0;
        if drawdown <= config.account_drawdown_threshold {
            state.triggered = true;
            state.reasons.push(format!(
                "account equity {:.2}% below peak",
                drawdown * 100.0
            ));
            state
                .recommendations
                .push("review exposure and tighten stops".to_string());
        }
    }

    if state.triggered {
        info!(%as_of, reasons = ?state.reasons, "circuit breaker tripped");
    }
    state
}

/// Advance every holding of `prior` to `as_of` and evaluate position and
/// portfolio rules.
pub fn check_portfolio_risk(
    prior: &PortfolioSnapshot,
    universe: &UniverseData,
    as_of: NaiveDate,
    config: &RiskConfig,
) -> PortfolioRiskReport {
    let mut report = PortfolioRiskReport::default();

    for (symbol, position) in &prior.holdings {
        let (advanced, status) = check_position_risk(
            position,
            universe.get(symbol),
            prior.as_of,
            as_of,
            &universe.calendar,
            universe.spreads.get(symbol).copied(),
            config,
        );
        report.warnings.extend(status.warnings.iter().cloned());
        report.positions.insert(symbol.clone(), advanced);
        report.statuses.insert(symbol.clone(), status);
    }

    let equity = prior.cash
        + report
            .positions
            .values()
            .map(Position::market_value)
            .sum::<f64>();
    let peak_equity = prior.metadata.peak_equity.max(equity);
    report.circuit_breaker = check_circuit_breaker(
        universe.benchmark.as_ref(),
        as_of,
        equity,
        peak_equity,
        config,
    );
    report.equity = equity;
    report.peak_equity = peak_equity;
    report
}
