//! Performance summary of a replay.

use super::order::{OrderAction, TradeOrder};
use super::portfolio::EquityPoint;
use super::replay::ReplayResult;
use serde::Serialize;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub initial_value: f64,
    pub final_value: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    /// Longest run of trading days below a prior peak.
    pub max_drawdown_duration: i64,
    pub order_count: usize,
    pub buy_count: usize,
    pub sell_count: usize,
    /// Traded value over average equity.
    pub turnover: f64,
}

impl Metrics {
    pub fn compute(
        equity_curve: &[EquityPoint],
        orders: &[TradeOrder],
        initial_value: f64,
        risk_free_rate: f64,
    ) -> Self {
        let final_value = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_value);

        let total_return = if initial_value > 0.0 {
            (final_value - initial_value) / initial_value
        } else {
            0.0
        };

        let trading_days = equity_curve.len() as f64;
        let years = trading_days / TRADING_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return.is_finite() && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);

        let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(equity_curve, daily_rf);

        let buy_count = orders
            .iter()
            .filter(|o| o.action == OrderAction::Buy)
            .count();
        let traded: f64 = orders.iter().map(|o| o.value()).sum();
        let average_equity = if equity_curve.is_empty() {
            initial_value
        } else {
            equity_curve.iter().map(|p| p.equity).sum::<f64>() / trading_days
        };
        let turnover = if average_equity > 0.0 {
            traded / average_equity
        } else {
            0.0
        };

        Metrics {
            initial_value,
            final_value,
            total_return,
            annualized_return,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            order_count: orders.len(),
            buy_count,
            sell_count: orders.len() - buy_count,
            turnover,
        }
    }

    pub fn from_replay(result: &ReplayResult, risk_free_rate: f64) -> Self {
        Metrics::compute(
            &result.equity_curve,
            &result.orders,
            result.initial.total_value,
            risk_free_rate,
        )
    }
}

fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, i64) {
    if equity_curve.is_empty() {
        return (0.0, 0);
    }

    let mut peak = equity_curve[0].equity;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0i64;
    let mut current_dd_duration = 0i64;

    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
            current_dd_duration = 0;
        } else if peak > 0.0 && point.equity < peak {
            let dd = (peak - point.equity) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
            current_dd_duration += 1;
            if current_dd_duration > max_dd_duration {
                max_dd_duration = current_dd_duration;
            }
        }
    }

    (max_dd, max_dd_duration)
}

fn compute_risk_adjusted(equity_curve: &[EquityPoint], daily_rf: f64) -> (f64, f64) {
    if equity_curve.len() < 2 {
        return (0.0, 0.0);
    }

    let returns: Vec<f64> = equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].equity;
            let curr = w[1].equity;
            if prev > 0.0 {
                (curr - prev) / prev
            } else {
                0.0
            }
        })
        .collect();

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;

    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    let excess_return = mean - daily_rf;

    let sharpe = if stddev > 0.0 {
        (excess_return / stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    let downside: f64 = returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|&r| (r - daily_rf).powi(2))
        .sum();
    let downside_stddev = (downside / n).sqrt();

    let sortino = if downside_stddev > 0.0 {
        (excess_return / downside_stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    (sharpe, sortino)
}
