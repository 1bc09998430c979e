//! Configuration validation.
//!
//! Every check here is fatal: a run never starts on a config that fails one.

use crate::domain::cluster::ClusterConfig;
use crate::domain::config::{EngineConfig, RunConfig};
use crate::domain::error::RotatorError;
use crate::domain::execution::ExecutionConfig;
use crate::domain::momentum::MomentumConfig;
use crate::domain::risk::RiskConfig;
use crate::domain::signal::SignalStrategy;
use crate::domain::sizing::SizingConfig;

/// Allowed drift of the momentum weight sum from 1.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

pub fn validate_engine_config(config: &EngineConfig) -> Result<(), RotatorError> {
    validate_run(&config.run)?;
    validate_momentum(&config.momentum)?;
    validate_cluster(&config.cluster)?;
    validate_risk(&config.risk)?;
    validate_sizing(&config.sizing)?;
    validate_execution(&config.execution)?;
    if let Some(signal) = &config.signal {
        validate_signal(signal)?;
    }
    Ok(())
}

fn validate_run(run: &RunConfig) -> Result<(), RotatorError> {
    if !(run.initial_capital > 0.0) {
        return Err(RotatorError::invalid(
            "engine",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    if let (Some(start), Some(end)) = (run.start_date, run.end_date) {
        if start >= end {
            return Err(RotatorError::invalid(
                "engine",
                "start_date",
                "start_date must be before end_date",
            ));
        }
    }
    if run.rebalance_every == 0 {
        return Err(RotatorError::invalid(
            "engine",
            "rebalance_every",
            "rebalance_every must be at least 1",
        ));
    }
    Ok(())
}

fn validate_momentum(m: &MomentumConfig) -> Result<(), RotatorError> {
    if m.periods.is_empty() {
        return Err(RotatorError::invalid("momentum", "periods", "at least one period is required"));
    }
    if m.periods.iter().any(|&p| p == 0) {
        return Err(RotatorError::invalid("momentum", "periods", "periods must be positive"));
    }
    if m.periods.len() != m.weights.len() {
        return Err(RotatorError::invalid(
            "momentum",
            "weights",
            format!(
                "{} weights for {} periods",
                m.weights.len(),
                m.periods.len()
            ),
        ));
    }
    if m.weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(RotatorError::invalid("momentum", "weights", "weights must be non-negative"));
    }
    let sum: f64 = m.weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(RotatorError::invalid(
            "momentum",
            "weights",
            format!("weights must sum to 1, got {sum}"),
        ));
    }
    if m.buy_top_n == 0 {
        return Err(RotatorError::invalid("momentum", "buy_top_n", "buy_top_n must be at least 1"));
    }
    if m.hold_until_rank <= m.buy_top_n {
        return Err(RotatorError::invalid(
            "momentum",
            "hold_until_rank",
            "hold_until_rank must be greater than buy_top_n",
        ));
    }
    if !(m.inertia_bonus >= 0.0) {
        return Err(RotatorError::invalid(
            "momentum",
            "inertia_bonus",
            "inertia_bonus must be non-negative",
        ));
    }
    Ok(())
}

fn validate_cluster(c: &ClusterConfig) -> Result<(), RotatorError> {
    if !(-1.0..=1.0).contains(&c.correlation_threshold) {
        return Err(RotatorError::invalid(
            "cluster",
            "correlation_threshold",
            "correlation_threshold must be between -1 and 1",
        ));
    }
    if c.lookback < 3 {
        return Err(RotatorError::invalid("cluster", "lookback", "lookback must be at least 3"));
    }
    if c.max_per_cluster == 0 {
        return Err(RotatorError::invalid(
            "cluster",
            "max_per_cluster",
            "max_per_cluster must be at least 1",
        ));
    }
    if c.update_frequency == 0 {
        return Err(RotatorError::invalid(
            "cluster",
            "update_frequency",
            "update_frequency must be at least 1",
        ));
    }
    if !(c.min_coverage > 0.0 && c.min_coverage <= 1.0) {
        return Err(RotatorError::invalid(
            "cluster",
            "min_coverage",
            "min_coverage must be in (0, 1]",
        ));
    }
    Ok(())
}

fn validate_risk(r: &RiskConfig) -> Result<(), RotatorError> {
    if r.atr_period == 0 {
        return Err(RotatorError::invalid("risk", "atr_period", "atr_period must be at least 1"));
    }
    if !(r.atr_multiplier > 0.0) {
        return Err(RotatorError::invalid(
            "risk",
            "atr_multiplier",
            "atr_multiplier must be positive",
        ));
    }
    if r.min_profit_atr_multiples < 0.0 {
        return Err(RotatorError::invalid(
            "risk",
            "min_profit_atr_multiples",
            "min_profit_atr_multiples must be non-negative",
        ));
    }
    if !(r.market_drop_threshold > -1.0 && r.market_drop_threshold < 0.0) {
        return Err(RotatorError::invalid(
            "risk",
            "market_drop_threshold",
            "market_drop_threshold must be in (-1, 0)",
        ));
    }
    if !(r.account_drawdown_threshold > -1.0 && r.account_drawdown_threshold < 0.0) {
        return Err(RotatorError::invalid(
            "risk",
            "account_drawdown_threshold",
            "account_drawdown_threshold must be in (-1, 0)",
        ));
    }
    if r.liquidity_window == 0 {
        return Err(RotatorError::invalid(
            "risk",
            "liquidity_window",
            "liquidity_window must be at least 1",
        ));
    }
    if r.min_avg_amount < 0.0 || r.max_spread_pct < 0.0 {
        return Err(RotatorError::invalid(
            "risk",
            "min_avg_amount",
            "liquidity limits must be non-negative",
        ));
    }
    Ok(())
}

fn check_fraction(value: f64, key: &str) -> Result<(), RotatorError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(RotatorError::invalid("sizing", key, format!("{key} must be in (0, 1]")))
    }
}

fn validate_sizing(s: &SizingConfig) -> Result<(), RotatorError> {
    check_fraction(s.target_risk_pct, "target_risk_pct")?;
    check_fraction(s.max_position_pct, "max_position_pct")?;
    check_fraction(s.max_cluster_pct, "max_cluster_pct")?;
    check_fraction(s.max_total_exposure, "max_total_exposure")?;
    if s.max_position_pct > s.max_cluster_pct {
        return Err(RotatorError::invalid(
            "sizing",
            "max_position_pct",
            "max_position_pct must not exceed max_cluster_pct",
        ));
    }
    if s.volatility_window < 2 {
        return Err(RotatorError::invalid(
            "sizing",
            "volatility_window",
            "volatility_window must be at least 2",
        ));
    }
    if !(s.ewma_lambda > 0.0 && s.ewma_lambda < 1.0) {
        return Err(RotatorError::invalid("sizing", "ewma_lambda", "ewma_lambda must be in (0, 1)"));
    }
    if s.min_trade_amount < 0.0 {
        return Err(RotatorError::invalid(
            "sizing",
            "min_trade_amount",
            "min_trade_amount must be non-negative",
        ));
    }
    if s.lot_size < 1 {
        return Err(RotatorError::invalid("sizing", "lot_size", "lot_size must be at least 1"));
    }
    Ok(())
}

fn validate_execution(e: &ExecutionConfig) -> Result<(), RotatorError> {
    for (key, value) in [
        ("commission_per_trade", e.commission_per_trade),
        ("commission_pct", e.commission_pct),
        ("slippage_pct", e.slippage_pct),
    ] {
        if value < 0.0 {
            return Err(RotatorError::invalid(
                "execution",
                key,
                format!("{key} must be non-negative"),
            ));
        }
    }
    Ok(())
}

fn validate_signal(signal: &SignalStrategy) -> Result<(), RotatorError> {
    match *signal {
        SignalStrategy::Momentum { period, threshold } => {
            if period == 0 {
                return Err(RotatorError::invalid("signal", "period", "period must be at least 1"));
            }
            if threshold < 0.0 {
                return Err(RotatorError::invalid(
                    "signal",
                    "threshold",
                    "threshold must be non-negative",
                ));
            }
        }
        SignalStrategy::MovingAverageCross { fast, slow } => {
            if fast == 0 || fast >= slow {
                return Err(RotatorError::invalid(
                    "signal",
                    "fast",
                    "fast period must be positive and shorter than slow",
                ));
            }
        }
        SignalStrategy::Rsi {
            period,
            oversold,
            overbought,
        } => {
            if period == 0 {
                return Err(RotatorError::invalid("signal", "period", "period must be at least 1"));
            }
            if !(0.0..=100.0).contains(&oversold)
                || !(0.0..=100.0).contains(&overbought)
                || oversold >= overbought
            {
                return Err(RotatorError::invalid(
                    "signal",
                    "oversold",
                    "need 0 <= oversold < overbought <= 100",
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_of(result: Result<(), RotatorError>) -> String {
        match result {
            Err(RotatorError::ConfigInvalid { key, .. }) => key,
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_engine_config(&EngineConfig::default()).is_ok());
    }

    #[test]
    fn weights_must_sum_to_one() {
        let mut config = EngineConfig::default();
        config.momentum.weights = vec![0.4, 0.3, 0.2];
        assert_eq!(key_of(validate_engine_config(&config)), "weights");
    }

    #[test]
    fn weight_sum_tolerance() {
        let mut config = EngineConfig::default();
        config.momentum.weights = vec![0.4, 0.3, 0.3 + 1e-9];
        assert!(validate_engine_config(&config).is_ok());
    }

    #[test]
    fn periods_and_weights_same_length() {
        let mut config = EngineConfig::default();
        config.momentum.periods = vec![20, 60];
        assert_eq!(key_of(validate_engine_config(&config)), "weights");
    }

    #[test]
    fn hold_rank_above_buy_rank() {
        let mut config = EngineConfig::default();
        config.momentum.buy_top_n = 8;
        config.momentum.hold_until_rank = 8;
        assert_eq!(key_of(validate_engine_config(&config)), "hold_until_rank");
    }

    #[test]
    fn position_cap_within_cluster_cap() {
        let mut config = EngineConfig::default();
        config.sizing.max_position_pct = 0.5;
        config.sizing.max_cluster_pct = 0.4;
        assert_eq!(key_of(validate_engine_config(&config)), "max_position_pct");
    }

    #[test]
    fn caps_within_unit_interval() {
        let mut config = EngineConfig::default();
        config.sizing.max_total_exposure = 1.5;
        assert_eq!(key_of(validate_engine_config(&config)), "max_total_exposure");

        let mut config = EngineConfig::default();
        config.sizing.max_cluster_pct = 0.0;
        assert_eq!(key_of(validate_engine_config(&config)), "max_cluster_pct");
    }

    #[test]
    fn capital_must_be_positive() {
        let mut config = EngineConfig::default();
        config.run.initial_capital = 0.0;
        assert_eq!(key_of(validate_engine_config(&config)), "initial_capital");
    }

    #[test]
    fn dates_ordered() {
        let mut config = EngineConfig::default();
        config.run.start_date = chrono::NaiveDate::from_ymd_opt(2024, 6, 1);
        config.run.end_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 1);
        assert_eq!(key_of(validate_engine_config(&config)), "start_date");
    }

    #[test]
    fn signal_parameters_checked() {
        let mut config = EngineConfig::default();
        config.signal = Some(SignalStrategy::MovingAverageCross { fast: 30, slow: 10 });
        assert_eq!(key_of(validate_engine_config(&config)), "fast");

        config.signal = Some(SignalStrategy::Rsi {
            period: 14,
            oversold: 70.0,
            overbought: 30.0,
        });
        assert_eq!(key_of(validate_engine_config(&config)), "oversold");
    }

    #[test]
    fn breaker_thresholds_strictly_negative() {
        let mut config = EngineConfig::default();
        config.risk.account_drawdown_threshold = 0.0;
        assert_eq!(key_of(validate_engine_config(&config)), "account_drawdown_threshold");

        let mut config = EngineConfig::default();
        config.risk.market_drop_threshold = 0.0;
        assert_eq!(key_of(validate_engine_config(&config)), "market_drop_threshold");

        let mut config = EngineConfig::default();
        config.risk.market_drop_threshold = -1.0;
        assert_eq!(key_of(validate_engine_config(&config)), "market_drop_threshold");

        let mut config = EngineConfig::default();
        config.risk.account_drawdown_threshold = -0.0001;
        assert!(validate_engine_config(&config).is_ok());
    }

    #[test]
    fn negative_costs_rejected() {
        let mut config = EngineConfig::default();
        config.execution.slippage_pct = -0.1;
        assert_eq!(key_of(validate_engine_config(&config)), "slippage_pct");
    }
}
