//! Typed engine configuration and its construction from a [`ConfigPort`].
//!
//! Sections: `[engine]`, `[momentum]`, `[cluster]`, `[risk]`, `[sizing]`,
//! `[execution]`, `[signal]`. Missing keys take the defaults of each
//! sub-config; malformed values are `ConfigInvalid`.

use crate::domain::cluster::{ClusterConfig, Linkage};
use crate::domain::config_validation::validate_engine_config;
use crate::domain::error::RotatorError;
use crate::domain::execution::ExecutionConfig;
use crate::domain::indicator::AtrMethod;
use crate::domain::momentum::{InertiaMode, MomentumConfig};
use crate::domain::risk::RiskConfig;
use crate::domain::signal::SignalStrategy;
use crate::domain::sizing::{SizingConfig, VolatilityMethod};
use crate::domain::universe::{parse_symbols, MIN_OHLCV_BARS};
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Run-level settings: capital, date range, data locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub initial_capital: f64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Trading days between rebalances in a replay.
    pub rebalance_every: usize,
    pub data_dir: PathBuf,
    pub exchange: String,
    pub symbols: Vec<String>,
    pub benchmark: Option<String>,
    pub snapshot_dir: Option<PathBuf>,
    pub min_bars: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            initial_capital: 100_000.0,
            start_date: None,
            end_date: None,
            rebalance_every: 5,
            data_dir: PathBuf::from("data"),
            exchange: "SH".to_string(),
            symbols: Vec::new(),
            benchmark: None,
            snapshot_dir: None,
            min_bars: MIN_OHLCV_BARS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub run: RunConfig,
    pub momentum: MomentumConfig,
    pub cluster: ClusterConfig,
    pub risk: RiskConfig,
    pub sizing: SizingConfig,
    pub execution: ExecutionConfig,
    pub signal: Option<SignalStrategy>,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), RotatorError> {
        validate_engine_config(self)
    }
}

fn get_usize(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, RotatorError> {
    let value = config.get_int(section, key, default as i64);
    usize::try_from(value)
        .map_err(|_| RotatorError::invalid(section, key, format!("{key} must be non-negative")))
}

fn get_parsed<T: FromStr<Err = String>>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, RotatorError> {
    match config.get_string(section, key) {
        Some(raw) => raw.parse().map_err(|e: String| RotatorError::invalid(section, key, e)),
        None => Ok(default),
    }
}

fn get_list<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: Vec<T>,
) -> Result<Vec<T>, RotatorError> {
    let Some(raw) = config.get_string(section, key) else {
        return Ok(default);
    };
    raw.split(',')
        .map(|token| {
            token.trim().parse::<T>().map_err(|_| {
                RotatorError::invalid(section, key, format!("invalid list element '{}'", token.trim()))
            })
        })
        .collect()
}

fn get_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDate>, RotatorError> {
    config
        .get_string(section, key)
        .map(|s| {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
                RotatorError::invalid(section, key, "invalid date format (expected YYYY-MM-DD)")
            })
        })
        .transpose()
}

fn non_empty(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn build_run_config(config: &dyn ConfigPort) -> Result<RunConfig, RotatorError> {
    let defaults = RunConfig::default();
    let symbols = match non_empty(config, "engine", "symbols") {
        Some(list) => parse_symbols(&list)
            .map_err(|e| RotatorError::invalid("engine", "symbols", e.to_string()))?,
        None => Vec::new(),
    };

    Ok(RunConfig {
        initial_capital: config.get_double("engine", "initial_capital", defaults.initial_capital),
        start_date: get_date(config, "engine", "start_date")?,
        end_date: get_date(config, "engine", "end_date")?,
        rebalance_every: get_usize(config, "engine", "rebalance_every", defaults.rebalance_every)?,
        data_dir: non_empty(config, "engine", "data_dir")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir),
        exchange: non_empty(config, "engine", "exchange").unwrap_or(defaults.exchange),
        symbols,
        benchmark: non_empty(config, "engine", "benchmark").map(|s| s.to_uppercase()),
        snapshot_dir: non_empty(config, "engine", "snapshot_dir").map(PathBuf::from),
        min_bars: get_usize(config, "engine", "min_bars", defaults.min_bars)?,
    })
}

pub fn build_momentum_config(config: &dyn ConfigPort) -> Result<MomentumConfig, RotatorError> {
    let d = MomentumConfig::default();
    Ok(MomentumConfig {
        periods: get_list(config, "momentum", "periods", d.periods)?,
        weights: get_list(config, "momentum", "weights", d.weights)?,
        buy_top_n: get_usize(config, "momentum", "buy_top_n", d.buy_top_n)?,
        hold_until_rank: get_usize(config, "momentum", "hold_until_rank", d.hold_until_rank)?,
        inertia_bonus: config.get_double("momentum", "inertia_bonus", d.inertia_bonus),
        inertia_mode: get_parsed::<InertiaMode>(config, "momentum", "inertia_mode", d.inertia_mode)?,
    })
}

pub fn build_cluster_config(config: &dyn ConfigPort) -> Result<ClusterConfig, RotatorError> {
    let d = ClusterConfig::default();
    Ok(ClusterConfig {
        enabled: config.get_bool("cluster", "enabled", d.enabled),
        lookback: get_usize(config, "cluster", "lookback", d.lookback)?,
        correlation_threshold: config.get_double(
            "cluster",
            "correlation_threshold",
            d.correlation_threshold,
        ),
        linkage: get_parsed::<Linkage>(config, "cluster", "linkage", d.linkage)?,
        max_per_cluster: get_usize(config, "cluster", "max_per_cluster", d.max_per_cluster)?,
        update_frequency: get_usize(config, "cluster", "update_frequency", d.update_frequency)?,
        min_coverage: config.get_double("cluster", "min_coverage", d.min_coverage),
        max_fill: get_usize(config, "cluster", "max_fill", d.max_fill)?,
    })
}

pub fn build_risk_config(config: &dyn ConfigPort) -> Result<RiskConfig, RotatorError> {
    let d = RiskConfig::default();
    Ok(RiskConfig {
        atr_period: get_usize(config, "risk", "atr_period", d.atr_period)?,
        atr_method: get_parsed::<AtrMethod>(config, "risk", "atr_method", d.atr_method)?,
        atr_multiplier: config.get_double("risk", "atr_multiplier", d.atr_multiplier),
        max_hold_days: get_usize(config, "risk", "max_hold_days", d.max_hold_days)?,
        min_profit_atr_multiples: config.get_double(
            "risk",
            "min_profit_atr_multiples",
            d.min_profit_atr_multiples,
        ),
        market_lookback: get_usize(config, "risk", "market_lookback", d.market_lookback)?,
        market_drop_threshold: config.get_double(
            "risk",
            "market_drop_threshold",
            d.market_drop_threshold,
        ),
        account_drawdown_threshold: config.get_double(
            "risk",
            "account_drawdown_threshold",
            d.account_drawdown_threshold,
        ),
        liquidity_window: get_usize(config, "risk", "liquidity_window", d.liquidity_window)?,
        min_avg_amount: config.get_double("risk", "min_avg_amount", d.min_avg_amount),
        max_spread_pct: config.get_double("risk", "max_spread_pct", d.max_spread_pct),
    })
}

pub fn build_sizing_config(config: &dyn ConfigPort) -> Result<SizingConfig, RotatorError> {
    let d = SizingConfig::default();
    Ok(SizingConfig {
        target_risk_pct: config.get_double("sizing", "target_risk_pct", d.target_risk_pct),
        max_position_pct: config.get_double("sizing", "max_position_pct", d.max_position_pct),
        max_cluster_pct: config.get_double("sizing", "max_cluster_pct", d.max_cluster_pct),
        max_total_exposure: config.get_double("sizing", "max_total_exposure", d.max_total_exposure),
        volatility_method: get_parsed::<VolatilityMethod>(
            config,
            "sizing",
            "volatility_method",
            d.volatility_method,
        )?,
        volatility_window: get_usize(config, "sizing", "volatility_window", d.volatility_window)?,
        ewma_lambda: config.get_double("sizing", "ewma_lambda", d.ewma_lambda),
        min_trade_amount: config.get_double("sizing", "min_trade_amount", d.min_trade_amount),
        lot_size: config.get_int("sizing", "lot_size", d.lot_size),
    })
}

pub fn build_execution_config(config: &dyn ConfigPort) -> ExecutionConfig {
    let d = ExecutionConfig::default();
    ExecutionConfig {
        commission_per_trade: config.get_double(
            "execution",
            "commission_per_trade",
            d.commission_per_trade,
        ),
        commission_pct: config.get_double("execution", "commission_pct", d.commission_pct),
        slippage_pct: config.get_double("execution", "slippage_pct", d.slippage_pct),
    }
}

pub fn build_signal_strategy(
    config: &dyn ConfigPort,
) -> Result<Option<SignalStrategy>, RotatorError> {
    let name = non_empty(config, "signal", "strategy")
        .map(|s| s.to_lowercase())
        .unwrap_or_else(|| "none".to_string());

    let strategy = match name.as_str() {
        "none" => None,
        "momentum" => Some(SignalStrategy::Momentum {
            period: get_usize(config, "signal", "period", 20)?,
            threshold: config.get_double("signal", "threshold", 0.0),
        }),
        "ma_cross" => Some(SignalStrategy::MovingAverageCross {
            fast: get_usize(config, "signal", "fast", 10)?,
            slow: get_usize(config, "signal", "slow", 30)?,
        }),
        "rsi" => Some(SignalStrategy::Rsi {
            period: get_usize(config, "signal", "period", 14)?,
            oversold: config.get_double("signal", "oversold", 30.0),
            overbought: config.get_double("signal", "overbought", 70.0),
        }),
        other => {
            return Err(RotatorError::invalid(
                "signal",
                "strategy",
                format!("unknown strategy '{other}' (expected none, momentum, ma_cross or rsi)"),
            ))
        }
    };
    Ok(strategy)
}

/// Read every section and validate the result.
pub fn build_engine_config(config: &dyn ConfigPort) -> Result<EngineConfig, RotatorError> {
    let engine = EngineConfig {
        run: build_run_config(config)?,
        momentum: build_momentum_config(config)?,
        cluster: build_cluster_config(config)?,
        risk: build_risk_config(config)?,
        sizing: build_sizing_config(config)?,
        execution: build_execution_config(config),
        signal: build_signal_strategy(config)?,
    };
    engine.validate()?;
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapConfig {
        values: HashMap<(String, String), String>,
    }

    impl MapConfig {
        fn with(mut self, section: &str, key: &str, value: &str) -> Self {
            self.values
                .insert((section.to_string(), key.to_string()), value.to_string());
            self
        }
    }

    impl ConfigPort for MapConfig {
        fn get_string(&self, section: &str, key: &str) -> Option<String> {
            self.values
                .get(&(section.to_string(), key.to_string()))
                .cloned()
        }

        fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
            self.get_string(section, key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
            self.get_string(section, key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
            self.get_string(section, key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }
    }

    #[test]
    fn empty_config_uses_defaults() {
        let engine = build_engine_config(&MapConfig::default()).unwrap();
        assert_eq!(engine, EngineConfig::default());
    }

    #[test]
    fn reads_every_section() {
        let config = MapConfig::default()
            .with("engine", "symbols", "510300, 159915")
            .with("engine", "start_date", "2023-01-03")
            .with("engine", "benchmark", "sh000300")
            .with("momentum", "periods", "10,30")
            .with("momentum", "weights", "0.5,0.5")
            .with("momentum", "inertia_mode", "additive")
            .with("cluster", "linkage", "average")
            .with("risk", "atr_method", "sma")
            .with("sizing", "volatility_method", "ewma")
            .with("sizing", "lot_size", "10")
            .with("execution", "slippage_pct", "0.1")
            .with("signal", "strategy", "ma_cross")
            .with("signal", "fast", "5");

        let engine = build_engine_config(&config).unwrap();
        assert_eq!(engine.run.symbols, vec!["510300", "159915"]);
        assert_eq!(engine.run.start_date, NaiveDate::from_ymd_opt(2023, 1, 3));
        assert_eq!(engine.run.benchmark.as_deref(), Some("SH000300"));
        assert_eq!(engine.momentum.periods, vec![10, 30]);
        assert_eq!(engine.momentum.inertia_mode, InertiaMode::Additive);
        assert_eq!(engine.cluster.linkage, Linkage::Average);
        assert_eq!(engine.risk.atr_method, AtrMethod::Sma);
        assert_eq!(engine.sizing.volatility_method, VolatilityMethod::Ewma);
        assert_eq!(engine.sizing.lot_size, 10);
        assert!((engine.execution.slippage_pct - 0.1).abs() < 1e-12);
        assert_eq!(
            engine.signal,
            Some(SignalStrategy::MovingAverageCross { fast: 5, slow: 30 })
        );
    }

    #[test]
    fn bad_list_element_is_invalid() {
        let config = MapConfig::default().with("momentum", "periods", "20,abc");
        assert!(matches!(
            build_engine_config(&config),
            Err(RotatorError::ConfigInvalid { key, .. }) if key == "periods"
        ));
    }

    #[test]
    fn bad_date_is_invalid() {
        let config = MapConfig::default().with("engine", "end_date", "2024/01/01");
        assert!(matches!(
            build_engine_config(&config),
            Err(RotatorError::ConfigInvalid { key, .. }) if key == "end_date"
        ));
    }

    #[test]
    fn unknown_enum_value_is_invalid() {
        let config = MapConfig::default().with("cluster", "linkage", "centroid");
        assert!(matches!(
            build_engine_config(&config),
            Err(RotatorError::ConfigInvalid { key, .. }) if key == "linkage"
        ));
    }

    #[test]
    fn negative_count_is_invalid() {
        let config = MapConfig::default().with("momentum", "buy_top_n", "-1");
        assert!(matches!(
            build_engine_config(&config),
            Err(RotatorError::ConfigInvalid { key, .. }) if key == "buy_top_n"
        ));
    }

    #[test]
    fn unknown_signal_strategy() {
        let config = MapConfig::default().with("signal", "strategy", "macd");
        assert!(build_signal_strategy(&config).is_err());
    }

    #[test]
    fn duplicate_symbols_rejected() {
        let config = MapConfig::default().with("engine", "symbols", "AAA,aaa");
        assert!(matches!(
            build_run_config(&config),
            Err(RotatorError::ConfigInvalid { key, .. }) if key == "symbols"
        ));
    }
}
