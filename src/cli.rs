//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_snapshot_adapter::{read_snapshot, JsonSnapshotAdapter};
use crate::domain::config::{build_engine_config, EngineConfig};
use crate::domain::error::RotatorError;
use crate::domain::metrics::Metrics;
use crate::domain::orchestrator::{run_cycle, CycleOutput};
use crate::domain::portfolio::PortfolioSnapshot;
use crate::domain::replay::{rebalance_dates, run_replay};
use crate::domain::series::InstrumentSeries;
use crate::domain::universe::{load_universe, UniverseData};
use crate::ports::data_port::DataPort;
use crate::ports::snapshot_port::SnapshotPort;

const DEFAULT_SNAPSHOT_DIR: &str = "snapshots";

#[derive(Parser, Debug)]
#[command(name = "rotator", about = "Momentum rotation portfolio decision engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check a configuration file without touching data
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run one rebalance cycle and write the resulting snapshot
    Rebalance {
        #[arg(short, long)]
        config: PathBuf,
        /// Cycle date, YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,
        /// Prior snapshot; defaults to the latest stored one before `date`
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Print the cycle diagnostics as JSON
        #[arg(long)]
        diagnostics: bool,
    },
    /// Replay the configured date range and print a performance summary
    Replay {
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Install the stderr log subscriber; `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Validate { config } => run_validate(&config),
        Command::Rebalance {
            config,
            date,
            snapshot,
            diagnostics,
        } => run_rebalance(&config, date, snapshot.as_deref(), diagnostics),
        Command::Replay { config } => run_replay_command(&config),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<EngineConfig, RotatorError> {
    info!(path = %path.display(), "loading config");
    let adapter = FileConfigAdapter::from_file(path)?;
    build_engine_config(&adapter)
}

fn run_validate(config_path: &Path) -> Result<(), RotatorError> {
    let config = load_config(config_path)?;
    println!("Configuration OK: {}", config_path.display());
    println!("  symbols:      {}", describe_symbols(&config));
    println!(
        "  momentum:     periods {:?}, buy top {}, hold until rank {}",
        config.momentum.periods, config.momentum.buy_top_n, config.momentum.hold_until_rank
    );
    println!(
        "  cluster:      {}",
        if config.cluster.enabled {
            format!(
                "{:?} linkage, threshold {}, max {} per cluster",
                config.cluster.linkage,
                config.cluster.correlation_threshold,
                config.cluster.max_per_cluster
            )
        } else {
            "disabled".to_string()
        }
    );
    println!(
        "  risk:         ATR({}) x {}, max hold {} days",
        config.risk.atr_period, config.risk.atr_multiplier, config.risk.max_hold_days
    );
    println!(
        "  signal:       {}",
        config.signal.as_ref().map(|s| s.name()).unwrap_or("none")
    );
    Ok(())
}

fn describe_symbols(config: &EngineConfig) -> String {
    if config.run.symbols.is_empty() {
        format!("all on {}", config.run.exchange)
    } else {
        format!("{} on {}", config.run.symbols.join(","), config.run.exchange)
    }
}

/// Load price history for the configured universe up to `end`.
pub fn load_market(config: &EngineConfig, end: NaiveDate) -> Result<UniverseData, RotatorError> {
    let data_port = CsvAdapter::new(config.run.data_dir.clone());
    let symbols = if config.run.symbols.is_empty() {
        data_port.list_symbols(&config.run.exchange)?
    } else {
        config.run.symbols.clone()
    };
    info!(count = symbols.len(), exchange = %config.run.exchange, "loading universe");

    let universe = load_universe(
        &data_port,
        &symbols,
        &config.run.exchange,
        NaiveDate::MIN,
        end,
        config.run.min_bars,
    )?;

    let Some(benchmark) = &config.run.benchmark else {
        return Ok(universe);
    };
    match load_benchmark(&data_port, benchmark, &config.run.exchange, end) {
        Ok(series) => Ok(universe.with_benchmark(series)),
        Err(e) => {
            warn!(benchmark = %benchmark, error = %e, "benchmark unavailable, market breaker off");
            Ok(universe)
        }
    }
}

fn load_benchmark(
    data_port: &dyn DataPort,
    symbol: &str,
    exchange: &str,
    end: NaiveDate,
) -> Result<InstrumentSeries, RotatorError> {
    let bars = data_port.fetch_ohlcv(symbol, exchange, NaiveDate::MIN, end)?;
    InstrumentSeries::new(symbol, bars)
}

fn snapshot_store(config: &EngineConfig) -> JsonSnapshotAdapter {
    JsonSnapshotAdapter::new(
        config
            .run
            .snapshot_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR)),
    )
}

fn run_rebalance(
    config_path: &Path,
    date: NaiveDate,
    snapshot_path: Option<&Path>,
    show_diagnostics: bool,
) -> Result<(), RotatorError> {
    let config = load_config(config_path)?;
    let universe = load_market(&config, date)?;
    let store = snapshot_store(&config);

    let prior = match snapshot_path {
        Some(path) => read_snapshot(path)?,
        None => match store.latest_before(date)? {
            Some(snapshot) => snapshot,
            None => {
                info!(capital = config.run.initial_capital, "no prior snapshot, starting in cash");
                PortfolioSnapshot::inception(date, config.run.initial_capital)
            }
        },
    };

    let output = run_cycle(&config, &universe, &prior, date)?;
    print_cycle(&output);
    if show_diagnostics {
        println!("{}", serde_json::to_string_pretty(&output.diagnostics)?);
    }
    store.save(&output.snapshot)?;
    Ok(())
}

fn print_cycle(output: &CycleOutput) {
    let snapshot = &output.snapshot;
    println!("Rebalance {}", snapshot.as_of);
    if output.orders.is_empty() {
        println!("  no orders");
    }
    for order in &output.orders {
        println!(
            "  {:<4} {:<10} {:>10} @ {:>10.4}  {:>14.2}  {}",
            order.action.to_string(),
            order.symbol,
            order.shares,
            order.price,
            order.value(),
            order.reason
        );
    }
    for symbol in &output.diagnostics.deferred_sells {
        println!("  deferred sell {symbol} (T+1)");
    }
    if output.diagnostics.risk.circuit_breaker.triggered {
        for reason in &output.diagnostics.risk.circuit_breaker.reasons {
            println!("  circuit breaker: {reason}");
        }
    }
    for warning in &output.diagnostics.warnings {
        println!("  warning: {warning}");
    }
    println!(
        "  cash {:.2}  holdings {}  total {:.2}",
        snapshot.cash,
        snapshot.position_count(),
        snapshot.total_value
    );
}

fn run_replay_command(config_path: &Path) -> Result<(), RotatorError> {
    let config = load_config(config_path)?;
    let end = config.run.end_date.unwrap_or(NaiveDate::MAX);
    let universe = load_market(&config, end)?;

    let calendar = &universe.calendar;
    let (Some(first), Some(last)) = (calendar.dates().first(), calendar.dates().last()) else {
        return Err(RotatorError::Data {
            reason: "no trading days in loaded data".to_string(),
        });
    };
    let start = config.run.start_date.unwrap_or(*first);
    let end = config.run.end_date.unwrap_or(*last);
    let dates = rebalance_dates(calendar, start, end, config.run.rebalance_every);
    let Some(&first_cycle) = dates.first() else {
        return Err(RotatorError::Data {
            reason: format!("no trading days between {start} and {end}"),
        });
    };

    let initial = PortfolioSnapshot::inception(first_cycle, config.run.initial_capital);
    let store = config.run.snapshot_dir.as_ref().map(|_| snapshot_store(&config));
    let result = run_replay(
        &config,
        &universe,
        initial,
        &dates,
        store.as_ref().map(|s| s as &dyn SnapshotPort),
    )?;

    let metrics = Metrics::from_replay(&result, 0.0);
    print_metrics(&metrics, first_cycle, end);
    Ok(())
}

fn print_metrics(m: &Metrics, start: NaiveDate, end: NaiveDate) {
    println!("Replay {start} .. {end}");
    println!("  initial value:      {:>14.2}", m.initial_value);
    println!("  final value:        {:>14.2}", m.final_value);
    println!("  total return:       {:>13.2}%", m.total_return * 100.0);
    println!("  annualized return:  {:>13.2}%", m.annualized_return * 100.0);
    println!("  sharpe ratio:       {:>14.3}", m.sharpe_ratio);
    println!("  sortino ratio:      {:>14.3}", m.sortino_ratio);
    println!("  max drawdown:       {:>13.2}%", m.max_drawdown * 100.0);
    println!("  drawdown duration:  {:>10} days", m.max_drawdown_duration);
    println!(
        "  orders:             {:>14} ({} buy, {} sell)",
        m.order_count, m.buy_count, m.sell_count
    );
    println!("  turnover:           {:>14.2}", m.turnover);
}
