//! Historical replay: `run_cycle` folded over a list of rebalance dates.

use crate::domain::calendar::TradingCalendar;
use crate::domain::config::EngineConfig;
use crate::domain::error::RotatorError;
use crate::domain::orchestrator::{run_cycle, CycleDiagnostics};
use crate::domain::order::TradeOrder;
use crate::domain::portfolio::{EquityPoint, PortfolioSnapshot};
use crate::domain::universe::UniverseData;
use crate::ports::snapshot_port::SnapshotPort;
use chrono::NaiveDate;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayResult {
    pub initial: PortfolioSnapshot,
    /// One snapshot per rebalance date, in date order.
    pub snapshots: Vec<PortfolioSnapshot>,
    pub orders: Vec<TradeOrder>,
    /// Daily mark-to-market from the first to the last rebalance date.
    pub equity_curve: Vec<EquityPoint>,
    pub diagnostics: Vec<(NaiveDate, CycleDiagnostics)>,
}

impl ReplayResult {
    pub fn final_snapshot(&self) -> &PortfolioSnapshot {
        self.snapshots.last().unwrap_or(&self.initial)
    }
}

/// Every `every_n`-th trading day in `[start, end]`.
pub fn rebalance_dates(
    calendar: &TradingCalendar,
    start: NaiveDate,
    end: NaiveDate,
    every_n: usize,
) -> Vec<NaiveDate> {
    calendar.sample(start, end, every_n)
}

/// Daily equity between rebalances: each trading day is valued with the
/// latest snapshot at or before it.
fn mark_to_market(
    universe: &UniverseData,
    snapshots: &[PortfolioSnapshot],
) -> Vec<EquityPoint> {
    let (Some(first), Some(last)) = (snapshots.first(), snapshots.last()) else {
        return Vec::new();
    };
    let mut curve = Vec::new();
    let mut current = 0;
    for &day in universe.calendar.range(first.as_of, last.as_of) {
        while current + 1 < snapshots.len() && snapshots[current + 1].as_of <= day {
            current += 1;
        }
        let snapshot = &snapshots[current];
        let equity = if snapshot.as_of == day {
            snapshot.total_value
        } else {
            snapshot.value_at(&universe.price_map(day))
        };
        curve.push(EquityPoint { date: day, equity });
    }
    curve
}

/// Run one cycle per date in order, each consuming the previous snapshot.
///
/// With a snapshot store, every new snapshot is saved before the next cycle
/// starts; a failed save stops the replay.
pub fn run_replay(
    config: &EngineConfig,
    universe: &UniverseData,
    initial: PortfolioSnapshot,
    dates: &[NaiveDate],
    store: Option<&dyn SnapshotPort>,
) -> Result<ReplayResult, RotatorError> {
    info!(
        cycles = dates.len(),
        symbols = universe.series.len(),
        initial_value = initial.total_value,
        "starting replay"
    );
    let mut snapshots = Vec::with_capacity(dates.len());
    let mut orders = Vec::new();
    let mut diagnostics = Vec::with_capacity(dates.len());

    for &date in dates {
        let prior = snapshots.last().unwrap_or(&initial);
        let output = run_cycle(config, universe, prior, date)?;
        debug!(%date, orders = output.orders.len(), "replay cycle");
        if let Some(store) = store {
            store.save(&output.snapshot)?;
        }
        orders.extend(output.orders);
        diagnostics.push((date, output.diagnostics));
        snapshots.push(output.snapshot);
    }

    let equity_curve = mark_to_market(universe, &snapshots);
    if let Some(last) = snapshots.last() {
        info!(
            final_value = last.total_value,
            orders = orders.len(),
            "replay complete"
        );
    }

    Ok(ReplayResult {
        initial,
        snapshots,
        orders,
        equity_curve,
        diagnostics,
    })
}
