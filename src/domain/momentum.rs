//! Momentum scoring, ranking and hysteresis buy/hold/sell selection.
//!
//! score = Σ w_i * return(p_i) / max(annualized_vol(p_i), ε)
//!
//! `return(p)` is the close-to-close change over the last p bars and
//! `annualized_vol(p)` is the population stddev of the last p daily returns
//! times √252. Only bars dated at or before the evaluation date are used.

use crate::domain::calendar::TradingCalendar;
use crate::domain::indicator::roc::calculate_roc;
use crate::domain::indicator::stddev::calculate_stddev;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::series::InstrumentSeries;
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;
pub const VOL_EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InertiaMode {
    #[default]
    Multiplicative,
    Additive,
}

impl std::str::FromStr for InertiaMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "multiplicative" | "mult" => Ok(InertiaMode::Multiplicative),
            "additive" | "add" => Ok(InertiaMode::Additive),
            other => Err(format!("unknown inertia mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentumConfig {
    pub periods: Vec<usize>,
    pub weights: Vec<f64>,
    pub buy_top_n: usize,
    pub hold_until_rank: usize,
    pub inertia_bonus: f64,
    pub inertia_mode: InertiaMode,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        MomentumConfig {
            periods: vec![20, 60, 120],
            weights: vec![0.4, 0.3, 0.3],
            buy_top_n: 5,
            hold_until_rank: 8,
            inertia_bonus: 0.1,
            inertia_mode: InertiaMode::Multiplicative,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreOutcome {
    Score(f64),
    InsufficientData { bars: usize, required: usize },
}

impl ScoreOutcome {
    pub fn value(&self) -> Option<f64> {
        match self {
            ScoreOutcome::Score(v) => Some(*v),
            ScoreOutcome::InsufficientData { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedSymbol {
    pub symbol: String,
    pub score: f64,
    /// 1-based.
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRecord {
    pub symbol: String,
    pub raw_score: f64,
    pub rank: usize,
    pub adjusted_score: f64,
    pub adjusted_rank: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ranking {
    pub ranked: Vec<RankedSymbol>,
    /// Symbols left out of the ranking and why.
    pub excluded: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TradingSignals {
    pub to_buy: Vec<String>,
    pub to_hold: Vec<String>,
    pub to_sell: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreFrame {
    pub date: NaiveDate,
    pub scores: BTreeMap<String, f64>,
}

/// Combine per-period returns and volatilities into one score.
pub fn weighted_score(returns: &[f64], vols: &[f64], weights: &[f64]) -> f64 {
    returns
        .iter()
        .zip(vols)
        .zip(weights)
        .map(|((r, v), w)| w * r / v.max(VOL_EPSILON))
        .sum()
}

/// Return and annualized volatility over the trailing `period` bars.
fn period_stats(bars: &[OhlcvBar], period: usize) -> Option<(f64, f64)> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }
    let window = &bars[bars.len() - period - 1..];
    let ret = calculate_roc(window, period).last_valid()? / 100.0;
    let vol = calculate_stddev(window, period).last_valid()? * TRADING_DAYS_PER_YEAR.sqrt();
    Some((ret, vol))
}

/// Score one instrument as of `as_of`.
///
/// Periods the history cannot cover are dropped and the remaining weights
/// renormalized; when even the shortest period is uncovered the result is
/// `InsufficientData`.
pub fn score(
    series: &InstrumentSeries,
    as_of: NaiveDate,
    periods: &[usize],
    weights: &[f64],
) -> ScoreOutcome {
    let bars = series.bars_until(as_of);
    let required = periods.iter().min().map(|p| p + 1).unwrap_or(1);

    let mut returns = Vec::with_capacity(periods.len());
    let mut vols = Vec::with_capacity(periods.len());
    let mut used_weights = Vec::with_capacity(periods.len());

    for (&period, &weight) in periods.iter().zip(weights) {
        if let Some((ret, vol)) = period_stats(bars, period) {
            returns.push(ret);
            vols.push(vol);
            used_weights.push(weight);
        }
    }

    let weight_sum: f64 = used_weights.iter().sum();
    if returns.is_empty() || weight_sum <= 0.0 {
        return ScoreOutcome::InsufficientData {
            bars: bars.len(),
            required,
        };
    }

    for w in &mut used_weights {
        *w /= weight_sum;
    }
    ScoreOutcome::Score(weighted_score(&returns, &vols, &used_weights))
}

/// Descending by score, ties by ascending symbol; ranks are reassigned 1..=n.
fn sort_and_rank(entries: &mut Vec<RankedSymbol>) {
    entries.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.rank = i + 1;
    }
}

pub fn rank_universe(
    series_map: &BTreeMap<String, InstrumentSeries>,
    as_of: NaiveDate,
    config: &MomentumConfig,
) -> Ranking {
    let mut ranking = Ranking::default();

    for (symbol, series) in series_map {
        match score(series, as_of, &config.periods, &config.weights) {
            ScoreOutcome::Score(value) if value.is_finite() => ranking.ranked.push(RankedSymbol {
                symbol: symbol.clone(),
                score: value,
                rank: 0,
            }),
            ScoreOutcome::Score(value) => ranking
                .excluded
                .push((symbol.clone(), format!("non-finite score {value}"))),
            ScoreOutcome::InsufficientData { bars, required } => ranking.excluded.push((
                symbol.clone(),
                format!("insufficient history: {bars} bars, need {required}"),
            )),
        }
    }

    sort_and_rank(&mut ranking.ranked);
    ranking
}

/// Boost held symbols and re-rank. Output is ordered by adjusted rank.
pub fn apply_inertia_bonus(
    ranked: &[RankedSymbol],
    holdings: &BTreeSet<String>,
    bonus_pct: f64,
    mode: InertiaMode,
) -> Vec<ScoreRecord> {
    let mut adjusted: Vec<RankedSymbol> = ranked
        .iter()
        .map(|r| {
            let score = if holdings.contains(&r.symbol) {
                match mode {
                    InertiaMode::Multiplicative => r.score * (1.0 + bonus_pct),
                    InertiaMode::Additive => r.score + bonus_pct,
                }
            } else {
                r.score
            };
            RankedSymbol {
                symbol: r.symbol.clone(),
                score,
                rank: 0,
            }
        })
        .collect();
    sort_and_rank(&mut adjusted);

    let raw: BTreeMap<&str, &RankedSymbol> =
        ranked.iter().map(|r| (r.symbol.as_str(), r)).collect();

    adjusted
        .into_iter()
        .map(|adj| {
            let (raw_score, rank) = raw
                .get(adj.symbol.as_str())
                .map(|r| (r.score, r.rank))
                .unwrap_or((adj.score, adj.rank));
            ScoreRecord {
                symbol: adj.symbol,
                raw_score,
                rank,
                adjusted_score: adj.score,
                adjusted_rank: adj.rank,
            }
        })
        .collect()
}

/// View score records through their adjusted score and rank.
pub fn adjusted_ranking(records: &[ScoreRecord]) -> Vec<RankedSymbol> {
    records
        .iter()
        .map(|r| RankedSymbol {
            symbol: r.symbol.clone(),
            score: r.adjusted_score,
            rank: r.adjusted_rank,
        })
        .collect()
}

/// Hysteresis selection.
///
/// Held symbols stay while `rank <= hold_until_rank` unless forced out; new
/// symbols enter only at `rank <= buy_top_n`. Held symbols missing from the
/// ranking are kept unless forced out.
pub fn get_trading_signals(
    ranked: &[RankedSymbol],
    holdings: &BTreeSet<String>,
    buy_top_n: usize,
    hold_until_rank: usize,
    forced_sell: &BTreeSet<String>,
) -> TradingSignals {
    let mut signals = TradingSignals::default();
    let mut seen = BTreeSet::new();

    for entry in ranked {
        seen.insert(entry.symbol.as_str());
        if holdings.contains(&entry.symbol) {
            if forced_sell.contains(&entry.symbol) || entry.rank > hold_until_rank {
                signals.to_sell.push(entry.symbol.clone());
            } else {
                signals.to_hold.push(entry.symbol.clone());
            }
        } else if entry.rank <= buy_top_n && !forced_sell.contains(&entry.symbol) {
            signals.to_buy.push(entry.symbol.clone());
        }
    }

    for symbol in holdings {
        if seen.contains(symbol.as_str()) {
            continue;
        }
        if forced_sell.contains(symbol) {
            signals.to_sell.push(symbol.clone());
        } else {
            signals.to_hold.push(symbol.clone());
        }
    }

    signals
}

/// Rolling, lookahead-free scores on every `freq`-th trading day in
/// `[start, end]`. Dates are scored independently in parallel.
pub fn historical_scores(
    series_map: &BTreeMap<String, InstrumentSeries>,
    start: NaiveDate,
    end: NaiveDate,
    freq: usize,
    config: &MomentumConfig,
) -> Vec<ScoreFrame> {
    let calendar = TradingCalendar::from_series(series_map.values());
    let dates = calendar.sample(start, end, freq);

    dates
        .par_iter()
        .map(|&date| {
            let scores = series_map
                .iter()
                .filter_map(|(symbol, series)| {
                    score(series, date, &config.periods, &config.weights)
                        .value()
                        .filter(|v| v.is_finite())
                        .map(|v| (symbol.clone(), v))
                })
                .collect();
            ScoreFrame { date, scores }
        })
        .collect()
}
