//! Correlation clustering and per-cluster concentration limits.
//!
//! Returns are aligned on the union calendar over a trailing window, gaps are
//! forward-filled a few bars at most, and symbols with thin coverage or flat
//! prices are left out. Correlations become distances d = √(2(1-ρ)) and are
//! merged bottom-up with Lance-Williams updates until the next merge would
//! exceed the height equivalent of the correlation threshold.

use crate::domain::calendar::TradingCalendar;
use crate::domain::series::{population_stddev, InstrumentSeries};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Fewest aligned returns a pair needs for a meaningful correlation.
const MIN_ALIGNED_RETURNS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    Single,
    Complete,
    Average,
    #[default]
    Ward,
}

impl std::str::FromStr for Linkage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single" => Ok(Linkage::Single),
            "complete" => Ok(Linkage::Complete),
            "average" => Ok(Linkage::Average),
            "ward" => Ok(Linkage::Ward),
            other => Err(format!("unknown linkage '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub enabled: bool,
    /// Number of daily returns in the correlation window.
    pub lookback: usize,
    pub correlation_threshold: f64,
    pub linkage: Linkage,
    pub max_per_cluster: usize,
    /// Trading days between recomputations.
    pub update_frequency: usize,
    pub min_coverage: f64,
    /// Longest run of missing closes that is forward-filled.
    pub max_fill: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            enabled: true,
            lookback: 120,
            correlation_threshold: 0.5,
            linkage: Linkage::Ward,
            max_per_cluster: 2,
            update_frequency: 20,
            min_coverage: 0.8,
            max_fill: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub symbols: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.symbols.iter().position(|s| s == a)?;
        let j = self.symbols.iter().position(|s| s == b)?;
        Some(self.values[i][j])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub computed_on: NaiveDate,
    pub labels: BTreeMap<String, usize>,
    pub correlation: CorrelationMatrix,
}

impl ClusterAssignment {
    /// Every symbol in its own cluster.
    pub fn singletons<'a, I>(symbols: I, computed_on: NaiveDate) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let labels = symbols
            .into_iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i))
            .collect();
        ClusterAssignment {
            computed_on,
            labels,
            correlation: CorrelationMatrix::default(),
        }
    }

    pub fn cluster_of(&self, symbol: &str) -> Option<usize> {
        self.labels.get(symbol).copied()
    }

    pub fn cluster_count(&self) -> usize {
        self.labels.values().collect::<BTreeSet<_>>().len()
    }

    pub fn members(&self, cluster: usize) -> Vec<String> {
        self.labels
            .iter()
            .filter(|(_, c)| **c == cluster)
            .map(|(s, _)| s.clone())
            .collect()
    }

    /// Labels for `symbols`, giving any symbol this assignment does not know
    /// a fresh singleton id above the current maximum.
    pub fn resolve<'a, I>(&self, symbols: I) -> BTreeMap<String, usize>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut next = self.labels.values().max().map(|m| m + 1).unwrap_or(0);
        symbols
            .into_iter()
            .map(|s| {
                let label = self.cluster_of(s).unwrap_or_else(|| {
                    let id = next;
                    next += 1;
                    id
                });
                (s.clone(), label)
            })
            .collect()
    }
}

/// Correlation → distance, d = √(2(1-ρ)).
pub fn correlation_distance(rho: f64) -> f64 {
    (2.0 * (1.0 - rho.clamp(-1.0, 1.0))).max(0.0).sqrt()
}

/// Pearson correlation over pairs where both sides are present.
fn pearson(xs: &[Option<f64>], ys: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = xs
        .iter()
        .zip(ys)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();
    if pairs.len() < MIN_ALIGNED_RETURNS {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in &pairs {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }
    if var_x <= 0.0 || var_y <= 0.0 {
        return None;
    }
    Some((cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0))
}

/// Closes on `window` dates, forward-filled up to `max_fill` bars.
/// Returns the filled closes and how many were observed directly.
fn aligned_closes(
    series: &InstrumentSeries,
    window: &[NaiveDate],
    max_fill: usize,
) -> (Vec<Option<f64>>, usize) {
    let mut out = Vec::with_capacity(window.len());
    let mut observed = 0;
    let mut last: Option<f64> = None;
    let mut gap = 0;

    for date in window {
        match series.get_bar(*date) {
            Some(bar) => {
                observed += 1;
                gap = 0;
                last = Some(bar.close);
                out.push(last);
            }
            None => {
                gap += 1;
                out.push(if gap <= max_fill { last } else { None });
            }
        }
    }
    (out, observed)
}

fn aligned_returns(closes: &[Option<f64>]) -> Vec<Option<f64>> {
    closes
        .windows(2)
        .map(|w| match (w[0], w[1]) {
            (Some(prev), Some(curr)) if prev != 0.0 => Some(curr / prev - 1.0),
            _ => None,
        })
        .collect()
}

/// Correlation matrix over the trailing window ending at `as_of`.
///
/// Returns the matrix (usable symbols only, sorted) and the excluded symbols
/// with a reason.
pub fn correlation_matrix(
    series_map: &BTreeMap<String, InstrumentSeries>,
    as_of: NaiveDate,
    config: &ClusterConfig,
) -> (CorrelationMatrix, Vec<(String, String)>) {
    let calendar = TradingCalendar::from_series(series_map.values());
    let upto = calendar.range(NaiveDate::MIN, as_of);
    let window = &upto[upto.len().saturating_sub(config.lookback + 1)..];

    let mut usable: Vec<(String, Vec<Option<f64>>)> = Vec::new();
    let mut excluded = Vec::new();

    for (symbol, series) in series_map {
        let (closes, observed) = aligned_closes(series, window, config.max_fill);
        let coverage = if window.is_empty() {
            0.0
        } else {
            observed as f64 / window.len() as f64
        };
        if coverage < config.min_coverage {
            excluded.push((symbol.clone(), format!("coverage {:.2} below minimum", coverage)));
            continue;
        }
        let returns = aligned_returns(&closes);
        let present: Vec<f64> = returns.iter().flatten().copied().collect();
        if present.len() < MIN_ALIGNED_RETURNS {
            excluded.push((symbol.clone(), "too few aligned returns".to_string()));
            continue;
        }
        if population_stddev(&present) == 0.0 {
            excluded.push((symbol.clone(), "zero variance".to_string()));
            continue;
        }
        usable.push((symbol.clone(), returns));
    }

    let n = usable.len();
    let mut values = vec![vec![0.0; n]; n];
    for i in 0..n {
        values[i][i] = 1.0;
        for j in (i + 1)..n {
            let rho = pearson(&usable[i].1, &usable[j].1).unwrap_or(0.0);
            values[i][j] = rho;
            values[j][i] = rho;
        }
    }

    (
        CorrelationMatrix {
            symbols: usable.into_iter().map(|(s, _)| s).collect(),
            values,
        },
        excluded,
    )
}

/// Agglomerative clustering on a distance matrix, stopping before the first
/// merge higher than `cut_height`. Returns groups of item indices.
pub fn agglomerate(distances: &[Vec<f64>], linkage: Linkage, cut_height: f64) -> Vec<Vec<usize>> {
    let n = distances.len();
    let mut dist: Vec<Vec<f64>> = distances.to_vec();
    let mut groups: Vec<Option<Vec<usize>>> = (0..n).map(|i| Some(vec![i])).collect();

    loop {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..n {
            if groups[i].is_none() {
                continue;
            }
            for j in (i + 1)..n {
                if groups[j].is_none() {
                    continue;
                }
                let d = dist[i][j];
                if best.is_none_or(|(_, _, bd)| d < bd) {
                    best = Some((i, j, d));
                }
            }
        }

        // These linkages are monotone, so stopping here equals a dendrogram cut.
        let Some((i, j, d_ij)) = best else { break };
        if d_ij > cut_height {
            break;
        }

        let n_i = groups[i].as_ref().map_or(0, Vec::len) as f64;
        let n_j = groups[j].as_ref().map_or(0, Vec::len) as f64;

        for k in 0..n {
            if k == i || k == j || groups[k].is_none() {
                continue;
            }
            let n_k = groups[k].as_ref().map_or(0, Vec::len) as f64;
            let d_ki = dist[k][i];
            let d_kj = dist[k][j];
            let merged = match linkage {
                Linkage::Single => d_ki.min(d_kj),
                Linkage::Complete => d_ki.max(d_kj),
                Linkage::Average => (n_i * d_ki + n_j * d_kj) / (n_i + n_j),
                Linkage::Ward => {
                    let num = (n_i + n_k) * d_ki * d_ki + (n_j + n_k) * d_kj * d_kj
                        - n_k * d_ij * d_ij;
                    (num / (n_i + n_j + n_k)).max(0.0).sqrt()
                }
            };
            dist[i][k] = merged;
            dist[k][i] = merged;
        }

        if let Some(absorbed) = groups[j].take() {
            if let Some(target) = groups[i].as_mut() {
                target.extend(absorbed);
            }
        }
    }

    groups.into_iter().flatten().collect()
}

/// Cluster the universe as of `as_of`.
///
/// Degrades to one cluster per instrument when too few symbols survive the
/// data checks.
pub fn cluster_universe(
    series_map: &BTreeMap<String, InstrumentSeries>,
    as_of: NaiveDate,
    config: &ClusterConfig,
) -> ClusterAssignment {
    let all_symbols: Vec<&String> = series_map.keys().collect();
    if all_symbols.len() <= 1 {
        return ClusterAssignment::singletons(all_symbols, as_of);
    }

    let (correlation, excluded) = correlation_matrix(series_map, as_of, config);
    for (symbol, reason) in &excluded {
        warn!(symbol = %symbol, reason = %reason, "excluded from clustering");
    }

    if correlation.symbols.len() < 2 {
        warn!(
            usable = correlation.symbols.len(),
            "not enough data to cluster, using one cluster per instrument"
        );
        let mut fallback = ClusterAssignment::singletons(all_symbols, as_of);
        fallback.correlation = correlation;
        return fallback;
    }

    let distances: Vec<Vec<f64>> = correlation
        .values
        .iter()
        .map(|row| row.iter().map(|&rho| correlation_distance(rho)).collect())
        .collect();
    let cut_height = correlation_distance(config.correlation_threshold);

    let mut groups: Vec<Vec<String>> = agglomerate(&distances, config.linkage, cut_height)
        .into_iter()
        .map(|members| {
            let mut names: Vec<String> = members
                .into_iter()
                .map(|i| correlation.symbols[i].clone())
                .collect();
            names.sort();
            names
        })
        .collect();
    groups.sort();

    let mut labels = BTreeMap::new();
    for (id, group) in groups.iter().enumerate() {
        for symbol in group {
            labels.insert(symbol.clone(), id);
        }
    }
    let mut next = groups.len();
    for (symbol, _) in &excluded {
        labels.insert(symbol.clone(), next);
        next += 1;
    }

    debug!(clusters = groups.len(), symbols = labels.len(), %as_of, "clustered universe");

    ClusterAssignment {
        computed_on: as_of,
        labels,
        correlation,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Replacement {
    pub candidate: String,
    pub replaced: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClusterFilterResult {
    pub approved: Vec<String>,
    pub rejected: Vec<String>,
    pub replacements: Vec<Replacement>,
}

/// Admit candidates while their cluster has room.
///
/// `candidates` must be sorted best first: they are taken in the order given,
/// and only holdings can be displaced, so a weaker candidate listed earlier
/// keeps a slot a stronger one listed later would have wanted.
///
/// A full cluster rejects the candidate unless `scores` is given and the
/// candidate strictly beats the weakest scored holding there, in which case
/// that holding is displaced. Holdings without a score are never displaced.
pub fn filter_by_cluster_limit(
    candidates: &[String],
    labels: &BTreeMap<String, usize>,
    holdings: &BTreeSet<String>,
    max_per_cluster: usize,
    scores: Option<&BTreeMap<String, f64>>,
) -> ClusterFilterResult {
    let mut next_label = labels.values().max().map(|m| m + 1).unwrap_or(0);
    let mut extra: BTreeMap<String, usize> = BTreeMap::new();
    let mut label_of = |symbol: &String| -> usize {
        if let Some(&l) = labels.get(symbol) {
            return l;
        }
        *extra.entry(symbol.clone()).or_insert_with(|| {
            let id = next_label;
            next_label += 1;
            id
        })
    };

    let mut held_by_cluster: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for symbol in holdings {
        held_by_cluster
            .entry(label_of(symbol))
            .or_default()
            .push(symbol.clone());
    }
    let mut approved_by_cluster: BTreeMap<usize, usize> = BTreeMap::new();
    let mut result = ClusterFilterResult::default();

    for candidate in candidates {
        if holdings.contains(candidate) {
            continue;
        }
        let cluster = label_of(candidate);
        let held = held_by_cluster.entry(cluster).or_default();
        let approved = approved_by_cluster.entry(cluster).or_insert(0);

        if held.len() + *approved < max_per_cluster {
            *approved += 1;
            result.approved.push(candidate.clone());
            continue;
        }

        let Some(scores) = scores else {
            result.rejected.push(candidate.clone());
            continue;
        };
        let Some(&candidate_score) = scores.get(candidate) else {
            result.rejected.push(candidate.clone());
            continue;
        };

        let weakest = held
            .iter()
            .enumerate()
            .filter_map(|(idx, s)| scores.get(s).map(|&v| (idx, v)))
            .min_by(|a, b| a.1.total_cmp(&b.1).then_with(|| held[a.0].cmp(&held[b.0])));

        match weakest {
            Some((idx, weakest_score)) if candidate_score > weakest_score => {
                let replaced = held.remove(idx);
                *approved += 1;
                result.approved.push(candidate.clone());
                result.replacements.push(Replacement {
                    candidate: candidate.clone(),
                    replaced,
                });
            }
            _ => result.rejected.push(candidate.clone()),
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::OhlcvBar;

    fn series_from_returns(symbol: &str, returns: &[f64]) -> InstrumentSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut close = 100.0;
        let mut bars = vec![OhlcvBar {
            date: start,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000,
        }];
        for (i, r) in returns.iter().enumerate() {
            close *= 1.0 + r;
            bars.push(OhlcvBar {
                date: start + chrono::Duration::days(i as i64 + 1),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000,
            });
        }
        InstrumentSeries::new(symbol, bars).unwrap()
    }

    fn base_returns(n: usize, phase: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (((i + phase) * 7919) % 13) as f64 / 1000.0 - 0.006)
            .collect()
    }

    fn labels(pairs: &[(&str, usize)]) -> BTreeMap<String, usize> {
        pairs.iter().map(|(s, c)| (s.to_string(), *c)).collect()
    }

    fn set(symbols: &[&str]) -> BTreeSet<String> {
        symbols.iter().map(|s| s.to_string()).collect()
    }

    fn strings(symbols: &[&str]) -> Vec<String> {
        symbols.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn distance_bounds() {
        assert!(correlation_distance(1.0).abs() < 1e-12);
        assert!((correlation_distance(0.5) - 1.0).abs() < 1e-12);
        assert!((correlation_distance(-1.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn correlated_pair_shares_cluster() {
        let a = base_returns(60, 0);
        let b: Vec<f64> = a.iter().map(|r| r * 1.01 + 0.0001).collect();
        let c = base_returns(60, 5);
        let mut map = BTreeMap::new();
        map.insert("AAA".to_string(), series_from_returns("AAA", &a));
        map.insert("BBB".to_string(), series_from_returns("BBB", &b));
        map.insert("CCC".to_string(), series_from_returns("CCC", &c));
        let config = ClusterConfig {
            lookback: 50,
            ..ClusterConfig::default()
        };
        let as_of = map["AAA"].last_date().unwrap();

        let assignment = cluster_universe(&map, as_of, &config);
        assert_eq!(assignment.cluster_of("AAA"), assignment.cluster_of("BBB"));
        assert_ne!(assignment.cluster_of("AAA"), assignment.cluster_of("CCC"));
        assert_eq!(assignment.cluster_of("AAA"), Some(0));
        let rho = assignment.correlation.get("AAA", "BBB").unwrap();
        assert!(rho > 0.99);
    }

    #[test]
    fn single_symbol_is_trivial_cluster() {
        let mut map = BTreeMap::new();
        map.insert("AAA".to_string(), series_from_returns("AAA", &base_returns(30, 0)));
        let as_of = map["AAA"].last_date().unwrap();
        let assignment = cluster_universe(&map, as_of, &ClusterConfig::default());
        assert_eq!(assignment.labels, labels(&[("AAA", 0)]));
        assert_eq!(assignment.cluster_count(), 1);
    }

    #[test]
    fn zero_variance_series_is_excluded() {
        let mut map = BTreeMap::new();
        map.insert("AAA".to_string(), series_from_returns("AAA", &base_returns(30, 0)));
        map.insert("BBB".to_string(), series_from_returns("BBB", &base_returns(30, 3)));
        map.insert("FLAT".to_string(), series_from_returns("FLAT", &[0.0; 30]));
        let as_of = map["AAA"].last_date().unwrap();
        let config = ClusterConfig {
            lookback: 25,
            ..ClusterConfig::default()
        };

        let (matrix, excluded) = correlation_matrix(&map, as_of, &config);
        assert_eq!(matrix.symbols, strings(&["AAA", "BBB"]));
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded[0].0, "FLAT");

        let assignment = cluster_universe(&map, as_of, &config);
        assert!(assignment.cluster_of("FLAT").is_some());
        let flat = assignment.cluster_of("FLAT").unwrap();
        assert_eq!(assignment.members(flat), strings(&["FLAT"]));
    }

    #[test]
    fn too_little_data_degrades_to_singletons() {
        let mut map = BTreeMap::new();
        map.insert("AAA".to_string(), series_from_returns("AAA", &[0.01]));
        map.insert("BBB".to_string(), series_from_returns("BBB", &[0.01]));
        let as_of = map["AAA"].last_date().unwrap();
        let assignment = cluster_universe(&map, as_of, &ClusterConfig::default());
        assert_eq!(assignment.cluster_count(), 2);
    }

    #[test]
    fn agglomerate_respects_cut_height() {
        let d = vec![
            vec![0.0, 0.1, 1.5],
            vec![0.1, 0.0, 1.6],
            vec![1.5, 1.6, 0.0],
        ];
        for linkage in [Linkage::Single, Linkage::Complete, Linkage::Average, Linkage::Ward] {
            let mut groups = agglomerate(&d, linkage, 1.0);
            groups.sort();
            assert_eq!(groups, vec![vec![0, 1], vec![2]], "{linkage:?}");
        }
        assert_eq!(agglomerate(&d, Linkage::Single, 2.0).len(), 1);
    }

    #[test]
    fn ward_merge_height() {
        // Ward distance from {0,1} to 2 with d02 = d12 = 1, d01 = 0.
        let d = vec![
            vec![0.0, 0.0, 1.0],
            vec![0.0, 0.0, 1.0],
            vec![1.0, 1.0, 0.0],
        ];
        // sqrt((2*1 + 2*1 - 0) / 3) ≈ 1.1547 > 1.1
        assert_eq!(agglomerate(&d, Linkage::Ward, 1.1).len(), 2);
        assert_eq!(agglomerate(&d, Linkage::Ward, 1.2).len(), 1);
    }

    #[test]
    fn resolve_gives_unknown_symbols_fresh_ids() {
        let assignment = ClusterAssignment {
            computed_on: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            labels: labels(&[("AAA", 0), ("BBB", 1)]),
            correlation: CorrelationMatrix::default(),
        };
        let resolved = assignment.resolve(&strings(&["AAA", "NEW1", "NEW2"]));
        assert_eq!(resolved, labels(&[("AAA", 0), ("NEW1", 2), ("NEW2", 3)]));
    }

    #[test]
    fn filter_approves_when_room() {
        let result = filter_by_cluster_limit(
            &strings(&["A", "B"]),
            &labels(&[("A", 0), ("B", 1), ("H", 0)]),
            &set(&["H"]),
            2,
            None,
        );
        assert_eq!(result.approved, strings(&["A", "B"]));
        assert!(result.rejected.is_empty());
    }

    #[test]
    fn filter_without_scores_rejects_when_full() {
        let result = filter_by_cluster_limit(
            &strings(&["A", "B"]),
            &labels(&[("A", 0), ("B", 0)]),
            &BTreeSet::new(),
            1,
            None,
        );
        assert_eq!(result.approved, strings(&["A"]));
        assert_eq!(result.rejected, strings(&["B"]));
    }

    #[test]
    fn filter_replaces_weaker_holding() {
        let scores: BTreeMap<String, f64> =
            [("LOW".to_string(), 0.5), ("HIGH".to_string(), 1.2)].into();
        let result = filter_by_cluster_limit(
            &strings(&["HIGH"]),
            &labels(&[("LOW", 0), ("HIGH", 0)]),
            &set(&["LOW"]),
            1,
            Some(&scores),
        );
        assert_eq!(result.approved, strings(&["HIGH"]));
        assert_eq!(
            result.replacements,
            vec![Replacement {
                candidate: "HIGH".into(),
                replaced: "LOW".into()
            }]
        );
    }

    #[test]
    fn filter_keeps_stronger_holding() {
        let scores: BTreeMap<String, f64> =
            [("HELD".to_string(), 1.2), ("NEW".to_string(), 0.5)].into();
        let result = filter_by_cluster_limit(
            &strings(&["NEW"]),
            &labels(&[("HELD", 0), ("NEW", 0)]),
            &set(&["HELD"]),
            1,
            Some(&scores),
        );
        assert!(result.approved.is_empty());
        assert_eq!(result.rejected, strings(&["NEW"]));
    }

    #[test]
    fn filter_equal_score_does_not_replace() {
        let scores: BTreeMap<String, f64> =
            [("HELD".to_string(), 1.0), ("NEW".to_string(), 1.0)].into();
        let result = filter_by_cluster_limit(
            &strings(&["NEW"]),
            &labels(&[("HELD", 0), ("NEW", 0)]),
            &set(&["HELD"]),
            1,
            Some(&scores),
        );
        assert_eq!(result.rejected, strings(&["NEW"]));
    }

    #[test]
    fn filter_unlabelled_symbols_are_their_own_cluster() {
        let result = filter_by_cluster_limit(
            &strings(&["X", "Y"]),
            &BTreeMap::new(),
            &BTreeSet::new(),
            1,
            None,
        );
        assert_eq!(result.approved, strings(&["X", "Y"]));
    }

    mod properties {
        use super::super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn cap_holds_without_scores(
                cluster_ids in proptest::collection::vec(0usize..4, 1..20),
                held_mask in proptest::collection::vec(any::<bool>(), 20),
                max_per_cluster in 1usize..4,
            ) {
                let symbols: Vec<String> =
                    (0..cluster_ids.len()).map(|i| format!("S{i:02}")).collect();
                let labels: BTreeMap<String, usize> =
                    symbols.iter().cloned().zip(cluster_ids.iter().copied()).collect();
                let holdings: BTreeSet<String> = symbols
                    .iter()
                    .zip(&held_mask)
                    .filter(|(_, held)| **held)
                    .map(|(s, _)| s.clone())
                    .collect();
                let candidates: Vec<String> =
                    symbols.iter().filter(|s| !holdings.contains(*s)).cloned().collect();

                let result =
                    filter_by_cluster_limit(&candidates, &labels, &holdings, max_per_cluster, None);

                prop_assert_eq!(result.approved.len() + result.rejected.len(), candidates.len());
                prop_assert!(result.replacements.is_empty());
                for cluster in 0..4 {
                    let held = holdings.iter().filter(|s| labels[*s] == cluster).count();
                    let approved = result.approved.iter().filter(|s| labels[*s] == cluster).count();
                    prop_assert!(approved == 0 || held + approved <= max_per_cluster);
                }
            }
        }
    }
}
