//! Snapshot store as one pretty-printed JSON file per date.

use crate::domain::error::RotatorError;
use crate::domain::portfolio::PortfolioSnapshot;
use crate::ports::snapshot_port::SnapshotPort;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PREFIX: &str = "snapshot_";
const SUFFIX: &str = ".json";

pub struct JsonSnapshotAdapter {
    dir: PathBuf,
}

impl JsonSnapshotAdapter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn path_for(&self, as_of: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{PREFIX}{}{SUFFIX}", as_of.format("%Y-%m-%d")))
    }

    /// Dates of every snapshot file in the directory, ascending.
    pub fn stored_dates(&self) -> Result<Vec<NaiveDate>, RotatorError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut dates = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            let date = name
                .strip_prefix(PREFIX)
                .and_then(|rest| rest.strip_suffix(SUFFIX))
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
            if let Some(date) = date {
                dates.push(date);
            }
        }
        dates.sort();
        Ok(dates)
    }
}

/// Read a snapshot from an explicit path.
pub fn read_snapshot(path: &Path) -> Result<PortfolioSnapshot, RotatorError> {
    let json = fs::read_to_string(path).map_err(|e| RotatorError::Snapshot {
        reason: format!("failed to read {}: {}", path.display(), e),
    })?;
    let snapshot: PortfolioSnapshot = serde_json::from_str(&json)?;
    if !snapshot.is_conserved() {
        return Err(RotatorError::Snapshot {
            reason: format!(
                "{}: total_value {} does not match cash plus holdings",
                path.display(),
                snapshot.total_value
            ),
        });
    }
    Ok(snapshot)
}

impl SnapshotPort for JsonSnapshotAdapter {
    fn save(&self, snapshot: &PortfolioSnapshot) -> Result<(), RotatorError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(snapshot.as_of);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        info!(path = %path.display(), "snapshot saved");
        Ok(())
    }

    fn load(&self, as_of: NaiveDate) -> Result<Option<PortfolioSnapshot>, RotatorError> {
        let path = self.path_for(as_of);
        if !path.exists() {
            debug!(path = %path.display(), "no snapshot");
            return Ok(None);
        }
        read_snapshot(&path).map(Some)
    }

    fn latest_before(&self, date: NaiveDate) -> Result<Option<PortfolioSnapshot>, RotatorError> {
        let latest = self
            .stored_dates()?
            .into_iter()
            .filter(|d| *d < date)
            .next_back();
        match latest {
            Some(d) => self.load(d),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::Position;
    use tempfile::TempDir;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn snapshot(as_of: NaiveDate) -> PortfolioSnapshot {
        let mut s = PortfolioSnapshot::inception(as_of, 100_000.0);
        s.holdings.insert(
            "510300".into(),
            Position::open("510300", as_of, 3.5, 1_000, 3_500.0, 3.2),
        );
        s.cash = 96_500.0;
        s
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = JsonSnapshotAdapter::new(dir.path().join("snapshots"));
        let original = snapshot(d(4));

        store.save(&original).unwrap();
        assert!(store.path_for(d(4)).exists());
        assert_eq!(store.load(d(4)).unwrap(), Some(original));
        assert_eq!(store.load(d(5)).unwrap(), None);
    }

    #[test]
    fn latest_before_picks_most_recent_earlier_date() {
        let dir = TempDir::new().unwrap();
        let store = JsonSnapshotAdapter::new(dir.path().to_path_buf());
        for day in [1, 5, 8] {
            store.save(&snapshot(d(day))).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        assert_eq!(store.stored_dates().unwrap(), vec![d(1), d(5), d(8)]);
        assert_eq!(store.latest_before(d(8)).unwrap().unwrap().as_of, d(5));
        assert_eq!(store.latest_before(d(20)).unwrap().unwrap().as_of, d(8));
        assert!(store.latest_before(d(1)).unwrap().is_none());
    }

    #[test]
    fn empty_directory() {
        let dir = TempDir::new().unwrap();
        let store = JsonSnapshotAdapter::new(dir.path().join("missing"));
        assert!(store.stored_dates().unwrap().is_empty());
        assert!(store.latest_before(d(10)).unwrap().is_none());
    }

    #[test]
    fn corrupt_snapshot_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(read_snapshot(&path), Err(RotatorError::Json(_))));

        let mut unbalanced = snapshot(d(2));
        unbalanced.total_value += 1_000.0;
        fs::write(&path, serde_json::to_string(&unbalanced).unwrap()).unwrap();
        assert!(matches!(read_snapshot(&path), Err(RotatorError::Snapshot { .. })));
    }
}
