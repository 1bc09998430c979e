//! Portfolio snapshot persistence port.

use crate::domain::error::RotatorError;
use crate::domain::portfolio::PortfolioSnapshot;
use chrono::NaiveDate;

pub trait SnapshotPort {
    fn save(&self, snapshot: &PortfolioSnapshot) -> Result<(), RotatorError>;

    fn load(&self, as_of: NaiveDate) -> Result<Option<PortfolioSnapshot>, RotatorError>;

    /// Most recent snapshot dated strictly before `date`.
    fn latest_before(&self, date: NaiveDate) -> Result<Option<PortfolioSnapshot>, RotatorError>;
}
