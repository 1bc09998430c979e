//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for rotator.
#[derive(Debug, thiserror::Error)]
pub enum RotatorError {
    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error("insufficient data for {symbol}: have {bars} bars, need {minimum}")]
    InsufficientData {
        symbol: String,
        bars: usize,
        minimum: usize,
    },

    #[error("invalid series for {symbol}: {reason}")]
    InvalidSeries { symbol: String, reason: String },

    #[error("cannot sell {symbol} on {date}: acquired on {entry_date}, not yet settled")]
    SettlementViolation {
        symbol: String,
        entry_date: NaiveDate,
        date: NaiveDate,
    },

    #[error("no open position for {symbol}")]
    UnknownPosition { symbol: String },

    #[error("snapshot error: {reason}")]
    Snapshot { reason: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RotatorError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        RotatorError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&RotatorError> for std::process::ExitCode {
    fn from(err: &RotatorError) -> Self {
        let code: u8 = match err {
            RotatorError::Io(_) | RotatorError::Json(_) | RotatorError::Snapshot { .. } => 1,
            RotatorError::ConfigParse { .. }
            | RotatorError::ConfigMissing { .. }
            | RotatorError::ConfigInvalid { .. } => 2,
            RotatorError::Data { .. } | RotatorError::InvalidSeries { .. } => 3,
            RotatorError::SettlementViolation { .. } | RotatorError::UnknownPosition { .. } => 4,
            RotatorError::NoData { .. } | RotatorError::InsufficientData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
