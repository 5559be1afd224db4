//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for rebaltrader.
#[derive(Debug, thiserror::Error)]
pub enum RebalError {
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

    #[error("no data for {asset}")]
    NoData { asset: String },

    #[error("no valid data obtained for any asset")]
    NoValidAssets,

    #[error("invalid price for {asset}: {price}")]
    InvalidPrice { asset: String, price: f64 },

    #[error("invalid share quantity for {asset}: {shares}")]
    InvalidShares { asset: String, shares: f64 },

    #[error("invalid commission rate {rate}: must be in [0, 1)")]
    InvalidCommission { rate: f64 },

    #[error("invalid target value for {asset}: {value}")]
    InvalidTargetValue { asset: String, value: f64 },

    #[error("cannot sell {asset}: not in holdings")]
    NotHeld { asset: String },

    #[error("cannot sell {requested} shares of {asset}: only {held} available")]
    Oversell {
        asset: String,
        requested: f64,
        held: f64,
    },

    #[error("insufficient cash for {asset}: need {required:.2}, have {available:.2}")]
    InsufficientCash {
        asset: String,
        required: f64,
        available: f64,
    },

    #[error("n_assets ({n_assets}) exceeds universe size ({universe})")]
    UniverseTooSmall { n_assets: usize, universe: usize },

    #[error("invalid run parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("invalid selection on {date}: {reason}")]
    InvalidSelection { date: NaiveDate, reason: String },

    #[error("strategy {name} failed on {date}: {reason}")]
    StrategyFailed {
        name: String,
        date: NaiveDate,
        reason: String,
    },

    #[error("strategy error: {reason}")]
    Strategy { reason: String },

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("unknown allocation method: {0}")]
    UnknownAllocation(String),

    #[error("backtest produced no results - check data and parameters")]
    EmptyHistory,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RebalError {
    /// Shorthand for a strategy-side failure.
    pub fn strategy(reason: impl Into<String>) -> Self {
        RebalError::Strategy {
            reason: reason.into(),
        }
    }
}

impl From<&RebalError> for std::process::ExitCode {
    fn from(err: &RebalError) -> Self {
        let code: u8 = match err {
            RebalError::Io(_) => 1,
            RebalError::ConfigParse { .. }
            | RebalError::ConfigMissing { .. }
            | RebalError::ConfigInvalid { .. }
            | RebalError::UnknownAllocation(_)
            | RebalError::InvalidParameter { .. }
            | RebalError::UniverseTooSmall { .. } => 2,
            RebalError::Data { .. } => 3,
            RebalError::Strategy { .. }
            | RebalError::StrategyFailed { .. }
            | RebalError::UnknownStrategy(_)
            | RebalError::InvalidSelection { .. } => 4,
            RebalError::NoData { .. } | RebalError::NoValidAssets | RebalError::EmptyHistory => 5,
            RebalError::InvalidPrice { .. }
            | RebalError::InvalidShares { .. }
            | RebalError::InvalidCommission { .. }
            | RebalError::InvalidTargetValue { .. }
            | RebalError::NotHeld { .. }
            | RebalError::Oversell { .. }
            | RebalError::InsufficientCash { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversell_message_names_asset_and_quantities() {
        let err = RebalError::Oversell {
            asset: "AAPL".into(),
            requested: 12.0,
            held: 10.0,
        };
        assert_eq!(
            err.to_string(),
            "cannot sell 12 shares of AAPL: only 10 available"
        );
    }

    #[test]
    fn config_errors_map_to_exit_code_two() {
        let err = RebalError::ConfigMissing {
            section: "backtest".into(),
            key: "start_date".into(),
        };
        let code = std::process::ExitCode::from(&err);
        assert_eq!(
            format!("{code:?}"),
            format!("{:?}", std::process::ExitCode::from(2))
        );
    }

    #[test]
    fn strategy_shorthand() {
        let err = RebalError::strategy("lookback_end must be < lookback_start");
        assert!(matches!(err, RebalError::Strategy { reason } if reason.contains("lookback")));
    }
}
