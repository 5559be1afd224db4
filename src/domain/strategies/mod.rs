//! Built-in ranking strategies and the name registry.
//!
//! Each strategy is a plain function matching the [`Strategy`] signature and
//! only reads bars dated on or before `current_date`.
//!
//! [`Strategy`]: crate::domain::strategy::Strategy

pub mod fip;
pub mod price_to_sma_ratio;
pub mod relative_momentum;

use chrono::NaiveDate;

use crate::domain::error::RebalError;
use crate::domain::market_data::MarketData;
use crate::domain::selection::ScoredAsset;
use crate::domain::strategy::StrategyParams;

pub type StrategyFn =
    fn(&MarketData, usize, NaiveDate, &StrategyParams) -> Result<Vec<ScoredAsset>, RebalError>;

#[derive(Debug, Clone, Copy)]
pub struct StrategyInfo {
    pub name: &'static str,
    pub description: &'static str,
    /// `(parameter, default)` pairs.
    pub params: &'static [(&'static str, &'static str)],
    pub function: StrategyFn,
}

const BUILTIN: &[StrategyInfo] = &[
    StrategyInfo {
        name: "price_to_sma_ratio",
        description: "price over its m-bar simple moving average",
        params: &[("m", "50")],
        function: price_to_sma_ratio::price_to_sma_ratio,
    },
    StrategyInfo {
        name: "relative_momentum",
        description: "return between two bar offsets, skipping the most recent bars",
        params: &[("lookback_start", "365"), ("lookback_end", "30")],
        function: relative_momentum::relative_momentum,
    },
    StrategyInfo {
        name: "fip",
        description: "frog-in-the-pan: signed share of up days over the momentum window",
        params: &[
            ("lookback_start", "365"),
            ("lookback_end", "30"),
            ("only_sign", "true"),
        ],
        function: fip::fip,
    },
];

pub fn available() -> &'static [StrategyInfo] {
    BUILTIN
}

pub fn lookup(name: &str) -> Result<StrategyFn, RebalError> {
    let wanted = name.trim().to_lowercase();
    BUILTIN
        .iter()
        .find(|info| info.name == wanted)
        .map(|info| info.function)
        .ok_or_else(|| RebalError::UnknownStrategy(name.to_string()))
}

/// Adjusted close history per asset, cut at `current_date`.
fn price_history(data: &MarketData, current_date: NaiveDate) -> Vec<(&str, Vec<f64>)> {
    data.iter()
        .map(|series| {
            let prices = series
                .bars_until(current_date)
                .iter()
                .map(|b| b.price())
                .collect();
            (series.asset.as_str(), prices)
        })
        .collect()
}

/// Checks `lookback_end < lookback_start` and returns both.
fn lookback_window(params: &StrategyParams) -> Result<(usize, usize), RebalError> {
    let start = params.get_usize("lookback_start", 365)?;
    let end = params.get_usize("lookback_end", 30)?;
    if end >= start {
        return Err(RebalError::strategy(format!(
            "lookback_end ({end}) must be < lookback_start ({start})"
        )));
    }
    Ok((start, end))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_names() {
        for info in available() {
            assert!(lookup(info.name).is_ok());
        }
        assert!(lookup("  FIP ").is_ok());
    }

    #[test]
    fn lookup_unknown_name() {
        assert!(matches!(
            lookup("buy_the_dip"),
            Err(RebalError::UnknownStrategy(name)) if name == "buy_the_dip"
        ));
    }

    #[test]
    fn lookback_window_rejects_inverted_range() {
        let params = StrategyParams::new()
            .with("lookback_start", 10)
            .with("lookback_end", 10);
        assert!(matches!(
            lookback_window(&params),
            Err(RebalError::Strategy { .. })
        ));
    }

    #[test]
    fn price_history_ignores_future_bars() {
        let data = fixtures::market(&[("A", &[1.0, 2.0, 3.0, 4.0])]);
        let history = price_history(&data, fixtures::day(1));
        assert_eq!(history, vec![("A", vec![1.0, 2.0])]);
    }
}
