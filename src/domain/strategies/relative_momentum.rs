//! Relative momentum between two bar offsets counted back from the latest bar.

use chrono::NaiveDate;
use tracing::debug;

use super::{lookback_window, price_history};
use crate::domain::error::RebalError;
use crate::domain::market_data::MarketData;
use crate::domain::selection::{ScoredAsset, top_n};
use crate::domain::strategy::StrategyParams;

/// score = price[-lookback_end] / price[-lookback_start] - 1.
///
/// `lookback_end = 0` reads the latest bar. Assets with fewer than
/// `lookback_start` bars are skipped.
pub fn relative_momentum(
    data: &MarketData,
    n: usize,
    current_date: NaiveDate,
    params: &StrategyParams,
) -> Result<Vec<ScoredAsset>, RebalError> {
    let (lookback_start, lookback_end) = lookback_window(params)?;

    let mut scores = Vec::new();
    for (asset, prices) in price_history(data, current_date) {
        let len = prices.len();
        if len < lookback_start {
            debug!(asset, bars = len, lookback_start, "not enough history");
            continue;
        }

        let price_start = prices[len - lookback_start];
        let price_end = if lookback_end > 0 {
            prices[len - lookback_end]
        } else {
            prices[len - 1]
        };

        if price_start > 0.0 {
            scores.push(ScoredAsset::new(asset, price_end / price_start - 1.0));
        }
    }

    Ok(top_n(scores, n))
}
