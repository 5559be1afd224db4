//! Price-to-SMA ratio: favours assets trading furthest above their trend.
//!
//! score = price(current_date) / SMA(m), where the SMA covers the last `m`
//! bars up to and including `current_date`.

use chrono::NaiveDate;
use tracing::debug;

use super::price_history;
use crate::domain::error::RebalError;
use crate::domain::market_data::MarketData;
use crate::domain::selection::{ScoredAsset, top_n};
use crate::domain::strategy::StrategyParams;

pub fn price_to_sma_ratio(
    data: &MarketData,
    n: usize,
    current_date: NaiveDate,
    params: &StrategyParams,
) -> Result<Vec<ScoredAsset>, RebalError> {
    let m = params.get_usize("m", 50)?;
    if m == 0 {
        return Err(RebalError::strategy("m must be at least 1"));
    }

    let mut scores = Vec::new();
    for (asset, prices) in price_history(data, current_date) {
        // Needs a bar on the evaluation date itself.
        let has_bar_today = data
            .series(asset)
            .is_some_and(|s| s.get_bar(current_date).is_some());
        if !has_bar_today || prices.len() < m {
            debug!(asset, bars = prices.len(), m, "skipping asset");
            continue;
        }

        let window = &prices[prices.len() - m..];
        let sma = window.iter().sum::<f64>() / m as f64;
        let current = prices[prices.len() - 1];
        if sma > 0.0 {
            scores.push(ScoredAsset::new(asset, current / sma));
        }
    }

    Ok(top_n(scores, n))
}
