//! Frog-in-the-pan: prefers gradual risers over assets that moved in a few jumps.
//!
//! Over the bar window `[-lookback_start, -lookback_end)` count up days
//! (`n_pos`) and down days (`n_neg`). The score is
//! `sign(return) * (n_pos - n_neg) / (lookback_start - lookback_end)`, or uses
//! the raw return instead of its sign when `only_sign = false`.

use chrono::NaiveDate;
use tracing::debug;

use super::{lookback_window, price_history};
use crate::domain::error::RebalError;
use crate::domain::market_data::MarketData;
use crate::domain::selection::{ScoredAsset, top_n};
use crate::domain::strategy::StrategyParams;

pub fn fip(
    data: &MarketData,
    n: usize,
    current_date: NaiveDate,
    params: &StrategyParams,
) -> Result<Vec<ScoredAsset>, RebalError> {
    let (lookback_start, lookback_end) = lookback_window(params)?;
    let only_sign = params.get_bool("only_sign", true)?;
    let total_days = (lookback_start - lookback_end) as f64;

    let mut scores = Vec::new();
    for (asset, prices) in price_history(data, current_date) {
        let len = prices.len();
        if len < lookback_start {
            debug!(asset, bars = len, lookback_start, "not enough history");
            continue;
        }

        let window = &prices[len - lookback_start..len - lookback_end];
        if window.len() < 2 {
            continue;
        }

        let (mut n_pos, mut n_neg) = (0i64, 0i64);
        for pair in window.windows(2) {
            if pair[1] > pair[0] {
                n_pos += 1;
            } else if pair[1] < pair[0] {
                n_neg += 1;
            }
        }

        let price_start = window[0];
        let price_end = window[window.len() - 1];
        if price_start <= 0.0 {
            continue;
        }

        let period_return = price_end / price_start - 1.0;
        let direction = if only_sign {
            sign(period_return)
        } else {
            period_return
        };
        scores.push(ScoredAsset::new(
            asset,
            direction * (n_pos - n_neg) as f64 / total_days,
        ));
    }

    Ok(top_n(scores, n))
}

/// Sign with `sign(0) = 0`.
fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}
