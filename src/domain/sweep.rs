//! Parameter sweep over holding periods × portfolio sizes, and side-by-side
//! runs of several strategies under one configuration.
//!
//! Each grid cell or strategy is an independent backtest over the shared
//! dataset, so they run in parallel on the rayon pool.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use super::backtest::{BacktestConfig, run_backtest};
use super::error::RebalError;
use super::market_data::MarketData;
use super::metrics::{ComparisonRow, Metrics, compare};
use super::strategies;
use super::strategy::Strategy;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepRow {
    pub holding_period: u64,
    pub n_assets: usize,
    pub final_value: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub num_rebalances: usize,
}

pub fn run_sweep(
    data: &MarketData,
    strategy: &dyn Strategy,
    base: &BacktestConfig,
    holding_periods: &[u64],
    n_assets: &[usize],
) -> Result<Vec<SweepRow>, RebalError> {
    let grid: Vec<(u64, usize)> = holding_periods
        .iter()
        .flat_map(|&hp| n_assets.iter().map(move |&n| (hp, n)))
        .collect();
    if grid.is_empty() {
        return Err(RebalError::InvalidParameter {
            name: "sweep".into(),
            reason: "empty parameter grid".into(),
        });
    }

    info!(cells = grid.len(), "running sweep");

    let mut rows: Vec<SweepRow> = grid
        .par_iter()
        .filter_map(|&(holding_period, n)| {
            let config = BacktestConfig {
                holding_period,
                n_assets: n,
                ..base.clone()
            };
            let outcome = run_backtest(data, strategy, &config)
                .and_then(|result| Metrics::compute(&result.history, config.initial_capital));
            match outcome {
                Ok(m) => Some(SweepRow {
                    holding_period,
                    n_assets: n,
                    final_value: m.final_value,
                    total_return: m.total_return,
                    annualized_return: m.annualized_return,
                    sharpe_ratio: m.sharpe_ratio,
                    max_drawdown: m.max_drawdown,
                    num_rebalances: m.num_rebalances,
                }),
                Err(e) => {
                    warn!(holding_period, n_assets = n, error = %e, "sweep cell failed");
                    None
                }
            }
        })
        .collect();

    rows.sort_by_key(|r| (r.holding_period, r.n_assets));
    Ok(rows)
}

/// Row with the highest annualized return.
pub fn best_by_return(rows: &[SweepRow]) -> Option<&SweepRow> {
    rows.iter()
        .max_by(|a, b| a.annualized_return.total_cmp(&b.annualized_return))
}

/// Runs every named built-in strategy over `data` with `base`'s settings.
///
/// Unknown names fail before anything runs. A strategy whose backtest fails
/// is warned about and left out; rows keep the order of `names`.
pub fn compare_strategies(
    data: &MarketData,
    base: &BacktestConfig,
    names: &[String],
) -> Result<Vec<ComparisonRow>, RebalError> {
    if names.is_empty() {
        return Err(RebalError::InvalidParameter {
            name: "strategies".into(),
            reason: "no strategies to compare".into(),
        });
    }
    let resolved = names
        .iter()
        .map(|name| {
            let name = name.trim().to_lowercase();
            strategies::lookup(&name).map(|f| (name, f))
        })
        .collect::<Result<Vec<_>, _>>()?;

    info!(strategies = resolved.len(), "comparing strategies");

    let outcomes: Vec<(String, Metrics)> = resolved
        .par_iter()
        .filter_map(|(name, strategy)| {
            let config = BacktestConfig {
                strategy_name: name.clone(),
                ..base.clone()
            };
            let outcome = run_backtest(data, strategy, &config)
                .and_then(|result| Metrics::compute(&result.history, config.initial_capital));
            match outcome {
                Ok(m) => Some((name.clone(), m)),
                Err(e) => {
                    warn!(strategy = name.as_str(), error = %e, "strategy run failed");
                    None
                }
            }
        })
        .collect();

    let named: Vec<(&str, &Metrics)> = outcomes.iter().map(|(n, m)| (n.as_str(), m)).collect();
    Ok(compare(&named))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::OhlcvBar;
    use crate::domain::selection::{ScoredAsset, top_n};
    use crate::domain::strategy::StrategyParams;
    use chrono::{Days, NaiveDate};

    fn data() -> MarketData {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = [("A", 10.0, 0.1), ("B", 20.0, -0.05), ("C", 5.0, 0.02)]
            .iter()
            .flat_map(|&(asset, base, slope)| {
                (0..60).map(move |i| {
                    let price = base + slope * i as f64;
                    OhlcvBar {
                        asset: asset.to_string(),
                        date: start + Days::new(i),
                        open: price,
                        high: price,
                        low: price,
                        close: price,
                        volume: 100,
                        adj_close: price,
                    }
                })
            })
            .collect();
        MarketData::from_bars(bars)
    }

    fn latest_price(
        data: &MarketData,
        n: usize,
        date: NaiveDate,
        _: &StrategyParams,
    ) -> Result<Vec<ScoredAsset>, RebalError> {
        let scores = data
            .assets()
            .filter_map(|a| data.price_as_of(a, date).map(|p| ScoredAsset::new(a, p)))
            .collect();
        Ok(top_n(scores, n))
    }

    fn base() -> BacktestConfig {
        let mut cfg = BacktestConfig::new(
            vec!["A".into(), "B".into(), "C".into()],
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 28).unwrap(),
        );
        cfg.lookback_period = 0;
        cfg
    }

    #[test]
    fn covers_grid_in_order() {
        let rows = run_sweep(&data(), &latest_price, &base(), &[30, 10], &[2, 1]).unwrap();
        let cells: Vec<(u64, usize)> = rows.iter().map(|r| (r.holding_period, r.n_assets)).collect();
        assert_eq!(cells, vec![(10, 1), (10, 2), (30, 1), (30, 2)]);
    }

    #[test]
    fn failing_cells_are_omitted() {
        // n_assets = 5 exceeds the three-asset universe.
        let rows = run_sweep(&data(), &latest_price, &base(), &[10], &[1, 5]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].n_assets, 1);
    }

    #[test]
    fn empty_grid_is_an_error() {
        assert!(run_sweep(&data(), &latest_price, &base(), &[], &[1]).is_err());
    }

    #[test]
    fn compares_builtin_strategies_in_given_order() {
        let mut cfg = base();
        cfg.n_assets = 1;
        cfg.holding_period = 10;
        cfg.strategy_params = StrategyParams::new()
            .with("m", 5)
            .with("lookback_start", 10)
            .with("lookback_end", 2);
        let names = vec!["FIP".to_string(), "price_to_sma_ratio".to_string()];

        let rows = compare_strategies(&data(), &cfg, &names).unwrap();
        let order: Vec<&str> = rows.iter().map(|r| r.strategy.as_str()).collect();
        assert_eq!(order, vec!["fip", "price_to_sma_ratio"]);
        assert!(rows.iter().all(|r| r.final_value > 0.0 && r.num_rebalances > 0));
    }

    #[test]
    fn strategy_that_fails_is_left_out() {
        let mut cfg = base();
        cfg.n_assets = 1;
        cfg.strategy_params = StrategyParams::new()
            .with("m", 5)
            .with("lookback_start", 2)
            .with("lookback_end", 2);
        let names = vec!["relative_momentum".to_string(), "price_to_sma_ratio".to_string()];

        let rows = compare_strategies(&data(), &cfg, &names).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].strategy, "price_to_sma_ratio");
    }

    #[test]
    fn unknown_or_missing_strategies_are_errors() {
        let names = vec!["fip".to_string(), "tea_leaves".to_string()];
        assert!(matches!(
            compare_strategies(&data(), &base(), &names),
            Err(RebalError::UnknownStrategy(_))
        ));
        assert!(compare_strategies(&data(), &base(), &[]).is_err());
    }

    #[test]
    fn best_by_return_picks_max() {
        let rows = run_sweep(&data(), &latest_price, &base(), &[10, 20], &[1, 2]).unwrap();
        let best = best_by_return(&rows).unwrap();
        assert!(rows.iter().all(|r| r.annualized_return <= best.annualized_return));
    }
}
