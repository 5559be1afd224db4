//! Backtest driver: walks the rebalance calendar and applies one
//! select → allocate → convert → rebalance cycle per event.
//!
//! The strategy only ever sees `MarketData::truncated(d)`, so no row dated
//! after the effective rebalance date can influence a selection.

use chrono::{Days, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use crate::domain::allocation::{AllocationMethod, allocate};
use crate::domain::conversion::convert;
use crate::domain::error::RebalError;
use crate::domain::ledger::{CashPolicy, Ledger};
use crate::domain::market_data::MarketData;
use crate::domain::rebalance::{RebalanceReport, rebalance};
use crate::domain::schedule::{RebalanceDate, resolve_rebalance_dates};
use crate::domain::selection::Selection;
use crate::domain::strategy::{Strategy, StrategyParams};
use crate::ports::data_port::DataPort;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub assets: Vec<String>,
    pub initial_capital: f64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Calendar days of history loaded before `start_date`.
    pub lookback_period: u64,
    /// Calendar days between scheduled rebalances.
    pub holding_period: u64,
    pub n_assets: usize,
    pub strategy_name: String,
    pub strategy_params: StrategyParams,
    pub allocation_method: AllocationMethod,
    pub commission_buy: f64,
    pub commission_sell: f64,
    pub cash_policy: CashPolicy,
}

impl BacktestConfig {
    pub fn new(assets: Vec<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        BacktestConfig {
            assets,
            initial_capital: 10_000.0,
            start_date,
            end_date,
            lookback_period: 365,
            holding_period: 30,
            n_assets: 5,
            strategy_name: "price_to_sma_ratio".to_string(),
            strategy_params: StrategyParams::new(),
            allocation_method: AllocationMethod::Equal,
            commission_buy: 0.001,
            commission_sell: 0.001,
            cash_policy: CashPolicy::Clip,
        }
    }

    /// First date of data to load: `start_date - lookback_period`.
    pub fn data_start(&self) -> NaiveDate {
        self.start_date
            .checked_sub_days(Days::new(self.lookback_period))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Run-level checks performed before any trading.
    pub fn validate(&self, universe: usize) -> Result<(), RebalError> {
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(invalid(
                "initial_capital",
                format!("must be positive, got {}", self.initial_capital),
            ));
        }
        for rate in [self.commission_buy, self.commission_sell] {
            if !rate.is_finite() || !(0.0..1.0).contains(&rate) {
                return Err(RebalError::InvalidCommission { rate });
            }
        }
        if self.holding_period < 1 {
            return Err(invalid("holding_period", "must be at least 1 day".into()));
        }
        if self.n_assets < 1 {
            return Err(invalid("n_assets", "must be at least 1".into()));
        }
        if self.n_assets > universe {
            return Err(RebalError::UniverseTooSmall {
                n_assets: self.n_assets,
                universe,
            });
        }
        if self.start_date > self.end_date {
            return Err(invalid(
                "start_date",
                format!("{} is after end_date {}", self.start_date, self.end_date),
            ));
        }
        Ok(())
    }

    /// Flat `(name, value)` listing of every parameter, in a stable order.
    pub fn parameter_rows(&self) -> Vec<(String, String)> {
        vec![
            ("assets".into(), self.assets.join(",")),
            ("initial_capital".into(), self.initial_capital.to_string()),
            ("start_date".into(), self.start_date.to_string()),
            ("end_date".into(), self.end_date.to_string()),
            ("lookback_period".into(), self.lookback_period.to_string()),
            ("holding_period".into(), self.holding_period.to_string()),
            ("n_assets".into(), self.n_assets.to_string()),
            ("strategy".into(), self.strategy_name.clone()),
            ("strategy_params".into(), self.strategy_params.to_string()),
            ("allocation_method".into(), self.allocation_method.to_string()),
            ("commission_buy".into(), self.commission_buy.to_string()),
            ("commission_sell".into(), self.commission_sell.to_string()),
            ("cash_policy".into(), self.cash_policy.to_string()),
        ]
    }
}

fn invalid(name: &str, reason: String) -> RebalError {
    RebalError::InvalidParameter {
        name: name.to_string(),
        reason,
    }
}

/// Portfolio state recorded after each executed rebalance.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub date: NaiveDate,
    /// Post-rebalance mark-to-market value.
    pub portfolio_value: f64,
    pub cash: f64,
    pub num_positions: usize,
    pub holdings: BTreeMap<String, f64>,
    pub selected_assets: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub ledger: Ledger,
    pub history: Vec<Snapshot>,
    pub parameters: BacktestConfig,
}

impl BacktestResult {
    pub fn final_value(&self) -> f64 {
        self.history
            .last()
            .map(|s| s.portfolio_value)
            .unwrap_or(self.parameters.initial_capital)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    NotStarted,
    Running,
    Complete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Rebalanced(RebalanceReport),
    Skipped { date: NaiveDate, reason: String },
}

/// Stepwise driver over a shared, read-only dataset.
pub struct Backtest<'a> {
    data: &'a MarketData,
    strategy: &'a dyn Strategy,
    config: &'a BacktestConfig,
    schedule: Vec<RebalanceDate>,
    cursor: usize,
    ledger: Ledger,
    history: Vec<Snapshot>,
    state: DriverState,
}

impl<'a> Backtest<'a> {
    pub fn new(
        data: &'a MarketData,
        strategy: &'a dyn Strategy,
        config: &'a BacktestConfig,
    ) -> Result<Self, RebalError> {
        config.validate(data.asset_count())?;

        let ledger = Ledger::new(
            config.initial_capital,
            config.commission_buy,
            config.commission_sell,
        )?
        .with_cash_policy(config.cash_policy);

        let schedule = resolve_rebalance_dates(
            &data.timeline(),
            config.start_date,
            config.end_date,
            config.holding_period,
        );

        Ok(Backtest {
            data,
            strategy,
            config,
            schedule,
            cursor: 0,
            ledger,
            history: Vec::new(),
            state: DriverState::NotStarted,
        })
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn history(&self) -> &[Snapshot] {
        &self.history
    }

    pub fn schedule(&self) -> &[RebalanceDate] {
        &self.schedule
    }

    /// Processes the next rebalance event. Returns `Ok(None)` once complete.
    pub fn step(&mut self) -> Result<Option<StepOutcome>, RebalError> {
        if self.state == DriverState::Complete {
            return Ok(None);
        }

        let Some(event) = self.schedule.get(self.cursor).copied() else {
            self.state = DriverState::Complete;
            return Ok(None);
        };
        self.state = DriverState::Running;
        self.cursor += 1;

        let outcome = self.process(event.effective)?;

        if self.cursor >= self.schedule.len() {
            self.state = DriverState::Complete;
        }
        Ok(Some(outcome))
    }

    /// Steps to completion and returns the result.
    pub fn run_to_end(mut self) -> Result<BacktestResult, RebalError> {
        while self.step()?.is_some() {}

        if self.history.is_empty() {
            return Err(RebalError::EmptyHistory);
        }

        info!(
            rebalances = self.history.len(),
            trades = self.ledger.trade_log().len(),
            final_cash = self.ledger.cash,
            "backtest complete"
        );

        Ok(BacktestResult {
            ledger: self.ledger,
            history: self.history,
            parameters: self.config.clone(),
        })
    }

    fn process(&mut self, date: NaiveDate) -> Result<StepOutcome, RebalError> {
        let slice = self.data.truncated(date);

        let held_prices = slice.prices_as_of(self.ledger.holdings().keys().map(String::as_str), date);
        let unpriced = self.ledger.missing_prices(&held_prices);
        if !unpriced.is_empty() {
            if unpriced.len() == self.ledger.position_count() {
                return Ok(skip(date, "no prices available for holdings"));
            }
            debug!(%date, ?unpriced, "holdings without a price are valued at 0");
        }
        let total_value = self.ledger.total_value(&held_prices);

        let picks = self
            .strategy
            .select(&slice, self.config.n_assets, date, &self.config.strategy_params)
            .map_err(|e| RebalError::StrategyFailed {
                name: self.config.strategy_name.clone(),
                date,
                reason: e.to_string(),
            })?;
        let selection = Selection::validate(picks, self.config.n_assets, date)?;
        if selection.is_empty() {
            return Ok(skip(date, "strategy returned no assets"));
        }

        let target_prices = slice.prices_as_of(selection.as_slice().iter().map(|s| s.asset.as_str()), date);
        if target_prices.is_empty() {
            return Ok(skip(date, "no prices available for selected assets"));
        }

        let target_values = allocate(self.config.allocation_method, selection.as_slice(), total_value);
        let conversion = convert(&target_values, &target_prices, self.config.commission_buy)?;

        let prices: HashMap<String, f64> = held_prices.into_iter().chain(target_prices).collect();
        let report = rebalance(&mut self.ledger, &conversion.shares, &prices, date);

        let snapshot = Snapshot {
            date,
            portfolio_value: self.ledger.total_value(&prices),
            cash: self.ledger.cash,
            num_positions: self.ledger.position_count(),
            holdings: self.ledger.holdings().clone(),
            selected_assets: selection.assets(),
        };
        debug!(
            %date,
            value = snapshot.portfolio_value,
            cash = snapshot.cash,
            positions = snapshot.num_positions,
            trades = report.trade_count(),
            "rebalanced"
        );
        self.history.push(snapshot);

        Ok(StepOutcome::Rebalanced(report))
    }
}

fn skip(date: NaiveDate, reason: &str) -> StepOutcome {
    warn!(%date, reason, "skipping rebalance");
    StepOutcome::Skipped {
        date,
        reason: reason.to_string(),
    }
}

/// Runs a backtest over an already loaded dataset.
pub fn run_backtest(
    data: &MarketData,
    strategy: &dyn Strategy,
    config: &BacktestConfig,
) -> Result<BacktestResult, RebalError> {
    info!(
        assets = data.asset_count(),
        start = %config.start_date,
        end = %config.end_date,
        holding_period = config.holding_period,
        n_assets = config.n_assets,
        strategy = config.strategy_name.as_str(),
        "starting backtest"
    );
    if let Some(last) = data
        .latest_date_on_or_before(config.end_date)
        .filter(|last| *last < config.end_date)
    {
        info!(%last, end = %config.end_date, "data ends before end_date");
    }
    Backtest::new(data, strategy, config)?.run_to_end()
}

/// Loads `config.assets` from `start_date - lookback_period` through
/// `end_date` and runs the backtest.
pub fn run(
    data_port: &dyn DataPort,
    strategy: &dyn Strategy,
    config: &BacktestConfig,
) -> Result<BacktestResult, RebalError> {
    let data = data_port.get_data(&config.assets, config.data_start(), config.end_date)?;
    info!(
        assets = data.asset_count(),
        rows = data.row_count(),
        "data loaded"
    );
    run_backtest(&data, strategy, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::OhlcvBar;
    use crate::domain::selection::ScoredAsset;
    use approx::assert_relative_eq;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn bar(asset: &str, date: NaiveDate, price: f64) -> OhlcvBar {
        OhlcvBar {
            asset: asset.to_string(),
            date,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 1_000,
            adj_close: price,
        }
    }

    /// `days` consecutive daily bars from 2024-01-01; price = base + slope * day.
    fn daily_data(assets: &[(&str, f64, f64)], days: usize) -> MarketData {
        let start = d("2024-01-01");
        let bars = assets
            .iter()
            .flat_map(|&(asset, base, slope)| {
                (0..days).map(move |i| {
                    bar(asset, start + Days::new(i as u64), base + slope * i as f64)
                })
            })
            .collect();
        MarketData::from_bars(bars)
    }

    fn config(assets: &[&str], n: usize, hp: u64) -> BacktestConfig {
        let mut cfg = BacktestConfig::new(
            assets.iter().map(|a| a.to_string()).collect(),
            d("2024-01-01"),
            d("2024-01-20"),
        );
        cfg.n_assets = n;
        cfg.holding_period = hp;
        cfg.lookback_period = 0;
        cfg.commission_buy = 0.0;
        cfg.commission_sell = 0.0;
        cfg
    }

    fn pick_all(
        data: &MarketData,
        n: usize,
        _: NaiveDate,
        _: &StrategyParams,
    ) -> Result<Vec<ScoredAsset>, RebalError> {
        Ok(data.assets().take(n).map(|a| ScoredAsset::new(a, 1.0)).collect())
    }

    #[test]
    fn validate_rejects_bad_parameters() {
        let base = config(&["A"], 1, 5);

        let cfg = BacktestConfig {
            initial_capital: 0.0,
            ..base.clone()
        };
        assert!(matches!(cfg.validate(1), Err(RebalError::InvalidParameter { .. })));

        let cfg = BacktestConfig {
            commission_sell: 1.0,
            ..base.clone()
        };
        assert!(matches!(cfg.validate(1), Err(RebalError::InvalidCommission { .. })));

        let cfg = BacktestConfig {
            holding_period: 0,
            ..base.clone()
        };
        assert!(cfg.validate(1).is_err());

        let cfg = BacktestConfig {
            n_assets: 3,
            ..base.clone()
        };
        assert!(matches!(
            cfg.validate(2),
            Err(RebalError::UniverseTooSmall {
                n_assets: 3,
                universe: 2
            })
        ));

        let cfg = BacktestConfig {
            start_date: d("2025-01-01"),
            ..base.clone()
        };
        assert!(cfg.validate(1).is_err());

        assert!(base.validate(1).is_ok());
    }

    #[test]
    fn data_start_subtracts_lookback() {
        let mut cfg = config(&["A"], 1, 5);
        cfg.lookback_period = 31;
        assert_eq!(cfg.data_start(), d("2023-12-01"));
    }

    #[test]
    fn driver_moves_through_states() {
        let data = daily_data(&[("A", 10.0, 0.0)], 20);
        let cfg = config(&["A"], 1, 10);
        let mut bt = Backtest::new(&data, &pick_all, &cfg).unwrap();

        assert_eq!(bt.state(), DriverState::NotStarted);
        assert!(bt.step().unwrap().is_some());
        assert_eq!(bt.state(), DriverState::Running);
        assert!(bt.step().unwrap().is_some());
        assert_eq!(bt.state(), DriverState::Complete);
        assert!(bt.step().unwrap().is_none());
        assert!(bt.step().unwrap().is_none());
        assert_eq!(bt.history().len(), 2);
    }

    #[test]
    fn flat_prices_without_commission_preserve_value() {
        let data = daily_data(&[("A", 10.0, 0.0), ("B", 20.0, 0.0)], 20);
        let cfg = config(&["A", "B"], 2, 5);
        let result = run_backtest(&data, &pick_all, &cfg).unwrap();

        assert_eq!(result.history.len(), 4);
        for snap in &result.history {
            assert_relative_eq!(snap.portfolio_value, 10_000.0, epsilon = 1e-6);
            assert_eq!(snap.num_positions, 2);
        }
        assert_relative_eq!(result.ledger.position("A"), 500.0, epsilon = 1e-9);
        assert_relative_eq!(result.ledger.position("B"), 250.0, epsilon = 1e-9);
        // Later rebalances are no-ops on unchanged targets.
        assert_eq!(result.ledger.trade_log().len(), 2);
    }

    #[test]
    fn strategy_never_sees_future_rows() {
        let data = daily_data(&[("A", 10.0, 1.0)], 20);
        let cfg = config(&["A"], 1, 3);
        let guard = |slice: &MarketData, n: usize, date: NaiveDate, _: &StrategyParams| {
            assert!(slice.max_date().is_some_and(|max| max <= date));
            let picks: Vec<ScoredAsset> =
                slice.assets().take(n).map(|a| ScoredAsset::new(a, 1.0)).collect();
            Ok::<_, RebalError>(picks)
        };
        let result = run_backtest(&data, &guard, &cfg).unwrap();
        assert_eq!(result.history.len(), 7);
    }

    #[test]
    fn empty_selection_skips_without_recording() {
        let data = daily_data(&[("A", 10.0, 0.0)], 20);
        let cfg = config(&["A"], 1, 5);
        let picky = |slice: &MarketData, _: usize, date: NaiveDate, _: &StrategyParams| {
            if date >= d("2024-01-10") {
                let picks: Vec<ScoredAsset> =
                    slice.assets().map(|a| ScoredAsset::new(a, 1.0)).collect();
                Ok::<_, RebalError>(picks)
            } else {
                Ok(vec![])
            }
        };
        let result = run_backtest(&data, &picky, &cfg).unwrap();
        let dates: Vec<NaiveDate> = result.history.iter().map(|s| s.date).collect();
        assert_eq!(dates, vec![d("2024-01-11"), d("2024-01-16")]);
    }

    #[test]
    fn no_recorded_events_is_an_error() {
        let data = daily_data(&[("A", 10.0, 0.0)], 20);
        let cfg = config(&["A"], 1, 5);
        let none = |_: &MarketData, _: usize, _: NaiveDate, _: &StrategyParams| {
            Ok::<Vec<ScoredAsset>, RebalError>(vec![])
        };
        assert!(matches!(
            run_backtest(&data, &none, &cfg),
            Err(RebalError::EmptyHistory)
        ));
    }

    #[test]
    fn strategy_error_halts_run() {
        let data = daily_data(&[("A", 10.0, 0.0)], 20);
        let cfg = config(&["A"], 1, 5);
        let failing = |_: &MarketData, _: usize, _: NaiveDate, _: &StrategyParams| {
            Err::<Vec<ScoredAsset>, _>(RebalError::strategy("boom"))
        };
        assert!(matches!(
            run_backtest(&data, &failing, &cfg),
            Err(RebalError::StrategyFailed { reason, .. }) if reason.contains("boom")
        ));
    }

    #[test]
    fn oversized_selection_is_a_contract_violation() {
        let data = daily_data(&[("A", 10.0, 0.0), ("B", 10.0, 0.0)], 20);
        let cfg = config(&["A", "B"], 1, 5);
        let greedy = |slice: &MarketData, _: usize, _: NaiveDate, _: &StrategyParams| {
            let picks: Vec<ScoredAsset> = slice.assets().map(|a| ScoredAsset::new(a, 1.0)).collect();
            Ok::<_, RebalError>(picks)
        };
        assert!(matches!(
            run_backtest(&data, &greedy, &cfg),
            Err(RebalError::InvalidSelection { .. })
        ));
    }

    #[test]
    fn rotation_sells_dropped_assets() {
        let data = daily_data(&[("A", 10.0, 0.0), ("B", 20.0, 0.0)], 20);
        let cfg = config(&["A", "B"], 1, 10);
        let rotate = |_: &MarketData, _: usize, date: NaiveDate, _: &StrategyParams| {
            let asset = if date < d("2024-01-10") { "A" } else { "B" };
            Ok::<_, RebalError>(vec![ScoredAsset::new(asset, 1.0)])
        };
        let result = run_backtest(&data, &rotate, &cfg).unwrap();

        assert!(!result.ledger.has_position("A"));
        assert_relative_eq!(result.ledger.position("B"), 500.0, epsilon = 1e-9);
        assert_eq!(result.history[1].selected_assets, vec!["B".to_string()]);
    }

    #[test]
    fn commissions_reduce_value() {
        let data = daily_data(&[("A", 10.0, 0.0)], 20);
        let mut cfg = config(&["A"], 1, 30);
        cfg.commission_buy = 0.001;
        let result = run_backtest(&data, &pick_all, &cfg).unwrap();

        let shares = 10_000.0 / 1.001 / 10.0;
        assert_relative_eq!(result.ledger.position("A"), shares, epsilon = 1e-9);
        assert!(result.final_value() < 10_000.0);
    }

    #[test]
    fn run_rejects_n_assets_above_universe() {
        let data = daily_data(&[("A", 10.0, 0.0)], 20);
        let cfg = config(&["A"], 2, 5);
        assert!(matches!(
            run_backtest(&data, &pick_all, &cfg),
            Err(RebalError::UniverseTooSmall { .. })
        ));
    }
}
