//! Performance metrics over a backtest history.

use serde::Serialize;

use super::backtest::Snapshot;
use super::error::RebalError;
use super::trade::{TradeAction, TradeRecord};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const DAYS_PER_YEAR: f64 = 365.25;

/// Window, in snapshots, of the rolling Sharpe column in history reports.
pub const ROLLING_SHARPE_WINDOW: usize = 60;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub final_value: f64,
    pub total_return: f64,
    /// Compound annual growth between the first and last snapshot.
    pub annualized_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    /// Largest peak-to-trough decline, as a positive fraction.
    pub max_drawdown: f64,
    pub num_rebalances: usize,
    pub days: i64,
    pub years: f64,
}

impl Metrics {
    pub fn compute(history: &[Snapshot], initial_capital: f64) -> Result<Self, RebalError> {
        let (first, last) = match (history.first(), history.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(RebalError::EmptyHistory),
        };

        let final_value = last.portfolio_value;
        let total_return = if initial_capital > 0.0 {
            (final_value - initial_capital) / initial_capital
        } else {
            0.0
        };

        let days = (last.date - first.date).num_days();
        let years = days as f64 / DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && initial_capital > 0.0 {
            (final_value / initial_capital).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let values: Vec<f64> = history.iter().map(|s| s.portfolio_value).collect();
        let returns = period_returns(&values);
        let volatility = if returns.len() > 1 {
            sample_std(&returns) * TRADING_DAYS_PER_YEAR.sqrt()
        } else {
            0.0
        };
        let sharpe_ratio = if volatility > 0.0 {
            annualized_return / volatility
        } else {
            0.0
        };

        let max_drawdown = drawdown_series(&values)
            .into_iter()
            .fold(0.0_f64, f64::max);

        Ok(Metrics {
            final_value,
            total_return,
            annualized_return,
            volatility,
            sharpe_ratio,
            max_drawdown,
            num_rebalances: history.len(),
            days,
            years,
        })
    }
}

/// One line of a side-by-side strategy comparison. Percent fields are
/// fractions scaled by 100.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub strategy: String,
    pub final_value: f64,
    pub total_return_pct: f64,
    pub annual_return_pct: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown_pct: f64,
    pub volatility_pct: f64,
    pub num_rebalances: usize,
}

impl ComparisonRow {
    pub fn new(strategy: &str, m: &Metrics) -> Self {
        ComparisonRow {
            strategy: strategy.to_string(),
            final_value: m.final_value,
            total_return_pct: m.total_return * 100.0,
            annual_return_pct: m.annualized_return * 100.0,
            sharpe_ratio: m.sharpe_ratio,
            max_drawdown_pct: m.max_drawdown * 100.0,
            volatility_pct: m.volatility * 100.0,
            num_rebalances: m.num_rebalances,
        }
    }
}

/// Comparison table over named results, in input order.
pub fn compare(results: &[(&str, &Metrics)]) -> Vec<ComparisonRow> {
    results
        .iter()
        .map(|(name, m)| ComparisonRow::new(name, m))
        .collect()
}

/// Trade activity totals from a ledger's trade log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TradeSummary {
    pub buys: usize,
    pub sells: usize,
    pub total_commission: f64,
    /// Gross traded value, both directions.
    pub turnover: f64,
}

impl TradeSummary {
    pub fn from_trades(trades: &[TradeRecord]) -> Self {
        trades.iter().fold(TradeSummary::default(), |mut acc, t| {
            match t.action {
                TradeAction::Buy => acc.buys += 1,
                TradeAction::Sell => acc.sells += 1,
            }
            acc.total_commission += t.commission;
            acc.turnover += t.gross_value();
            acc
        })
    }
}

/// Snapshot-to-snapshot simple returns; periods starting at a non-positive
/// value are dropped.
fn period_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
fn sample_std(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    var.sqrt()
}

/// Drawdown from the running peak at each point, as a positive fraction.
pub fn drawdown_series(values: &[f64]) -> Vec<f64> {
    let mut peak = f64::MIN;
    values
        .iter()
        .map(|&v| {
            peak = peak.max(v);
            if peak > 0.0 { (peak - v) / peak } else { 0.0 }
        })
        .collect()
}

/// Annualized Sharpe over a rolling window of period returns.
///
/// The output is aligned with `values`; points without a full window, or
/// whose window has zero dispersion, are `None`.
pub fn rolling_sharpe(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window < 2 || values.len() <= window {
        return out;
    }

    let returns: Vec<f64> = values
        .windows(2)
        .map(|w| if w[0] > 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect();

    for (end, slot) in out.iter_mut().enumerate().skip(window) {
        // returns[i] is the change into values[i + 1]
        let slice = &returns[end - window..end];
        let std = sample_std(slice);
        if std > 0.0 {
            *slot = Some(mean(slice) / std * TRADING_DAYS_PER_YEAR.sqrt());
        }
    }
    out
}
