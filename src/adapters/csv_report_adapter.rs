//! CSV report adapter implementing ReportPort.
//!
//! Writes `history.csv`, `trades.csv`, `metrics.csv` and `parameters.csv`
//! for a backtest, `sweep.csv` for a sweep and `comparison.csv` for a
//! strategy comparison.

use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::domain::backtest::{BacktestResult, Snapshot};
use crate::domain::error::RebalError;
use crate::domain::metrics::{
    ComparisonRow, Metrics, ROLLING_SHARPE_WINDOW, TradeSummary, drawdown_series, rolling_sharpe,
};
use crate::domain::sweep::SweepRow;
use crate::ports::report_port::ReportPort;

pub struct CsvReportAdapter;

#[derive(Serialize)]
struct HistoryRow<'a> {
    date: String,
    portfolio_value: f64,
    cash: f64,
    num_positions: usize,
    drawdown: f64,
    /// Empty until a full window of snapshots exists.
    rolling_sharpe: Option<f64>,
    /// `ASSET=shares` pairs separated by `;`.
    holdings: String,
    selected_assets: &'a str,
}

/// Metrics and trade totals in one flat record.
#[derive(Serialize)]
struct MetricsRow {
    final_value: f64,
    total_return: f64,
    annualized_return: f64,
    volatility: f64,
    sharpe_ratio: f64,
    max_drawdown: f64,
    num_rebalances: usize,
    days: i64,
    years: f64,
    buys: usize,
    sells: usize,
    total_commission: f64,
    turnover: f64,
}

impl MetricsRow {
    fn new(m: &Metrics, t: TradeSummary) -> Self {
        MetricsRow {
            final_value: m.final_value,
            total_return: m.total_return,
            annualized_return: m.annualized_return,
            volatility: m.volatility,
            sharpe_ratio: m.sharpe_ratio,
            max_drawdown: m.max_drawdown,
            num_rebalances: m.num_rebalances,
            days: m.days,
            years: m.years,
            buys: t.buys,
            sells: t.sells,
            total_commission: t.total_commission,
            turnover: t.turnover,
        }
    }
}

#[derive(Serialize)]
struct ParameterRow<'a> {
    name: &'a str,
    value: &'a str,
}

fn io_error(e: csv::Error) -> RebalError {
    RebalError::Io(e.into())
}

fn write_rows<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<(), RebalError> {
    let mut wtr = csv::Writer::from_path(path).map_err(io_error)?;
    for row in rows {
        wtr.serialize(row).map_err(io_error)?;
    }
    wtr.flush()?;
    Ok(())
}

fn format_holdings(snapshot: &Snapshot) -> String {
    snapshot
        .holdings
        .iter()
        .map(|(asset, shares)| format!("{asset}={shares:.6}"))
        .collect::<Vec<_>>()
        .join(";")
}

impl ReportPort for CsvReportAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        metrics: &Metrics,
        output_dir: &Path,
    ) -> Result<(), RebalError> {
        fs::create_dir_all(output_dir)?;

        let values: Vec<f64> = result.history.iter().map(|s| s.portfolio_value).collect();
        let drawdowns = drawdown_series(&values);
        let sharpes = rolling_sharpe(&values, ROLLING_SHARPE_WINDOW);
        let selected: Vec<String> = result
            .history
            .iter()
            .map(|s| s.selected_assets.join(";"))
            .collect();
        write_rows(
            &output_dir.join("history.csv"),
            result
                .history
                .iter()
                .zip(drawdowns)
                .zip(sharpes)
                .zip(&selected)
                .map(|(((snap, drawdown), rolling_sharpe), selected)| HistoryRow {
                    date: snap.date.to_string(),
                    portfolio_value: snap.portfolio_value,
                    cash: snap.cash,
                    num_positions: snap.num_positions,
                    drawdown,
                    rolling_sharpe,
                    holdings: format_holdings(snap),
                    selected_assets: selected,
                }),
        )?;

        write_rows(&output_dir.join("trades.csv"), result.ledger.trade_log())?;

        write_rows(
            &output_dir.join("metrics.csv"),
            [MetricsRow::new(
                metrics,
                TradeSummary::from_trades(result.ledger.trade_log()),
            )],
        )?;

        let params = result.parameters.parameter_rows();
        write_rows(
            &output_dir.join("parameters.csv"),
            params.iter().map(|(name, value)| ParameterRow { name, value }),
        )?;

        Ok(())
    }

    fn write_sweep(&self, rows: &[SweepRow], output_dir: &Path) -> Result<(), RebalError> {
        fs::create_dir_all(output_dir)?;
        write_rows(&output_dir.join("sweep.csv"), rows)
    }

    fn write_comparison(
        &self,
        rows: &[ComparisonRow],
        output_dir: &Path,
    ) -> Result<(), RebalError> {
        fs::create_dir_all(output_dir)?;
        write_rows(&output_dir.join("comparison.csv"), rows)
    }
}
