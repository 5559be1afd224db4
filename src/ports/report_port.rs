//! Report generation port.

use std::path::Path;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::RebalError;
use crate::domain::metrics::{ComparisonRow, Metrics};
use crate::domain::sweep::SweepRow;

/// Port for writing backtest, sweep and comparison reports into a directory.
pub trait ReportPort {
    fn write(
        &self,
        result: &BacktestResult,
        metrics: &Metrics,
        output_dir: &Path,
    ) -> Result<(), RebalError>;

    fn write_sweep(&self, rows: &[SweepRow], output_dir: &Path) -> Result<(), RebalError>;

    fn write_comparison(&self, rows: &[ComparisonRow], output_dir: &Path)
    -> Result<(), RebalError>;
}
