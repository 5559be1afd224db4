//! CSV file data adapter: one `<ASSET>.csv` per asset in a base directory.

use crate::domain::error::RebalError;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub struct CsvAdapter {
    base_path: PathBuf,
}

/// Header-addressed row; `adj_close` falls back to `close` when absent.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "Date")]
    date: String,
    #[serde(alias = "Open")]
    open: f64,
    #[serde(alias = "High")]
    high: f64,
    #[serde(alias = "Low")]
    low: f64,
    #[serde(alias = "Close")]
    close: f64,
    #[serde(alias = "Volume")]
    volume: f64,
    #[serde(default, alias = "Adj Close", alias = "adj close")]
    adj_close: Option<f64>,
}

fn data_error(reason: String) -> RebalError {
    RebalError::Data { reason }
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time component.
fn parse_date(raw: &str) -> Result<NaiveDate, RebalError> {
    let day = raw.trim().get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| data_error(format!("invalid date {raw:?}: {e}")))
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn csv_path(&self, asset: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", asset))
    }

    fn read_all(&self, asset: &str) -> Result<Vec<OhlcvBar>, RebalError> {
        let path = self.csv_path(asset);
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|e| data_error(format!("failed to read {}: {}", path.display(), e)))?;

        let mut bars = Vec::new();
        for result in rdr.deserialize::<CsvRow>() {
            let row = result.map_err(|e| {
                data_error(format!("{}: CSV parse error: {}", path.display(), e))
            })?;
            if !row.volume.is_finite() {
                return Err(data_error(format!(
                    "{}: non-finite volume on {}",
                    path.display(),
                    row.date
                )));
            }
            bars.push(OhlcvBar {
                asset: asset.to_string(),
                date: parse_date(&row.date)?,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume as i64,
                adj_close: row.adj_close.unwrap_or(row.close),
            });
        }

        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        asset: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, RebalError> {
        let mut bars = self.read_all(asset)?;
        bars.retain(|b| b.date >= start_date && b.date <= end_date);
        Ok(bars)
    }

    fn list_assets(&self) -> Result<Vec<String>, RebalError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            data_error(format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ))
        })?;

        let mut assets = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| data_error(format!("directory entry error: {}", e)))?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                if let Some(stem) = path.file_stem() {
                    assets.push(stem.to_string_lossy().into_owned());
                }
            }
        }

        assets.sort();
        Ok(assets)
    }

    fn get_data_range(
        &self,
        asset: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, RebalError> {
        if !self.csv_path(asset).exists() {
            return Ok(None);
        }
        let bars = self.read_all(asset)?;
        Ok(match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Some((first.date, last.date, bars.len())),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let csv_content = "date,open,high,low,close,volume,adj_close\n\
            2024-01-17,110.0,120.0,105.0,115.0,55000,114.0\n\
            2024-01-15,100.0,110.0,90.0,105.0,50000,104.0\n\
            2024-01-16,105.0,115.0,100.0,110.0,60000,109.0\n";
        fs::write(path.join("AAPL.csv"), csv_content).unwrap();

        fs::write(
            path.join("MSFT.csv"),
            "Date,Open,High,Low,Close,Volume\n2024-01-15 00:00:00,50,51,49,50.5,1000.0\n",
        )
        .unwrap();
        fs::write(path.join("EMPTY.csv"), "date,open,high,low,close,volume\n").unwrap();
        fs::write(path.join("notes.txt"), "ignore me").unwrap();

        (dir, path)
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn fetch_bars_returns_sorted_data() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let bars = adapter.fetch_bars("AAPL", d(15), d(17)).unwrap();

        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].date, d(15));
        assert_eq!(bars[0].open, 100.0);
        assert_eq!(bars[0].close, 105.0);
        assert_eq!(bars[0].adj_close, 104.0);
        assert_eq!(bars[0].volume, 50000);
        assert_eq!(bars[2].date, d(17));
    }

    #[test]
    fn fetch_bars_filters_by_date() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let bars = adapter.fetch_bars("AAPL", d(16), d(16)).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].date, d(16));
    }

    #[test]
    fn capitalized_headers_and_missing_adj_close() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let bars = adapter.fetch_bars("MSFT", d(1), d(31)).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].adj_close, 50.5);
        assert_eq!(bars[0].volume, 1000);
    }

    #[test]
    fn non_finite_volume_is_rejected() {
        for volume in ["NaN", "inf", "-inf"] {
            let dir = TempDir::new().unwrap();
            fs::write(
                dir.path().join("BAD.csv"),
                format!("date,open,high,low,close,volume\n2024-01-15,10,11,9,10.5,{volume}\n"),
            )
            .unwrap();
            let adapter = CsvAdapter::new(dir.path().to_path_buf());
            assert!(
                matches!(
                    adapter.fetch_bars("BAD", d(1), d(31)),
                    Err(RebalError::Data { ref reason }) if reason.contains("non-finite volume")
                ),
                "volume {volume} should be rejected"
            );
        }
    }

    #[test]
    fn fetch_bars_errors_for_missing_file() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        assert!(matches!(
            adapter.fetch_bars("XYZ", d(1), d(31)),
            Err(RebalError::Data { .. })
        ));
    }

    #[test]
    fn list_assets_returns_csv_stems() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        assert_eq!(adapter.list_assets().unwrap(), vec!["AAPL", "EMPTY", "MSFT"]);
    }

    #[test]
    fn data_range_reports_span() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        assert_eq!(
            adapter.get_data_range("AAPL").unwrap(),
            Some((d(15), d(17), 3))
        );
        assert_eq!(adapter.get_data_range("EMPTY").unwrap(), None);
        assert_eq!(adapter.get_data_range("XYZ").unwrap(), None);
    }

    #[test]
    fn get_data_skips_unusable_assets() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let assets = vec!["AAPL".to_string(), "EMPTY".to_string(), "XYZ".to_string()];
        let data = adapter.get_data(&assets, d(1), d(31)).unwrap();
        assert_eq!(data.asset_count(), 1);
        assert_eq!(data.row_count(), 3);
    }

    #[test]
    fn get_data_errors_when_nothing_loads() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let assets = vec!["EMPTY".to_string(), "XYZ".to_string()];
        assert!(matches!(
            adapter.get_data(&assets, d(1), d(31)),
            Err(RebalError::NoValidAssets)
        ));
    }
}
