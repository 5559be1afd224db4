#![allow(dead_code)]

use chrono::{Days, NaiveDate};
pub use rebaltrader::domain::backtest::BacktestConfig;
use rebaltrader::domain::error::RebalError;
pub use rebaltrader::domain::ohlcv::OhlcvBar;
use rebaltrader::ports::data_port::DataPort;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, asset: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(asset.to_string(), bars);
        self
    }

    pub fn with_error(mut self, asset: &str, reason: &str) -> Self {
        self.errors.insert(asset.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        asset: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, RebalError> {
        if let Some(reason) = self.errors.get(asset) {
            return Err(RebalError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(asset)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start_date && b.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_assets(&self) -> Result<Vec<String>, RebalError> {
        let mut assets: Vec<String> = self.data.keys().cloned().collect();
        assets.sort();
        Ok(assets)
    }

    fn get_data_range(
        &self,
        asset: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, RebalError> {
        if let Some(reason) = self.errors.get(asset) {
            return Err(RebalError::Data {
                reason: reason.clone(),
            });
        }
        match self.data.get(asset) {
            Some(bars) if !bars.is_empty() => {
                let min = bars.iter().map(|b| b.date).min().unwrap();
                let max = bars.iter().map(|b| b.date).max().unwrap();
                Ok(Some((min, max, bars.len())))
            }
            _ => Ok(None),
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(asset: &str, date: NaiveDate, price: f64) -> OhlcvBar {
    OhlcvBar {
        asset: asset.to_string(),
        date,
        open: price,
        high: price * 1.01,
        low: price * 0.99,
        close: price,
        volume: 1000,
        adj_close: price,
    }
}

/// One bar per calendar day, price moving linearly by `slope` per day.
pub fn generate_bars(
    asset: &str,
    start: NaiveDate,
    count: usize,
    start_price: f64,
    slope: f64,
) -> Vec<OhlcvBar> {
    (0..count)
        .map(|i| make_bar(asset, start + Days::new(i as u64), start_price + slope * i as f64))
        .collect()
}

/// Like [`generate_bars`] but skipping Saturdays and Sundays.
pub fn generate_weekday_bars(
    asset: &str,
    start: NaiveDate,
    days: usize,
    start_price: f64,
    slope: f64,
) -> Vec<OhlcvBar> {
    use chrono::{Datelike, Weekday};
    (0..days)
        .filter_map(|i| {
            let d = start + Days::new(i as u64);
            match d.weekday() {
                Weekday::Sat | Weekday::Sun => None,
                _ => Some(make_bar(asset, d, start_price + slope * i as f64)),
            }
        })
        .collect()
}

/// Config over `assets` with no lookback or commission, equal weights.
pub fn sample_config(assets: &[&str], start: NaiveDate, end: NaiveDate) -> BacktestConfig {
    let mut cfg = BacktestConfig::new(
        assets.iter().map(|a| a.to_string()).collect(),
        start,
        end,
    );
    cfg.lookback_period = 0;
    cfg.commission_buy = 0.0;
    cfg.commission_sell = 0.0;
    cfg.n_assets = assets.len().min(2);
    cfg
}

/// Writes bars as `<dir>/<ASSET>.csv` in the data adapter's format.
pub fn write_csv(dir: &Path, asset: &str, bars: &[OhlcvBar]) {
    let mut content = String::from("date,open,high,low,close,volume,adj_close\n");
    for b in bars {
        content.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            b.date, b.open, b.high, b.low, b.close, b.volume, b.adj_close
        ));
    }
    fs::write(dir.join(format!("{asset}.csv")), content).unwrap();
}
