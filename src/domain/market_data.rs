//! Per-asset price series and the (date, asset) indexed dataset.
//!
//! `MarketData` is the read-only table the data provider hands to the engine.
//! `truncated` produces the look-ahead-safe slice given to strategies.

use crate::domain::error::RebalError;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct AssetSeries {
    pub asset: String,
    pub bars: Vec<OhlcvBar>,
    pub date_index: HashMap<NaiveDate, usize>,
}

impl AssetSeries {
    /// Builds a series; bars are sorted by date.
    pub fn new(asset: String, mut bars: Vec<OhlcvBar>) -> Self {
        bars.sort_by_key(|b| b.date);
        let date_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        Self {
            asset,
            bars,
            date_index,
        }
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn get_bar(&self, date: NaiveDate) -> Option<&OhlcvBar> {
        self.date_index.get(&date).map(|&i| &self.bars[i])
    }

    /// Bars dated on or before `date`.
    pub fn bars_until(&self, date: NaiveDate) -> &[OhlcvBar] {
        let end = self.bars.partition_point(|b| b.date <= date);
        &self.bars[..end]
    }

    /// Most recent bar on or before `date`.
    pub fn bar_as_of(&self, date: NaiveDate) -> Option<&OhlcvBar> {
        self.bars_until(date).last()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    /// Adjusted close prices in date order.
    pub fn prices(&self) -> Vec<f64> {
        self.bars.iter().map(OhlcvBar::price).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MarketData {
    series: BTreeMap<String, AssetSeries>,
}

impl MarketData {
    pub fn new(series: Vec<AssetSeries>) -> Self {
        Self {
            series: series.into_iter().map(|s| (s.asset.clone(), s)).collect(),
        }
    }

    /// Groups a flat list of bars by asset.
    pub fn from_bars(bars: Vec<OhlcvBar>) -> Self {
        let mut grouped: BTreeMap<String, Vec<OhlcvBar>> = BTreeMap::new();
        for bar in bars {
            grouped.entry(bar.asset.clone()).or_default().push(bar);
        }
        Self::new(
            grouped
                .into_iter()
                .map(|(asset, bars)| AssetSeries::new(asset, bars))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn asset_count(&self) -> usize {
        self.series.len()
    }

    pub fn row_count(&self) -> usize {
        self.series.values().map(AssetSeries::bar_count).sum()
    }

    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn series(&self, asset: &str) -> Option<&AssetSeries> {
        self.series.get(asset)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssetSeries> {
        self.series.values()
    }

    /// Sorted union of every date with at least one bar.
    pub fn timeline(&self) -> Vec<NaiveDate> {
        let unique: BTreeSet<NaiveDate> = self
            .series
            .values()
            .flat_map(|s| s.bars.iter().map(|b| b.date))
            .collect();
        unique.into_iter().collect()
    }

    pub fn max_date(&self) -> Option<NaiveDate> {
        self.series.values().filter_map(AssetSeries::last_date).max()
    }

    /// Most recent date with data for any asset, on or before `date`.
    pub fn latest_date_on_or_before(&self, date: NaiveDate) -> Option<NaiveDate> {
        self.series
            .values()
            .filter_map(|s| s.bar_as_of(date).map(|b| b.date))
            .max()
    }

    /// Copy of the dataset without any row dated after `date`.
    pub fn truncated(&self, date: NaiveDate) -> MarketData {
        let series = self
            .series
            .values()
            .filter_map(|s| {
                let bars = s.bars_until(date);
                if bars.is_empty() {
                    None
                } else {
                    Some(AssetSeries::new(s.asset.clone(), bars.to_vec()))
                }
            })
            .collect();
        MarketData::new(series)
    }

    /// Latest adjusted close on or before `date`.
    pub fn price_as_of(&self, asset: &str, date: NaiveDate) -> Option<f64> {
        self.series
            .get(asset)
            .and_then(|s| s.bar_as_of(date))
            .map(OhlcvBar::price)
    }

    /// Price map for `assets` as of `date`; assets without a price are omitted.
    pub fn prices_as_of<'a, I>(&self, assets: I, date: NaiveDate) -> HashMap<String, f64>
    where
        I: IntoIterator<Item = &'a str>,
    {
        assets
            .into_iter()
            .filter_map(|asset| {
                self.price_as_of(asset, date)
                    .map(|price| (asset.to_string(), price))
            })
            .collect()
    }
}

/// Validates a single asset's bars: well-formed values, no duplicate dates.
/// Returns the bars sorted by date.
pub fn validate_bars(asset: &str, mut bars: Vec<OhlcvBar>) -> Result<Vec<OhlcvBar>, RebalError> {
    if bars.is_empty() {
        return Err(RebalError::NoData {
            asset: asset.to_string(),
        });
    }

    if let Some(bad) = bars.iter().find(|b| !b.is_well_formed()) {
        return Err(RebalError::Data {
            reason: format!("{}: malformed bar on {}", asset, bad.date),
        });
    }

    let mut seen = HashSet::with_capacity(bars.len());
    if let Some(dup) = bars.iter().find(|b| !seen.insert(b.date)) {
        return Err(RebalError::Data {
            reason: format!("{}: duplicate bar on {}", asset, dup.date),
        });
    }

    bars.sort_by_key(|b| b.date);
    Ok(bars)
}
