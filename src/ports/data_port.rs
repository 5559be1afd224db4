//! Market data access port.

use crate::domain::error::RebalError;
use crate::domain::market_data::{AssetSeries, MarketData, validate_bars};
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;
use tracing::{debug, warn};

pub trait DataPort {
    /// Bars for `asset` dated within `[start_date, end_date]`.
    fn fetch_bars(
        &self,
        asset: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, RebalError>;

    fn list_assets(&self) -> Result<Vec<String>, RebalError>;

    /// `(first_date, last_date, bar_count)` or `None` if the asset has no data.
    fn get_data_range(
        &self,
        asset: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, RebalError>;

    /// Loads and validates every asset. Assets that fail to load or validate
    /// are skipped with a warning; an error is returned only when none remain.
    fn get_data(
        &self,
        assets: &[String],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<MarketData, RebalError> {
        let mut series = Vec::with_capacity(assets.len());

        for asset in assets {
            let bars = match self
                .fetch_bars(asset, start_date, end_date)
                .and_then(|bars| validate_bars(asset, bars))
            {
                Ok(bars) => bars,
                Err(e) => {
                    warn!(asset = asset.as_str(), error = %e, "skipping asset");
                    continue;
                }
            };
            debug!(asset = asset.as_str(), bars = bars.len(), "loaded");
            series.push(AssetSeries::new(asset.clone(), bars));
        }

        if series.is_empty() {
            return Err(RebalError::NoValidAssets);
        }
        Ok(MarketData::new(series))
    }
}
