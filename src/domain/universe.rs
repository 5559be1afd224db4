//! Asset universe: parsing the configured asset list and surveying which
//! assets have data.

use crate::domain::error::RebalError;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in asset list")]
    EmptyToken,

    #[error("duplicate asset: {0}")]
    DuplicateAsset(String),
}

/// Splits a comma separated list into upper-cased identifiers.
pub fn parse_assets(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut assets = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let asset = trimmed.to_uppercase();
        if !seen.insert(asset.clone()) {
            return Err(UniverseError::DuplicateAsset(asset));
        }
        assets.push(asset);
    }

    Ok(assets)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Coverage {
    Available {
        first: NaiveDate,
        last: NaiveDate,
        bars: usize,
    },
    Missing,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetCoverage {
    pub asset: String,
    pub coverage: Coverage,
}

impl AssetCoverage {
    pub fn is_available(&self) -> bool {
        matches!(self.coverage, Coverage::Available { .. })
    }

    /// True when the data spans `[start, end]` completely.
    pub fn covers(&self, start: NaiveDate, end: NaiveDate) -> bool {
        match self.coverage {
            Coverage::Available { first, last, .. } => first <= start && last >= end,
            _ => false,
        }
    }
}

/// Reports the stored date range of each asset. Never fails as a whole.
pub fn survey(data_port: &dyn DataPort, assets: &[String]) -> Vec<AssetCoverage> {
    assets
        .iter()
        .map(|asset| {
            let coverage = match data_port.get_data_range(asset) {
                Ok(Some((first, last, bars))) => Coverage::Available { first, last, bars },
                Ok(None) => Coverage::Missing,
                Err(e) => {
                    warn!(asset = asset.as_str(), error = %e, "could not read data range");
                    Coverage::Failed(e.to_string())
                }
            };
            AssetCoverage {
                asset: asset.clone(),
                coverage,
            }
        })
        .collect()
}

/// Errors with [`RebalError::NoValidAssets`] when no surveyed asset has data.
pub fn require_any(coverage: &[AssetCoverage]) -> Result<usize, RebalError> {
    match coverage.iter().filter(|c| c.is_available()).count() {
        0 => Err(RebalError::NoValidAssets),
        n => Ok(n),
    }
}
