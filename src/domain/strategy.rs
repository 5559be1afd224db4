//! Strategy capability and free-form strategy parameters.
//!
//! A strategy is a pure function of `(data, n, current_date, params)`. The
//! trait is blanket-implemented for every matching `Fn`, so built-in
//! strategies are plain functions and tests can pass closures.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::RebalError;
use super::market_data::MarketData;
use super::selection::ScoredAsset;

pub trait Strategy: Sync {
    /// Ranks assets using only rows dated on or before `current_date`.
    /// Returns at most `n` entries sorted by score descending.
    fn select(
        &self,
        data: &MarketData,
        n: usize,
        current_date: NaiveDate,
        params: &StrategyParams,
    ) -> Result<Vec<ScoredAsset>, RebalError>;
}

impl<F> Strategy for F
where
    F: Fn(&MarketData, usize, NaiveDate, &StrategyParams) -> Result<Vec<ScoredAsset>, RebalError>
        + Sync,
{
    fn select(
        &self,
        data: &MarketData,
        n: usize,
        current_date: NaiveDate,
        params: &StrategyParams,
    ) -> Result<Vec<ScoredAsset>, RebalError> {
        self(data, n, current_date, params)
    }
}

/// Strategy parameters as raw strings, parsed on access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrategyParams {
    values: BTreeMap<String, String>,
}

impl StrategyParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl ToString) {
        self.values
            .insert(key.trim().to_lowercase(), value.to_string().trim().to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, RebalError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| {
                RebalError::strategy(format!("invalid value for parameter {key}: {raw}"))
            }),
        }
    }

    pub fn get_usize(&self, key: &str, default: usize) -> Result<usize, RebalError> {
        self.parse_or(key, default)
    }

    pub fn get_f64(&self, key: &str, default: f64) -> Result<f64, RebalError> {
        self.parse_or(key, default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, RebalError> {
        match self.get(key).map(str::to_lowercase).as_deref() {
            None => Ok(default),
            Some("true" | "yes" | "1") => Ok(true),
            Some("false" | "no" | "0") => Ok(false),
            Some(raw) => Err(RebalError::strategy(format!(
                "invalid value for parameter {key}: {raw}"
            ))),
        }
    }
}

impl fmt::Display for StrategyParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{}", pairs.join(","))
    }
}
