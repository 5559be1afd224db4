//! Target allocation: ranked selection + investable value → monetary targets.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use super::error::RebalError;
use super::selection::ScoredAsset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationMethod {
    #[default]
    Equal,
    ScoreProportional,
}

impl FromStr for AllocationMethod {
    type Err = RebalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "equal" | "equal_weight" => Ok(AllocationMethod::Equal),
            "score_proportional" => Ok(AllocationMethod::ScoreProportional),
            other => Err(RebalError::UnknownAllocation(other.to_string())),
        }
    }
}

impl fmt::Display for AllocationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationMethod::Equal => write!(f, "equal"),
            AllocationMethod::ScoreProportional => write!(f, "score_proportional"),
        }
    }
}

/// Monetary target per asset.
pub type TargetValues = BTreeMap<String, f64>;

pub fn allocate(
    method: AllocationMethod,
    selection: &[ScoredAsset],
    total_value: f64,
) -> TargetValues {
    match method {
        AllocationMethod::Equal => equal_weight(selection, total_value),
        AllocationMethod::ScoreProportional => score_proportional(selection, total_value),
    }
}

/// total_value / |selection| for each selected asset.
pub fn equal_weight(selection: &[ScoredAsset], total_value: f64) -> TargetValues {
    if selection.is_empty() {
        return TargetValues::new();
    }
    let per_asset = total_value.max(0.0) / selection.len() as f64;
    selection
        .iter()
        .map(|s| (s.asset.clone(), per_asset))
        .collect()
}

/// Weights proportional to score, counting only non-negative scores.
///
/// Negative-score assets stay in the result with a zero target. Falls back
/// to [`equal_weight`] when the non-negative scores sum to zero or less.
pub fn score_proportional(selection: &[ScoredAsset], total_value: f64) -> TargetValues {
    if selection.is_empty() {
        return TargetValues::new();
    }

    let total_score: f64 = selection.iter().map(|s| s.score.max(0.0)).sum();
    if total_score <= 0.0 {
        warn!("total score is not positive, falling back to equal weight");
        return equal_weight(selection, total_value);
    }

    let budget = total_value.max(0.0);
    selection
        .iter()
        .map(|s| (s.asset.clone(), s.score.max(0.0) / total_score * budget))
        .collect()
}
