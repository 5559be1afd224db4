//! Ranked selections returned by strategies.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;

use super::error::RebalError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredAsset {
    pub asset: String,
    pub score: f64,
}

impl ScoredAsset {
    pub fn new(asset: impl Into<String>, score: f64) -> Self {
        ScoredAsset {
            asset: asset.into(),
            score,
        }
    }
}

/// Sorts by score descending (stable for ties) and keeps the top `n`.
pub fn top_n(mut scores: Vec<ScoredAsset>, n: usize) -> Vec<ScoredAsset> {
    scores.sort_by(|a, b| b.score.total_cmp(&a.score));
    scores.truncate(n);
    scores
}

/// A validated ranked selection: distinct assets, finite scores, at most `n`
/// entries, ordered by score descending.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selection(Vec<ScoredAsset>);

impl Selection {
    pub fn validate(
        entries: Vec<ScoredAsset>,
        n: usize,
        date: NaiveDate,
    ) -> Result<Self, RebalError> {
        if entries.len() > n {
            return Err(RebalError::InvalidSelection {
                date,
                reason: format!("{} entries returned, at most {} allowed", entries.len(), n),
            });
        }

        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.asset.as_str()) {
                return Err(RebalError::InvalidSelection {
                    date,
                    reason: format!("duplicate asset {}", entry.asset),
                });
            }
            if !entry.score.is_finite() {
                return Err(RebalError::InvalidSelection {
                    date,
                    reason: format!("non-finite score for {}", entry.asset),
                });
            }
        }

        let mut entries = entries;
        entries.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(Selection(entries))
    }

    pub fn as_slice(&self) -> &[ScoredAsset] {
        &self.0
    }

    pub fn assets(&self) -> Vec<String> {
        self.0.iter().map(|s| s.asset.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
