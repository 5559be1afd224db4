//! Commission-aware conversion of monetary targets into share quantities.
//!
//! A target value `v` at price `p` becomes `v / (1 + commission_buy) / p`
//! shares, so buying exactly that many shares costs at most `v` including
//! commission.

use std::collections::{BTreeMap, HashMap};
use tracing::warn;

use super::allocation::TargetValues;
use super::error::RebalError;

/// Target share quantity per asset.
pub type TargetShares = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Conversion {
    pub shares: TargetShares,
    /// Assets dropped for lack of a usable price.
    pub skipped: Vec<String>,
}

pub fn convert(
    target_values: &TargetValues,
    prices: &HashMap<String, f64>,
    commission_buy: f64,
) -> Result<Conversion, RebalError> {
    if !commission_buy.is_finite() || !(0.0..1.0).contains(&commission_buy) {
        return Err(RebalError::InvalidCommission {
            rate: commission_buy,
        });
    }

    let mut conversion = Conversion::default();

    for (asset, &value) in target_values {
        if !value.is_finite() || value < 0.0 {
            return Err(RebalError::InvalidTargetValue {
                asset: asset.clone(),
                value,
            });
        }

        let price = match prices.get(asset) {
            Some(&p) if p.is_finite() && p > 0.0 => p,
            Some(&p) => {
                warn!(asset = asset.as_str(), price = p, "unusable price, skipping");
                conversion.skipped.push(asset.clone());
                continue;
            }
            None => {
                warn!(asset = asset.as_str(), "no price available, skipping");
                conversion.skipped.push(asset.clone());
                continue;
            }
        };

        let value_for_shares = value / (1.0 + commission_buy);
        conversion
            .shares
            .insert(asset.clone(), value_for_shares / price);
    }

    Ok(conversion)
}
