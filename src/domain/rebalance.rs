//! Incremental rebalancing of a ledger toward target share quantities.
//!
//! Two ordered phases:
//! 1. Sell every held asset whose target is below the current quantity
//!    (assets absent from the target are sold in full).
//! 2. Buy every shortfall. Available cash is read from the ledger after the
//!    sell phase; if the pending buys cost more than that, all of them are
//!    scaled by the same `fraction_to_buy = available / pending_cost`.

use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::conversion::TargetShares;
use super::ledger::Ledger;
use super::trade::Fill;

/// Quantity differences below this are not traded.
pub const DUST_SHARES: f64 = 1e-9;

/// Pending buy cost may exceed available cash by this much before scaling.
const SCALE_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceReport {
    pub date: NaiveDate,
    pub sells: Vec<Fill>,
    pub buys: Vec<Fill>,
    /// Uniform scale applied to every pending buy (1.0 when cash sufficed).
    pub fraction_to_buy: f64,
    /// Assets whose buy was clipped by the ledger.
    pub clipped: Vec<String>,
    /// Assets left untouched because no usable price was available or the
    /// ledger rejected the trade.
    pub skipped: Vec<String>,
}

impl RebalanceReport {
    fn new(date: NaiveDate) -> Self {
        RebalanceReport {
            date,
            sells: Vec::new(),
            buys: Vec::new(),
            fraction_to_buy: 1.0,
            clipped: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn trade_count(&self) -> usize {
        self.sells.len() + self.buys.len()
    }

    pub fn is_noop(&self) -> bool {
        self.trade_count() == 0
    }

    pub fn was_scaled(&self) -> bool {
        self.fraction_to_buy < 1.0
    }
}

fn usable_price(prices: &HashMap<String, f64>, asset: &str) -> Option<f64> {
    prices
        .get(asset)
        .copied()
        .filter(|p| p.is_finite() && *p > 0.0)
}

/// Moves `ledger` toward `target`. Never fails: problems with individual
/// assets are logged and listed in the report, and the ledger always stays
/// valid.
pub fn rebalance(
    ledger: &mut Ledger,
    target: &TargetShares,
    prices: &HashMap<String, f64>,
    date: NaiveDate,
) -> RebalanceReport {
    let mut report = RebalanceReport::new(date);

    sell_phase(ledger, target, prices, date, &mut report);
    buy_phase(ledger, target, prices, date, &mut report);

    report
}

fn sell_phase(
    ledger: &mut Ledger,
    target: &TargetShares,
    prices: &HashMap<String, f64>,
    date: NaiveDate,
    report: &mut RebalanceReport,
) {
    let reductions: Vec<(String, f64, f64)> = ledger
        .holdings()
        .iter()
        .filter_map(|(asset, &held)| {
            let wanted = target.get(asset).copied().unwrap_or(0.0);
            if held - wanted > DUST_SHARES {
                Some((asset.clone(), held, wanted))
            } else {
                None
            }
        })
        .collect();

    for (asset, held, wanted) in reductions {
        let Some(price) = usable_price(prices, &asset) else {
            warn!(asset = asset.as_str(), %date, "no price for held asset, cannot sell");
            report.skipped.push(asset);
            continue;
        };

        let result = if wanted <= DUST_SHARES {
            ledger.sell_all(&asset, price, date)
        } else {
            ledger.sell(&asset, held - wanted, price, date)
        };

        match result {
            Ok(fill) if !fill.is_empty() => report.sells.push(fill),
            Ok(_) => {}
            Err(e) => {
                warn!(asset = asset.as_str(), %date, error = %e, "sell rejected");
                report.skipped.push(asset);
            }
        }
    }
}

fn buy_phase(
    ledger: &mut Ledger,
    target: &TargetShares,
    prices: &HashMap<String, f64>,
    date: NaiveDate,
    report: &mut RebalanceReport,
) {
    let mut pending: Vec<(&str, f64, f64)> = Vec::new();
    for (asset, &wanted) in target {
        let shortfall = wanted - ledger.position(asset);
        if shortfall <= DUST_SHARES {
            continue;
        }
        match usable_price(prices, asset) {
            Some(price) => pending.push((asset.as_str(), shortfall, price)),
            None => {
                warn!(asset = asset.as_str(), %date, "no price for target asset, cannot buy");
                report.skipped.push(asset.clone());
            }
        }
    }

    if pending.is_empty() {
        return;
    }

    let commission_factor = 1.0 + ledger.commission_buy();
    let pending_cost: f64 = pending
        .iter()
        .map(|(_, shares, price)| shares * price * commission_factor)
        .sum();
    let available = ledger.cash.max(0.0);

    if pending_cost > available + SCALE_TOLERANCE {
        report.fraction_to_buy = available / pending_cost;
        warn!(
            %date,
            pending_cost,
            available,
            fraction = report.fraction_to_buy,
            "scaling buys down to available cash"
        );
    } else {
        debug!(%date, pending_cost, available, "buys fit available cash");
    }

    for (asset, shortfall, price) in pending {
        match ledger.buy(asset, shortfall * report.fraction_to_buy, price, date) {
            Ok(fill) => {
                if fill.clipped {
                    report.clipped.push(asset.to_string());
                }
                if !fill.is_empty() {
                    report.buys.push(fill);
                }
            }
            Err(e) => {
                warn!(asset, %date, error = %e, "buy rejected");
                report.skipped.push(asset.to_string());
            }
        }
    }
}
