//! Cash and holdings ledger with commission-aware buy/sell primitives.
//!
//! The ledger is the only place cash and share quantities change. Every
//! mutation goes through [`Ledger::buy`] or [`Ledger::sell`], which keep
//! `cash >= -CASH_EPSILON` and every holding non-negative.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use super::error::RebalError;
use super::trade::{Fill, TradeAction, TradeRecord};

/// Floating tolerance for cash and share comparisons.
pub const CASH_EPSILON: f64 = 1e-6;

/// Holdings below this are treated as fully sold and removed.
pub const HOLDING_DUST: f64 = 1e-10;

/// Clipping shortfalls larger than this are reported as warnings; smaller
/// ones are floating noise.
const CLIP_WARN_THRESHOLD: f64 = 1.0;

/// What a buy does when it cannot be paid for in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CashPolicy {
    /// Buy the maximum affordable quantity and report it.
    #[default]
    Clip,
    /// Reject the buy with [`RebalError::InsufficientCash`].
    Strict,
}

impl FromStr for CashPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "clip" => Ok(CashPolicy::Clip),
            "strict" => Ok(CashPolicy::Strict),
            other => Err(format!("unknown cash policy: {other}")),
        }
    }
}

impl fmt::Display for CashPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CashPolicy::Clip => write!(f, "clip"),
            CashPolicy::Strict => write!(f, "strict"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    pub cash: f64,
    pub initial_capital: f64,
    holdings: BTreeMap<String, f64>,
    commission_buy: f64,
    commission_sell: f64,
    cash_policy: CashPolicy,
    trade_log: Vec<TradeRecord>,
}

fn validate_rate(rate: f64) -> Result<f64, RebalError> {
    if rate.is_finite() && (0.0..1.0).contains(&rate) {
        Ok(rate)
    } else {
        Err(RebalError::InvalidCommission { rate })
    }
}

fn validate_price(asset: &str, price: f64) -> Result<(), RebalError> {
    if price.is_finite() && price > 0.0 {
        Ok(())
    } else {
        Err(RebalError::InvalidPrice {
            asset: asset.to_string(),
            price,
        })
    }
}

fn validate_shares(asset: &str, shares: f64) -> Result<(), RebalError> {
    if shares.is_finite() && shares >= 0.0 {
        Ok(())
    } else {
        Err(RebalError::InvalidShares {
            asset: asset.to_string(),
            shares,
        })
    }
}

impl Ledger {
    pub fn new(
        initial_capital: f64,
        commission_buy: f64,
        commission_sell: f64,
    ) -> Result<Self, RebalError> {
        if !initial_capital.is_finite() || initial_capital < 0.0 {
            return Err(RebalError::InvalidParameter {
                name: "initial_capital".into(),
                reason: format!("must be non-negative, got {initial_capital}"),
            });
        }
        Ok(Ledger {
            cash: initial_capital,
            initial_capital,
            holdings: BTreeMap::new(),
            commission_buy: validate_rate(commission_buy)?,
            commission_sell: validate_rate(commission_sell)?,
            cash_policy: CashPolicy::default(),
            trade_log: Vec::new(),
        })
    }

    pub fn with_cash_policy(mut self, policy: CashPolicy) -> Self {
        self.cash_policy = policy;
        self
    }

    pub fn commission_buy(&self) -> f64 {
        self.commission_buy
    }

    pub fn commission_sell(&self) -> f64 {
        self.commission_sell
    }

    pub fn cash_policy(&self) -> CashPolicy {
        self.cash_policy
    }

    pub fn holdings(&self) -> &BTreeMap<String, f64> {
        &self.holdings
    }

    pub fn trade_log(&self) -> &[TradeRecord] {
        &self.trade_log
    }

    /// Shares held of `asset` (0 if not held).
    pub fn position(&self, asset: &str) -> f64 {
        self.holdings.get(asset).copied().unwrap_or(0.0)
    }

    pub fn has_position(&self, asset: &str) -> bool {
        self.holdings.contains_key(asset)
    }

    pub fn position_count(&self) -> usize {
        self.holdings.len()
    }

    /// Buy `shares` of `asset` at `price`, paying `commission_buy` on the cost.
    ///
    /// When the total exceeds available cash the quantity is clipped to the
    /// maximum affordable at the same commission rate (or rejected under
    /// [`CashPolicy::Strict`]).
    pub fn buy(
        &mut self,
        asset: &str,
        shares: f64,
        price: f64,
        date: NaiveDate,
    ) -> Result<Fill, RebalError> {
        validate_shares(asset, shares)?;
        validate_price(asset, price)?;

        let mut shares = shares;
        let mut clipped = false;
        let required = shares * price * (1.0 + self.commission_buy);

        if required > self.cash + CASH_EPSILON {
            if self.cash_policy == CashPolicy::Strict {
                return Err(RebalError::InsufficientCash {
                    asset: asset.to_string(),
                    required,
                    available: self.cash,
                });
            }
            let shortfall = required - self.cash;
            if shortfall > CLIP_WARN_THRESHOLD {
                warn!(
                    asset,
                    %date,
                    required,
                    available = self.cash,
                    "insufficient cash, buying maximum possible"
                );
            } else {
                debug!(asset, %date, shortfall, "clipping buy to available cash");
            }
            shares = (self.cash.max(0.0) / (1.0 + self.commission_buy)) / price;
            clipped = true;
        }

        if shares <= 0.0 {
            return Ok(Fill {
                asset: asset.to_string(),
                action: TradeAction::Buy,
                shares: 0.0,
                price,
                commission: 0.0,
                clipped,
            });
        }

        let cost = shares * price;
        let commission = cost * self.commission_buy;
        self.cash -= cost + commission;
        if self.cash < 0.0 && self.cash > -CASH_EPSILON {
            self.cash = 0.0;
        }
        *self.holdings.entry(asset.to_string()).or_insert(0.0) += shares;

        self.record(date, asset, TradeAction::Buy, shares, price, commission);

        Ok(Fill {
            asset: asset.to_string(),
            action: TradeAction::Buy,
            shares,
            price,
            commission,
            clipped,
        })
    }

    /// Sell `shares` of `asset` at `price`, paying `commission_sell` on the proceeds.
    pub fn sell(
        &mut self,
        asset: &str,
        shares: f64,
        price: f64,
        date: NaiveDate,
    ) -> Result<Fill, RebalError> {
        validate_shares(asset, shares)?;
        validate_price(asset, price)?;

        let held = match self.holdings.get(asset) {
            Some(&held) => held,
            None => {
                return Err(RebalError::NotHeld {
                    asset: asset.to_string(),
                });
            }
        };

        if shares > held + CASH_EPSILON {
            return Err(RebalError::Oversell {
                asset: asset.to_string(),
                requested: shares,
                held,
            });
        }

        let clipped = shares > held;
        let shares = shares.min(held);

        if shares == 0.0 {
            return Ok(Fill {
                asset: asset.to_string(),
                action: TradeAction::Sell,
                shares: 0.0,
                price,
                commission: 0.0,
                clipped,
            });
        }

        let proceeds = shares * price;
        let commission = proceeds * self.commission_sell;
        self.cash += proceeds - commission;

        let remaining = held - shares;
        if remaining.abs() < HOLDING_DUST {
            self.holdings.remove(asset);
        } else {
            self.holdings.insert(asset.to_string(), remaining);
        }

        self.record(date, asset, TradeAction::Sell, shares, price, commission);

        Ok(Fill {
            asset: asset.to_string(),
            action: TradeAction::Sell,
            shares,
            price,
            commission,
            clipped,
        })
    }

    /// Sell the entire position in `asset`.
    pub fn sell_all(
        &mut self,
        asset: &str,
        price: f64,
        date: NaiveDate,
    ) -> Result<Fill, RebalError> {
        let held = self.holdings.get(asset).copied().ok_or_else(|| RebalError::NotHeld {
            asset: asset.to_string(),
        })?;
        self.sell(asset, held, price, date)
    }

    /// Mark-to-market value of holdings. Assets missing from `prices` count as 0.
    pub fn holdings_value(&self, prices: &HashMap<String, f64>) -> f64 {
        self.holdings
            .iter()
            .map(|(asset, &shares)| match prices.get(asset) {
                Some(&price) => shares * price,
                None => {
                    warn!(asset = asset.as_str(), "no price available, valuing at 0");
                    0.0
                }
            })
            .sum()
    }

    /// Held assets without an entry in `prices`.
    pub fn missing_prices(&self, prices: &HashMap<String, f64>) -> Vec<String> {
        self.holdings
            .keys()
            .filter(|asset| !prices.contains_key(*asset))
            .cloned()
            .collect()
    }

    /// cash + Σ holdings × price.
    pub fn total_value(&self, prices: &HashMap<String, f64>) -> f64 {
        self.cash + self.holdings_value(prices)
    }

    fn record(
        &mut self,
        date: NaiveDate,
        asset: &str,
        action: TradeAction,
        shares: f64,
        price: f64,
        commission: f64,
    ) {
        self.trade_log.push(TradeRecord {
            date,
            asset: asset.to_string(),
            action,
            shares,
            price,
            commission,
        });
    }
}
