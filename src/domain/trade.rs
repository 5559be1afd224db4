//! Trade records kept in the ledger's append-only log.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "buy"),
            TradeAction::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub date: NaiveDate,
    pub asset: String,
    pub action: TradeAction,
    pub shares: f64,
    pub price: f64,
    pub commission: f64,
}

impl TradeRecord {
    /// shares * price, before commission.
    pub fn gross_value(&self) -> f64 {
        self.shares * self.price
    }

    /// Signed cash impact: negative for buys, positive for sells.
    pub fn cash_flow(&self) -> f64 {
        match self.action {
            TradeAction::Buy => -(self.gross_value() + self.commission),
            TradeAction::Sell => self.gross_value() - self.commission,
        }
    }
}

/// Outcome of a single executed buy or sell.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub asset: String,
    pub action: TradeAction,
    pub shares: f64,
    pub price: f64,
    pub commission: f64,
    /// The requested quantity was reduced to fit available cash or holdings.
    pub clipped: bool,
}

impl Fill {
    pub fn is_empty(&self) -> bool {
        self.shares == 0.0
    }
}
