//! OHLCV bar representation.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub asset: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub adj_close: f64,
}

impl OhlcvBar {
    /// Price used for valuation and trading: the adjusted close.
    pub fn price(&self) -> f64 {
        self.adj_close
    }

    /// True when every price field is finite and non-negative and volume is non-negative.
    pub fn is_well_formed(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close, self.adj_close];
        prices.iter().all(|p| p.is_finite() && *p >= 0.0) && self.volume >= 0
    }
}
