// Point-in-time L2 order book view
// Levels are normalized on construction: bids descending, asks ascending.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SimulatorError, SimulatorResult};

/// Side of the hypothetical order being costed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    Buy,
    Sell,
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" | "b" => Ok(Side::Buy),
            "sell" | "s" => Ok(Side::Sell),
            other => Err(format!("unknown side '{}', expected buy or sell", other)),
        }
    }
}

/// Result of consuming book levels for a given quantity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookWalk {
    /// Volume-weighted average fill price
    pub vwap: f64,
    pub filled: f64,
    pub levels_consumed: usize,
}

impl BookWalk {
    /// True when the visible book could not absorb the full quantity
    pub fn is_partial(&self, requested: f64) -> bool {
        self.filled + 1e-12 < requested
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    symbol: String,
    bids: Vec<(f64, f64)>, // (price, quantity)
    asks: Vec<(f64, f64)>,
    timestamp: DateTime<Utc>,
    sequence: u64,
}

impl OrderBookSnapshot {
    pub fn new(
        symbol: impl Into<String>,
        mut bids: Vec<(f64, f64)>,
        mut asks: Vec<(f64, f64)>,
        timestamp: DateTime<Utc>,
        sequence: u64,
    ) -> Self {
        bids.sort_by(|a, b| b.0.total_cmp(&a.0));
        asks.sort_by(|a, b| a.0.total_cmp(&b.0));

        Self {
            symbol: symbol.into(),
            bids,
            asks,
            timestamp,
            sequence,
        }
    }

    /// Reject books the estimation core cannot work with.
    ///
    /// Both sides must be non-empty, every level finite and strictly positive,
    /// and the book must not be crossed or locked.
    pub fn validate(&self) -> SimulatorResult<()> {
        if self.bids.is_empty() || self.asks.is_empty() {
            return Err(SimulatorError::InvalidSnapshot(format!(
                "{} seq {}: empty side (bids={}, asks={})",
                self.symbol,
                self.sequence,
                self.bids.len(),
                self.asks.len()
            )));
        }

        let bad_level = self
            .bids
            .iter()
            .chain(self.asks.iter())
            .find(|(price, qty)| !price.is_finite() || !qty.is_finite() || *price <= 0.0 || *qty <= 0.0);
        if let Some((price, qty)) = bad_level {
            return Err(SimulatorError::InvalidSnapshot(format!(
                "{} seq {}: bad level ({}, {})",
                self.symbol, self.sequence, price, qty
            )));
        }

        let (bid, ask) = (self.bids[0].0, self.asks[0].0);
        if bid >= ask {
            return Err(SimulatorError::InvalidSnapshot(format!(
                "{} seq {}: crossed book, best bid {} >= best ask {}",
                self.symbol, self.sequence, bid, ask
            )));
        }

        Ok(())
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bids(&self) -> &[(f64, f64)] {
        &self.bids
    }

    pub fn asks(&self) -> &[(f64, f64)] {
        &self.asks
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|(price, _)| *price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|(price, _)| *price)
    }

    pub fn mid_price(&self) -> Option<f64> {
        Some((self.best_bid()? + self.best_ask()?) / 2.0)
    }

    pub fn spread(&self) -> Option<f64> {
        Some(self.best_ask()? - self.best_bid()?)
    }

    /// Total bid quantity across the top `levels` levels
    pub fn bid_depth(&self, levels: usize) -> f64 {
        self.bids.iter().take(levels).map(|(_, qty)| qty).sum()
    }

    /// Total ask quantity across the top `levels` levels
    pub fn ask_depth(&self, levels: usize) -> f64 {
        self.asks.iter().take(levels).map(|(_, qty)| qty).sum()
    }

    /// Signed quantity imbalance in [-1, 1] over the top `levels` levels.
    /// Positive means more resting bid quantity.
    pub fn imbalance(&self, levels: usize) -> f64 {
        let bid = self.bid_depth(levels);
        let ask = self.ask_depth(levels);
        let total = bid + ask;
        if total > 0.0 {
            (bid - ask) / total
        } else {
            0.0
        }
    }

    /// Walk the side an order of `side` would take liquidity from.
    ///
    /// Buys consume asks from the best price upward, sells consume bids
    /// downward. Returns `None` when nothing could be filled.
    pub fn walk_book(&self, side: Side, quantity: f64) -> Option<BookWalk> {
        if !(quantity > 0.0) {
            return None;
        }

        let levels = match side {
            Side::Buy => &self.asks,
            Side::Sell => &self.bids,
        };

        let mut remaining = quantity;
        let mut notional = 0.0;
        let mut filled = 0.0;
        let mut levels_consumed = 0;

        for &(price, available) in levels {
            if remaining <= 0.0 {
                break;
            }
            let take = available.min(remaining);
            notional += take * price;
            filled += take;
            remaining -= take;
            levels_consumed += 1;
        }

        if filled <= 0.0 {
            return None;
        }

        Some(BookWalk {
            vwap: notional / filled,
            filled,
            levels_consumed,
        })
    }
}
