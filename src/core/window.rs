// Bounded FIFO of per-snapshot derived scalars

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::WindowConfig;
use crate::core::snapshot::OrderBookSnapshot;
use crate::error::{SimulatorError, SimulatorResult};

/// Scalars derived from one accepted snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowRecord {
    pub mid_price: f64,
    pub spread: f64,
    pub imbalance: f64,
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
    pub best_bid: f64,
    pub best_ask: f64,
    /// Bid quantity over the configured liquidity levels
    pub bid_depth: f64,
    pub ask_depth: f64,
}

/// Read-only view of the window handed to feature extraction
#[derive(Debug, Clone, Copy)]
pub struct SlidingWindow<'a> {
    records: &'a VecDeque<WindowRecord>,
}

impl<'a> SlidingWindow<'a> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first(&self) -> Option<&'a WindowRecord> {
        self.records.front()
    }

    pub fn latest(&self) -> Option<&'a WindowRecord> {
        self.records.back()
    }

    /// Record before the latest one
    pub fn previous(&self) -> Option<&'a WindowRecord> {
        self.records.len().checked_sub(2).and_then(|i| self.records.get(i))
    }

    pub fn mid_prices(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.mid_price).collect()
    }
}

#[derive(Debug, Clone)]
pub struct SlidingWindowStore {
    capacity: usize,
    imbalance_depth: usize,
    liquidity_levels: usize,
    records: VecDeque<WindowRecord>,
    latest_snapshot: Option<OrderBookSnapshot>,
    last_sequence: Option<u64>,
    out_of_order: u64,
}

impl SlidingWindowStore {
    pub fn new(capacity: usize, imbalance_depth: usize, liquidity_levels: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            imbalance_depth,
            liquidity_levels,
            records: VecDeque::with_capacity(capacity),
            latest_snapshot: None,
            last_sequence: None,
            out_of_order: 0,
        }
    }

    pub fn from_config(config: &WindowConfig) -> Self {
        Self::new(
            config.window_capacity,
            config.imbalance_depth,
            config.liquidity_levels,
        )
    }

    /// Admit a snapshot, evicting the oldest record at capacity.
    ///
    /// Sequence numbers must strictly increase; anything else is dropped and
    /// leaves the window untouched.
    pub fn push(&mut self, snapshot: OrderBookSnapshot) -> SimulatorResult<()> {
        let sequence = snapshot.sequence();
        if let Some(last) = self.last_sequence {
            if sequence <= last {
                self.out_of_order += 1;
                debug!(sequence, last, "dropping out-of-order snapshot");
                return Err(SimulatorError::OutOfOrderSnapshot {
                    sequence,
                    last_accepted: last,
                });
            }
        }

        let (best_bid, best_ask) = match (snapshot.best_bid(), snapshot.best_ask()) {
            (Some(bid), Some(ask)) => (bid, ask),
            _ => {
                return Err(SimulatorError::InvalidSnapshot(format!(
                    "{} seq {}: missing best bid or ask",
                    snapshot.symbol(),
                    sequence
                )))
            }
        };

        let record = WindowRecord {
            mid_price: (best_bid + best_ask) / 2.0,
            spread: best_ask - best_bid,
            imbalance: snapshot.imbalance(self.imbalance_depth),
            timestamp: snapshot.timestamp(),
            sequence,
            best_bid,
            best_ask,
            bid_depth: snapshot.bid_depth(self.liquidity_levels),
            ask_depth: snapshot.ask_depth(self.liquidity_levels),
        };

        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
        self.latest_snapshot = Some(snapshot);
        self.last_sequence = Some(sequence);

        Ok(())
    }

    pub fn derived(&self) -> SlidingWindow<'_> {
        SlidingWindow {
            records: &self.records,
        }
    }

    /// Most recently accepted full book
    pub fn latest_snapshot(&self) -> Option<&OrderBookSnapshot> {
        self.latest_snapshot.as_ref()
    }

    /// Forget all history, including the last accepted sequence number
    pub fn clear(&mut self) {
        self.records.clear();
        self.latest_snapshot = None;
        self.last_sequence = None;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    pub fn out_of_order_count(&self) -> u64 {
        self.out_of_order
    }
}
