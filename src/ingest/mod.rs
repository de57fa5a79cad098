// Hand-off between the feed client and the per-symbol pipeline task

pub mod queue;

pub use queue::{DropOldestQueue, SnapshotQueue};

use crate::core::snapshot::OrderBookSnapshot;

/// A validated snapshot tagged with the connection it arrived on.
/// The epoch changes on every reconnect.
#[derive(Debug, Clone)]
pub struct FeedItem {
    pub epoch: u64,
    pub snapshot: OrderBookSnapshot,
}
