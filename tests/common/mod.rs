// Common test utilities and helpers
#![allow(dead_code)]

use std::sync::Mutex;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;
use trade_impact_sim::{Config, CostEstimate, EstimateSink, OrderBookSnapshot};

/// Test configuration with a generous latency budget so debug builds stay quiet
pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.pipeline.latency_budget_us = 10_000_000;
    config
}

pub fn base_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).single().expect("valid timestamp")
}

/// Symmetric five-level book around `mid`, 100ms per sequence step
pub fn book(seq: u64, mid: f64) -> OrderBookSnapshot {
    let bids = (0..5).map(|i| (mid - 0.5 - i as f64 * 0.5, 1.0 + i as f64)).collect();
    let asks = (0..5).map(|i| (mid + 0.5 + i as f64 * 0.5, 1.0 + i as f64)).collect();
    book_with(seq, bids, asks)
}

pub fn book_with(seq: u64, bids: Vec<(f64, f64)>, asks: Vec<(f64, f64)>) -> OrderBookSnapshot {
    let timestamp = base_time() + Duration::milliseconds(seq as i64 * 100);
    OrderBookSnapshot::new("BTC-USDT-SWAP", bids, asks, timestamp, seq)
}

/// One feed message as the exchange sends it
pub fn book_message(seq: u64, mid: f64) -> String {
    book_message_for("BTC-USDT-SWAP", seq, mid)
}

pub fn book_message_for(symbol: &str, seq: u64, mid: f64) -> String {
    serde_json::json!({
        "timestamp": (base_time() + Duration::milliseconds(seq as i64 * 100)).to_rfc3339(),
        "exchange": "OKX",
        "symbol": symbol,
        "seq": seq,
        "asks": [[format!("{}", mid + 0.5), "2.5"], [format!("{}", mid + 1.0), "4.0"]],
        "bids": [[format!("{}", mid - 0.5), "3.0"], [format!("{}", mid - 1.0), "1.5"]],
    })
    .to_string()
}

/// Temporary directory that lives as long as the returned guard
pub fn create_temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

#[derive(Default)]
pub struct CollectingSink {
    pub estimates: Mutex<Vec<CostEstimate>>,
}

impl CollectingSink {
    pub fn collected(&self) -> Vec<CostEstimate> {
        self.estimates.lock().expect("sink lock").clone()
    }
}

impl EstimateSink for CollectingSink {
    fn emit(&self, estimate: &CostEstimate) {
        self.estimates.lock().expect("sink lock").push(estimate.clone());
    }
}
