// Output sinks for cost estimates. `emit` must never block the pipeline.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::core::pipeline::CostEstimate;
use crate::error::SimulatorResult;

pub trait EstimateSink: Send + Sync {
    fn emit(&self, estimate: &CostEstimate);

    fn flush(&self) {}
}

/// Logs every `every`-th estimate through tracing
pub struct LogSink {
    every: u64,
    seen: AtomicU64,
}

impl LogSink {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            seen: AtomicU64::new(0),
        }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(1)
    }
}

impl EstimateSink for LogSink {
    fn emit(&self, estimate: &CostEstimate) {
        let n = self.seen.fetch_add(1, Ordering::Relaxed);
        if n % self.every != 0 {
            return;
        }
        info!(
            symbol = %estimate.symbol,
            seq = estimate.sequence,
            latency_us = estimate.latency_us,
            "💹 mid {:.2} | slippage {:.4}% | impact {:.4}% | fees {:.6} | net {:.6} | maker {:.2} / taker {:.2}",
            estimate.mid_price,
            estimate.slippage_pct,
            estimate.market_impact_pct,
            estimate.fees,
            estimate.net_cost,
            estimate.maker_prob,
            estimate.taker_prob,
        );
    }
}

/// Forwards estimates over a bounded channel, dropping when the consumer lags
pub struct ChannelSink {
    tx: mpsc::Sender<CostEstimate>,
    dropped: AtomicU64,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<CostEstimate>) -> Self {
        Self {
            tx,
            dropped: AtomicU64::new(0),
        }
    }

    /// Channel sink plus the receiving end
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<CostEstimate>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EstimateSink for ChannelSink {
    fn emit(&self, estimate: &CostEstimate) {
        if self.tx.try_send(estimate.clone()).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Appends one JSON object per estimate to a file
pub struct JsonLinesSink {
    writer: Mutex<BufWriter<File>>,
    failures: AtomicU64,
}

impl JsonLinesSink {
    pub fn create<P: AsRef<Path>>(path: P) -> SimulatorResult<Self> {
        let file = File::create(path.as_ref())?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            failures: AtomicU64::new(0),
        })
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl EstimateSink for JsonLinesSink {
    fn emit(&self, estimate: &CostEstimate) {
        let line = match serde_json::to_string(estimate) {
            Ok(line) => line,
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!("Failed to serialize estimate: {}", e);
                return;
            }
        };

        let mut writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = writeln!(writer, "{}", line) {
            self.failures.fetch_add(1, Ordering::Relaxed);
            warn!("Failed to write estimate: {}", e);
        }
    }

    fn flush(&self) {
        let mut writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = writer.flush() {
            warn!("Failed to flush estimates: {}", e);
        }
    }
}

/// Fans one estimate out to several sinks
pub struct MultiSink {
    sinks: Vec<Box<dyn EstimateSink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Box<dyn EstimateSink>>) -> Self {
        Self { sinks }
    }
}

impl EstimateSink for MultiSink {
    fn emit(&self, estimate: &CostEstimate) {
        for sink in &self.sinks {
            sink.emit(estimate);
        }
    }

    fn flush(&self) {
        for sink in &self.sinks {
            sink.flush();
        }
    }
}
