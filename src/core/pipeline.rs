//! Per-symbol simulation pipeline.
//!
//! One pipeline owns one window and one instance of each model. Every
//! accepted snapshot yields at most one [`CostEstimate`]; after emission the
//! realized outcome of the previous estimate is fed back into the learned
//! models, which refit on their own cadence.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::core::classifier::{ClassifierParams, MakerTakerClassifier};
use crate::core::features::{FeatureExtractor, FeatureVector};
use crate::core::fees::FeeSchedule;
use crate::core::impact::MarketImpactModel;
use crate::core::slippage::{SlippageModel, SlippageParams};
use crate::core::snapshot::{OrderBookSnapshot, Side};
use crate::core::window::SlidingWindowStore;
use crate::error::{SimulatorError, SimulatorResult};
use crate::sink::EstimateSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    WarmingUp,
    Ready,
}

/// Cost breakdown for the configured order against one book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub symbol: String,
    pub sequence: u64,
    /// Expected slippage, percent of mid
    pub slippage_pct: f64,
    /// Expected market impact, percent of mid
    pub market_impact_pct: f64,
    /// Expected fees, quote units
    pub fees: f64,
    /// Slippage + impact + fees, quote units
    pub net_cost: f64,
    pub maker_prob: f64,
    pub taker_prob: f64,
    pub mid_price: f64,
    pub volatility: f64,
    pub liquidity: f64,
    pub latency_us: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub snapshots_received: u64,
    pub snapshots_accepted: u64,
    pub out_of_order: u64,
    pub rejected: u64,
    pub warmup_skips: u64,
    pub estimates_emitted: u64,
    pub budget_overruns: u64,
    pub slippage_refits: u64,
    pub classifier_refits: u64,
    pub degenerate_fits: u64,
    pub resets: u64,
    pub last_latency_us: u64,
    /// Rolling median of per-estimate processing time
    pub median_latency_us: u64,
    /// Rolling mean of snapshot timestamp gaps
    pub mean_update_interval_ms: f64,
}

/// Outcome bookkeeping for the last emitted estimate
#[derive(Debug, Clone, Copy)]
struct PendingOutcome {
    mid_price: f64,
    features: FeatureVector,
}

#[derive(Debug, Clone)]
struct PerformanceTracker {
    capacity: usize,
    latencies_us: VecDeque<u64>,
    intervals_ms: VecDeque<f64>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl PerformanceTracker {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            latencies_us: VecDeque::with_capacity(capacity),
            intervals_ms: VecDeque::with_capacity(capacity),
            last_timestamp: None,
        }
    }

    fn record_latency(&mut self, latency_us: u64) {
        if self.latencies_us.len() == self.capacity {
            self.latencies_us.pop_front();
        }
        self.latencies_us.push_back(latency_us);
    }

    fn record_update(&mut self, timestamp: DateTime<Utc>) {
        if let Some(last) = self.last_timestamp {
            let gap_ms = (timestamp - last).num_microseconds().map(|us| us as f64 / 1e3);
            if let Some(gap) = gap_ms.filter(|g| *g >= 0.0) {
                if self.intervals_ms.len() == self.capacity {
                    self.intervals_ms.pop_front();
                }
                self.intervals_ms.push_back(gap);
            }
        }
        self.last_timestamp = Some(timestamp);
    }

    fn median_latency_us(&self) -> u64 {
        if self.latencies_us.is_empty() {
            return 0;
        }
        let mut sorted: Vec<u64> = self.latencies_us.iter().copied().collect();
        sorted.sort_unstable();
        sorted[sorted.len() / 2]
    }

    fn mean_interval_ms(&self) -> f64 {
        if self.intervals_ms.is_empty() {
            return 0.0;
        }
        self.intervals_ms.iter().sum::<f64>() / self.intervals_ms.len() as f64
    }
}

pub struct SimulationPipeline {
    symbol: String,
    state: PipelineState,
    window: SlidingWindowStore,
    extractor: FeatureExtractor,
    impact: MarketImpactModel,
    slippage: SlippageModel,
    classifier: MakerTakerClassifier,
    fees: FeeSchedule,
    fee_tier: String,
    quantity: f64,
    side: Side,
    taker_threshold_bps: f64,
    latency_budget_us: u64,
    pending: Option<PendingOutcome>,
    stats: PipelineStats,
    perf: PerformanceTracker,
}

impl SimulationPipeline {
    pub fn new(symbol: impl Into<String>, config: &Config) -> Self {
        Self {
            symbol: symbol.into(),
            state: PipelineState::Idle,
            window: SlidingWindowStore::from_config(&config.window),
            extractor: FeatureExtractor::from_config(&config.window),
            impact: MarketImpactModel::from_config(&config.models),
            slippage: SlippageModel::new(&config.models),
            classifier: MakerTakerClassifier::new(&config.models),
            fees: config.fees.clone(),
            fee_tier: config.order.fee_tier.clone(),
            quantity: config.order.quantity,
            side: config.order.side,
            taker_threshold_bps: config.models.taker_threshold_bps,
            latency_budget_us: config.pipeline.latency_budget_us,
            pending: None,
            stats: PipelineStats::default(),
            perf: PerformanceTracker::new(config.pipeline.stats_window),
        }
    }

    /// Start from previously saved parameters instead of the configured priors
    pub fn with_models(
        mut self,
        config: &Config,
        slippage: Option<SlippageParams>,
        classifier: Option<ClassifierParams>,
    ) -> Self {
        if let Some(params) = slippage {
            self.slippage = SlippageModel::with_prior(&config.models, params);
        }
        if let Some(params) = classifier {
            self.classifier = MakerTakerClassifier::with_prior(&config.models, params);
        }
        self
    }

    /// Ingest one snapshot and emit its estimate to `sink`.
    pub fn process(
        &mut self,
        snapshot: OrderBookSnapshot,
        sink: &dyn EstimateSink,
    ) -> SimulatorResult<CostEstimate> {
        let (estimate, features) = self.estimate(snapshot)?;
        sink.emit(&estimate);
        self.learn(features);
        Ok(estimate)
    }

    /// Ingest one snapshot and return its estimate without a sink.
    pub fn on_snapshot(&mut self, snapshot: OrderBookSnapshot) -> SimulatorResult<CostEstimate> {
        let (estimate, features) = self.estimate(snapshot)?;
        self.learn(features);
        Ok(estimate)
    }

    fn estimate(
        &mut self,
        snapshot: OrderBookSnapshot,
    ) -> SimulatorResult<(CostEstimate, FeatureVector)> {
        let started = Instant::now();
        self.stats.snapshots_received += 1;

        let timestamp = snapshot.timestamp();
        if let Err(e) = self.window.push(snapshot) {
            match e {
                SimulatorError::OutOfOrderSnapshot { .. } => self.stats.out_of_order += 1,
                _ => self.stats.rejected += 1,
            }
            return Err(e);
        }
        self.stats.snapshots_accepted += 1;
        self.perf.record_update(timestamp);

        if self.state == PipelineState::Idle {
            self.state = PipelineState::WarmingUp;
            debug!(symbol = %self.symbol, "pipeline warming up");
        }

        let features = match self.extractor.compute(&self.window.derived()) {
            Ok(features) => features,
            Err(e) => {
                self.stats.warmup_skips += 1;
                return Err(e);
            }
        };

        if self.state == PipelineState::WarmingUp {
            self.state = PipelineState::Ready;
            info!("✅ {} pipeline ready after {} snapshots", self.symbol, self.window.len());
        }

        let sequence = self.window.last_sequence().unwrap_or_default();
        let quantity = self.quantity.max(0.0);
        let mid = features.mid_price;

        let impact = self.impact.estimate(quantity, features.liquidity, features.volatility);
        let slippage_pct = if quantity > 0.0 {
            self.slippage.predict(&features)
        } else {
            0.0
        };
        let taker_prob = self.classifier.predict(&features);
        let maker_prob = 1.0 - taker_prob;
        let fees = self.fees.expected_fee(&self.fee_tier, quantity, mid, maker_prob);

        let notional = quantity * mid;
        let slippage_cost = slippage_pct / 100.0 * notional;
        let impact_cost = impact.total_pct / 100.0 * notional;
        let net_cost = slippage_cost + impact_cost + fees;

        let latency_us = started.elapsed().as_micros() as u64;
        self.stats.last_latency_us = latency_us;
        self.perf.record_latency(latency_us);
        if latency_us > self.latency_budget_us {
            self.stats.budget_overruns += 1;
            warn!(
                "⏱️  {} estimate took {}µs (budget {}µs)",
                self.symbol, latency_us, self.latency_budget_us
            );
        }

        self.stats.estimates_emitted += 1;
        let estimate = CostEstimate {
            symbol: self.symbol.clone(),
            sequence,
            slippage_pct,
            market_impact_pct: impact.total_pct,
            fees,
            net_cost,
            maker_prob,
            taker_prob,
            mid_price: mid,
            volatility: features.volatility,
            liquidity: features.liquidity,
            latency_us,
            timestamp,
        };

        Ok((estimate, features))
    }

    /// Score the previous estimate against the book just accepted, then
    /// give both learned models a chance to refit.
    fn learn(&mut self, features: FeatureVector) {
        if let (Some(previous), Some(book)) = (self.pending.take(), self.window.latest_snapshot()) {
            let prev_mid = previous.mid_price;

            if let Some(walk) = book.walk_book(self.side, self.quantity) {
                let realized_pct = match self.side {
                    Side::Buy => (walk.vwap - prev_mid) / prev_mid * 100.0,
                    Side::Sell => (prev_mid - walk.vwap) / prev_mid * 100.0,
                };
                self.slippage.observe(&previous.features, realized_pct);
            }

            let touch_distance_bps = match self.side {
                Side::Buy => book.best_ask().map(|ask| (ask - prev_mid) / prev_mid * 1e4),
                Side::Sell => book.best_bid().map(|bid| (prev_mid - bid) / prev_mid * 1e4),
            };
            if let Some(distance) = touch_distance_bps {
                self.classifier
                    .observe(&previous.features, distance <= self.taker_threshold_bps);
            }
        }

        self.pending = Some(PendingOutcome {
            mid_price: features.mid_price,
            features,
        });

        match self.slippage.maybe_retrain() {
            Ok(true) => {
                self.stats.slippage_refits += 1;
                info!(
                    "🔄 {} slippage model v{} published",
                    self.symbol,
                    self.slippage.state().version()
                );
            }
            Ok(false) => {}
            Err(_) => self.stats.degenerate_fits += 1,
        }

        match self.classifier.maybe_retrain() {
            Ok(true) => {
                self.stats.classifier_refits += 1;
                info!(
                    "🔄 {} maker/taker classifier v{} published",
                    self.symbol,
                    self.classifier.state().version()
                );
            }
            Ok(false) => {}
            Err(_) => self.stats.degenerate_fits += 1,
        }
    }

    /// Drop all window history after a feed reconnect. Learned parameters and
    /// their training buffers survive.
    pub fn reset(&mut self) {
        self.window.clear();
        self.pending = None;
        self.state = PipelineState::WarmingUp;
        self.stats.resets += 1;
        info!("🔌 {} pipeline reset, warming up again", self.symbol);
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn window(&self) -> &SlidingWindowStore {
        &self.window
    }

    pub fn slippage_model(&self) -> &SlippageModel {
        &self.slippage
    }

    pub fn classifier(&self) -> &MakerTakerClassifier {
        &self.classifier
    }

    pub fn slippage_params(&self) -> Arc<SlippageParams> {
        self.slippage.state().shared()
    }

    pub fn classifier_params(&self) -> Arc<ClassifierParams> {
        self.classifier.state().shared()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            median_latency_us: self.perf.median_latency_us(),
            mean_update_interval_ms: self.perf.mean_interval_ms(),
            ..self.stats.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn book(seq: u64, mid: f64) -> OrderBookSnapshot {
        let ts = Utc.timestamp_opt(1_700_000_000, 0).single().expect("valid ts")
            + Duration::milliseconds(seq as i64 * 250);
        OrderBookSnapshot::new(
            "BTC-USDT-SWAP",
            vec![(mid - 0.5, 1.0), (mid - 1.0, 2.0)],
            vec![(mid + 0.5, 1.0), (mid + 1.0, 2.0)],
            ts,
            seq,
        )
    }

    #[test]
    fn test_state_transitions() {
        let mut pipeline = SimulationPipeline::new("BTC-USDT-SWAP", &Config::default());
        assert_eq!(pipeline.state(), PipelineState::Idle);

        assert!(pipeline.on_snapshot(book(1, 100.0)).is_err());
        assert_eq!(pipeline.state(), PipelineState::WarmingUp);

        assert!(pipeline.on_snapshot(book(2, 100.5)).is_ok());
        assert_eq!(pipeline.state(), PipelineState::Ready);

        pipeline.reset();
        assert_eq!(pipeline.state(), PipelineState::WarmingUp);
        assert!(pipeline.window().is_empty());
    }

    #[test]
    fn test_estimate_combines_components() {
        let mut pipeline = SimulationPipeline::new("BTC-USDT-SWAP", &Config::default());
        pipeline.on_snapshot(book(1, 100.0)).unwrap_err();
        let estimate = pipeline.on_snapshot(book(2, 100.0)).expect("ready");

        assert!((estimate.maker_prob + estimate.taker_prob - 1.0).abs() < 1e-12);
        assert!((estimate.taker_prob - 0.3).abs() < 1e-9);
        let notional = 0.1 * estimate.mid_price;
        let expected = estimate.slippage_pct / 100.0 * notional
            + estimate.market_impact_pct / 100.0 * notional
            + estimate.fees;
        assert!((estimate.net_cost - expected).abs() < 1e-12);
        assert!(estimate.slippage_pct > 0.0);
    }

    #[test]
    fn test_realized_outcomes_are_buffered() {
        let mut pipeline = SimulationPipeline::new("BTC-USDT-SWAP", &Config::default());
        for seq in 1..=5 {
            let _ = pipeline.on_snapshot(book(seq, 100.0 + seq as f64 * 0.1));
        }
        // Estimates at 2..=5; outcomes for 2..=4 observed on the next book
        assert_eq!(pipeline.slippage_model().history_len(), 3);
        assert_eq!(pipeline.classifier().history_len(), 3);
    }

    #[test]
    fn test_stats_track_rejections() {
        let mut pipeline = SimulationPipeline::new("BTC-USDT-SWAP", &Config::default());
        let _ = pipeline.on_snapshot(book(3, 100.0));
        let _ = pipeline.on_snapshot(book(2, 100.0));
        let stats = pipeline.stats();
        assert_eq!(stats.snapshots_received, 2);
        assert_eq!(stats.out_of_order, 1);
        assert_eq!(stats.warmup_skips, 1);
    }
}
