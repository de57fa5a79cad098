// Latency benchmark over synthetic order books

use std::time::Instant;

use chrono::{Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::config::Config;
use crate::core::features::FeatureExtractor;
use crate::core::impact::MarketImpactModel;
use crate::core::pipeline::SimulationPipeline;
use crate::core::snapshot::OrderBookSnapshot;
use crate::core::window::SlidingWindowStore;
use crate::error::{SimulatorError, SimulatorResult};

#[derive(Debug, Clone, Default, Serialize)]
pub struct TimingSummary {
    pub samples: usize,
    pub mean_us: f64,
    pub median_us: f64,
    pub p99_us: f64,
    pub max_us: f64,
}

impl TimingSummary {
    pub fn from_nanos(mut nanos: Vec<u64>) -> Self {
        if nanos.is_empty() {
            return Self::default();
        }
        nanos.sort_unstable();
        let to_us = |ns: u64| ns as f64 / 1_000.0;
        let n = nanos.len();
        Self {
            samples: n,
            mean_us: to_us(nanos.iter().sum::<u64>()) / n as f64,
            median_us: to_us(nanos[n / 2]),
            p99_us: to_us(nanos[((n as f64 * 0.99) as usize).min(n - 1)]),
            max_us: to_us(nanos[n - 1]),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub iterations: usize,
    pub volatility: TimingSummary,
    pub impact: TimingSummary,
    pub pipeline: TimingSummary,
    pub budget_overruns: u64,
}

/// Random-walk book generator with a fixed seed
pub struct SyntheticBooks {
    rng: StdRng,
    symbol: String,
    mid: f64,
    sequence: u64,
    levels: usize,
}

impl SyntheticBooks {
    pub fn new(symbol: &str, start_mid: f64, levels: usize, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            symbol: symbol.to_string(),
            mid: start_mid,
            sequence: 0,
            levels: levels.max(1),
        }
    }

    pub fn next_book(&mut self) -> OrderBookSnapshot {
        self.sequence += 1;
        self.mid *= 1.0 + self.rng.gen_range(-0.0005..0.0005);
        let half_spread = self.mid * self.rng.gen_range(0.00001..0.0001);
        let tick = self.mid * 0.00002;

        let bids = (0..self.levels)
            .map(|i| (self.mid - half_spread - i as f64 * tick, self.rng.gen_range(0.01..5.0)))
            .collect();
        let asks = (0..self.levels)
            .map(|i| (self.mid + half_spread + i as f64 * tick, self.rng.gen_range(0.01..5.0)))
            .collect();

        let base = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_else(Utc::now);
        let timestamp = base + Duration::milliseconds(self.sequence as i64 * 100);
        OrderBookSnapshot::new(self.symbol.clone(), bids, asks, timestamp, self.sequence)
    }
}

pub fn run_benchmark(config: &Config, iterations: usize, seed: u64) -> SimulatorResult<BenchReport> {
    if iterations == 0 {
        return Err(SimulatorError::InsufficientData { required: 1, available: 0 });
    }

    let symbol = config
        .feed
        .symbols
        .first()
        .cloned()
        .unwrap_or_else(|| "BENCH".to_string());
    let mut books = SyntheticBooks::new(&symbol, 95_000.0, 50, seed);

    // Volatility over a full window
    let extractor = FeatureExtractor::from_config(&config.window);
    let mut store = SlidingWindowStore::from_config(&config.window);
    for _ in 0..config.window.window_capacity {
        store.push(books.next_book())?;
    }
    let mids = store.derived().mid_prices();
    let mut volatility = Vec::with_capacity(iterations);
    for _ in 0..iterations {
        let started = Instant::now();
        std::hint::black_box(extractor.realized_volatility(&mids));
        volatility.push(started.elapsed().as_nanos() as u64);
    }

    let model = MarketImpactModel::from_config(&config.models);
    let features = extractor.compute(&store.derived())?;
    let mut impact = Vec::with_capacity(iterations);
    for i in 0..iterations {
        let quantity = config.order.quantity * (1.0 + (i % 10) as f64);
        let started = Instant::now();
        std::hint::black_box(model.estimate(quantity, features.liquidity, features.volatility));
        impact.push(started.elapsed().as_nanos() as u64);
    }

    let mut pipeline = SimulationPipeline::new(symbol, config);
    let mut cycle = Vec::with_capacity(iterations);
    for _ in 0..iterations {
        let book = books.next_book();
        let started = Instant::now();
        let _ = std::hint::black_box(pipeline.on_snapshot(book));
        cycle.push(started.elapsed().as_nanos() as u64);
    }

    Ok(BenchReport {
        iterations,
        volatility: TimingSummary::from_nanos(volatility),
        impact: TimingSummary::from_nanos(impact),
        pipeline: TimingSummary::from_nanos(cycle),
        budget_overruns: pipeline.stats().budget_overruns,
    })
}
