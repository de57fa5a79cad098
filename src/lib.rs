// Real-time trade cost estimator library
// Exposes the estimation core plus feed, sink and replay plumbing

pub mod bench;
pub mod clients;
pub mod config;
pub mod core;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod progress;
pub mod replay;
pub mod runner;
pub mod sink;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use crate::core::{
    CostEstimate, FeatureExtractor, FeatureVector, MakerTakerClassifier, MarketImpactModel,
    OrderBookSnapshot, PipelineState, PipelineStats, Side, SimulationPipeline,
    SlidingWindowStore, SlippageModel,
};
pub use error::{SimulatorError, SimulatorResult};
pub use ingest::{FeedItem, SnapshotQueue};
pub use sink::{ChannelSink, EstimateSink, JsonLinesSink, LogSink};
