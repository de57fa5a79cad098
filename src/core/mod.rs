// Estimation core: window, features, models and the per-symbol pipeline

pub mod checkpoint;
pub mod classifier;
pub mod features;
pub mod fees;
pub mod impact;
pub mod linalg;
pub mod model_state;
pub mod pipeline;
pub mod slippage;
pub mod snapshot;
pub mod window;

pub use checkpoint::{CheckpointStore, ModelCheckpoint, RestoredModels};
pub use classifier::{ClassifierParams, MakerTakerClassifier};
pub use features::{FeatureExtractor, FeatureVector};
pub use fees::{FeeSchedule, FeeTier};
pub use impact::{ImpactEstimate, MarketImpactModel};
pub use model_state::{ExampleBuffer, ModelState};
pub use pipeline::{CostEstimate, PipelineState, PipelineStats, SimulationPipeline};
pub use slippage::{SlippageModel, SlippageParams};
pub use snapshot::{BookWalk, OrderBookSnapshot, Side};
pub use window::{SlidingWindow, SlidingWindowStore, WindowRecord};
