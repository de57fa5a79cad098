//! Unified error handling for the trade impact simulator
//!
//! Every condition raised inside the estimation core is recoverable: the
//! pipeline degrades (skips an estimate, keeps stale parameters, drops a
//! snapshot) instead of halting. `category()` and `is_recoverable()` let the
//! caller count and log errors without branching on each variant.

use std::io;

use crate::config::ConfigError;

/// Main error type for the simulator
#[derive(Debug, thiserror::Error)]
pub enum SimulatorError {
    /// The sliding window does not yet hold enough records to derive features.
    #[error("Insufficient data: need {required} records, have {available}")]
    InsufficientData { required: usize, available: usize },

    /// A model refit produced no usable parameters; the previous ones stay live.
    #[error("Degenerate fit for {model} model: {reason}")]
    DegenerateFit { model: &'static str, reason: String },

    #[error("Out-of-order snapshot: sequence {sequence} <= last accepted {last_accepted}")]
    OutOfOrderSnapshot { sequence: u64, last_accepted: u64 },

    /// Connection-level failure reported by the feed client.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed or crossed book rejected at the ingestion boundary.
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SimulatorError {
    /// Get error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            SimulatorError::InsufficientData { .. } => "warmup",
            SimulatorError::DegenerateFit { .. } => "model",
            SimulatorError::OutOfOrderSnapshot { .. } | SimulatorError::InvalidSnapshot(_) => {
                "ingestion"
            }
            SimulatorError::Transport(_) => "transport",
            SimulatorError::Config(_) => "config",
            SimulatorError::Checkpoint(_) | SimulatorError::Io(_) | SimulatorError::Serialization(_) => {
                "io"
            }
        }
    }

    /// Whether the pipeline keeps running after this error.
    ///
    /// Only configuration and startup IO problems are fatal, and those never
    /// originate inside the estimation core.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            SimulatorError::Config(_) | SimulatorError::Io(_)
        )
    }

    /// Get a user-friendly error message with helpful context
    pub fn user_message(&self) -> String {
        match self {
            SimulatorError::Config(ConfigError::FileRead(msg)) => {
                format!(
                    "Failed to read configuration: {}\n\n\
                    💡 Quick fix:\n\
                    1. Run: impact-sim init\n\
                    2. Edit config.toml (feed URL, symbols, order size)\n\
                    3. Try again",
                    msg
                )
            }
            SimulatorError::Config(ConfigError::Validation(msg)) => {
                format!(
                    "Configuration validation error: {}\n\n\
                    💡 Check config.toml for:\n\
                    - Positive window and retrain sizes\n\
                    - Non-negative impact coefficients\n\
                    - An order fee_tier that exists under [fees.tiers]",
                    msg
                )
            }
            SimulatorError::Transport(msg) => {
                format!(
                    "Feed connection failed: {}\n\n\
                    💡 Check the ws_url in config.toml and your network connection",
                    msg
                )
            }
            _ => self.to_string(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SimulatorError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SimulatorError::Transport(err.to_string())
    }
}

/// Result type alias using SimulatorError
pub type SimulatorResult<T> = Result<T, SimulatorError>;
