// Configuration management for the trade impact simulator

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::classifier::ClassifierParams;
use crate::core::fees::FeeSchedule;
use crate::core::slippage::SlippageParams;
use crate::core::snapshot::Side;

/// Live order book feed settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Websocket endpoint; `{symbol}` is replaced with each symbol.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    /// Bound of the hand-off queue between feed and pipeline
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    /// 0 retries forever
    #[serde(default = "default_max_reconnects")]
    pub max_reconnect_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,
    #[serde(default = "default_imbalance_depth")]
    pub imbalance_depth: usize,
    /// Levels per side summed into liquidity depth
    #[serde(default = "default_liquidity_levels")]
    pub liquidity_levels: usize,
    #[serde(default = "default_min_records")]
    pub min_records: usize,
    /// Scaling applied to the std-dev of log returns
    #[serde(default = "default_annualization")]
    pub annualization_factor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Observations between refits of the learned models
    #[serde(default = "default_retrain_interval")]
    pub retrain_interval: usize,
    /// Maximum buffered training examples per model
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
    #[serde(default = "default_min_fit_examples")]
    pub min_fit_examples: usize,
    /// Temporary impact coefficient
    #[serde(default = "default_eta")]
    pub eta: f64,
    /// Permanent impact coefficient
    #[serde(default = "default_gamma")]
    pub gamma: f64,
    /// Saturating impact returned for empty or overwhelmed books
    #[serde(default = "default_max_impact_pct")]
    pub max_impact_pct: f64,
    #[serde(default = "default_quantile")]
    pub slippage_quantile: f64,
    #[serde(default = "default_taker_threshold_bps")]
    pub taker_threshold_bps: f64,
    #[serde(default = "default_classifier_l2")]
    pub classifier_l2: f64,
    #[serde(default)]
    pub slippage_prior: SlippageParams,
    #[serde(default)]
    pub classifier_prior: ClassifierParams,
}

/// The hypothetical order being costed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConfig {
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    #[serde(default)]
    pub side: Side,
    #[serde(default = "default_fee_tier")]
    pub fee_tier: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Advisory end-to-end budget per snapshot, microseconds
    #[serde(default = "default_latency_budget")]
    pub latency_budget_us: u64,
    /// Samples kept for the rolling latency and update-rate figures
    #[serde(default = "default_stats_window")]
    pub stats_window: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Directory for per-model parameter blobs; disabled when unset
    #[serde(default)]
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub fees: FeeSchedule,
    #[serde(default)]
    pub order: OrderConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

// Default value functions
fn default_ws_url() -> String {
    "wss://ws.gomarket-cpp.goquant.io/ws/l2-orderbook/okx/{symbol}".to_string()
}
fn default_symbols() -> Vec<String> { vec!["BTC-USDT-SWAP".to_string()] }
fn default_queue_capacity() -> usize { 1000 }
fn default_reconnect_delay() -> u64 { 5 }
fn default_max_reconnects() -> u32 { 5 }
fn default_window_capacity() -> usize { 30 }
fn default_imbalance_depth() -> usize { 5 }
fn default_liquidity_levels() -> usize { 10 }
fn default_min_records() -> usize { 2 }
fn default_annualization() -> f64 { (365.0_f64 * 24.0).sqrt() }
fn default_retrain_interval() -> usize { 100 }
fn default_history_cap() -> usize { 2000 }
fn default_min_fit_examples() -> usize { 20 }
fn default_eta() -> f64 { 0.1 }
fn default_gamma() -> f64 { 0.01 }
fn default_max_impact_pct() -> f64 { 10.0 }
fn default_quantile() -> f64 { 0.5 }
fn default_taker_threshold_bps() -> f64 { 1.0 }
fn default_classifier_l2() -> f64 { 1e-3 }
fn default_quantity() -> f64 { 0.1 }
fn default_fee_tier() -> String { "1".to_string() }
fn default_latency_budget() -> u64 { 2_000 }
fn default_stats_window() -> usize { 500 }

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            symbols: default_symbols(),
            queue_capacity: default_queue_capacity(),
            reconnect_delay_secs: default_reconnect_delay(),
            max_reconnect_attempts: default_max_reconnects(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_capacity: default_window_capacity(),
            imbalance_depth: default_imbalance_depth(),
            liquidity_levels: default_liquidity_levels(),
            min_records: default_min_records(),
            annualization_factor: default_annualization(),
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            retrain_interval: default_retrain_interval(),
            history_cap: default_history_cap(),
            min_fit_examples: default_min_fit_examples(),
            eta: default_eta(),
            gamma: default_gamma(),
            max_impact_pct: default_max_impact_pct(),
            slippage_quantile: default_quantile(),
            taker_threshold_bps: default_taker_threshold_bps(),
            classifier_l2: default_classifier_l2(),
            slippage_prior: SlippageParams::default(),
            classifier_prior: ClassifierParams::default(),
        }
    }
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            quantity: default_quantity(),
            side: Side::default(),
            fee_tier: default_fee_tier(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            latency_budget_us: default_latency_budget(),
            stats_window: default_stats_window(),
        }
    }
}

impl FeedConfig {
    /// Endpoint for one symbol
    pub fn ws_url_for(&self, symbol: &str) -> String {
        self.ws_url.replace("{symbol}", symbol)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("{}: {}", path.as_ref().display(), e)))?;

        let config: Config = toml::from_str(&content)?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        fs::write(path, content)
            .map_err(|e| ConfigError::FileWrite(e.to_string()))?;

        Ok(())
    }

    /// Load configuration from file, or create default if file doesn't exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            let config = Self::default();
            config.to_file(&path)?;
            tracing::info!("📁 Created default config file: {}", path.as_ref().display());
            Ok(config)
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed.symbols.is_empty() {
            return Err(ConfigError::Validation("feed.symbols must list at least one symbol".to_string()));
        }

        if self.feed.queue_capacity == 0 {
            return Err(ConfigError::Validation("queue_capacity must be greater than 0".to_string()));
        }

        if self.window.window_capacity < 2 {
            return Err(ConfigError::Validation("window_capacity must be at least 2".to_string()));
        }

        if self.window.min_records < 2 || self.window.min_records > self.window.window_capacity {
            return Err(ConfigError::Validation(
                "min_records must be between 2 and window_capacity".to_string(),
            ));
        }

        if self.window.imbalance_depth == 0 || self.window.liquidity_levels == 0 {
            return Err(ConfigError::Validation(
                "imbalance_depth and liquidity_levels must be greater than 0".to_string(),
            ));
        }

        if !(self.window.annualization_factor > 0.0) {
            return Err(ConfigError::Validation("annualization_factor must be positive".to_string()));
        }

        if self.models.retrain_interval == 0 {
            return Err(ConfigError::Validation("retrain_interval must be greater than 0".to_string()));
        }

        if self.models.history_cap < self.models.min_fit_examples {
            return Err(ConfigError::Validation(
                "history_cap must be at least min_fit_examples".to_string(),
            ));
        }

        if !(self.models.eta >= 0.0) || !(self.models.gamma >= 0.0) {
            return Err(ConfigError::Validation("eta and gamma must be non-negative".to_string()));
        }

        if !(self.models.max_impact_pct > 0.0) || !self.models.max_impact_pct.is_finite() {
            return Err(ConfigError::Validation("max_impact_pct must be positive and finite".to_string()));
        }

        if !(self.models.slippage_quantile > 0.0 && self.models.slippage_quantile < 1.0) {
            return Err(ConfigError::Validation("slippage_quantile must be in (0, 1)".to_string()));
        }

        if !(self.models.classifier_l2 >= 0.0) || !(self.models.taker_threshold_bps >= 0.0) {
            return Err(ConfigError::Validation(
                "classifier_l2 and taker_threshold_bps must be non-negative".to_string(),
            ));
        }

        if !(self.order.quantity >= 0.0) || !self.order.quantity.is_finite() {
            return Err(ConfigError::Validation("order quantity must be non-negative".to_string()));
        }

        self.fees.validate().map_err(ConfigError::Validation)?;

        if !self.fees.tiers.contains_key(&self.order.fee_tier) {
            return Err(ConfigError::Validation(format!(
                "order fee_tier '{}' is not defined under [fees.tiers]",
                self.order.fee_tier
            )));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(String),

    #[error("Failed to write config file: {0}")]
    FileWrite(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.window.window_capacity, 30);
        assert_eq!(config.window.imbalance_depth, 5);
        assert_eq!(config.models.retrain_interval, 100);
        assert!((config.models.eta - 0.1).abs() < f64::EPSILON);
        assert!((config.models.gamma - 0.01).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ws_url_substitutes_symbol() {
        let feed = FeedConfig::default();
        assert!(feed.ws_url_for("ETH-USDT-SWAP").ends_with("/okx/ETH-USDT-SWAP"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [window]
            window_capacity = 50

            [order]
            quantity = 2.5
            side = "sell"
            "#,
        )
        .expect("partial config should parse");

        assert_eq!(config.window.window_capacity, 50);
        assert_eq!(config.window.imbalance_depth, 5);
        assert_eq!(config.order.side, Side::Sell);
        assert_eq!(config.feed.symbols, vec!["BTC-USDT-SWAP".to_string()]);
    }

    #[test]
    fn test_validation_rejects_unknown_fee_tier() {
        let mut config = Config::default();
        config.order.fee_tier = "9".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validation_rejects_zero_retrain_interval() {
        let mut config = Config::default();
        config.models.retrain_interval = 0;
        assert!(config.validate().is_err());
    }
}
