//! Model inputs derived from the sliding window.
//!
//! Extraction is a pure function of the window: the same records always
//! produce the same [`FeatureVector`].

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::config::WindowConfig;
use crate::core::window::SlidingWindow;
use crate::error::{SimulatorError, SimulatorResult};

pub const FEATURE_NAMES: [&str; 8] = [
    "imbalance",
    "spread",
    "spread_pct",
    "volatility",
    "liquidity",
    "direction",
    "trade_frequency",
    "mid_price",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Top-k quantity imbalance of the latest book, in [-1, 1]
    pub imbalance: f64,
    /// Best ask minus best bid, quote units
    pub spread: f64,
    /// Spread as a fraction of mid
    pub spread_pct: f64,
    /// Annualized std-dev of log mid returns
    pub volatility: f64,
    /// Bid plus ask quantity across the liquidity levels
    pub liquidity: f64,
    /// Sign of the latest mid change: -1, 0 or +1
    pub direction: f64,
    /// Updates per second across the window span
    pub trade_frequency: f64,
    pub mid_price: f64,
}

impl FeatureVector {
    pub fn get(&self, name: &str) -> Option<f64> {
        let value = match name {
            "imbalance" => self.imbalance,
            "spread" => self.spread,
            "spread_pct" => self.spread_pct,
            "volatility" => self.volatility,
            "liquidity" => self.liquidity,
            "direction" => self.direction,
            "trade_frequency" => self.trade_frequency,
            "mid_price" => self.mid_price,
            _ => return None,
        };
        Some(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES
            .iter()
            .filter_map(move |name| self.get(name).map(|value| (*name, value)))
    }
}

#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    min_records: usize,
    annualization_factor: f64,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::from_config(&WindowConfig::default())
    }
}

impl FeatureExtractor {
    pub fn new(min_records: usize, annualization_factor: f64) -> Self {
        Self {
            min_records: min_records.max(2),
            annualization_factor,
        }
    }

    pub fn from_config(config: &WindowConfig) -> Self {
        Self::new(config.min_records, config.annualization_factor)
    }

    pub fn min_records(&self) -> usize {
        self.min_records
    }

    pub fn compute(&self, window: &SlidingWindow<'_>) -> SimulatorResult<FeatureVector> {
        let (first, previous, latest) = match (window.first(), window.previous(), window.latest()) {
            (Some(first), Some(previous), Some(latest)) if window.len() >= self.min_records => {
                (first, previous, latest)
            }
            _ => {
                return Err(SimulatorError::InsufficientData {
                    required: self.min_records,
                    available: window.len(),
                })
            }
        };

        let mid_change = latest.mid_price - previous.mid_price;
        let direction = if mid_change > 0.0 {
            1.0
        } else if mid_change < 0.0 {
            -1.0
        } else {
            0.0
        };

        let span_secs = (latest.timestamp - first.timestamp)
            .num_microseconds()
            .map(|us| us as f64 / 1e6)
            .unwrap_or(0.0);
        let trade_frequency = if span_secs > 0.0 {
            (window.len() - 1) as f64 / span_secs
        } else {
            0.0
        };

        let spread_pct = if latest.mid_price > 0.0 {
            latest.spread / latest.mid_price
        } else {
            0.0
        };

        Ok(FeatureVector {
            imbalance: latest.imbalance,
            spread: latest.spread,
            spread_pct,
            volatility: self.realized_volatility(&window.mid_prices()),
            liquidity: latest.bid_depth + latest.ask_depth,
            direction,
            trade_frequency,
            mid_price: latest.mid_price,
        })
    }

    /// Population std-dev of log returns, scaled by the annualization factor
    pub fn realized_volatility(&self, mids: &[f64]) -> f64 {
        let returns: Vec<f64> = mids
            .windows(2)
            .filter(|pair| pair[0] > 0.0 && pair[1] > 0.0)
            .map(|pair| (pair[1] / pair[0]).ln())
            .filter(|r| r.is_finite())
            .collect();

        if returns.is_empty() {
            return 0.0;
        }

        let std = Array1::from_vec(returns).std(0.0);
        if std.is_finite() {
            std * self.annualization_factor
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::snapshot::OrderBookSnapshot;
    use crate::core::window::SlidingWindowStore;
    use chrono::{Duration, TimeZone, Utc};

    fn push_mid(store: &mut SlidingWindowStore, seq: u64, mid: f64) {
        let ts = Utc.timestamp_opt(1_700_000_000, 0).single().expect("valid ts")
            + Duration::milliseconds(seq as i64 * 100);
        let snapshot = OrderBookSnapshot::new(
            "TEST",
            vec![(mid - 0.05, 1.0)],
            vec![(mid + 0.05, 3.0)],
            ts,
            seq,
        );
        store.push(snapshot).expect("in order");
    }

    #[test]
    fn test_insufficient_then_exactly_min() {
        let extractor = FeatureExtractor::new(2, 1.0);
        let mut store = SlidingWindowStore::new(30, 5, 10);

        assert!(matches!(
            extractor.compute(&store.derived()),
            Err(SimulatorError::InsufficientData { required: 2, available: 0 })
        ));

        push_mid(&mut store, 1, 100.0);
        assert!(extractor.compute(&store.derived()).is_err());

        push_mid(&mut store, 2, 100.0);
        let features = extractor.compute(&store.derived()).expect("two records");
        assert_eq!(features.direction, 0.0);
        assert_eq!(features.volatility, 0.0);
        assert!((features.trade_frequency - 10.0).abs() < 1e-9);
        assert!((features.liquidity - 4.0).abs() < 1e-12);
        assert!((features.imbalance + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_volatility_matches_population_std() {
        let extractor = FeatureExtractor::new(2, 1.0);
        let mids = [100.0, 101.0, 99.0];
        let r1 = (101.0_f64 / 100.0).ln();
        let r2 = (99.0_f64 / 101.0).ln();
        let mean = (r1 + r2) / 2.0;
        let expected = (((r1 - mean).powi(2) + (r2 - mean).powi(2)) / 2.0).sqrt();
        assert!((extractor.realized_volatility(&mids) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_direction_sign() {
        let extractor = FeatureExtractor::new(2, 1.0);
        let mut store = SlidingWindowStore::new(30, 5, 10);
        push_mid(&mut store, 1, 100.0);
        push_mid(&mut store, 2, 99.0);
        let features = extractor.compute(&store.derived()).expect("features");
        assert_eq!(features.direction, -1.0);
    }

    #[test]
    fn test_named_access() {
        let features = FeatureVector {
            volatility: 0.25,
            ..FeatureVector::default()
        };
        assert_eq!(features.get("volatility"), Some(0.25));
        assert_eq!(features.get("unknown"), None);
        assert_eq!(features.iter().count(), FEATURE_NAMES.len());
    }
}
