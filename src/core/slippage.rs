//! Median (quantile) regression of realized slippage on book features.
//!
//! The fit minimizes pinball loss with iteratively reweighted least squares.
//! It is fully deterministic: same buffered examples, same coefficients.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ModelsConfig;
use crate::core::features::FeatureVector;
use crate::core::linalg::{solve, Standardized};
use crate::core::model_state::{ExampleBuffer, ModelState};
use crate::error::{SimulatorError, SimulatorResult};

const MODEL_NAME: &str = "slippage";
const IRLS_ITERATIONS: usize = 50;
const IRLS_TOLERANCE: f64 = 1e-9;
const RESIDUAL_FLOOR: f64 = 1e-6;

/// Linear coefficients over {imbalance, spread_pct, volatility}.
/// Predictions are slippage in percent of mid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlippageParams {
    pub intercept: f64,
    pub imbalance: f64,
    pub spread_pct: f64,
    pub volatility: f64,
}

impl Default for SlippageParams {
    /// Half the quoted spread, expressed in percent
    fn default() -> Self {
        Self {
            intercept: 0.0,
            imbalance: 0.0,
            spread_pct: 50.0,
            volatility: 0.0,
        }
    }
}

impl SlippageParams {
    fn from_coefficients(intercept: f64, coefs: &[f64]) -> Self {
        Self {
            intercept,
            imbalance: coefs[0],
            spread_pct: coefs[1],
            volatility: coefs[2],
        }
    }

    fn is_finite(&self) -> bool {
        [self.intercept, self.imbalance, self.spread_pct, self.volatility]
            .iter()
            .all(|v| v.is_finite())
    }

    /// Raw linear prediction, unclamped
    pub fn linear(&self, features: &FeatureVector) -> f64 {
        self.intercept
            + self.imbalance * features.imbalance
            + self.spread_pct * features.spread_pct
            + self.volatility * features.volatility
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SlippageExample {
    pub inputs: [f64; 3],
    pub realized_pct: f64,
}

impl SlippageExample {
    pub fn new(features: &FeatureVector, realized_pct: f64) -> Self {
        Self {
            inputs: [features.imbalance, features.spread_pct, features.volatility],
            realized_pct,
        }
    }

    fn is_finite(&self) -> bool {
        self.realized_pct.is_finite() && self.inputs.iter().all(|v| v.is_finite())
    }
}

#[derive(Debug, Clone)]
pub struct SlippageModel {
    state: ModelState<SlippageParams>,
    history: ExampleBuffer<SlippageExample>,
    quantile: f64,
    retrain_interval: usize,
    min_fit_examples: usize,
}

impl SlippageModel {
    pub fn new(config: &ModelsConfig) -> Self {
        Self::with_prior(config, config.slippage_prior)
    }

    pub fn with_prior(config: &ModelsConfig, prior: SlippageParams) -> Self {
        Self {
            state: ModelState::new(prior),
            history: ExampleBuffer::new(config.history_cap),
            quantile: config.slippage_quantile,
            retrain_interval: config.retrain_interval.max(1),
            min_fit_examples: config.min_fit_examples,
        }
    }

    /// Expected slippage in percent, never negative
    pub fn predict(&self, features: &FeatureVector) -> f64 {
        let raw = self.state.params().linear(features);
        if raw.is_finite() {
            raw.max(0.0)
        } else {
            0.0
        }
    }

    /// Buffer one realized outcome. Non-finite examples are ignored.
    pub fn observe(&mut self, features: &FeatureVector, realized_pct: f64) {
        let example = SlippageExample::new(features, realized_pct);
        if !example.is_finite() {
            debug!(realized_pct, "skipping non-finite slippage example");
            return;
        }
        self.history.push(example);
        self.state.record_observation();
    }

    /// Refit once enough observations have accumulated.
    ///
    /// Returns `Ok(true)` when new parameters were published. A failed fit
    /// keeps the current parameters and is reported as `DegenerateFit`.
    pub fn maybe_retrain(&mut self) -> SimulatorResult<bool> {
        if !self.state.retrain_due(self.retrain_interval) {
            return Ok(false);
        }

        let examples: Vec<SlippageExample> = self.history.iter().copied().collect();
        match fit_quantile(&examples, self.quantile, self.min_fit_examples) {
            Ok(params) => {
                debug!(
                    version = self.state.version() + 1,
                    examples = examples.len(),
                    ?params,
                    "slippage model refit"
                );
                self.state.publish(params);
                Ok(true)
            }
            Err(e) => {
                warn!("⚠️  Slippage refit skipped, keeping previous parameters: {}", e);
                self.state.reject();
                Err(e)
            }
        }
    }

    pub fn params(&self) -> SlippageParams {
        *self.state.params()
    }

    pub fn state(&self) -> &ModelState<SlippageParams> {
        &self.state
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

/// Pinball-loss regression at `quantile` via IRLS.
pub fn fit_quantile(
    examples: &[SlippageExample],
    quantile: f64,
    min_examples: usize,
) -> SimulatorResult<SlippageParams> {
    let degenerate = |reason: String| SimulatorError::DegenerateFit {
        model: MODEL_NAME,
        reason,
    };

    let n = examples.len();
    if n < min_examples.max(2) {
        return Err(degenerate(format!("{} examples, need {}", n, min_examples.max(2))));
    }
    if examples.iter().any(|e| !e.is_finite()) {
        return Err(degenerate("non-finite training example".to_string()));
    }

    let mut raw = Array2::<f64>::zeros((n, 3));
    let mut y = Array1::<f64>::zeros(n);
    for (i, example) in examples.iter().enumerate() {
        for (j, value) in example.inputs.iter().enumerate() {
            raw[[i, j]] = *value;
        }
        y[i] = example.realized_pct;
    }

    let standardized = Standardized::new(&raw);
    let x = &standardized.design;
    let p = standardized.width();

    // Least squares start
    let mut beta = solve(x.t().dot(x), x.t().dot(&y))
        .ok_or_else(|| degenerate("singular normal matrix".to_string()))?;

    for _ in 0..IRLS_ITERATIONS {
        let residuals = &y - &x.dot(&beta);
        let mut weights: Array1<f64> = residuals.mapv(|r| {
            let tilt = if r < 0.0 { 1.0 - quantile } else { quantile };
            tilt / r.abs().max(RESIDUAL_FLOOR)
        });
        let mean_weight = weights.sum() / n as f64;
        if !(mean_weight > 0.0) || !mean_weight.is_finite() {
            return Err(degenerate("non-finite IRLS weights".to_string()));
        }
        weights /= mean_weight;

        let mut weighted = x.clone();
        for (mut row, w) in weighted.rows_mut().into_iter().zip(weights.iter()) {
            row *= *w;
        }
        let normal = weighted.t().dot(x);
        let rhs = weighted.t().dot(&y);
        let next = solve(normal, rhs)
            .ok_or_else(|| degenerate("singular weighted normal matrix".to_string()))?;

        let step = (0..p).fold(0.0_f64, |m, k| m.max((next[k] - beta[k]).abs()));
        beta = next;
        if step < IRLS_TOLERANCE {
            break;
        }
    }

    let (intercept, coefs) = standardized.unstandardize(&beta);
    let params = SlippageParams::from_coefficients(intercept, &coefs);
    if !params.is_finite() {
        return Err(degenerate("non-finite coefficients".to_string()));
    }

    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(imbalance: f64, spread_pct: f64, volatility: f64, realized: f64) -> SlippageExample {
        SlippageExample {
            inputs: [imbalance, spread_pct, volatility],
            realized_pct: realized,
        }
    }

    #[test]
    fn test_prior_is_half_spread() {
        let model = SlippageModel::new(&ModelsConfig::default());
        let features = FeatureVector {
            spread_pct: 0.001,
            ..FeatureVector::default()
        };
        assert!((model.predict(&features) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_prediction_clamped_non_negative() {
        let config = ModelsConfig::default();
        let prior = SlippageParams {
            intercept: -1.0,
            ..SlippageParams::default()
        };
        let model = SlippageModel::with_prior(&config, prior);
        assert_eq!(model.predict(&FeatureVector::default()), 0.0);
    }

    #[test]
    fn test_median_fit_ignores_outliers() {
        // y = 0.1 + 1.5 * imbalance, with a few huge outliers
        let mut examples: Vec<SlippageExample> = (0..60)
            .map(|i| {
                let imbalance = (i as f64 / 30.0) - 1.0;
                let spread = 0.0001 * ((i * 7 % 11) as f64 + 1.0);
                let vol = 0.01 * ((i * 5 % 13) as f64);
                example(imbalance, spread, vol, 0.1 + 1.5 * imbalance)
            })
            .collect();
        for i in [3usize, 17, 41] {
            examples[i].realized_pct += 50.0;
        }

        let params = fit_quantile(&examples, 0.5, 20).expect("fit");
        assert!((params.intercept - 0.1).abs() < 1e-2, "{:?}", params);
        assert!((params.imbalance - 1.5).abs() < 1e-2, "{:?}", params);
    }

    #[test]
    fn test_too_few_examples_is_degenerate() {
        let examples = vec![example(0.1, 0.001, 0.1, 0.2); 5];
        let err = fit_quantile(&examples, 0.5, 20).unwrap_err();
        assert!(matches!(err, SimulatorError::DegenerateFit { model: "slippage", .. }));
    }

    #[test]
    fn test_failed_retrain_keeps_params() {
        let config = ModelsConfig {
            retrain_interval: 3,
            min_fit_examples: 20,
            ..ModelsConfig::default()
        };
        let mut model = SlippageModel::new(&config);
        let before = model.params();
        for _ in 0..3 {
            model.observe(&FeatureVector::default(), 0.1);
        }
        assert!(model.maybe_retrain().is_err());
        assert_eq!(model.params(), before);
        assert_eq!(model.state().failed_fits(), 1);
    }
}
