//! Logistic maker/taker classifier.
//!
//! Predicts the probability that the simulated order executes as taker from
//! {price direction, imbalance, trade frequency}. Refits use Newton-Raphson
//! with a small L2 ridge, started from zero weights.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ModelsConfig;
use crate::core::features::FeatureVector;
use crate::core::linalg::{solve, Standardized};
use crate::core::model_state::{ExampleBuffer, ModelState};
use crate::error::{SimulatorError, SimulatorResult};

const MODEL_NAME: &str = "maker_taker";
const NEWTON_ITERATIONS: usize = 50;
const NEWTON_TOLERANCE: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierParams {
    pub bias: f64,
    pub direction: f64,
    pub imbalance: f64,
    pub trade_frequency: f64,
}

impl Default for ClassifierParams {
    /// 30% taker / 70% maker before any data is seen
    fn default() -> Self {
        Self {
            bias: (0.3_f64 / 0.7).ln(),
            direction: 0.0,
            imbalance: 0.0,
            trade_frequency: 0.0,
        }
    }
}

impl ClassifierParams {
    fn from_weights(bias: f64, weights: &[f64]) -> Self {
        Self {
            bias,
            direction: weights[0],
            imbalance: weights[1],
            trade_frequency: weights[2],
        }
    }

    fn is_finite(&self) -> bool {
        [self.bias, self.direction, self.imbalance, self.trade_frequency]
            .iter()
            .all(|v| v.is_finite())
    }

    pub fn logit(&self, features: &FeatureVector) -> f64 {
        self.bias
            + self.direction * features.direction
            + self.imbalance * features.imbalance
            + self.trade_frequency * features.trade_frequency
    }
}

/// Logistic function that cannot overflow; NaN maps to 0.5
pub fn sigmoid(z: f64) -> f64 {
    if z.is_nan() {
        return 0.5;
    }
    let p = if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    };
    p.clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy)]
pub struct TakerExample {
    pub inputs: [f64; 3],
    pub taker: bool,
}

impl TakerExample {
    pub fn new(features: &FeatureVector, taker: bool) -> Self {
        Self {
            inputs: [features.direction, features.imbalance, features.trade_frequency],
            taker,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MakerTakerClassifier {
    state: ModelState<ClassifierParams>,
    history: ExampleBuffer<TakerExample>,
    l2: f64,
    retrain_interval: usize,
    min_fit_examples: usize,
}

impl MakerTakerClassifier {
    pub fn new(config: &ModelsConfig) -> Self {
        Self::with_prior(config, config.classifier_prior)
    }

    pub fn with_prior(config: &ModelsConfig, prior: ClassifierParams) -> Self {
        Self {
            state: ModelState::new(prior),
            history: ExampleBuffer::new(config.history_cap),
            l2: config.classifier_l2,
            retrain_interval: config.retrain_interval.max(1),
            min_fit_examples: config.min_fit_examples,
        }
    }

    /// P(taker) in [0, 1]
    pub fn predict(&self, features: &FeatureVector) -> f64 {
        sigmoid(self.state.params().logit(features))
    }

    pub fn observe(&mut self, features: &FeatureVector, taker: bool) {
        let example = TakerExample::new(features, taker);
        if example.inputs.iter().any(|v| !v.is_finite()) {
            debug!("skipping non-finite maker/taker example");
            return;
        }
        self.history.push(example);
        self.state.record_observation();
    }

    pub fn maybe_retrain(&mut self) -> SimulatorResult<bool> {
        if !self.state.retrain_due(self.retrain_interval) {
            return Ok(false);
        }

        let examples: Vec<TakerExample> = self.history.iter().copied().collect();
        match fit_logistic(&examples, self.l2, self.min_fit_examples) {
            Ok(params) => {
                debug!(
                    version = self.state.version() + 1,
                    examples = examples.len(),
                    ?params,
                    "maker/taker classifier refit"
                );
                self.state.publish(params);
                Ok(true)
            }
            Err(e) => {
                warn!("⚠️  Maker/taker refit skipped, keeping previous weights: {}", e);
                self.state.reject();
                Err(e)
            }
        }
    }

    pub fn params(&self) -> ClassifierParams {
        *self.state.params()
    }

    pub fn state(&self) -> &ModelState<ClassifierParams> {
        &self.state
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

/// Ridge-penalized logistic regression; the bias is not penalized.
pub fn fit_logistic(
    examples: &[TakerExample],
    l2: f64,
    min_examples: usize,
) -> SimulatorResult<ClassifierParams> {
    let degenerate = |reason: String| SimulatorError::DegenerateFit {
        model: MODEL_NAME,
        reason,
    };

    let n = examples.len();
    if n < min_examples.max(2) {
        return Err(degenerate(format!("{} examples, need {}", n, min_examples.max(2))));
    }

    let positives = examples.iter().filter(|e| e.taker).count();
    if positives == 0 || positives == n {
        return Err(degenerate("single-class labels".to_string()));
    }

    let mut raw = Array2::<f64>::zeros((n, 3));
    let mut y = Array1::<f64>::zeros(n);
    for (i, example) in examples.iter().enumerate() {
        for (j, value) in example.inputs.iter().enumerate() {
            raw[[i, j]] = *value;
        }
        y[i] = if example.taker { 1.0 } else { 0.0 };
    }
    if raw.iter().any(|v| !v.is_finite()) {
        return Err(degenerate("non-finite training example".to_string()));
    }

    let standardized = Standardized::new(&raw);
    let x = &standardized.design;
    let p = standardized.width();
    let mut ridge = Array1::<f64>::from_elem(p, l2.max(0.0));
    ridge[0] = 0.0;

    let mut w = Array1::<f64>::zeros(p);
    for _ in 0..NEWTON_ITERATIONS {
        let probs = x.dot(&w).mapv(sigmoid);
        let gradient = x.t().dot(&(&probs - &y)) + &ridge * &w;

        let mut weighted = x.clone();
        for (mut row, prob) in weighted.rows_mut().into_iter().zip(probs.iter()) {
            row *= prob * (1.0 - prob);
        }
        let mut hessian = x.t().dot(&weighted);
        for k in 0..p {
            hessian[[k, k]] += ridge[k];
        }

        let delta = solve(hessian, gradient)
            .ok_or_else(|| degenerate("singular Hessian".to_string()))?;
        w = w - &delta;

        if w.iter().any(|v| !v.is_finite()) {
            return Err(degenerate("non-finite weights".to_string()));
        }
        if delta.iter().fold(0.0_f64, |m, d| m.max(d.abs())) < NEWTON_TOLERANCE {
            break;
        }
    }

    let (bias, weights) = standardized.unstandardize(&w);
    let params = ClassifierParams::from_weights(bias, &weights);
    if !params.is_finite() {
        return Err(degenerate("non-finite weights".to_string()));
    }

    Ok(params)
}
