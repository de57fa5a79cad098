// Linear temporary + permanent market impact (Almgren-Chriss style)

use serde::{Deserialize, Serialize};

use crate::config::ModelsConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpactEstimate {
    pub temporary_pct: f64,
    pub permanent_pct: f64,
    pub total_pct: f64,
    /// Capped at the configured maximum
    pub saturated: bool,
}

#[derive(Debug, Clone)]
pub struct MarketImpactModel {
    eta: f64,
    gamma: f64,
    max_impact_pct: f64,
}

impl Default for MarketImpactModel {
    fn default() -> Self {
        Self::from_config(&ModelsConfig::default())
    }
}

impl MarketImpactModel {
    pub fn new(eta: f64, gamma: f64, max_impact_pct: f64) -> Self {
        Self {
            eta: eta.max(0.0),
            gamma: gamma.max(0.0),
            max_impact_pct,
        }
    }

    pub fn from_config(config: &ModelsConfig) -> Self {
        Self::new(config.eta, config.gamma, config.max_impact_pct)
    }

    /// Impact in percent for `quantity` against `liquidity` resting units.
    ///
    /// `temporary = eta * q/L`, `permanent = gamma * q/L * sigma`, both scaled
    /// to percent. Non-positive quantities cost nothing; an empty book or a
    /// non-finite result returns the saturating maximum.
    pub fn estimate(&self, quantity: f64, liquidity: f64, volatility: f64) -> ImpactEstimate {
        if !(quantity > 0.0) {
            return ImpactEstimate::default();
        }

        if !(liquidity > 0.0) {
            return self.saturated();
        }

        let participation = quantity / liquidity;
        let sigma = if volatility.is_finite() { volatility.max(0.0) } else { 0.0 };
        let temporary_pct = self.eta * participation * 100.0;
        let permanent_pct = self.gamma * participation * sigma * 100.0;
        let total_pct = temporary_pct + permanent_pct;

        if !total_pct.is_finite() || total_pct >= self.max_impact_pct {
            return self.saturated();
        }

        ImpactEstimate {
            temporary_pct,
            permanent_pct,
            total_pct,
            saturated: false,
        }
    }

    fn saturated(&self) -> ImpactEstimate {
        ImpactEstimate {
            temporary_pct: self.max_impact_pct,
            permanent_pct: 0.0,
            total_pct: self.max_impact_pct,
            saturated: true,
        }
    }
}
