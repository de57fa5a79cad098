// Tiered exchange fees

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Maker and taker rates as fractions of notional
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeTier {
    pub maker_rate: f64,
    pub taker_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeSchedule {
    #[serde(default = "default_tiers")]
    pub tiers: BTreeMap<String, FeeTier>,
}

fn default_tiers() -> BTreeMap<String, FeeTier> {
    let mut tiers = BTreeMap::new();
    tiers.insert("1".to_string(), FeeTier { maker_rate: 0.0008, taker_rate: 0.0010 });
    tiers.insert("2".to_string(), FeeTier { maker_rate: 0.0006, taker_rate: 0.0008 });
    tiers.insert("3".to_string(), FeeTier { maker_rate: 0.0004, taker_rate: 0.0005 });
    tiers
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self { tiers: default_tiers() }
    }
}

impl FeeSchedule {
    /// Rates for `tier`, falling back to the lowest-numbered tier when unknown
    pub fn tier(&self, tier: &str) -> FeeTier {
        self.tiers
            .get(tier)
            .or_else(|| self.tiers.values().next())
            .copied()
            .unwrap_or(FeeTier { maker_rate: 0.0, taker_rate: 0.0 })
    }

    /// Expected fee in quote units for `quantity` at `mid`, blending maker
    /// and taker rates by their probabilities.
    pub fn expected_fee(&self, tier: &str, quantity: f64, mid: f64, maker_prob: f64) -> f64 {
        if !(quantity > 0.0) || !(mid > 0.0) {
            return 0.0;
        }
        let rates = self.tier(tier);
        let maker_prob = maker_prob.clamp(0.0, 1.0);
        let blended = maker_prob * rates.maker_rate + (1.0 - maker_prob) * rates.taker_rate;
        quantity * mid * blended
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.tiers.is_empty() {
            return Err("at least one fee tier must be defined".to_string());
        }
        for (name, tier) in &self.tiers {
            let in_range = |rate: f64| rate.is_finite() && (0.0..1.0).contains(&rate);
            if !in_range(tier.maker_rate) || !in_range(tier.taker_rate) {
                return Err(format!("fee tier '{}' has a rate outside [0, 1)", name));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blended_fee() {
        let fees = FeeSchedule::default();
        // 0.7 * 0.0008 + 0.3 * 0.0010 = 0.00086
        let fee = fees.expected_fee("1", 2.0, 100.0, 0.7);
        assert!((fee - 0.172).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_tier_falls_back() {
        let fees = FeeSchedule::default();
        assert_eq!(fees.tier("platinum"), fees.tier("1"));
    }

    #[test]
    fn test_default_tiers_are_numbered() {
        let fees = FeeSchedule::default();
        assert_eq!(fees.tier("1"), FeeTier { maker_rate: 0.0008, taker_rate: 0.0010 });
        assert_eq!(fees.tier("2"), FeeTier { maker_rate: 0.0006, taker_rate: 0.0008 });
        assert_eq!(fees.tier("3"), FeeTier { maker_rate: 0.0004, taker_rate: 0.0005 });
        assert_eq!(fees.tier("7"), fees.tier("1"));
    }

    #[test]
    fn test_zero_quantity_has_no_fee() {
        let fees = FeeSchedule::default();
        assert_eq!(fees.expected_fee("2", 0.0, 100.0, 0.5), 0.0);
    }

    #[test]
    fn test_validate_rejects_bad_rate() {
        let mut fees = FeeSchedule::default();
        fees.tiers.insert("bad".to_string(), FeeTier { maker_rate: -0.1, taker_rate: 0.001 });
        assert!(fees.validate().is_err());
    }
}
