use crate::domain::ratio::Ratio;
use anyhow::ensure;
use serde::Serialize;

/// Company/benchmark ratio at or above which a lower-is-better metric reads as overvalued.
pub const OVERVALUED_RATIO: f64 = 1.2;
/// Company/benchmark ratio at or below which a lower-is-better metric reads as undervalued.
pub const UNDERVALUED_RATIO: f64 = 0.8;
/// Composite score magnitude that separates a directional signal from "fairly valued".
/// Shared by the signal classifier and anything that colours a score for display.
pub const SIGNAL_THRESHOLD: f64 = 0.2;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Weights {
    #[serde(rename = "PE")]
    pub pe: f64,
    #[serde(rename = "PB")]
    pub pb: f64,
    #[serde(rename = "ROE")]
    pub roe: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            pe: 0.5,
            pb: 0.3,
            roe: 0.2,
        }
    }
}

impl Weights {
    pub fn get(&self, ratio: Ratio) -> f64 {
        match ratio {
            Ratio::Pe => self.pe,
            Ratio::Pb => self.pb,
            Ratio::Roe => self.roe,
        }
    }

    pub fn sum(&self) -> f64 {
        self.pe + self.pb + self.roe
    }

    fn validate(&self) -> anyhow::Result<()> {
        for ratio in Ratio::ALL {
            let w = self.get(ratio);
            ensure!(
                w.is_finite() && w >= 0.0,
                "weight for {ratio} must be a non-negative number (got {w})"
            );
        }
        let sum = self.sum();
        ensure!(
            (sum - 1.0).abs() <= WEIGHT_SUM_TOLERANCE,
            "weights must sum to 1.0 (got {sum})"
        );
        Ok(())
    }
}

/// Thresholds and weights of the valuation engine. Every tunable number lives here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoringConfig {
    pub overvalued_ratio: f64,
    pub undervalued_ratio: f64,
    pub weights: Weights,
    pub signal_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            overvalued_ratio: OVERVALUED_RATIO,
            undervalued_ratio: UNDERVALUED_RATIO,
            weights: Weights::default(),
            signal_threshold: SIGNAL_THRESHOLD,
        }
    }
}

impl ScoringConfig {
    pub fn try_new(
        overvalued_ratio: f64,
        undervalued_ratio: f64,
        weights: Weights,
        signal_threshold: f64,
    ) -> anyhow::Result<Self> {
        let config = Self {
            overvalued_ratio,
            undervalued_ratio,
            weights,
            signal_threshold,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.undervalued_ratio.is_finite() && self.undervalued_ratio > 0.0,
            "undervalued_ratio must be positive (got {})",
            self.undervalued_ratio
        );
        ensure!(
            self.overvalued_ratio.is_finite() && self.overvalued_ratio > self.undervalued_ratio,
            "overvalued_ratio must exceed undervalued_ratio (got {} <= {})",
            self.overvalued_ratio,
            self.undervalued_ratio
        );
        ensure!(
            self.signal_threshold.is_finite() && self.signal_threshold > 0.0,
            "signal_threshold must be positive (got {})",
            self.signal_threshold
        );
        self.weights.validate()
    }

    /// Defaults overridden by `SCORING_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut out = Self::default();
        let read = |key: &str| -> anyhow::Result<Option<f64>> {
            match lookup(key) {
                Some(s) if !s.trim().is_empty() => {
                    let v = s
                        .trim()
                        .parse::<f64>()
                        .map_err(|e| anyhow::anyhow!("{key} must be a number: {e}"))?;
                    Ok(Some(v))
                }
                _ => Ok(None),
            }
        };

        if let Some(v) = read("SCORING_OVERVALUED_RATIO")? {
            out.overvalued_ratio = v;
        }
        if let Some(v) = read("SCORING_UNDERVALUED_RATIO")? {
            out.undervalued_ratio = v;
        }
        if let Some(v) = read("SCORING_SIGNAL_THRESHOLD")? {
            out.signal_threshold = v;
        }
        if let Some(v) = read("SCORING_WEIGHT_PE")? {
            out.weights.pe = v;
        }
        if let Some(v) = read("SCORING_WEIGHT_PB")? {
            out.weights.pb = v;
        }
        if let Some(v) = read("SCORING_WEIGHT_ROE")? {
            out.weights.roe = v;
        }

        out.validate()?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn default_is_valid_and_weights_sum_to_one() {
        let c = ScoringConfig::default();
        assert!(c.validate().is_ok());
        assert!((c.weights.sum() - 1.0).abs() < 1e-12);
        assert_eq!(c.signal_threshold, SIGNAL_THRESHOLD);
    }

    #[test]
    fn rejects_weights_not_summing_to_one() {
        let w = Weights {
            pe: 0.5,
            pb: 0.5,
            roe: 0.2,
        };
        assert!(ScoringConfig::try_new(1.2, 0.8, w, 0.2).is_err());
    }

    #[test]
    fn rejects_negative_weight_and_inverted_thresholds() {
        let w = Weights {
            pe: 1.2,
            pb: -0.2,
            roe: 0.0,
        };
        assert!(ScoringConfig::try_new(1.2, 0.8, w, 0.2).is_err());
        assert!(ScoringConfig::try_new(0.8, 1.2, Weights::default(), 0.2).is_err());
        assert!(ScoringConfig::try_new(1.2, 0.8, Weights::default(), 0.0).is_err());
    }

    #[test]
    fn env_overrides_are_applied_then_validated() {
        let c = ScoringConfig::from_lookup(lookup(&[
            ("SCORING_WEIGHT_PE", "0.4"),
            ("SCORING_WEIGHT_PB", "0.4"),
            ("SCORING_OVERVALUED_RATIO", "1.25"),
        ]))
        .unwrap();
        assert_eq!(c.weights.pe, 0.4);
        assert_eq!(c.weights.pb, 0.4);
        assert_eq!(c.weights.roe, 0.2);
        assert_eq!(c.overvalued_ratio, 1.25);

        assert!(ScoringConfig::from_lookup(lookup(&[("SCORING_WEIGHT_PE", "0.9")])).is_err());
        assert!(ScoringConfig::from_lookup(lookup(&[("SCORING_WEIGHT_PE", "abc")])).is_err());
    }
}
