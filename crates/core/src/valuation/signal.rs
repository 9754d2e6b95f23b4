use crate::valuation::config::ScoringConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Final valuation call. Variants are declared from most bearish to most bullish so the derived
/// ordering matches the score ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Signal {
    Overvalued,
    #[serde(rename = "Fairly valued")]
    FairlyValued,
    Undervalued,
}

impl Signal {
    pub fn label(self) -> &'static str {
        match self {
            Signal::Overvalued => "Overvalued",
            Signal::FairlyValued => "Fairly valued",
            Signal::Undervalued => "Undervalued",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl ScoringConfig {
    pub fn classify(&self, score: f64) -> Signal {
        if score >= self.signal_threshold {
            Signal::Undervalued
        } else if score <= -self.signal_threshold {
            Signal::Overvalued
        } else {
            Signal::FairlyValued
        }
    }
}

pub fn classify(score: f64) -> Signal {
    ScoringConfig::default().classify(score)
}
