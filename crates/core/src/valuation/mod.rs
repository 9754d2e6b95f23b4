//! Sector-relative valuation: per-metric indicators, weighted composite score and final signal.
//!
//! Everything here is a pure function of (fundamentals, benchmark, config). Analyst data is
//! deliberately absent from every signature in this module.

pub mod config;
pub mod indicator;
pub mod scorer;
pub mod signal;

pub use config::{ScoringConfig, Weights, SIGNAL_THRESHOLD};
pub use indicator::{compare, indicator_for, Indicator};
pub use scorer::{analyze, score, ScoreExplanation, ValuationReport};
pub use signal::{classify, Signal};
