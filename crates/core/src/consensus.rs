//! Analyst consensus aggregation.
//!
//! Turns a recommendation breakdown into bullish/neutral/bearish percentages. This output is
//! informational only and never feeds the valuation score.

use crate::domain::analyst::{AnalystConsensus, RecommendationBreakdown};
use crate::numeric::round_to;
use serde::Serialize;

pub const LABEL_BUY: &str = "Buy";
pub const LABEL_HOLD: &str = "Hold";
pub const LABEL_SELL: &str = "Sell";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    Supplied,
    Derived,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConsensusPercentages {
    pub bullish: f64,
    pub neutral: f64,
    pub bearish: f64,
}

impl ConsensusPercentages {
    /// Rounds to two decimals for presentation. Neutral is re-derived after rounding so the
    /// three values still add up to 100.
    pub fn for_display(&self) -> Self {
        let bullish = round_to(self.bullish, 2);
        let bearish = round_to(self.bearish, 2);
        Self {
            bullish,
            neutral: round_to(100.0 - bullish - bearish, 2),
            bearish,
        }
    }

    pub fn sum(&self) -> f64 {
        self.bullish + self.neutral + self.bearish
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsensusSummary {
    pub consensus: String,
    pub label_source: LabelSource,
    pub total_analysts: u64,
    pub breakdown: RecommendationBreakdown,
    pub percentages: ConsensusPercentages,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsensusOutcome {
    /// No analyst covers the ticker; percentages are undefined.
    NoData,
    Summary(ConsensusSummary),
}

impl ConsensusOutcome {
    pub fn summary(&self) -> Option<&ConsensusSummary> {
        match self {
            ConsensusOutcome::NoData => None,
            ConsensusOutcome::Summary(s) => Some(s),
        }
    }

    pub fn into_summary(self) -> Option<ConsensusSummary> {
        match self {
            ConsensusOutcome::NoData => None,
            ConsensusOutcome::Summary(s) => Some(s),
        }
    }
}

/// Computes consensus percentages. A supplied label is passed through untouched; a missing one
/// is derived by plurality (see [`derive_label`]).
///
/// `total_analysts` must equal the bucket sum. Provider data should go through
/// [`AnalystConsensus`] and [`aggregate_consensus`], which check that up front.
pub fn aggregate(
    breakdown: &RecommendationBreakdown,
    total_analysts: u64,
    label: Option<&str>,
) -> ConsensusOutcome {
    if total_analysts == 0 {
        return ConsensusOutcome::NoData;
    }
    debug_assert_eq!(
        breakdown.total(),
        total_analysts,
        "analyst total disagrees with the bucket sum"
    );

    let total = total_analysts as f64;
    let bullish = 100.0 * breakdown.bullish() as f64 / total;
    let bearish = 100.0 * breakdown.bearish() as f64 / total;
    let neutral = 100.0 - bullish - bearish;

    let (consensus, label_source) = match label.map(str::trim).filter(|s| !s.is_empty()) {
        Some(l) => (l.to_string(), LabelSource::Supplied),
        None => (derive_label(breakdown).to_string(), LabelSource::Derived),
    };

    ConsensusOutcome::Summary(ConsensusSummary {
        consensus,
        label_source,
        total_analysts,
        breakdown: *breakdown,
        percentages: ConsensusPercentages {
            bullish,
            neutral,
            bearish,
        },
    })
}

pub fn aggregate_consensus(consensus: &AnalystConsensus) -> ConsensusOutcome {
    aggregate(
        consensus.breakdown(),
        consensus.total_analysts(),
        consensus.label(),
    )
}

/// Plurality over buy-side, hold and sell-side counts. Any tie resolves to "Hold".
pub fn derive_label(breakdown: &RecommendationBreakdown) -> &'static str {
    let (bull, hold, bear) = (breakdown.bullish(), breakdown.neutral(), breakdown.bearish());
    if bull > hold && bull > bear {
        LABEL_BUY
    } else if bear > hold && bear > bull {
        LABEL_SELL
    } else {
        LABEL_HOLD
    }
}
