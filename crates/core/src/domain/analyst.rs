use anyhow::ensure;
use serde::{Deserialize, Serialize};

/// Analyst recommendation counts on the 5-point scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationBreakdown {
    pub strong_buy: u32,
    pub buy: u32,
    pub hold: u32,
    pub sell: u32,
    pub strong_sell: u32,
}

impl RecommendationBreakdown {
    pub fn bullish(&self) -> u64 {
        u64::from(self.strong_buy) + u64::from(self.buy)
    }

    pub fn neutral(&self) -> u64 {
        u64::from(self.hold)
    }

    pub fn bearish(&self) -> u64 {
        u64::from(self.sell) + u64::from(self.strong_sell)
    }

    pub fn total(&self) -> u64 {
        self.bullish() + self.neutral() + self.bearish()
    }
}

/// Provider-reported consensus for one ticker, validated at the input boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalystConsensus {
    ticker: String,
    label: Option<String>,
    breakdown: RecommendationBreakdown,
    total_analysts: u64,
}

impl AnalystConsensus {
    pub fn try_new(
        ticker: impl Into<String>,
        label: Option<String>,
        breakdown: RecommendationBreakdown,
        total_analysts: u64,
    ) -> anyhow::Result<Self> {
        let ticker = ticker.into().trim().to_ascii_uppercase();
        ensure!(!ticker.is_empty(), "ticker must be non-empty");
        ensure!(
            breakdown.total() == total_analysts,
            "breakdown total {} does not match total_analysts {total_analysts}",
            breakdown.total()
        );

        let label = label.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        Ok(Self {
            ticker,
            label,
            breakdown,
            total_analysts,
        })
    }

    /// Builds a consensus whose total is the sum of the buckets.
    pub fn from_breakdown(
        ticker: impl Into<String>,
        label: Option<String>,
        breakdown: RecommendationBreakdown,
    ) -> anyhow::Result<Self> {
        Self::try_new(ticker, label, breakdown, breakdown.total())
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn breakdown(&self) -> &RecommendationBreakdown {
        &self.breakdown
    }

    pub fn total_analysts(&self) -> u64 {
        self.total_analysts
    }
}
