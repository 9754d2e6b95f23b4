use crate::benchmark::PeerListing;
use crate::directory::ListedCompany;
use crate::domain::analyst::AnalystConsensus;
use crate::domain::company::CompanyProfile;
use crate::domain::ratio::RatioValues;
use anyhow::Result;

/// Source of raw fundamentals, sector constituents and analyst grades.
#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_profile(&self, ticker: &str) -> Result<Option<CompanyProfile>>;

    /// Latest annual P/E, P/B and ROE (percent). Missing ratios are `None`, not errors.
    async fn fetch_ratios(&self, ticker: &str) -> Result<RatioValues>;

    /// Largest listings of a sector by market cap.
    async fn fetch_sector_peers(&self, sector: &str, limit: usize) -> Result<Vec<PeerListing>>;

    async fn fetch_analyst_consensus(&self, ticker: &str) -> Result<Option<AnalystConsensus>>;

    async fn search_companies(&self, query: &str, limit: usize) -> Result<Vec<ListedCompany>>;

    /// Cheap authenticated request used by health checks.
    async fn ping(&self) -> Result<()>;
}
