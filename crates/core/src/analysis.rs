//! Request-level orchestration: resolves a company, its sector benchmark and analyst data, then
//! runs the valuation and consensus pipelines.
//!
//! Valuation never sees analyst data. The two pipelines only meet in [`CompleteAnalysis`], where
//! they sit side by side.

use crate::benchmark::{build_benchmark, reference_benchmark, BenchmarkCache, PeerRatios};
use crate::consensus::{aggregate_consensus, ConsensusOutcome, ConsensusSummary};
use crate::directory::{CompanyDirectory, DirectoryStats, ListedCompany, DEFAULT_SUGGESTION_LIMIT};
use crate::domain::company::{Benchmark, Fundamentals};
use crate::domain::ratio::RatioValues;
use crate::ingest::provider::MarketDataProvider;
use crate::storage::benchmarks::fetch_latest_benchmark;
use crate::valuation::{ScoringConfig, ValuationReport};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

const SCORING_DISCLAIMER: &str =
    "The score is computed exclusively from fundamental ratios compared with the sector benchmark.";
const ANALYST_DISCLAIMER: &str =
    "Analyst recommendations are informational only and do not influence the score.";
const NO_ANALYST_DATA: &str = "No analyst recommendation data available";
const SEARCH_HINTS: [&str; 3] = [
    "Check the spelling of the company name",
    "Try the full legal name of the company",
    "Make sure the company is publicly listed",
];

/// Lookup miss that should surface as "not found" rather than a server failure.
#[derive(Debug, Clone)]
pub struct NotFound {
    pub what: &'static str,
    pub key: String,
}

impl NotFound {
    fn new(what: &'static str, key: impl Into<String>) -> Self {
        Self {
            what,
            key: key.into(),
        }
    }
}

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} not found: {}", self.what, self.key)
    }
}

impl std::error::Error for NotFound {}

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub peer_limit: usize,
    pub cache_ttl: Duration,
    /// Pause between per-peer ratio requests.
    pub request_delay: Duration,
    pub directory_path: Option<PathBuf>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            peer_limit: crate::benchmark::DEFAULT_PEER_LIMIT,
            cache_ttl: crate::benchmark::DEFAULT_CACHE_TTL,
            request_delay: Duration::from_millis(100),
            directory_path: None,
        }
    }
}

impl ServiceOptions {
    pub fn from_env(directory_path: Option<PathBuf>) -> Self {
        let defaults = Self::default();
        let env_u64 = |key: &str| std::env::var(key).ok().and_then(|s| s.parse::<u64>().ok());

        Self {
            peer_limit: env_u64("SECTOR_PEER_LIMIT")
                .map(|v| v as usize)
                .filter(|v| *v > 0)
                .unwrap_or(defaults.peer_limit),
            cache_ttl: env_u64("BENCHMARK_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            request_delay: env_u64("DATA_PROVIDER_REQ_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_delay),
            directory_path,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompanyReport {
    pub ticker: String,
    pub name: String,
    pub sector: String,
    pub exchange: Option<String>,
    pub market_cap: Option<f64>,
    pub price: Option<f64>,
    pub fundamentals: RatioValues,
}

impl CompanyReport {
    pub fn to_fundamentals(&self) -> anyhow::Result<Fundamentals> {
        Fundamentals::try_new(&self.ticker, &self.sector, self.fundamentals)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkSource {
    Cache,
    Stored,
    Live,
    Reference,
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    #[serde(flatten)]
    pub benchmark: Benchmark,
    pub source: BenchmarkSource,
    pub computed_at: Option<DateTime<Utc>>,
}

/// Benchmark computed from live peer data, with the peer rows it was averaged from.
#[derive(Debug, Clone)]
pub struct LiveBenchmark {
    pub benchmark: Benchmark,
    pub peers: Vec<PeerRatios>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub ticker: String,
    pub name: String,
    pub sector: String,
    pub fundamentals: RatioValues,
    pub benchmark: RatioValues,
    pub benchmark_source: BenchmarkSource,
    pub companies_used: Vec<String>,
    #[serde(flatten)]
    pub report: ValuationReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsensusReport {
    pub ticker: String,
    pub analyst_recommendations: Option<ConsensusSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub note: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Disclaimer {
    pub scoring_system: &'static str,
    pub analyst_recommendations: &'static str,
}

impl Default for Disclaimer {
    fn default() -> Self {
        Self {
            scoring_system: SCORING_DISCLAIMER,
            analyst_recommendations: ANALYST_DISCLAIMER,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompleteAnalysis {
    #[serde(flatten)]
    pub analysis: Analysis,
    pub analyst_recommendations: Option<ConsensusSummary>,
    pub disclaimer: Disclaimer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    Cache,
    Api,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub company_name: String,
    pub found: bool,
    pub ticker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SearchSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_info: Option<ListedCompany>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuggestionList {
    pub partial_name: String,
    pub suggestions: Vec<ListedCompany>,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseHealth {
    Connected,
    Unreachable,
    Disabled,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub provider: &'static str,
    pub provider_reachable: bool,
    pub database: DatabaseHealth,
    pub cached_sectors: Vec<String>,
    pub directory: DirectoryStats,
}

pub struct AnalysisService {
    provider: Arc<dyn MarketDataProvider>,
    pool: Option<sqlx::PgPool>,
    scoring: ScoringConfig,
    options: ServiceOptions,
    cache: Mutex<BenchmarkCache>,
    directory: RwLock<CompanyDirectory>,
}

impl AnalysisService {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        pool: Option<sqlx::PgPool>,
        scoring: ScoringConfig,
        options: ServiceOptions,
        directory: CompanyDirectory,
    ) -> Self {
        Self {
            provider,
            pool,
            scoring,
            cache: Mutex::new(BenchmarkCache::new(options.cache_ttl)),
            options,
            directory: RwLock::new(directory),
        }
    }

    pub fn scoring(&self) -> &ScoringConfig {
        &self.scoring
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    /// Profile and latest fundamentals. Unknown tickers, tickers without a sector and tickers
    /// without any ratio are reported as [`NotFound`].
    pub async fn company(&self, ticker: &str) -> anyhow::Result<CompanyReport> {
        let ticker = ticker.trim().to_ascii_uppercase();
        anyhow::ensure!(!ticker.is_empty(), "ticker must be non-empty");

        let profile = self
            .provider
            .fetch_profile(&ticker)
            .await
            .with_context(|| format!("failed to fetch profile for {ticker}"))?
            .ok_or_else(|| NotFound::new("company", &ticker))?;

        let sector = match profile.sector.clone() {
            Some(s) => s,
            None => self
                .directory
                .read()
                .await
                .get(&ticker)
                .and_then(|c| c.sector.clone())
                .ok_or_else(|| NotFound::new("sector for company", &ticker))?,
        };

        let values = self
            .provider
            .fetch_ratios(&ticker)
            .await
            .with_context(|| format!("failed to fetch ratios for {ticker}"))?;
        if values.is_empty() {
            return Err(NotFound::new("fundamentals for company", &ticker).into());
        }

        let mut listed = ListedCompany::new(
            &ticker,
            &profile.name,
            profile.exchange.as_deref(),
            Some(sector.as_str()),
        );
        listed.market_cap = profile.market_cap;
        self.directory.write().await.insert(listed);

        tracing::info!(%ticker, %sector, ?values, "company fundamentals resolved");

        Ok(CompanyReport {
            ticker,
            name: profile.name,
            sector,
            exchange: profile.exchange,
            market_cap: profile.market_cap,
            price: profile.price,
            fundamentals: values,
        })
    }

    /// Cached, then stored (younger than the cache TTL), then live, then the reference table.
    pub async fn sector_benchmark(&self, sector: &str) -> anyhow::Result<BenchmarkReport> {
        let sector = sector.trim();
        anyhow::ensure!(!sector.is_empty(), "sector must be non-empty");

        if let Some(benchmark) = self.cache.lock().await.get(sector).cloned() {
            tracing::debug!(%sector, "benchmark cache hit");
            return Ok(BenchmarkReport {
                benchmark,
                source: BenchmarkSource::Cache,
                computed_at: None,
            });
        }

        if let Some(pool) = &self.pool {
            let max_age = chrono::Duration::from_std(self.options.cache_ttl)
                .unwrap_or_else(|_| chrono::Duration::hours(24));
            match fetch_latest_benchmark(pool, sector, max_age).await {
                Ok(Some(stored)) => {
                    tracing::info!(%sector, id = %stored.id, computed_at = %stored.computed_at, "using stored benchmark");
                    self.cache.lock().await.insert(stored.benchmark.clone());
                    return Ok(BenchmarkReport {
                        benchmark: stored.benchmark,
                        source: BenchmarkSource::Stored,
                        computed_at: Some(stored.computed_at),
                    });
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(%sector, error = %err, "stored benchmark lookup failed");
                }
            }
        }

        let live = self.compute_live_benchmark(sector).await;
        match live {
            Ok(Some(live)) => {
                self.cache.lock().await.insert(live.benchmark.clone());
                return Ok(BenchmarkReport {
                    benchmark: live.benchmark,
                    source: BenchmarkSource::Live,
                    computed_at: Some(Utc::now()),
                });
            }
            Ok(None) => {
                if let Some(benchmark) = reference_benchmark(sector) {
                    tracing::info!(%sector, "no live peers; using reference benchmark");
                    return Ok(reference(benchmark));
                }
                Err(NotFound::new("sector", sector).into())
            }
            Err(err) => match reference_benchmark(sector) {
                Some(benchmark) => {
                    tracing::warn!(%sector, error = %err, "live benchmark failed; using reference benchmark");
                    Ok(reference(benchmark))
                }
                None => Err(err),
            },
        }
    }

    /// Averages the ratios of the sector's largest listings. `None` when the provider lists no
    /// peers or none of them reports a usable ratio. Peers whose ratios fail to load are skipped.
    pub async fn compute_live_benchmark(&self, sector: &str) -> anyhow::Result<Option<LiveBenchmark>> {
        let listings = self
            .provider
            .fetch_sector_peers(sector, self.options.peer_limit)
            .await
            .with_context(|| format!("failed to list peers for sector {sector}"))?;

        if listings.is_empty() {
            return Ok(None);
        }

        let mut peers = Vec::with_capacity(listings.len());
        for (idx, listing) in listings.into_iter().enumerate() {
            if idx > 0 && !self.options.request_delay.is_zero() {
                tokio::time::sleep(self.options.request_delay).await;
            }
            match self.provider.fetch_ratios(&listing.symbol).await {
                Ok(values) if !values.is_empty() => peers.push(PeerRatios {
                    symbol: listing.symbol,
                    name: listing.name,
                    market_cap: listing.market_cap,
                    values,
                }),
                Ok(_) => {
                    tracing::debug!(%sector, ticker = %listing.symbol, "peer has no usable ratios");
                }
                Err(err) => {
                    tracing::warn!(%sector, ticker = %listing.symbol, error = %err, "peer ratios fetch failed");
                }
            }
        }

        if peers.is_empty() {
            return Ok(None);
        }

        let benchmark = build_benchmark(sector, &peers)?;
        tracing::info!(
            %sector,
            peers = peers.len(),
            values = ?benchmark.values(),
            "live sector benchmark computed"
        );
        Ok(Some(LiveBenchmark { benchmark, peers }))
    }

    pub async fn analyze(&self, ticker: &str) -> anyhow::Result<Analysis> {
        let company = self.company(ticker).await?;
        let fundamentals = company.to_fundamentals()?;
        let bench = self.sector_benchmark(&company.sector).await?;
        let report = self.scoring.analyze(&fundamentals, &bench.benchmark);

        Ok(Analysis {
            ticker: company.ticker,
            name: company.name,
            sector: company.sector,
            fundamentals: company.fundamentals,
            benchmark: *bench.benchmark.values(),
            benchmark_source: bench.source,
            companies_used: bench.benchmark.companies_used().to_vec(),
            report,
        })
    }

    pub async fn analyst_recommendations(&self, ticker: &str) -> anyhow::Result<ConsensusReport> {
        let ticker = ticker.trim().to_ascii_uppercase();
        let consensus = self
            .provider
            .fetch_analyst_consensus(&ticker)
            .await
            .with_context(|| format!("failed to fetch analyst consensus for {ticker}"))?;

        let summary = consensus
            .map(|c| aggregate_consensus(&c))
            .and_then(ConsensusOutcome::into_summary)
            .map(|mut s| {
                s.percentages = s.percentages.for_display();
                s
            });

        Ok(ConsensusReport {
            ticker,
            message: summary.is_none().then_some(NO_ANALYST_DATA),
            analyst_recommendations: summary,
            note: ANALYST_DISCLAIMER,
        })
    }

    /// Valuation and analyst consensus fetched concurrently. A valuation failure fails the
    /// request; an analyst failure only drops the analyst block.
    pub async fn complete_analysis(&self, ticker: &str) -> anyhow::Result<CompleteAnalysis> {
        let (analysis, analysts) =
            tokio::join!(self.analyze(ticker), self.analyst_recommendations(ticker));
        let analysis = analysis?;

        let analyst_recommendations = match analysts {
            Ok(report) => report.analyst_recommendations,
            Err(err) => {
                tracing::warn!(%ticker, error = %err, "analyst recommendations unavailable");
                None
            }
        };

        Ok(CompleteAnalysis {
            analysis,
            analyst_recommendations,
            disclaimer: Disclaimer::default(),
        })
    }

    /// Resolves a free-text company name to a ticker. The local directory is consulted first;
    /// provider hits are added to it.
    pub async fn resolve_company(&self, name: &str) -> anyhow::Result<SearchOutcome> {
        let query = name.trim();

        if let Some(hit) = self.directory.read().await.search(query).cloned() {
            return Ok(found(query, hit, SearchSource::Cache));
        }

        let hit = self
            .provider
            .search_companies(query, 1)
            .await
            .with_context(|| format!("company search failed for {query:?}"))?
            .into_iter()
            .next();

        let Some(hit) = hit else {
            return Ok(SearchOutcome {
                company_name: query.to_string(),
                found: false,
                ticker: None,
                source: None,
                company_info: None,
                suggestions: SEARCH_HINTS.to_vec(),
            });
        };

        {
            let mut directory = self.directory.write().await;
            directory.insert(hit.clone());
            if let Some(path) = &self.options.directory_path {
                if let Err(err) = directory.save(path) {
                    tracing::warn!(path = %path.display(), error = %err, "failed to persist company directory");
                }
            }
        }

        Ok(found(query, hit, SearchSource::Api))
    }

    pub async fn suggestions(&self, partial: &str) -> SuggestionList {
        let suggestions: Vec<ListedCompany> = self
            .directory
            .read()
            .await
            .suggest(partial, DEFAULT_SUGGESTION_LIMIT)
            .into_iter()
            .cloned()
            .collect();

        SuggestionList {
            partial_name: partial.to_string(),
            count: suggestions.len(),
            suggestions,
        }
    }

    pub async fn health(&self) -> HealthReport {
        let provider_reachable = match self.provider.ping().await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(provider = self.provider.provider_name(), error = %err, "provider ping failed");
                false
            }
        };

        let database = match &self.pool {
            None => DatabaseHealth::Disabled,
            Some(pool) => match sqlx::query("SELECT 1").persistent(false).execute(pool).await {
                Ok(_) => DatabaseHealth::Connected,
                Err(err) => {
                    tracing::warn!(error = %err, "database ping failed");
                    DatabaseHealth::Unreachable
                }
            },
        };

        let healthy = provider_reachable && database != DatabaseHealth::Unreachable;

        HealthReport {
            status: if healthy { "healthy" } else { "degraded" },
            provider: self.provider.provider_name(),
            provider_reachable,
            database,
            cached_sectors: self.cache.lock().await.sectors(),
            directory: self.directory.read().await.stats(),
        }
    }
}

fn reference(benchmark: Benchmark) -> BenchmarkReport {
    BenchmarkReport {
        benchmark,
        source: BenchmarkSource::Reference,
        computed_at: None,
    }
}

fn found(query: &str, company: ListedCompany, source: SearchSource) -> SearchOutcome {
    SearchOutcome {
        company_name: query.to_string(),
        found: true,
        ticker: Some(company.symbol.clone()),
        source: Some(source),
        company_info: Some(company),
        suggestions: Vec::new(),
    }
}
