use crate::domain::company::Benchmark;
use crate::domain::ratio::RatioValues;
use crate::numeric::round_to;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const DEFAULT_PEER_LIMIT: usize = 10;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 3600);

/// A sector constituent as listed by the screener, before its ratios are fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerListing {
    pub symbol: String,
    pub name: String,
    pub market_cap: f64,
}

/// A peer with its ratios resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerRatios {
    pub symbol: String,
    pub name: String,
    pub market_cap: f64,
    pub values: RatioValues,
}

/// Keeps the `limit` largest listings by market cap, dropping rows without a positive cap.
pub fn select_peers(mut listings: Vec<PeerListing>, limit: usize) -> Vec<PeerListing> {
    listings.retain(|p| !p.symbol.trim().is_empty() && p.market_cap.is_finite() && p.market_cap > 0.0);
    listings.sort_by(|a, b| {
        b.market_cap
            .partial_cmp(&a.market_cap)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    listings.truncate(limit);
    listings
}

/// Peer means. Price multiples only average positive values (negative earnings or book value
/// make them meaningless); ROE averages every reported value.
pub fn sector_averages(peers: &[PeerRatios]) -> RatioValues {
    let pe = mean(peers.iter().filter_map(|p| p.values.pe).filter(|v| *v > 0.0));
    let pb = mean(peers.iter().filter_map(|p| p.values.pb).filter(|v| *v > 0.0));
    let roe = mean(peers.iter().filter_map(|p| p.values.roe));
    RatioValues::new(pe, pb, roe)
}

pub fn build_benchmark(sector: &str, peers: &[PeerRatios]) -> anyhow::Result<Benchmark> {
    anyhow::ensure!(!peers.is_empty(), "no peer companies found for sector {sector}");
    let companies_used = peers.iter().map(|p| p.symbol.clone()).collect();
    Benchmark::try_new(sector, companies_used, sector_averages(peers))
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        return None;
    }
    Some(round_to(sum / n as f64, 2))
}

/// Static peer averages used when a sector cannot be computed live.
pub fn reference_benchmark(sector: &str) -> Option<Benchmark> {
    let (canonical, tickers, values): (&str, &[&str], RatioValues) =
        match sector.trim().to_ascii_lowercase().as_str() {
            "technology" => (
                "Technology",
                &["AAPL", "MSFT", "GOOGL", "AMZN", "META", "NVDA", "ORCL", "CRM", "TSM", "INTC"],
                RatioValues::new(Some(25.2), Some(10.1), Some(16.5)),
            ),
            "consumer discretionary" | "consumer cyclical" => (
                "Consumer Discretionary",
                &["AMZN", "TSLA", "HD", "MCD", "NKE", "SBUX", "LOW", "BKNG", "TJX", "CMG"],
                RatioValues::new(Some(22.8), Some(8.5), Some(18.2)),
            ),
            "healthcare" | "health care" => (
                "Healthcare",
                &["JNJ", "UNH", "PFE", "ABBV", "MRK", "TMO", "ABT", "DHR", "BMY", "AMGN"],
                RatioValues::new(Some(18.5), Some(6.2), Some(12.8)),
            ),
            _ => return None,
        };

    let companies_used = tickers.iter().map(|t| t.to_string()).collect();
    Benchmark::try_new(canonical, companies_used, values).ok()
}

/// Per-sector benchmark cache with a fixed time-to-live.
#[derive(Debug)]
pub struct BenchmarkCache {
    ttl: Duration,
    entries: HashMap<String, (Instant, Benchmark)>,
}

impl BenchmarkCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, sector: &str) -> Option<&Benchmark> {
        self.get_at(sector, Instant::now())
    }

    fn get_at(&self, sector: &str, now: Instant) -> Option<&Benchmark> {
        let (stored_at, benchmark) = self.entries.get(&cache_key(sector))?;
        if now.saturating_duration_since(*stored_at) < self.ttl {
            Some(benchmark)
        } else {
            None
        }
    }

    pub fn insert(&mut self, benchmark: Benchmark) {
        self.insert_at(benchmark, Instant::now());
    }

    fn insert_at(&mut self, benchmark: Benchmark, now: Instant) {
        self.entries
            .insert(cache_key(benchmark.sector()), (now, benchmark));
    }

    pub fn sectors(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .entries
            .values()
            .map(|(_, b)| b.sector().to_string())
            .collect();
        out.sort();
        out
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for BenchmarkCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

fn cache_key(sector: &str) -> String {
    sector.trim().to_ascii_lowercase()
}
