use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_SUGGESTION_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListedCompany {
    pub symbol: String,
    pub name: String,
    pub exchange: Option<String>,
    pub sector: Option<String>,
    pub market_cap: Option<f64>,
    pub last_updated: DateTime<Utc>,
}

impl ListedCompany {
    pub fn new(symbol: &str, name: &str, exchange: Option<&str>, sector: Option<&str>) -> Self {
        Self {
            symbol: symbol.trim().to_ascii_uppercase(),
            name: name.trim().to_string(),
            exchange: exchange.map(str::to_string),
            sector: sector.map(str::to_string),
            market_cap: None,
            last_updated: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DirectoryStats {
    pub total_companies: usize,
    pub exchanges: BTreeMap<String, usize>,
    pub sectors: BTreeMap<String, usize>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Local, ticker-keyed directory of listed companies used to resolve free-text names before
/// asking the market data provider.
#[derive(Debug, Clone, Default)]
pub struct CompanyDirectory {
    companies: BTreeMap<String, ListedCompany>,
}

impl CompanyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory pre-populated with large US listings.
    pub fn seeded() -> Self {
        let mut out = Self::new();
        for (symbol, name, exchange, sector) in SEED_COMPANIES {
            out.insert(ListedCompany::new(symbol, name, Some(exchange), Some(sector)));
        }
        out
    }

    /// Reads a directory previously written by [`CompanyDirectory::save`]. A missing file yields
    /// the seeded directory.
    pub fn load_or_seed(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "company directory file not found; using seed list");
            return Ok(Self::seeded());
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read company directory {}", path.display()))?;
        let companies: Vec<ListedCompany> = serde_json::from_str(&text)
            .with_context(|| format!("company directory {} is not valid JSON", path.display()))?;

        let mut out = Self::new();
        for c in companies {
            out.insert(c);
        }
        tracing::info!(path = %path.display(), companies = out.len(), "company directory loaded");
        Ok(out)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let companies: Vec<&ListedCompany> = self.companies.values().collect();
        let text = serde_json::to_string_pretty(&companies).context("serialize company directory failed")?;
        std::fs::write(path, text)
            .with_context(|| format!("failed to write company directory {}", path.display()))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.companies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.companies.is_empty()
    }

    pub fn insert(&mut self, company: ListedCompany) {
        self.companies.insert(company.symbol.clone(), company);
    }

    pub fn get(&self, symbol: &str) -> Option<&ListedCompany> {
        self.companies.get(&symbol.trim().to_ascii_uppercase())
    }

    /// Exact name match first, then containment in either direction, then ticker.
    pub fn search(&self, query: &str) -> Option<&ListedCompany> {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return None;
        }

        if let Some(c) = self.companies.values().find(|c| c.name.to_lowercase() == q) {
            return Some(c);
        }

        if let Some(c) = self.companies.values().find(|c| {
            let name = c.name.to_lowercase();
            name.contains(&q) || q.contains(&name)
        }) {
            return Some(c);
        }

        self.get(&q)
    }

    /// Companies whose name starts with `prefix`, ordered by name.
    pub fn suggest(&self, prefix: &str, limit: usize) -> Vec<&ListedCompany> {
        let p = prefix.trim().to_lowercase();
        if p.is_empty() {
            return Vec::new();
        }

        let mut out: Vec<&ListedCompany> = self
            .companies
            .values()
            .filter(|c| c.name.to_lowercase().starts_with(&p))
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out.truncate(limit);
        out
    }

    pub fn stats(&self) -> DirectoryStats {
        let mut stats = DirectoryStats {
            total_companies: self.companies.len(),
            ..Default::default()
        };
        for c in self.companies.values() {
            if let Some(exchange) = &c.exchange {
                *stats.exchanges.entry(exchange.clone()).or_default() += 1;
            }
            if let Some(sector) = &c.sector {
                *stats.sectors.entry(sector.clone()).or_default() += 1;
            }
            stats.last_updated = stats.last_updated.max(Some(c.last_updated));
        }
        stats
    }

    pub fn sectors(&self) -> Vec<String> {
        self.stats().sectors.into_keys().collect()
    }
}

const SEED_COMPANIES: [(&str, &str, &str, &str); 49] = [
    ("AAPL", "Apple Inc.", "NASDAQ", "Technology"),
    ("MSFT", "Microsoft Corporation", "NASDAQ", "Technology"),
    ("GOOGL", "Alphabet Inc. Class A", "NASDAQ", "Technology"),
    ("AMZN", "Amazon.com Inc.", "NASDAQ", "Consumer Discretionary"),
    ("NVDA", "NVIDIA Corporation", "NASDAQ", "Technology"),
    ("META", "Meta Platforms Inc.", "NASDAQ", "Technology"),
    ("TSLA", "Tesla Inc.", "NASDAQ", "Consumer Discretionary"),
    ("BRK.B", "Berkshire Hathaway Inc. Class B", "NYSE", "Financials"),
    ("UNH", "UnitedHealth Group Incorporated", "NYSE", "Healthcare"),
    ("JNJ", "Johnson & Johnson", "NYSE", "Healthcare"),
    ("JPM", "JPMorgan Chase & Co.", "NYSE", "Financials"),
    ("V", "Visa Inc.", "NYSE", "Financials"),
    ("PG", "Procter & Gamble Co.", "NYSE", "Consumer Staples"),
    ("HD", "Home Depot Inc.", "NYSE", "Consumer Discretionary"),
    ("MA", "Mastercard Incorporated", "NYSE", "Financials"),
    ("DIS", "Walt Disney Co.", "NYSE", "Communication Services"),
    ("PYPL", "PayPal Holdings Inc.", "NASDAQ", "Financials"),
    ("ADBE", "Adobe Inc.", "NASDAQ", "Technology"),
    ("CMCSA", "Comcast Corporation", "NASDAQ", "Communication Services"),
    ("NFLX", "Netflix Inc.", "NASDAQ", "Communication Services"),
    ("CRM", "Salesforce Inc.", "NYSE", "Technology"),
    ("INTC", "Intel Corporation", "NASDAQ", "Technology"),
    ("PFE", "Pfizer Inc.", "NYSE", "Healthcare"),
    ("ABT", "Abbott Laboratories", "NYSE", "Healthcare"),
    ("TMO", "Thermo Fisher Scientific Inc.", "NYSE", "Healthcare"),
    ("ACN", "Accenture plc", "NYSE", "Technology"),
    ("COST", "Costco Wholesale Corporation", "NASDAQ", "Consumer Staples"),
    ("DHR", "Danaher Corporation", "NYSE", "Healthcare"),
    ("VZ", "Verizon Communications Inc.", "NYSE", "Communication Services"),
    ("WMT", "Walmart Inc.", "NYSE", "Consumer Staples"),
    ("T", "AT&T Inc.", "NYSE", "Communication Services"),
    ("NKE", "Nike Inc.", "NYSE", "Consumer Discretionary"),
    ("ABBV", "AbbVie Inc.", "NYSE", "Healthcare"),
    ("MRK", "Merck & Co. Inc.", "NYSE", "Healthcare"),
    ("PEP", "PepsiCo Inc.", "NASDAQ", "Consumer Staples"),
    ("KO", "Coca-Cola Co.", "NYSE", "Consumer Staples"),
    ("AVGO", "Broadcom Inc.", "NASDAQ", "Technology"),
    ("TXN", "Texas Instruments Incorporated", "NASDAQ", "Technology"),
    ("QCOM", "QUALCOMM Incorporated", "NASDAQ", "Technology"),
    ("CSCO", "Cisco Systems Inc.", "NASDAQ", "Technology"),
    ("ORCL", "Oracle Corporation", "NYSE", "Technology"),
    ("IBM", "International Business Machines Corporation", "NYSE", "Technology"),
    ("AMD", "Advanced Micro Devices Inc.", "NASDAQ", "Technology"),
    ("AMAT", "Applied Materials Inc.", "NASDAQ", "Technology"),
    ("MU", "Micron Technology Inc.", "NASDAQ", "Technology"),
    ("ADP", "Automatic Data Processing Inc.", "NASDAQ", "Technology"),
    ("INTU", "Intuit Inc.", "NASDAQ", "Technology"),
    ("ISRG", "Intuitive Surgical Inc.", "NASDAQ", "Healthcare"),
    ("GILD", "Gilead Sciences Inc.", "NASDAQ", "Healthcare"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_prefers_exact_then_partial_then_ticker() {
        let dir = CompanyDirectory::seeded();
        assert_eq!(dir.search("apple inc.").unwrap().symbol, "AAPL");
        assert_eq!(dir.search("Microsoft").unwrap().symbol, "MSFT");
        assert_eq!(dir.search("nvda").unwrap().symbol, "NVDA");
        assert!(dir.search("Azienda Inesistente").is_none());
        assert!(dir.search("   ").is_none());
    }

    #[test]
    fn suggestions_match_name_prefix() {
        let dir = CompanyDirectory::seeded();
        let names: Vec<_> = dir.suggest("app", 10).iter().map(|c| c.symbol.clone()).collect();
        assert_eq!(names, ["AAPL", "AMAT"]);
        assert_eq!(dir.suggest("a", 3).len(), 3);
        assert!(dir.suggest("", 10).is_empty());
    }

    #[test]
    fn insert_upserts_by_ticker() {
        let mut dir = CompanyDirectory::new();
        dir.insert(ListedCompany::new("shop", "Shopify Inc.", Some("NYSE"), None));
        dir.insert(ListedCompany::new("SHOP", "Shopify Inc.", Some("NYSE"), Some("Technology")));
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.get("shop").unwrap().sector.as_deref(), Some("Technology"));
    }

    #[test]
    fn stats_count_exchanges_and_sectors() {
        let stats = CompanyDirectory::seeded().stats();
        assert_eq!(stats.total_companies, SEED_COMPANIES.len());
        assert_eq!(stats.exchanges.values().sum::<usize>(), SEED_COMPANIES.len());
        assert!(stats.sectors.contains_key("Technology"));
        assert!(stats.last_updated.is_some());
    }

    #[test]
    fn save_and_load_round_trip_through_a_file() {
        let path = std::env::temp_dir().join(format!("finge-directory-{}.json", uuid::Uuid::new_v4()));
        let mut dir = CompanyDirectory::seeded();
        dir.insert(ListedCompany::new("SHOP", "Shopify Inc.", Some("NYSE"), Some("Technology")));
        dir.save(&path).unwrap();

        let loaded = CompanyDirectory::load_or_seed(&path).unwrap();
        assert_eq!(loaded.len(), dir.len());
        assert_eq!(loaded.search("shopify").unwrap().symbol, "SHOP");
        let _ = std::fs::remove_file(&path);
    }
}
