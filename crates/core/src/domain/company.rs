use crate::domain::ratio::RatioValues;
use anyhow::ensure;
use serde::Serialize;

/// A company's P/E, P/B and ROE for the latest reported period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fundamentals {
    ticker: String,
    sector: String,
    #[serde(rename = "fundamentals")]
    values: RatioValues,
}

impl Fundamentals {
    pub fn try_new(
        ticker: impl Into<String>,
        sector: impl Into<String>,
        values: RatioValues,
    ) -> anyhow::Result<Self> {
        let ticker = ticker.into().trim().to_ascii_uppercase();
        ensure!(!ticker.is_empty(), "ticker must be non-empty");
        values.ensure_finite()?;

        // Same rule as the benchmark: ROE may be negative, price multiples may not.
        if let Some(pe) = values.pe {
            ensure!(pe >= 0.0, "{ticker} PE must be non-negative (got {pe})");
        }
        if let Some(pb) = values.pb {
            ensure!(pb >= 0.0, "{ticker} PB must be non-negative (got {pb})");
        }

        Ok(Self {
            ticker,
            sector: sector.into().trim().to_string(),
            values,
        })
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn sector(&self) -> &str {
        &self.sector
    }

    pub fn values(&self) -> &RatioValues {
        &self.values
    }
}

/// Sector peer-average ratios together with the tickers they were computed from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Benchmark {
    sector: String,
    companies_used: Vec<String>,
    #[serde(rename = "benchmark")]
    values: RatioValues,
}

impl Benchmark {
    pub fn try_new(
        sector: impl Into<String>,
        companies_used: Vec<String>,
        values: RatioValues,
    ) -> anyhow::Result<Self> {
        let sector = sector.into().trim().to_string();
        ensure!(!sector.is_empty(), "sector must be non-empty");
        values.ensure_finite()?;

        // ROE may legitimately be negative; price multiples may not.
        if let Some(pe) = values.pe {
            ensure!(pe >= 0.0, "benchmark PE must be non-negative (got {pe})");
        }
        if let Some(pb) = values.pb {
            ensure!(pb >= 0.0, "benchmark PB must be non-negative (got {pb})");
        }

        Ok(Self {
            sector,
            companies_used,
            values,
        })
    }

    pub fn sector(&self) -> &str {
        &self.sector
    }

    pub fn companies_used(&self) -> &[String] {
        &self.companies_used
    }

    pub fn values(&self) -> &RatioValues {
        &self.values
    }
}

/// Descriptive data for a listed company as reported by the market data provider.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct CompanyProfile {
    pub ticker: String,
    pub name: String,
    pub sector: Option<String>,
    pub exchange: Option<String>,
    pub market_cap: Option<f64>,
    pub price: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fundamentals_normalize_ticker() {
        let f = Fundamentals::try_new(" aapl ", "Technology", RatioValues::default()).unwrap();
        assert_eq!(f.ticker(), "AAPL");
        assert_eq!(f.sector(), "Technology");
    }

    #[test]
    fn fundamentals_reject_blank_ticker_and_nan() {
        assert!(Fundamentals::try_new("  ", "Technology", RatioValues::default()).is_err());
        let nan = RatioValues::new(Some(f64::NAN), None, None);
        assert!(Fundamentals::try_new("AAPL", "Technology", nan).is_err());
    }

    #[test]
    fn fundamentals_reject_negative_multiples() {
        let bad_pe = RatioValues::new(Some(-10.0), Some(2.0), Some(15.0));
        let err = Fundamentals::try_new("LOSS", "Technology", bad_pe).unwrap_err();
        assert!(err.to_string().contains("PE must be non-negative"), "{err}");

        let bad_pb = RatioValues::new(Some(12.0), Some(-0.5), None);
        assert!(Fundamentals::try_new("LOSS", "Technology", bad_pb).is_err());

        let negative_roe = RatioValues::new(Some(0.0), Some(1.0), Some(-8.0));
        assert!(Fundamentals::try_new("LOSS", "Technology", negative_roe).is_ok());
    }

    #[test]
    fn benchmark_allows_negative_roe_only() {
        let ok = RatioValues::new(Some(25.2), Some(10.1), Some(-4.0));
        assert!(Benchmark::try_new("Energy", vec![], ok).is_ok());

        let bad_pe = RatioValues::new(Some(-1.0), None, None);
        assert!(Benchmark::try_new("Energy", vec![], bad_pe).is_err());

        let bad_pb = RatioValues::new(None, Some(-0.5), None);
        assert!(Benchmark::try_new("Energy", vec![], bad_pb).is_err());

        let inf = RatioValues::new(None, None, Some(f64::INFINITY));
        assert!(Benchmark::try_new("Energy", vec![], inf).is_err());
    }

    #[test]
    fn benchmark_serializes_like_the_sector_endpoint() {
        let b = Benchmark::try_new(
            "Technology",
            vec!["AAPL".to_string(), "MSFT".to_string()],
            RatioValues::new(Some(25.2), Some(10.1), Some(16.5)),
        )
        .unwrap();
        let v = serde_json::to_value(&b).unwrap();
        assert_eq!(v["sector"], "Technology");
        assert_eq!(v["companies_used"][1], "MSFT");
        assert_eq!(v["benchmark"]["PB"], 10.1);
    }
}
