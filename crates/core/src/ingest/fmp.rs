use crate::benchmark::{select_peers, PeerListing};
use crate::config::Settings;
use crate::directory::ListedCompany;
use crate::domain::analyst::{AnalystConsensus, RecommendationBreakdown};
use crate::domain::company::CompanyProfile;
use crate::domain::ratio::RatioValues;
use crate::ingest::error::{self, ProviderHttpError, ProviderPayloadError};
use crate::ingest::provider::MarketDataProvider;
use crate::ingest::types::{
    BalanceSheetRow, GradesConsensusRow, IncomeStatementRow, ProfileRow, RatiosRow, ScreenerRow,
    SearchRow,
};
use crate::numeric::round_to;
use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

const PROVIDER_NAME: &str = "financial_modeling_prep";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RETRIES: u32 = 3;
const SCREENER_EXCHANGES: &str = "NASDAQ,NYSE,AMEX";

/// Financial Modeling Prep REST client.
#[derive(Debug, Clone)]
pub struct FmpClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retries: u32,
}

impl FmpClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.require_fmp_api_key()?.to_string();

        let timeout_secs = std::env::var("DATA_PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("DATA_PROVIDER_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES)
            .max(1);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build FMP http client")?;

        Ok(Self {
            http,
            base_url: settings.fmp_base_url.clone(),
            api_key,
            retries,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    async fn fetch_once<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let res = self
            .http
            .get(self.url(endpoint))
            .query(query)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await
            .with_context(|| format!("FMP request to {endpoint} failed"))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .with_context(|| format!("failed to read FMP {endpoint} response"))?;

        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(ProviderHttpError {
                provider: PROVIDER_NAME,
                endpoint: endpoint.to_string(),
                status,
                body: text,
            }
            .into());
        }

        parse_rows(endpoint, &text)
    }

    async fn get_rows<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(endpoint, query).await {
                Ok(rows) => return Ok(rows),
                Err(err) => {
                    if !error::is_retryable(&err) || attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    tracing::warn!(endpoint, attempt, ?backoff, error = %err, "FMP fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn first_row<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        Ok(self.get_rows(endpoint, query).await?.into_iter().next())
    }

    async fn annual<T: DeserializeOwned>(&self, endpoint: &str, ticker: &str) -> Result<Option<T>> {
        self.first_row(
            endpoint,
            &[("symbol", ticker.to_string()), ("period", "annual".to_string())],
        )
        .await
    }

    async fn profile_row(&self, ticker: &str) -> Result<Option<ProfileRow>> {
        self.first_row("profile", &[("symbol", ticker.to_string())])
            .await
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for FmpClient {
    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn fetch_profile(&self, ticker: &str) -> Result<Option<CompanyProfile>> {
        let ticker = normalize_ticker(ticker);
        Ok(self.profile_row(&ticker).await?.map(profile_from_row))
    }

    async fn fetch_ratios(&self, ticker: &str) -> Result<RatioValues> {
        let ticker = normalize_ticker(ticker);
        let ratios: Option<RatiosRow> = self.annual("ratios", &ticker).await?;
        let values = ratios_from_row(ratios.as_ref());
        if values.pe.is_some() && values.pb.is_some() && values.roe.is_some() {
            return Ok(values);
        }

        // Fall back to statement data for whatever the ratios endpoint left empty.
        let income: Option<IncomeStatementRow> = self.annual("income-statement", &ticker).await?;
        let balance: Option<BalanceSheetRow> =
            self.annual("balance-sheet-statement", &ticker).await?;
        let price = self.profile_row(&ticker).await?.and_then(|p| p.price);

        tracing::debug!(
            %ticker,
            has_income = income.is_some(),
            has_balance = balance.is_some(),
            "FMP ratios incomplete; derived from statements"
        );

        Ok(fill_missing_ratios(
            values,
            price,
            income.as_ref(),
            balance.as_ref(),
        ))
    }

    async fn fetch_sector_peers(&self, sector: &str, limit: usize) -> Result<Vec<PeerListing>> {
        // Over-fetch because rows without a market cap are discarded.
        let rows: Vec<ScreenerRow> = self
            .get_rows(
                "company-screener",
                &[
                    ("sector", sector.to_string()),
                    ("limit", (limit.saturating_mul(2)).to_string()),
                    ("exchange", SCREENER_EXCHANGES.to_string()),
                ],
            )
            .await?;

        let listings = rows
            .into_iter()
            .filter_map(|r| {
                Some(PeerListing {
                    symbol: normalize_ticker(r.symbol.as_deref()?),
                    name: r.company_name.unwrap_or_default(),
                    market_cap: r.market_cap?,
                })
            })
            .collect();

        Ok(select_peers(listings, limit))
    }

    async fn fetch_analyst_consensus(&self, ticker: &str) -> Result<Option<AnalystConsensus>> {
        let ticker = normalize_ticker(ticker);
        let row: Option<GradesConsensusRow> = self
            .first_row("grades-consensus", &[("symbol", ticker)])
            .await?;
        row.map(consensus_from_row).transpose()
    }

    async fn search_companies(&self, query: &str, limit: usize) -> Result<Vec<ListedCompany>> {
        let rows: Vec<SearchRow> = self
            .get_rows("search-name", &[("query", query.trim().to_string())])
            .await?;

        Ok(rows
            .into_iter()
            .filter(|r| !r.symbol.trim().is_empty())
            .take(limit)
            .map(|r| {
                let name = r.name.as_deref().unwrap_or(&r.symbol).to_string();
                ListedCompany::new(&r.symbol, &name, r.exchange.as_deref(), None)
            })
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        let _: Vec<SearchRow> = self
            .fetch_once("search-name", &[("query", "AAPL".to_string())])
            .await?;
        Ok(())
    }
}

fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_ascii_uppercase()
}

/// FMP answers with a JSON array, or with an object carrying "Error Message" on plan/key errors.
fn parse_rows<T: DeserializeOwned>(endpoint: &str, text: &str) -> Result<Vec<T>> {
    let payload_error = |detail: String| ProviderPayloadError {
        provider: PROVIDER_NAME,
        endpoint: endpoint.to_string(),
        detail,
    };

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let raw = serde_json::from_str::<Value>(text)
        .map_err(|e| payload_error(format!("not valid JSON ({e}): {text}")))?;

    if let Some(msg) = raw.get("Error Message").and_then(Value::as_str) {
        return Err(payload_error(format!("error: {msg}")).into());
    }

    match raw {
        Value::Array(_) => serde_json::from_value(raw)
            .map_err(|e| payload_error(format!("failed to decode rows: {e}")).into()),
        Value::Object(_) => {
            let row = serde_json::from_value(raw)
                .map_err(|e| payload_error(format!("failed to decode object: {e}")))?;
            Ok(vec![row])
        }
        _ => Err(payload_error(format!("unexpected payload: {text}")).into()),
    }
}

fn clean(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite()).map(|x| round_to(x, 2))
}

fn positive(v: Option<f64>) -> Option<f64> {
    clean(v.filter(|x| *x > 0.0))
}

pub(crate) fn ratios_from_row(row: Option<&RatiosRow>) -> RatioValues {
    let Some(row) = row else {
        return RatioValues::default();
    };
    RatioValues::new(
        positive(row.price_to_earnings_ratio),
        positive(row.price_to_book_ratio),
        clean(row.return_on_equity.map(|roe| roe * 100.0)),
    )
}

/// Derives ratios the ratios endpoint did not provide from price and statement lines.
pub(crate) fn fill_missing_ratios(
    mut values: RatioValues,
    price: Option<f64>,
    income: Option<&IncomeStatementRow>,
    balance: Option<&BalanceSheetRow>,
) -> RatioValues {
    let price = price.filter(|p| p.is_finite() && *p > 0.0);
    let eps = income.and_then(|i| i.eps).filter(|e| *e > 0.0);
    let shares = income
        .and_then(|i| i.weighted_average_shs_out)
        .filter(|s| *s > 0.0);
    let net_income = income.and_then(|i| i.net_income);
    let equity = balance
        .and_then(|b| b.total_stockholders_equity)
        .filter(|e| *e > 0.0);

    if values.pe.is_none() {
        values.pe = match (price, eps) {
            (Some(p), Some(e)) => positive(Some(p / e)),
            _ => None,
        };
    }

    if values.pb.is_none() {
        values.pb = match (price, equity, shares) {
            (Some(p), Some(eq), Some(sh)) => positive(Some(p / (eq / sh))),
            _ => None,
        };
    }

    if values.roe.is_none() {
        values.roe = match (net_income, equity) {
            (Some(ni), Some(eq)) => clean(Some(ni / eq * 100.0)),
            _ => None,
        };
    }

    values
}

fn profile_from_row(row: ProfileRow) -> CompanyProfile {
    let ticker = normalize_ticker(&row.symbol);
    CompanyProfile {
        name: row.company_name.unwrap_or_else(|| ticker.clone()),
        ticker,
        sector: row.sector.filter(|s| !s.trim().is_empty()),
        exchange: row
            .exchange_short_name
            .or(row.exchange)
            .filter(|e| !e.trim().is_empty()),
        market_cap: row.market_cap.filter(|m| m.is_finite() && *m > 0.0),
        price: row.price.filter(|p| p.is_finite()),
    }
}

fn consensus_from_row(row: GradesConsensusRow) -> Result<AnalystConsensus> {
    let breakdown = RecommendationBreakdown {
        strong_buy: row.strong_buy,
        buy: row.buy,
        hold: row.hold,
        sell: row.sell,
        strong_sell: row.strong_sell,
    };
    AnalystConsensus::from_breakdown(row.symbol, row.consensus, breakdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_ratio_rows_with_either_pe_key() {
        let rows: Vec<RatiosRow> = parse_rows(
            "ratios",
            &json!([{"priceToEarningsRatio": 28.456, "priceToBookRatio": 12.3, "returnOnEquity": 0.187}])
                .to_string(),
        )
        .unwrap();
        let v = ratios_from_row(rows.first());
        assert_eq!(v.pe, Some(28.46));
        assert_eq!(v.pb, Some(12.3));
        assert_eq!(v.roe, Some(18.7));

        let legacy: Vec<RatiosRow> =
            parse_rows("ratios", &json!([{"priceEarningsRatio": 15.0}]).to_string()).unwrap();
        assert_eq!(ratios_from_row(legacy.first()).pe, Some(15.0));
    }

    #[test]
    fn negative_multiples_are_unavailable_but_negative_roe_is_kept() {
        let row = RatiosRow {
            price_to_earnings_ratio: Some(-12.0),
            price_to_book_ratio: Some(0.0),
            return_on_equity: Some(-0.05),
        };
        let v = ratios_from_row(Some(&row));
        assert_eq!(v.pe, None);
        assert_eq!(v.pb, None);
        assert_eq!(v.roe, Some(-5.0));
    }

    #[test]
    fn fills_missing_ratios_from_statements() {
        let income = IncomeStatementRow {
            net_income: Some(20.0),
            eps: Some(4.0),
            weighted_average_shs_out: Some(10.0),
        };
        let balance = BalanceSheetRow {
            total_stockholders_equity: Some(100.0),
            total_assets: Some(500.0),
        };
        let v = fill_missing_ratios(RatioValues::default(), Some(50.0), Some(&income), Some(&balance));
        assert_eq!(v.pe, Some(12.5));
        assert_eq!(v.pb, Some(5.0));
        assert_eq!(v.roe, Some(20.0));

        // Already-present values are never overwritten.
        let preset = RatioValues::new(Some(30.0), None, None);
        let v = fill_missing_ratios(preset, Some(50.0), Some(&income), Some(&balance));
        assert_eq!(v.pe, Some(30.0));
    }

    #[test]
    fn statement_fallback_rejects_non_positive_inputs() {
        let income = IncomeStatementRow {
            net_income: Some(-5.0),
            eps: Some(-1.0),
            weighted_average_shs_out: Some(10.0),
        };
        let balance = BalanceSheetRow {
            total_stockholders_equity: Some(-40.0),
            total_assets: None,
        };
        let v = fill_missing_ratios(RatioValues::default(), Some(50.0), Some(&income), Some(&balance));
        assert_eq!(v, RatioValues::default());
    }

    #[test]
    fn error_object_is_reported() {
        let res = parse_rows::<RatiosRow>(
            "ratios",
            &json!({"Error Message": "Invalid API KEY."}).to_string(),
        );
        let err = res.unwrap_err();
        assert!(err.to_string().contains("Invalid API KEY"), "{err}");
        assert!(err.downcast_ref::<ProviderPayloadError>().is_some());
        assert!(parse_rows::<RatiosRow>("ratios", "").unwrap().is_empty());
    }

    #[test]
    fn maps_grades_consensus_row() {
        let rows: Vec<GradesConsensusRow> = parse_rows(
            "grades-consensus",
            &json!([{
                "symbol": "AAPL",
                "strongBuy": 5, "buy": 10, "hold": 3, "sell": 1, "strongSell": 1,
                "consensus": "Buy"
            }])
            .to_string(),
        )
        .unwrap();
        let c = consensus_from_row(rows.into_iter().next().unwrap()).unwrap();
        assert_eq!(c.total_analysts(), 20);
        assert_eq!(c.label(), Some("Buy"));
    }

    #[test]
    fn maps_profile_row() {
        let rows: Vec<ProfileRow> = parse_rows(
            "profile",
            &json!([{
                "symbol": "aapl",
                "companyName": "Apple Inc.",
                "sector": "Technology",
                "exchangeShortName": "NASDAQ",
                "marketCap": 3.4e12,
                "price": 227.5
            }])
            .to_string(),
        )
        .unwrap();
        let p = profile_from_row(rows.into_iter().next().unwrap());
        assert_eq!(p.ticker, "AAPL");
        assert_eq!(p.exchange.as_deref(), Some("NASDAQ"));
        assert_eq!(p.sector.as_deref(), Some("Technology"));
    }

    #[test]
    fn profile_exchange_prefers_short_code() {
        let rows: Vec<ProfileRow> = parse_rows(
            "profile",
            &json!([
                {"symbol": "MSFT", "exchange": "NASDAQ Global Select", "exchangeShortName": "NASDAQ"},
                {"symbol": "KO", "exchange": "NYSE"}
            ])
            .to_string(),
        )
        .unwrap();
        let exchanges: Vec<_> = rows
            .into_iter()
            .map(|r| profile_from_row(r).exchange)
            .collect();
        assert_eq!(exchanges, [Some("NASDAQ".to_string()), Some("NYSE".to_string())]);
    }

    #[test]
    fn client_errors_are_not_retryable() {
        let e = ProviderHttpError {
            provider: PROVIDER_NAME,
            endpoint: "ratios".to_string(),
            status: StatusCode::FORBIDDEN,
            body: String::new(),
        };
        assert!(!e.is_retryable());
        let e = ProviderHttpError {
            status: StatusCode::BAD_GATEWAY,
            ..e
        };
        assert!(e.is_retryable());
    }

    #[test]
    fn bad_payloads_are_not_retried() {
        let key_error =
            parse_rows::<RatiosRow>("ratios", &json!({"Error Message": "Invalid API KEY."}).to_string())
                .unwrap_err();
        assert!(!error::is_retryable(&key_error));

        let garbage = parse_rows::<RatiosRow>("ratios", "<html>maintenance</html>").unwrap_err();
        assert!(!error::is_retryable(&garbage));

        let wrong_shape = parse_rows::<ProfileRow>("profile", &json!([{"symbol": 42}]).to_string())
            .unwrap_err();
        assert!(!error::is_retryable(&wrong_shape));

        let forbidden: anyhow::Error = ProviderHttpError {
            provider: PROVIDER_NAME,
            endpoint: "ratios".to_string(),
            status: StatusCode::FORBIDDEN,
            body: String::new(),
        }
        .into();
        assert!(!error::is_retryable(&forbidden));

        let unavailable: anyhow::Error = ProviderHttpError {
            provider: PROVIDER_NAME,
            endpoint: "ratios".to_string(),
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: String::new(),
        }
        .into();
        assert!(error::is_retryable(&unavailable));

        let transport = anyhow::anyhow!("connection reset").context("FMP request to ratios failed");
        assert!(error::is_retryable(&transport));
    }
}
