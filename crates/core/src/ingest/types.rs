//! Row shapes returned by the Financial Modeling Prep "stable" endpoints. Every field is optional
//! because the provider omits or nulls fields freely.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatiosRow {
    #[serde(alias = "priceEarningsRatio")]
    pub price_to_earnings_ratio: Option<f64>,
    pub price_to_book_ratio: Option<f64>,
    pub return_on_equity: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeStatementRow {
    pub net_income: Option<f64>,
    pub eps: Option<f64>,
    pub weighted_average_shs_out: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSheetRow {
    pub total_stockholders_equity: Option<f64>,
    pub total_assets: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRow {
    pub symbol: String,
    pub company_name: Option<String>,
    pub sector: Option<String>,
    pub exchange: Option<String>,
    /// Legacy profiles carry the short code here and a long name in `exchange`.
    pub exchange_short_name: Option<String>,
    #[serde(alias = "mktCap")]
    pub market_cap: Option<f64>,
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenerRow {
    pub symbol: Option<String>,
    pub company_name: Option<String>,
    pub market_cap: Option<f64>,
    pub sector: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRow {
    pub symbol: String,
    pub name: Option<String>,
    pub exchange: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GradesConsensusRow {
    pub symbol: String,
    pub strong_buy: u32,
    pub buy: u32,
    pub hold: u32,
    pub sell: u32,
    pub strong_sell: u32,
    pub consensus: Option<String>,
}
