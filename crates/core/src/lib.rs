pub mod analysis;
pub mod benchmark;
pub mod consensus;
pub mod directory;
pub mod domain;
pub mod ingest;
mod numeric;
pub mod storage;
pub mod valuation;

pub mod config {
    use anyhow::Context;

    pub const DEFAULT_FMP_BASE_URL: &str = "https://financialmodelingprep.com/stable";
    pub const DEFAULT_CORS_ORIGINS: [&str; 3] = [
        "http://localhost:3000",
        "http://localhost:5173",
        "http://localhost:8080",
    ];
    pub const DEFAULT_COMPANY_DIRECTORY_PATH: &str = "company_directory.json";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub fmp_api_key: Option<String>,
        pub fmp_base_url: String,
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub cors_origins: Vec<String>,
        pub company_directory_path: String,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self::from_lookup(|key| std::env::var(key).ok()))
        }

        pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
            let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

            Self {
                fmp_api_key: non_empty("FMP_API_KEY"),
                fmp_base_url: non_empty("FMP_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_FMP_BASE_URL.to_string()),
                database_url: non_empty("DATABASE_URL"),
                sentry_dsn: non_empty("SENTRY_DSN"),
                cors_origins: non_empty("CORS_ORIGINS")
                    .map(|raw| parse_origins(&raw))
                    .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.map(str::to_string).to_vec()),
                company_directory_path: non_empty("COMPANY_DIRECTORY_PATH")
                    .unwrap_or_else(|| DEFAULT_COMPANY_DIRECTORY_PATH.to_string()),
            }
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_fmp_api_key(&self) -> anyhow::Result<&str> {
            self.fmp_api_key
                .as_deref()
                .context("FMP_API_KEY is required")
        }
    }

    fn parse_origins(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::collections::HashMap;

        fn settings(pairs: &[(&str, &str)]) -> Settings {
            let env: HashMap<String, String> = pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            Settings::from_lookup(|k| env.get(k).cloned())
        }

        #[test]
        fn defaults_apply_when_unset() {
            let s = settings(&[]);
            assert_eq!(s.fmp_base_url, DEFAULT_FMP_BASE_URL);
            assert_eq!(s.cors_origins.len(), 3);
            assert!(s.require_fmp_api_key().is_err());
            assert!(s.require_database_url().is_err());
        }

        #[test]
        fn cors_origins_are_split_and_trimmed() {
            let s = settings(&[
                ("CORS_ORIGINS", "https://a.example/, https://b.example ,,"),
                ("FMP_API_KEY", "k"),
                ("DATABASE_URL", "  "),
            ]);
            assert_eq!(s.cors_origins, vec!["https://a.example", "https://b.example"]);
            assert_eq!(s.require_fmp_api_key().unwrap(), "k");
            assert!(s.database_url.is_none());
        }
    }
}
