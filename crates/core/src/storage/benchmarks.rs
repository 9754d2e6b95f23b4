use crate::benchmark::PeerRatios;
use crate::domain::company::Benchmark;
use crate::domain::ratio::RatioValues;
use anyhow::Context;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Benchmark row read back from `sector_benchmarks`.
#[derive(Debug, Clone)]
pub struct StoredBenchmark {
    pub id: Uuid,
    pub computed_at: DateTime<Utc>,
    pub provider: String,
    pub benchmark: Benchmark,
}

pub async fn persist_benchmark(
    pool: &sqlx::PgPool,
    benchmark: &Benchmark,
    provider: &str,
    peers: &[PeerRatios],
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let computed_at: DateTime<Utc> = Utc::now();
    let raw_peers = serde_json::to_value(peers).context("serialize peer ratios failed")?;
    let values = benchmark.values();

    sqlx::query(
        "INSERT INTO sector_benchmarks (id, sector, computed_at, provider, pe, pb, roe, companies_used, raw_peers) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .persistent(false)
    .bind(id)
    .bind(benchmark.sector())
    .bind(computed_at)
    .bind(provider)
    .bind(values.pe)
    .bind(values.pb)
    .bind(values.roe)
    .bind(benchmark.companies_used().to_vec())
    .bind(raw_peers)
    .execute(pool)
    .await
    .with_context(|| format!("insert sector_benchmarks failed (sector={})", benchmark.sector()))?;

    Ok(id)
}

type BenchmarkRow = (
    Uuid,
    String,
    DateTime<Utc>,
    String,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Vec<String>,
);

/// Most recent benchmark for `sector` (case-insensitive) computed within `max_age`.
pub async fn fetch_latest_benchmark(
    pool: &sqlx::PgPool,
    sector: &str,
    max_age: chrono::Duration,
) -> anyhow::Result<Option<StoredBenchmark>> {
    let not_before = Utc::now() - max_age;

    let row: Option<BenchmarkRow> = sqlx::query_as(
        "SELECT id, sector, computed_at, provider, pe, pb, roe, companies_used \
         FROM sector_benchmarks \
         WHERE lower(sector) = lower($1) AND computed_at >= $2 \
         ORDER BY computed_at DESC \
         LIMIT 1",
    )
    .persistent(false)
    .bind(sector.trim())
    .bind(not_before)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("select sector_benchmarks failed (sector={sector})"))?;

    let Some((id, sector, computed_at, provider, pe, pb, roe, companies_used)) = row else {
        return Ok(None);
    };

    let benchmark = Benchmark::try_new(sector, companies_used, RatioValues::new(pe, pb, roe))
        .with_context(|| format!("stored benchmark {id} is invalid"))?;

    Ok(Some(StoredBenchmark {
        id,
        computed_at,
        provider,
        benchmark,
    }))
}
