use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use finge_core::analysis::{AnalysisService, ServiceOptions};
use finge_core::config::Settings;
use finge_core::directory::CompanyDirectory;
use finge_core::ingest::fmp::FmpClient;
use finge_core::ingest::provider::MarketDataProvider;
use finge_core::valuation::ScoringConfig;

#[derive(Debug, Parser)]
#[command(name = "finge_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Recompute sector benchmarks from live peer data and store them.
    Benchmarks {
        /// Sector to refresh. Repeatable; defaults to every sector in the company directory.
        #[arg(long = "sector")]
        sectors: Vec<String>,

        /// Do everything except writing to the database.
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the valuation analysis of one ticker as JSON.
    Analyze {
        ticker: String,

        /// Include analyst recommendations next to the valuation.
        #[arg(long)]
        with_analysts: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let result = match args.command {
        Command::Benchmarks { sectors, dry_run } => {
            refresh_benchmarks(&settings, sectors, dry_run).await
        }
        Command::Analyze {
            ticker,
            with_analysts,
        } => analyze(&settings, &ticker, with_analysts).await,
    };

    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
    }
    result
}

fn build_service(
    settings: &Settings,
    pool: Option<sqlx::PgPool>,
) -> anyhow::Result<(Arc<FmpClient>, AnalysisService)> {
    let provider = Arc::new(FmpClient::from_settings(settings)?);
    let directory = CompanyDirectory::seeded();
    let service = AnalysisService::new(
        provider.clone(),
        pool,
        ScoringConfig::from_env()?,
        ServiceOptions::from_env(None),
        directory,
    );
    Ok((provider, service))
}

async fn refresh_benchmarks(
    settings: &Settings,
    sectors: Vec<String>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let sectors = if sectors.is_empty() {
        CompanyDirectory::seeded().sectors()
    } else {
        sectors
    };

    if dry_run {
        let (_, service) = build_service(settings, None)?;
        for sector in &sectors {
            match service.compute_live_benchmark(sector).await {
                Ok(Some(live)) => tracing::info!(
                    %sector,
                    dry_run = true,
                    peers = live.peers.len(),
                    values = ?live.benchmark.values(),
                    "benchmark computed"
                ),
                Ok(None) => tracing::warn!(%sector, dry_run = true, "no peer data for sector"),
                Err(err) => tracing::error!(%sector, dry_run = true, error = %err, "benchmark failed"),
            }
        }
        return Ok(());
    }

    let db_url = settings.require_database_url()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    finge_core::storage::migrate(&pool).await?;

    let (provider, service) = build_service(settings, Some(pool.clone()))?;

    let mut failures = 0usize;
    for sector in &sectors {
        let Some(lock) = finge_core::storage::lock::try_acquire_sector_lock(&pool, sector).await?
        else {
            tracing::warn!(%sector, "sector lock not acquired; another refresh in progress");
            continue;
        };

        let outcome = refresh_sector(&pool, &service, provider.provider_name(), sector).await;
        if let Err(err) = outcome {
            failures += 1;
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(%sector, error = %err, "benchmark refresh failed");
        }

        if let Err(err) = lock.release().await {
            tracing::warn!(%sector, error = %err, "sector lock release failed");
        }
    }

    anyhow::ensure!(
        failures < sectors.len() || sectors.is_empty(),
        "every sector refresh failed ({failures})"
    );
    Ok(())
}

async fn refresh_sector(
    pool: &sqlx::PgPool,
    service: &AnalysisService,
    provider: &str,
    sector: &str,
) -> anyhow::Result<()> {
    let Some(live) = service.compute_live_benchmark(sector).await? else {
        tracing::warn!(%sector, "no peer data for sector; nothing stored");
        return Ok(());
    };

    let id = finge_core::storage::benchmarks::persist_benchmark(
        pool,
        &live.benchmark,
        provider,
        &live.peers,
    )
    .await?;

    tracing::info!(
        %sector,
        benchmark_id = %id,
        peers = live.peers.len(),
        values = ?live.benchmark.values(),
        "persisted sector benchmark"
    );
    Ok(())
}

async fn analyze(settings: &Settings, ticker: &str, with_analysts: bool) -> anyhow::Result<()> {
    let pool = match settings.database_url.as_deref() {
        Some(url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                tracing::warn!(error = %e, "db connect failed; analyzing without stored benchmarks");
                None
            }
        },
        None => None,
    };

    let (_, service) = build_service(settings, pool)?;

    let json = if with_analysts {
        serde_json::to_string_pretty(&service.complete_analysis(ticker).await?)?
    } else {
        serde_json::to_string_pretty(&service.analyze(ticker).await?)?
    };

    println!("{json}");
    Ok(())
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
