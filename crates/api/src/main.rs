use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use sqlx::PgPool;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use finge_core::analysis::{
    Analysis, AnalysisService, BenchmarkReport, CompanyReport, CompleteAnalysis, ConsensusReport,
    HealthReport, NotFound, SearchOutcome, ServiceOptions, SuggestionList,
};
use finge_core::config::Settings;
use finge_core::directory::CompanyDirectory;
use finge_core::ingest::fmp::FmpClient;
use finge_core::valuation::ScoringConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let pool = connect_storage(&settings).await;

    let provider = Arc::new(FmpClient::from_settings(&settings)?);
    let scoring = ScoringConfig::from_env()?;
    let directory_path = PathBuf::from(&settings.company_directory_path);
    let directory = CompanyDirectory::load_or_seed(&directory_path)?;

    let service = AnalysisService::new(
        provider,
        pool,
        scoring,
        ServiceOptions::from_env(Some(directory_path)),
        directory,
    );
    let state = AppState {
        service: Arc::new(service),
    };

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/company/:ticker", get(get_company))
        .route("/api/sector/:sector", get(get_sector_benchmark))
        .route("/api/analysis/:ticker", get(get_analysis))
        .route("/api/search/:name", get(search_company))
        .route("/api/search/suggestions/:partial", get(search_suggestions))
        .route(
            "/api/analyst-recommendations/:ticker",
            get(get_analyst_recommendations),
        )
        .route("/api/analysis-complete/:ticker", get(get_complete_analysis))
        .with_state(state)
        .layer(cors_layer(&settings.cors_origins))
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Storage is optional: without it the API still serves live data and only skips persisted
/// benchmarks.
async fn connect_storage(settings: &Settings) -> Option<PgPool> {
    let db_url = match settings.require_database_url() {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(error = %e, "DATABASE_URL missing; starting API without storage");
            return None;
        }
    };

    match sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
    {
        Ok(pool) => match finge_core::storage::migrate(&pool).await {
            Ok(()) => Some(pool),
            Err(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            let err = anyhow::Error::new(e);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
            None
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

#[derive(Clone)]
struct AppState {
    service: Arc<AnalysisService>,
}

#[derive(Debug, Serialize)]
struct RootMessage {
    message: &'static str,
}

async fn root() -> Json<RootMessage> {
    Json(RootMessage {
        message: "Finge API: sector-relative valuation",
    })
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.service.health().await)
}

fn error_status(err: anyhow::Error) -> StatusCode {
    if let Some(nf) = err.downcast_ref::<NotFound>() {
        tracing::info!(what = nf.what, key = %nf.key, "lookup miss");
        return StatusCode::NOT_FOUND;
    }
    sentry_anyhow::capture_anyhow(&err);
    tracing::error!(error = ?err, "request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn get_company(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<CompanyReport>, StatusCode> {
    let report = state.service.company(&ticker).await.map_err(error_status)?;
    Ok(Json(report))
}

async fn get_sector_benchmark(
    State(state): State<AppState>,
    Path(sector): Path<String>,
) -> Result<Json<BenchmarkReport>, StatusCode> {
    let report = state
        .service
        .sector_benchmark(&sector)
        .await
        .map_err(error_status)?;
    Ok(Json(report))
}

async fn get_analysis(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<Analysis>, StatusCode> {
    let analysis = state.service.analyze(&ticker).await.map_err(error_status)?;
    Ok(Json(analysis))
}

async fn search_company(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SearchOutcome>, StatusCode> {
    let outcome = state
        .service
        .resolve_company(&name)
        .await
        .map_err(error_status)?;
    Ok(Json(outcome))
}

async fn search_suggestions(
    State(state): State<AppState>,
    Path(partial): Path<String>,
) -> Json<SuggestionList> {
    Json(state.service.suggestions(&partial).await)
}

async fn get_analyst_recommendations(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<ConsensusReport>, StatusCode> {
    let report = state
        .service
        .analyst_recommendations(&ticker)
        .await
        .map_err(error_status)?;
    Ok(Json(report))
}

async fn get_complete_analysis(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<CompleteAnalysis>, StatusCode> {
    let complete = state
        .service
        .complete_analysis(&ticker)
        .await
        .map_err(error_status)?;
    Ok(Json(complete))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
