use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use peg_insight::config::Settings;
use peg_insight::llm::LlmClient;
use peg_insight::middleware::request_id_middleware;
use peg_insight::repository::{create_pool, PegRepository};
use peg_insight::services::analysis_service::AnalysisService;
use peg_insight::services::choi_client::ChoiClient;
use peg_insight::services::llm_analysis_service::LlmAnalysisService;
use peg_insight::services::peg_processing_service::PegProcessingService;
use peg_insight::{handlers, AppState};

/// PEG counter comparison and diagnostic analysis service.
#[derive(Parser, Debug)]
#[command(name = "peg-insight", version)]
struct Cli {
    /// Path to a TOML config file, overriding the usual search paths.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = Settings::load_from(cli.config.as_deref())?;
    init_logging(&settings);

    tracing::info!("peg-insight starting up");

    let pool = create_pool(&settings.database.url, settings.database.pool_size, settings.database.statement_timeout_secs).await?;
    tracing::info!("database pool created");

    let peg_processing = PegProcessingService::new(PegRepository::new(pool));
    let llm_analysis =
        LlmAnalysisService::new(LlmClient::new(settings.llm.clone()), &settings.peg).with_template_path(None);
    let choi_client = ChoiClient::new(&settings.backend);

    let settings = Arc::new(settings);
    let analysis_service = Arc::new(AnalysisService::new(peg_processing, llm_analysis, choi_client, Arc::clone(&settings)));

    let state = AppState { settings: Arc::clone(&settings), analysis_service };

    let api_routes = Router::new().route("/api/v1/analysis", post(handlers::analyze)).with_state(state);

    let health_routes = Router::new().route("/health", get(health_check)).route("/ready", get(ready_check));

    let app = Router::new()
        .merge(api_routes)
        .merge(health_routes)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("peg-insight listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// A layered `tracing_subscriber::registry()`: a stdout layer always, plus a
/// daily-rolling file layer when configured.
fn init_logging(settings: &Settings) {
    let filter = tracing_subscriber::EnvFilter::new(&settings.logging.level);
    let registry = tracing_subscriber::registry().with(filter);

    if let Some(log_file) = &settings.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path.file_name().and_then(|n| n.to_str()).unwrap_or("peg-insight.log");
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Leaking the guard keeps the non-blocking writer flushing for the
        // life of the process; main never returns except on shutdown.
        std::mem::forget(guard);
        registry.with(tracing_subscriber::fmt::layer().with_writer(non_blocking)).with(tracing_subscriber::fmt::layer()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn health_check() -> &'static str {
    "OK"
}

async fn ready_check() -> &'static str {
    "READY"
}
