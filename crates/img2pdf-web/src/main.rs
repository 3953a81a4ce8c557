//! img2pdf Web - Web server converting uploaded images into a PDF download.

mod helpers;
mod routes;
mod state;
mod templates;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use img2pdf_core::{AppConfig, StagingBackend};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "img2pdf-web")]
#[command(author, version, about = "img2pdf Web Server", long_about = None)]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind to
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Staging directory for uploads (overrides config)
    #[arg(long, env = "IMG2PDF_STAGING_DIR")]
    staging_dir: Option<PathBuf>,

    /// Stage uploads in memory instead of on disk
    #[arg(long)]
    memory_staging: bool,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Build the application router.
fn app(state: Arc<AppState>) -> Router {
    let body_limit = state.body_limit();

    Router::new()
        // Pages
        .route("/", get(routes::index))
        // Conversion (form target and API alias)
        .route("/upload", post(routes::convert_images))
        .route("/api/convert", post(routes::convert_images))
        // Middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Setup logging
    let default_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path).context("Failed to load config file")?
    } else {
        AppConfig::load().context("Failed to load config")?
    };

    if let Some(dir) = args.staging_dir {
        config.staging.dir = Some(dir);
    }
    if args.memory_staging {
        config.staging.backend = StagingBackend::Memory;
    }

    info!(
        "Limits: {} bytes per file, {} bytes per request, decode policy {:?}",
        config.limits.max_item_bytes,
        config.limits.max_request_bytes,
        config.conversion.decode_policy
    );

    let state = Arc::new(AppState::new(config).context("Failed to initialize application state")?);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
