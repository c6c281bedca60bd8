//! cxr-review - image review service
//!
//! Serves the review API over a SQLite database, optionally loading a seed
//! directory produced by `cxr-cohort` at startup.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cxr_common::config::TomlConfig;
use cxr_review::inference::{BinaryScorer, DualModelInference, MultiLabelScorer, UnavailableScorer};
use cxr_review::services::load_seed_dir;
use cxr_review::{AppState, ReviewSettings};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for cxr-review
#[derive(Parser, Debug)]
#[command(name = "cxr-review")]
#[command(about = "Image review service with dual-model predictions")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "CXR_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(short, long, env = "CXR_DATABASE")]
    database: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "CXR_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "CXR_BIND_ADDRESS")]
    bind_address: Option<String>,

    /// Seed directory to load before serving
    #[arg(long, env = "CXR_SEED_DIR")]
    seed_dir: Option<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(long, env = "CXR_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = TomlConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(database) = args.database {
        config.database_path = database;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind_address) = args.bind_address {
        config.bind_address = bind_address;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    let default_filter = format!("{},tower_http=info", config.logging.level);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting cxr-review v{}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.database_path.display());

    let db = cxr_common::db::init_database(&config.database_path)
        .await
        .context("Failed to open database")?;

    if let Some(seed_dir) = &args.seed_dir {
        let report = load_seed_dir(&db, seed_dir)
            .await
            .with_context(|| format!("Failed to load seed directory {}", seed_dir.display()))?;
        info!(?report, "Seed directory loaded");
    }

    let inference = wire_scorers(&config);
    let state = AppState::new(db, inference, ReviewSettings::from_config(&config));
    let app = cxr_review::build_router(state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Scorer kernels are provided externally; without configured weights each
/// path is wired as unavailable and inference requests fail with 503
fn wire_scorers(config: &TomlConfig) -> DualModelInference {
    let scorers = &config.scorers;
    let multilabel: Arc<dyn MultiLabelScorer> =
        Arc::new(unavailable("multilabel", &scorers.multilabel_weights));
    let binary: Arc<dyn BinaryScorer> = Arc::new(unavailable("binary", &scorers.binary_weights));
    DualModelInference::new(multilabel, binary)
}

fn unavailable(name: &str, weights: &Option<PathBuf>) -> UnavailableScorer {
    let reason = match weights {
        Some(path) => format!("no kernel linked for weights {}", path.display()),
        None => "weights path not configured".to_string(),
    };
    warn!(
        scorer = name,
        reason = reason.as_str(),
        "Scorer unavailable"
    );
    UnavailableScorer::new(name, reason)
}

/// Graceful shutdown on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
