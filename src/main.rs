use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use vet_reactivation::clock::{Clock, SystemClock};
use vet_reactivation::config::AppConfig;
use vet_reactivation::gateway::{MessagingGateway, WhatsAppGateway};
use vet_reactivation::http_router;
use vet_reactivation::jobs::{JobRegistry, spawn_scheduler};
use vet_reactivation::store::{LibSqlBackend, ReactivationStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;

    // stderr plus a daily-rolling file under LOG_DIR
    std::fs::create_dir_all(&config.server.log_dir)
        .with_context(|| format!("cannot create log dir {}", config.server.log_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(&config.server.log_dir, "vet-reactivation.log");
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    eprintln!("🐾 Vet Reactivation v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.server.database_path.display());
    eprintln!("   HTTP: http://0.0.0.0:{}", config.server.port);
    eprintln!(
        "   Messaging window: {:02}:00-{:02}:00",
        config.messaging.start_hour, config.messaging.end_hour
    );

    // ── Storage ─────────────────────────────────────────────────────────
    let store: Arc<dyn ReactivationStore> = Arc::new(
        LibSqlBackend::new_local(&config.server.database_path)
            .await
            .context("failed to open database")?,
    );

    // ── Gateway, clock, jobs ────────────────────────────────────────────
    let gateway: Arc<dyn MessagingGateway> =
        Arc::new(WhatsAppGateway::new(&config.whatsapp).context("failed to build WhatsApp client")?);
    if config.whatsapp.instance_id.trim().is_empty() {
        tracing::warn!("WHATSAPP_INSTANCE_ID is not set; every send will fail");
    }
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let registry = Arc::new(
        JobRegistry::from_config(&config, Arc::clone(&store), gateway, Arc::clone(&clock))
            .context("failed to build jobs")?,
    );
    let tickers = spawn_scheduler(Arc::clone(&registry), &config.schedules)
        .context("invalid job schedule")?;
    tracing::info!(jobs = tickers.len(), "Scheduler started");

    // ── HTTP ────────────────────────────────────────────────────────────
    let app = http_router(Arc::clone(&registry), store, clock).layer(CorsLayer::permissive());
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.server.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.server.port))?;
    tracing::info!(port = config.server.port, "HTTP server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("HTTP server failed")?;

    for ticker in tickers {
        ticker.abort();
    }
    tracing::info!("Stopped");
    Ok(())
}
