use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use prizebot_core::PrizebotConfig;
use prizebot_giveaway::{Announcer, GiveawayService, LogAnnouncer, SqliteStore, SystemClock};
use tracing::{info, warn};

mod announce;
mod app;
mod http;

/// Giveaway service: deadline timers, draws and the admin command API.
#[derive(Debug, Parser)]
#[command(name = "prizebot-gateway", version)]
struct Args {
    /// Path to prizebot.toml (overrides PRIZEBOT_CONFIG).
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "prizebot_gateway=info,prizebot_giveaway=info,tower_http=debug".into()
            }),
        )
        .init();

    // load config: --config > PRIZEBOT_CONFIG env > ~/.prizebot/prizebot.toml
    let args = Args::parse();
    let config_path = args.config.or_else(|| std::env::var("PRIZEBOT_CONFIG").ok());
    let config = PrizebotConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        PrizebotConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    prizebot_giveaway::db::init_db(&db)?;
    info!("database migrations complete");

    let announcer = build_announcer(&config);
    let (service, fired) = GiveawayService::new(
        Arc::new(SqliteStore::new(db)),
        announcer,
        Arc::new(SystemClock),
        config.giveaways.clone(),
    );
    let service = Arc::new(service);

    // Timer dispatch must be running before recovery arms anything.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let dispatch = tokio::spawn(Arc::clone(&service).run_timers(fired, shutdown_rx));

    let report = service.recover().await?;
    info!(
        scheduled = report.scheduled,
        concluded = report.concluded_overdue + report.resumed,
        failed = report.failed,
        "startup recovery finished"
    );

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let state = Arc::new(app::AppState::new(config, Arc::clone(&service)));
    let router = app::build_router(state);

    info!("Prizebot gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;

    // Pending giveaways keep their state in the store; recovery re-arms them.
    let _ = shutdown_tx.send(true);
    let _ = dispatch.await;
    service.scheduler().shutdown();
    Ok(())
}

/// Webhook delivery when configured, otherwise log-only announcements.
fn build_announcer(config: &PrizebotConfig) -> Arc<dyn Announcer> {
    let Some(url) = config.announcer.webhook_url.clone() else {
        info!("no announcer webhook configured, announcements are logged only");
        return Arc::new(LogAnnouncer);
    };
    let timeout = Duration::from_secs(config.announcer.timeout_secs);
    match announce::WebhookAnnouncer::new(url, timeout) {
        Ok(webhook) => {
            info!("announcing giveaways via webhook");
            Arc::new(webhook)
        }
        Err(e) => {
            warn!(error = %e, "webhook announcer unavailable, falling back to logs");
            Arc::new(LogAnnouncer)
        }
    }
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
