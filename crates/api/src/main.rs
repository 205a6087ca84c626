use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;

use stockhold_api::app::{AppServices, build_app};
use stockhold_api::config::{Command, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::parse();
    stockhold_observability::init(cfg.log_format);

    let services = Arc::new(AppServices::from_config(&cfg).await?);

    match cfg.command() {
        Command::ReclaimExpired => {
            let report = services.reservations.reclaim_expired(Utc::now()).await?;
            println!("reclaimed {} expired reservation(s)", report.reclaimed);
            Ok(())
        }
        Command::Serve => serve(cfg, services).await,
    }
}

async fn serve(cfg: Config, services: Arc<AppServices>) -> anyhow::Result<()> {
    let reclaimer = services.spawn_reclaimer(&cfg);
    let app = build_app(services);

    let listener = tokio::net::TcpListener::bind(cfg.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind_addr))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(handle) = reclaimer {
        handle.shutdown().await;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
