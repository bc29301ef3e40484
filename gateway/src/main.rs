//! IndexSwap Gateway Binary
//!
//! Serves ratio listings and conversions over HTTP.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use indexswap_common::{RatioSet, SystemClock};
use indexswap_gateway::{GatewayConfig, HttpServer, RequestRouter};
use indexswap_ratios::{HtmlRatioSource, RatioCache, RefreshScheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting IndexSwap Gateway");

    // Load configuration
    let config = GatewayConfig::from_env();
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let refresh_interval = chrono::Duration::from_std(config.refresh_interval)
        .context("Refresh interval out of range")?;
    let cache = if config.seed_defaults {
        RatioCache::seeded(RatioSet::defaults(), refresh_interval)
    } else {
        RatioCache::new(refresh_interval)
    };

    let source = HtmlRatioSource::new(config.source.clone())?;
    let scheduler = RefreshScheduler::new(
        Arc::new(source),
        Arc::new(cache),
        Arc::new(SystemClock),
        config.refresh_policy,
    );

    let timer = scheduler
        .policy()
        .uses_timer()
        .then(|| scheduler.spawn_timer());

    let router = RequestRouter::from_config(scheduler.clone(), &config);
    let server = Arc::new(HttpServer::new(router, &config).context("Invalid CORS origin")?);

    let addr = format!("{}:{}", config.listen_addr, config.listen_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(
        listen_addr = %config.listen_addr,
        listen_port = config.listen_port,
        variant = ?config.variant,
        refresh_policy = %scheduler.policy(),
        seeded = config.seed_defaults,
        "Gateway running"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    server.clone().serve(listener, shutdown).await?;

    if let Some(timer) = timer {
        timer.stop().await;
    }

    let metrics = server.router().metrics().snapshot();
    let refresh = scheduler.stats();
    let cache = scheduler.cache().stats(indexswap_common::now());
    info!(
        requests = metrics.requests_total,
        conversions = metrics.conversions_total,
        client_errors = metrics.client_errors,
        server_errors = metrics.server_errors,
        refresh_attempts = refresh.attempts,
        refresh_failures = refresh.failures,
        cache_fetched = cache.fetched,
        cache_age_secs = cache.age.map(|age| age.num_seconds()),
        "Gateway shutdown complete"
    );
    Ok(())
}
