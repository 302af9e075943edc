//! fxgate Server Binary
//!
//! Serves currency conversions over HTTP.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fxgate_fx::{HttpProviderConfig, HttpRateProvider, KeyValueStore, MemoryStore};
use fxgate_server::{http, CurrencyService, LogFormat, ServiceConfig};

#[derive(Debug, Parser)]
#[command(name = "fxgate", about = "Currency conversion service")]
struct Args {
    /// Listen address (overrides SVC_HOST).
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides SVC_PORT).
    #[arg(long)]
    port: Option<u16>,

    /// Log output format (overrides LOG_FORMAT).
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = ServiceConfig::from_env()?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(format) = args.log_format {
        config.log_format = format;
    }

    init_tracing(&config);

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    info!(service = %config.service_name, "Starting fxgate");

    let provider = Arc::new(HttpRateProvider::new(HttpProviderConfig {
        api_url: config.upstream.url.clone(),
        api_key: config.upstream.api_key.clone(),
        timeout: config.upstream.timeout,
    })?);

    let service = Arc::new(CurrencyService::new(config.clone(), provider));
    service.start(open_store(&config).await).await;

    let listener = TcpListener::bind(config.listen_addr()).await?;
    info!(listen_addr = %config.listen_addr(), "Service running");

    http::serve(listener, service.clone(), shutdown_signal()).await;

    service.stop().await;
    info!("Service shutdown complete");
    Ok(())
}

fn init_tracing(config: &ServiceConfig) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
    );

    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init(),
    }
}

#[cfg(feature = "redis")]
async fn open_store(config: &ServiceConfig) -> Option<Arc<dyn KeyValueStore>> {
    use fxgate_fx::{RedisSettings, RedisStore};

    let Some(host) = config.cache.host.clone() else {
        return Some(Arc::new(MemoryStore::new()));
    };

    let settings = RedisSettings {
        host,
        port: config.cache.port,
        db: config.cache.db,
        username: config.cache.username.clone(),
        password: config.cache.password.clone(),
        ssl: config.cache.ssl,
    };

    match RedisStore::connect(&settings, config.cache.timeout).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!(dsn = %settings.redacted_dsn(), error = %e, "Redis unreachable");
            None
        }
    }
}

#[cfg(not(feature = "redis"))]
async fn open_store(config: &ServiceConfig) -> Option<Arc<dyn KeyValueStore>> {
    if config.redis_requested() {
        warn!("Built without redis support, using in-process cache");
    }
    Some(Arc::new(MemoryStore::new()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
