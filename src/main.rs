mod config;
mod db;
mod device;
mod probe;
mod service;
mod web;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use db::SqliteDeviceStore;
use probe::icmp::IcmpProber;
use service::DeviceService;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "network_device_manager=info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::parse();

    let store = SqliteDeviceStore::open(&config.database_url, &config.collection)
        .with_context(|| format!("failed to open device store at '{}'", config.database_url))?;

    let prober = IcmpProber::new()
        .with_timeout(config.probe_timeout_ms)
        .with_count(config.probe_count);
    info!(
        timeout_ms = config.probe_timeout_ms,
        count = config.probe_count,
        "ICMP prober ready"
    );

    let service = DeviceService::new(Arc::new(store), Arc::new(prober));

    web::start(&config.bind, config.port, service)
        .await
        .with_context(|| format!("web server failed on {}:{}", config.bind, config.port))?;

    info!("Server stopped, device store closed");
    Ok(())
}
