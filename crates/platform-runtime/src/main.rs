//! CampusPost platform entry point.

use anyhow::Context;
use platform_runtime::{Platform, RuntimeConfig};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &RuntimeConfig) {
    let filter = EnvFilter::try_from_env("CAMPUSPOST_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RuntimeConfig::from_env();
    init_tracing(&config);

    info!(
        bind = %config.bind_addr,
        storage = ?config.storage,
        l2_prefix_len = config.l2_prefix_len,
        "CampusPost starting"
    );

    let platform = Platform::build(&config).await?;
    platform.start_background(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "Gateway listening");

    let router = platform.router.clone();
    let serve = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    );

    tokio::select! {
        result = serve => {
            result.context("gateway server exited")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            platform.shutdown();
        }
    }

    Ok(())
}
