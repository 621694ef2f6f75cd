use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use route_gateway::{
    // ---
    config::GatewayArgs,
    gateway::{build_router, GatewayState},
    RpcClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_ansi(false)
        .with_line_number(true)
        .init();

    let args = GatewayArgs::parse();
    let config = args.to_rpc_config();

    tracing::info!(
        node_id = %config.node_id,
        exchange = %config.exchange,
        routing_key = %config.routing_key,
        broker = config.transport_uri.as_deref().unwrap_or("memory://"),
        "starting route gateway"
    );

    let client = RpcClient::new(config)
        .await
        .context("failed to start rpc client")?;

    let router = build_router(
        GatewayState::new(client.clone()),
        args.identity_resolver(),
        &args.base_path,
    );

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;

    tracing::info!(bind = %args.bind, base_path = %args.base_path, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    client.shutdown().await.context("failed to close transport")?;
    tracing::info!("route gateway stopped");

    Ok(())
}

async fn shutdown_signal() {
    // ---
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
