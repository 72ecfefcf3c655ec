use chainpulse_api::{coordinator::Coordinator, routes};
use chainpulse_ingestor::{
    metrics_api::HttpMetricsClient, platform::PlatformClient, types::Network,
};
use chainpulse_settings::Settings;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "chainpulse-api", about = "Aggregated chain-metrics read API")]
struct AppArgs {
    /// Path to a settings file; CHAINPULSE__* environment variables override it.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = AppArgs::parse();
    let settings = Settings::new(args.config)?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&settings.log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    PrometheusBuilder::new()
        .with_http_listener(settings.server.metrics_addr.parse::<SocketAddr>()?)
        .install()?;

    let per_source = settings.per_source_timeout();
    let metrics_client = HttpMetricsClient::new(&settings.upstream.metrics_base_url, per_source)?;
    let platform_client = PlatformClient::new(
        &settings.upstream.platform_base_url,
        &settings.upstream.version_feed_url,
        per_source,
    )?;

    let listen_addr = settings.server.listen_addr.clone();
    let coordinator = Arc::new(Coordinator::new(
        settings,
        Network::Mainnet,
        Arc::new(metrics_client),
        Arc::new(platform_client),
    ));

    let listener = TcpListener::bind(&listen_addr).await?;
    info!(%listen_addr, "ChainPulse metrics API listening");

    let shutdown = shutdown_listener();
    axum::serve(listener, routes::router(coordinator))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("ChainPulse metrics API shutting down");

    Ok(())
}

fn shutdown_listener() -> CancellationToken {
    let cancellation_token = CancellationToken::new();
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("sigterm listener failed");
    tokio::spawn({
        let cancellation_token = cancellation_token.clone();
        async move {
            tokio::select! {
                _ = sigterm.recv() => cancellation_token.cancel(),
                _ = signal::ctrl_c() => cancellation_token.cancel(),
            }
        }
    });

    cancellation_token
}
