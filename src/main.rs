use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use clap::Parser;
use cumulus::config::NodeConfig;
use cumulus::net::client::NodeClient;
use cumulus::net::connection::ConnectionRegistry;
use cumulus::net::server::PeerServer;
use cumulus::storage::catalog::StoreCatalog;
use cumulus::storage::environment::EnvironmentRegistry;
use cumulus::storage::handlers::*;
use cumulus::storage::protocol::*;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "cumulus-node", about = "Cumulus storage node")]
struct Args {
    /// JSON node configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address peer nodes connect to.
    #[arg(long)]
    peer_bind: Option<SocketAddr>,

    /// Address of the operator HTTP surface.
    #[arg(long)]
    http_bind: Option<SocketAddr>,

    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Peer node to ping once at startup. May be repeated.
    #[arg(long = "probe")]
    probes: Vec<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    if let Some(addr) = args.peer_bind {
        config.peer_bind = addr;
    }
    if let Some(addr) = args.http_bind {
        config.http_bind = addr;
    }
    if let Some(dir) = args.data_dir.clone() {
        config.data_dir = dir;
    }

    tracing::info!("Starting Cumulus node (data dir {})", config.data_dir.display());

    // 1. Storage:
    let environments = EnvironmentRegistry::new(config.environment.clone());
    let catalog = StoreCatalog::new(environments.clone());
    for map in config.resolved_maps() {
        let store = catalog.open(map)?;
        tracing::info!(
            "Hosting map {} (arity {}, {} pattern(s))",
            store.name(),
            store.arity(),
            store.patterns().len()
        );
    }
    tracing::info!(
        "{} map(s) across {} environment(s)",
        catalog.len(),
        environments.open_environments()
    );

    // 2. Peer links:
    let connections = ConnectionRegistry::start()?;
    let peer_server = PeerServer::bind(config.peer_bind, catalog.clone()).await?;
    tokio::spawn(async move {
        if let Err(e) = peer_server.run().await {
            tracing::error!("Peer server stopped: {}", e);
        }
    });

    // 3. Startup probes (connections block, so they run off the async workers):
    for addr in args.probes.clone() {
        let connections = connections.clone();
        let batch_size = config.batch_size;
        tokio::task::spawn_blocking(move || match NodeClient::connect_with_batch(
            &connections,
            addr,
            batch_size,
        ) {
            Ok(client) => match client.ping() {
                Ok(maps) => tracing::info!("Peer {} is up, hosting {:?}", addr, maps),
                Err(e) => tracing::warn!("Peer {} did not answer ping: {}", addr, e),
            },
            Err(e) => tracing::warn!("Could not reach peer {}: {}", addr, e),
        });
    }

    // 4. HTTP Router:
    let app = Router::new()
        .route(&format!("{}/:map/:key", ENDPOINT_GET), get(handle_get))
        .route(ENDPOINT_PUT, post(handle_put))
        .route(&format!("{}/:map/:partial", ENDPOINT_SCAN), get(handle_scan))
        .route(&format!("{}/:map", ENDPOINT_DUMP), get(handle_dump))
        .route(ENDPOINT_STATS, get(handle_stats))
        .layer(Extension(catalog.clone()));

    tracing::info!("HTTP server listening on {}", config.http_bind);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(config.http_bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
        })
        .await?;

    tracing::info!("Shutting down, flushing {} map(s)", catalog.len());
    catalog.close_all()?;

    Ok(())
}
