//! certgate
//!
//! Intercepting RPC gateway between an aggregation sender and the upstream
//! aggregation-layer node.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use certgate_gateway::auth;
use certgate_gateway::http::{self, AppState};
use certgate_gateway::metrics::{MetricsUpdater, PrometheusReporter};
use certgate_gateway::scheduler::ReleaseScheduler;
use certgate_gateway::server::{
    self, NodeStateInterceptor, SubmissionService, TransparentForwarder,
};
use certgate_gateway::server::submission::parse_chain_ids;
use certgate_gateway::storage::GatewayStore;
use certgate_gateway::tokens;
use certgate_gateway::upstream::UpstreamClient;

#[derive(Parser, Debug)]
#[command(name = "certgate")]
#[command(
    version,
    about = "Intercepting certificate gateway between an aggsender and the aggregation layer"
)]
struct Args {
    /// Producer-facing gRPC bind address.
    #[arg(long = "grpc", default_value = "0.0.0.0:50051")]
    grpc_addr: SocketAddr,

    /// HTTP bind address (status page, control endpoints, metrics, health).
    #[arg(long = "http", default_value = "0.0.0.0:8080")]
    http_addr: SocketAddr,

    /// SQLite database path.
    #[arg(long = "db", default_value = "certificates.db")]
    db_path: PathBuf,

    /// Comma-separated chain ids whose submissions are candidates for delay.
    #[arg(long = "delayed-chains", default_value = "1,137")]
    delayed_chains: String,

    /// Hold duration for delayed certificates (e.g. 48h, 30m, 2h15m).
    #[arg(long = "delay", default_value = "48h", value_parser = humantime::parse_duration)]
    delay: Duration,

    /// Upstream aggsender address (host:port) all traffic forwards to.
    #[arg(long = "aggsender-addr")]
    aggsender_addr: String,

    /// How often to check for releasable certificates.
    #[arg(long = "scheduler-interval", default_value = "30s", value_parser = humantime::parse_duration)]
    scheduler_interval: Duration,

    /// API key for the kill switch endpoint.
    #[arg(long)]
    kill_switch_api_key: String,

    /// API key for the restart endpoint.
    #[arg(long)]
    kill_restart_api_key: String,

    /// API key for the certificate data endpoints.
    #[arg(long)]
    data_key: String,

    /// API key for the certificate override endpoint.
    #[arg(long)]
    certificate_override_key: String,

    /// Dollar high-water mark above which a certificate is held
    /// (sum of all bridged-out tokens).
    #[arg(long = "supsicious-value")]
    suspicious_value: Option<u64>,

    /// Per-token prices as `<address40>:<dollar_value>:<multiplier>` CSV,
    /// address without the leading 0x.
    #[arg(long = "token-values")]
    token_values: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "certgate_gateway=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        grpc = %args.grpc_addr,
        http = %args.http_addr,
        upstream = %args.aggsender_addr,
        "Starting certgate"
    );

    let credentials = [
        ("kill_switch_api_key", &args.kill_switch_api_key),
        ("kill_restart_api_key", &args.kill_restart_api_key),
        ("data_key", &args.data_key),
        ("certificate_override_key", &args.certificate_override_key),
    ];
    for (name, value) in &credentials {
        if value.is_empty() {
            anyhow::bail!("no {name} provided - cannot start");
        }
    }

    let store = GatewayStore::open(&args.db_path)
        .await
        .context("failed to initialize database")?;

    for (name, value) in &credentials {
        let hashed = auth::hash_key(value).with_context(|| format!("failed to hash {name}"))?;
        store
            .set_credential(name, &hashed)
            .await
            .with_context(|| format!("failed to store {name}"))?;
    }

    apply_config(&store, &args).await?;

    let chains = parse_chain_ids(&store.get_config("delayed_chains").await?);
    info!(chains = ?chains, delay = ?args.delay, "effective configuration");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let upstream =
        UpstreamClient::connect(&args.aggsender_addr).context("failed to create upstream client")?;

    let reporter = Arc::new(
        PrometheusReporter::new(&chains).context("failed to register prometheus metrics")?,
    );
    let metrics = MetricsUpdater::new(store.clone(), Arc::clone(&reporter)).start(shutdown_rx.clone());
    // publish the initial queue state
    metrics.trigger();

    let scheduler = ReleaseScheduler::new(
        store.clone(),
        upstream.clone(),
        metrics.clone(),
        args.scheduler_interval,
    );
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx.clone()));

    let grpc_router = server::build_grpc_router(
        SubmissionService::new(store.clone(), upstream.clone(), metrics.clone()),
        NodeStateInterceptor::new(store.clone(), upstream.clone()),
        TransparentForwarder::new(upstream.channel()),
    );

    let http_router = http::build_router(AppState {
        store: store.clone(),
        metrics: metrics.clone(),
        reporter,
        shutdown: shutdown_rx.clone(),
    });

    let grpc_listener = tokio::net::TcpListener::bind(args.grpc_addr)
        .await
        .with_context(|| format!("failed to bind gRPC address {}", args.grpc_addr))?;
    let http_listener = tokio::net::TcpListener::bind(args.http_addr)
        .await
        .with_context(|| format!("failed to bind HTTP address {}", args.http_addr))?;

    info!(addr = %args.grpc_addr, "gRPC gateway listening");
    info!(addr = %args.http_addr, "HTTP server listening");

    let grpc_shutdown = shutdown_rx.clone();
    let grpc_task = tokio::spawn(async move {
        axum::serve(grpc_listener, grpc_router)
            .with_graceful_shutdown(wait_for_shutdown(grpc_shutdown))
            .await
    });
    let http_shutdown = shutdown_rx.clone();
    let http_task = tokio::spawn(async move {
        axum::serve(http_listener, http_router)
            .with_graceful_shutdown(wait_for_shutdown(http_shutdown))
            .await
    });

    wait_for_signal().await;
    info!("shutting down...");

    // flips the health endpoint to 503 and stops every worker
    let _ = shutdown_tx.send(true);

    let drain = Duration::from_secs(10);
    if tokio::time::timeout(drain, scheduler_handle).await.is_err() {
        error!("release scheduler did not stop within the drain window");
    }
    if tokio::time::timeout(drain, grpc_task).await.is_err() {
        error!("gRPC server did not drain within the shutdown window");
    }
    if tokio::time::timeout(drain, http_task).await.is_err() {
        error!("HTTP server did not drain within the shutdown window");
    }

    store.pool().close().await;
    info!("shutdown complete");
    Ok(())
}

/// Write the startup flags through to the configuration table.
async fn apply_config(store: &GatewayStore, args: &Args) -> anyhow::Result<()> {
    store
        .set_config("aggsender_address", &args.aggsender_addr)
        .await?;

    store
        .set_config("delay_seconds", &args.delay.as_secs().to_string())
        .await?;

    let chains = parse_chain_ids(&args.delayed_chains);
    if !chains.is_empty() {
        let csv = chains
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        store.set_config("delayed_chains", &csv).await?;
        info!(chains = ?chains, "updated delayed chains");
    }

    if let Some(value) = args.suspicious_value {
        store
            .set_config("suspicious_value", &value.to_string())
            .await?;
        info!(value, "updated suspicious value");
    }

    if let Some(raw) = &args.token_values {
        // validate before storing so a malformed flag fails startup
        tokens::parse_token_values(raw).context("invalid token-values flag")?;
        store.set_config("token_values", raw).await?;
        info!("updated token values");
    }

    Ok(())
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stopped| *stopped).await;
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("received Ctrl+C shutdown signal"),
            _ = sigterm.recv() => info!("received SIGTERM shutdown signal"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received Ctrl+C shutdown signal");
    }
}
