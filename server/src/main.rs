mod http;

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use watchdog_cluster::{
    spawn_error_logger, start_node, ElectionTimings, ErrorSink, ProcessSupervisor,
};
use watchdog_common::{Cluster, NodeId, WatchdogConfig};

/// Single-executor watchdog node: elects one leader among its peers and
/// runs the gated process only while holding leadership.
#[derive(Parser, Debug)]
#[command(name = "watchdog-server", version, about)]
struct Args {
    /// Path to the watchdog configuration YAML file.
    #[arg(short, long)]
    config: PathBuf,

    /// Path to the cluster membership YAML file.
    #[arg(long)]
    cluster: PathBuf,
}

fn node_id_from_env() -> anyhow::Result<NodeId> {
    let raw = std::env::var("NODE_ID").context("NODE_ID environment variable is not set")?;
    let value: u8 = raw
        .trim()
        .parse()
        .with_context(|| format!("NODE_ID must be an integer in 1..=255, got `{raw}`"))?;
    anyhow::ensure!(value != 0, "NODE_ID 0 is reserved");

    Ok(NodeId::new(value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let id = node_id_from_env()?;
    let config = WatchdogConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let cluster = Cluster::load(&args.cluster)
        .with_context(|| format!("loading {}", args.cluster.display()))?;
    let local = cluster.require_member(id)?.clone();

    let (errors, error_rx) = ErrorSink::channel();
    let _error_logger = spawn_error_logger(error_rx);

    let runtime = start_node(
        id,
        cluster,
        ElectionTimings::from_config(&config),
        config.listen_on(),
        errors.clone(),
    )
    .await?;

    let supervisor =
        ProcessSupervisor::new(config.command().clone(), runtime.status.clone(), errors);
    let process_running = supervisor.running_flag();
    let _supervisor = supervisor.spawn();

    let diagnostics = http::DiagnosticState {
        queue: runtime.queue.clone(),
        status: runtime.status.clone(),
        adapter: runtime.adapter.clone(),
        process_running,
    };

    let listener = tokio::net::TcpListener::bind(&local.http_addr)
        .await
        .with_context(|| format!("binding diagnostic endpoint on {}", local.http_addr))?;
    info!(id = %id, addr = %local.http_addr, "diagnostic endpoint up");

    axum::serve(listener, http::router(diagnostics))
        .await
        .context("diagnostic endpoint failed")?;

    Ok(())
}
