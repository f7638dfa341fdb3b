//! replist command line.
//!
//! Three entry points around the core engine: `generate` writes an initial
//! snapshot file, `server` loads one and serves the RPC surface, `client`
//! drives a synthetic workload against a running server. Long-running
//! commands stop cleanly on SIGINT/SIGTERM and exit 0; initialization
//! failures surface as a non-zero exit.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use log::info;
use rand::Rng;
use tokio::sync::watch;

use replist_core::{load_history, generate_snapshot};
use replist_sync::{
    BatchService, ClientConfig, ClientMonitor, RpcServer, ServerConfig, ServerMonitor,
    ServiceConfig, WorkloadClient,
};

/// Replicated sorted-list store client/server.
#[derive(Parser, Debug)]
#[command(name = "replist", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate an initial snapshot file
    Generate(GenerateArgs),
    /// Load a snapshot and serve the RPC surface
    Server(ServerArgs),
    /// Run a synthetic-workload client
    Client(ClientArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Output file path
    #[arg(long, default_value = "./doc_v0.dat")]
    file_path: String,

    /// Number of items to generate
    #[arg(long, default_value_t = 1_000_000)]
    size: usize,
}

#[derive(Args, Debug)]
struct ServerArgs {
    /// Port to listen on
    #[arg(long, default_value_t = 2412)]
    port: u16,

    /// Inbound batch queue capacity
    #[arg(long, default_value_t = 50)]
    queue_size: usize,

    /// Commit period in milliseconds
    #[arg(long, default_value_t = 500)]
    commit_period: u64,

    /// Path to the generated snapshot file
    #[arg(long, default_value = "./doc_v0.dat")]
    file_path: String,
}

#[derive(Args, Debug)]
struct ClientArgs {
    /// Server URL
    #[arg(long, default_value = "ws://127.0.0.1:2412")]
    server_url: String,

    /// Unique client id; 0 picks a random one
    #[arg(long, default_value_t = 0)]
    client_id: u32,

    /// Edit-batch send period in milliseconds
    #[arg(long, default_value_t = 1000)]
    send_period: u64,

    /// Maximum edits per batch
    #[arg(long, default_value_t = 5)]
    max_ops: usize,

    /// Diff poll period in milliseconds
    #[arg(long, default_value_t = 2000)]
    poll_period: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    match Cli::parse().command {
        Commands::Generate(args) => {
            generate_snapshot(&args.file_path, args.size)?;
        }
        Commands::Server(args) => run_server(args).await?,
        Commands::Client(args) => run_client(args).await?,
    }

    Ok(())
}

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn Error>> {
    let history = Arc::new(load_history(&args.file_path)?);

    let monitor = Arc::new(ServerMonitor::new());
    monitor.start();

    let service = Arc::new(BatchService::start(
        history,
        ServiceConfig {
            queue_size: args.queue_size,
            commit_period: Duration::from_millis(args.commit_period),
        },
        monitor.clone(),
    )?);

    let server = RpcServer::new(
        ServerConfig { bind_addr: format!("0.0.0.0:{}", args.port) },
        service.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    server.run(shutdown_rx).await?;

    service.stop();
    monitor.stop();
    info!("server stopped");
    Ok(())
}

async fn run_client(args: ClientArgs) -> Result<(), Box<dyn Error>> {
    let client_id = if args.client_id == 0 {
        rand::thread_rng().gen_range(1..=u32::MAX)
    } else {
        args.client_id
    };

    let monitor = Arc::new(ClientMonitor::new());
    monitor.start();

    let mut client = WorkloadClient::connect(
        ClientConfig {
            server_url: args.server_url,
            client_id,
            send_period: Duration::from_millis(args.send_period),
            max_ops: args.max_ops,
            poll_period: Duration::from_millis(args.poll_period),
        },
        monitor.clone(),
    )
    .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    client.run(shutdown_rx).await?;

    monitor.stop();
    info!("client {client_id} stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    info!("shutdown signal received");
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
