// Copyright (c) 2026 Floodnet Contributors. MIT License.
// See LICENSE for details.

//! # floodnet Node
//!
//! Entry point for the `floodnet-node` binary. Parses CLI arguments,
//! initializes logging and metrics, wires the ledger/overlay/propagator,
//! and serves the HTTP API that is both the operator surface and the
//! peer-to-peer transport.
//!
//! The binary supports four subcommands:
//!
//! - `run`     — start a node
//! - `mine`    — mine one block against a running local node
//! - `status`  — query a running node's status endpoint
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use floodnet_protocol::config::{
    INVENTORY_SYNC_INTERVAL, PEER_BROADCAST_INTERVAL, PEER_CLEANUP_INTERVAL,
    PEER_EXCHANGE_INTERVAL, PEER_SNAPSHOT_INTERVAL, PEER_TIMEOUT, SHUTDOWN_GRACE,
};
use floodnet_protocol::ledger::{AddStatus, Block, Ledger};
use floodnet_protocol::miner::MinerError;
use floodnet_protocol::{Miner, NodeClient, NodeIdentity, OverlayManager, Propagator};

use cli::{Commands, NodeCli};
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = NodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Mine(args) => mine_block(args).await,
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// run — Full node startup sequence
// ---------------------------------------------------------------------------

/// Starts the full node: resolves the address, builds the subsystems,
/// bootstraps (or creates genesis), spawns the periodic workers, and
/// serves the HTTP API until a shutdown signal.
///
/// Startup sequence:
/// 1.  Initialize logging
/// 2.  Resolve our reachable IP
/// 3.  Generate the node identity
/// 4.  Build ledger, overlay, propagator, metrics
/// 5.  Load the peer snapshot, if one exists
/// 6.  Bootstrap against configured peers
/// 7.  Create genesis when standalone on an empty chain
/// 8.  Spawn periodic workers
/// 9.  Serve the HTTP API
/// 10. Drain and stop on SIGINT/SIGTERM
async fn run_node(args: cli::RunArgs) -> Result<()> {
    // --- 1. Logging ---
    let log_filter = format!(
        "floodnet_node={level},floodnet_protocol={level},tower_http=warn",
        level = args.log_level
    );
    logging::init_logging(&log_filter, LogFormat::from_str_lossy(&args.log_format));

    let client = NodeClient::new().context("failed to build HTTP client")?;

    // --- 2. Resolve our reachable IP ---
    let ip = if args.localhost {
        "127.0.0.1".to_string()
    } else {
        client
            .public_ip()
            .await
            .context("cannot determine public IP (use --localhost for local setups)")?
    };

    // --- 3. Identity ---
    let identity = NodeIdentity::generate(ip, args.port);
    tracing::info!(
        node_id = %identity.node_id,
        group = %identity.group(),
        addr = %identity.addr(),
        difficulty = args.difficulty,
        "node identity generated"
    );

    // --- 4. Subsystems ---
    let ledger = Arc::new(Ledger::new(args.difficulty));
    let overlay = Arc::new(OverlayManager::new(identity.clone(), client.clone()));
    let propagator = Arc::new(Propagator::new(client.clone(), Arc::clone(&overlay)));
    let node_metrics = Arc::new(NodeMetrics::new());

    // --- 5. Peer snapshot ---
    let peers_file = args.peers_file_path();
    match overlay.load_snapshot(&peers_file) {
        Ok(0) => {}
        Ok(n) => tracing::info!(peers = n, file = %peers_file.display(), "peer snapshot loaded"),
        Err(e) => tracing::warn!(file = %peers_file.display(), error = %e, "peer snapshot unreadable"),
    }

    // --- 6. Bootstrap ---
    let seeds = args.bootstrap_peers();
    if !seeds.is_empty() {
        let report = overlay.bootstrap(&seeds).await;
        tracing::info!(
            seeds = seeds.len(),
            connected = report.connected,
            blocks = report.blocks.len(),
            transactions = report.transactions.len(),
            "bootstrap finished"
        );
        let mut adopted = 0;
        for block in report.blocks {
            if matches!(
                ledger.add_block(block),
                Ok(AddStatus::Added | AddStatus::Orphaned)
            ) {
                adopted += 1;
            }
        }
        for tx in report.transactions {
            let _ = ledger.add_transaction(tx);
        }
        if adopted > 0 {
            tracing::info!(blocks = adopted, "bootstrap inventory adopted");
        }
        if report.connected == 0 {
            tracing::warn!("all bootstrap peers failed, continuing standalone");
        }
    }

    // --- 7. Genesis when standalone ---
    if seeds.is_empty() && !ledger.has_blocks() {
        let genesis = Block::genesis(
            identity.node_id.clone(),
            chrono::Utc::now().timestamp_millis(),
        );
        ledger
            .add_block(genesis)
            .map_err(|e| anyhow::anyhow!("genesis creation failed: {e}"))?;
        tracing::info!("standalone start, genesis block created");
    }

    node_metrics.observe(&ledger, &overlay);

    // --- 8. Periodic workers ---
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers: Vec<JoinHandle<()>> = Vec::new();

    // Peer exchange, 30 s, single-flight inside the manager.
    {
        let overlay = Arc::clone(&overlay);
        let mut shutdown = shutdown_rx.clone();
        workers.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PEER_EXCHANGE_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => overlay.exchange_tick().await,
                    _ = shutdown.changed() => break,
                }
            }
        }));
    }

    // Inventory anti-entropy, 30 s, one random active peer per tick.
    {
        let propagator = Arc::clone(&propagator);
        let ledger = Arc::clone(&ledger);
        let mut shutdown = shutdown_rx.clone();
        workers.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(INVENTORY_SYNC_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => propagator.sync_inventory_once(&ledger).await,
                    _ = shutdown.changed() => break,
                }
            }
        }));
    }

    // Peer-list broadcast, 45 s.
    {
        let propagator = Arc::clone(&propagator);
        let mut shutdown = shutdown_rx.clone();
        workers.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PEER_BROADCAST_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => propagator.broadcast_peers(),
                    _ = shutdown.changed() => break,
                }
            }
        }));
    }

    // Expiry sweeps: a fast one and a slow full-period one, plus a metrics
    // refresh riding the fast sweep.
    {
        let overlay = Arc::clone(&overlay);
        let ledger = Arc::clone(&ledger);
        let node_metrics = Arc::clone(&node_metrics);
        let mut shutdown = shutdown_rx.clone();
        workers.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PEER_CLEANUP_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        overlay.cleanup_expired();
                        node_metrics.observe(&ledger, &overlay);
                    }
                    _ = shutdown.changed() => break,
                }
            }
        }));
    }
    {
        let overlay = Arc::clone(&overlay);
        let mut shutdown = shutdown_rx.clone();
        workers.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PEER_TIMEOUT);
            loop {
                tokio::select! {
                    _ = ticker.tick() => { overlay.cleanup_expired(); }
                    _ = shutdown.changed() => break,
                }
            }
        }));
    }

    // Known-peer snapshot, 60 s.
    {
        let overlay = Arc::clone(&overlay);
        let path = peers_file.clone();
        let mut shutdown = shutdown_rx.clone();
        workers.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PEER_SNAPSHOT_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = overlay.write_snapshot(&path) {
                            tracing::warn!(file = %path.display(), error = %e, "peer snapshot write failed");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        }));
    }

    // --- 9. Serve the HTTP API ---
    let app_state = api::AppState {
        identity: identity.clone(),
        ledger: Arc::clone(&ledger),
        overlay: Arc::clone(&overlay),
        propagator: Arc::clone(&propagator),
        metrics: Arc::clone(&node_metrics),
    };
    let router = api::create_router(app_state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port))
        .await
        .with_context(|| format!("failed to bind port {}", args.port))?;
    tracing::info!(port = args.port, "HTTP API listening");
    print_startup_banner(&identity, args.difficulty, seeds.len());

    // --- 10. Run until shutdown, then drain ---
    tokio::select! {
        res = axum::serve(listener, router) => {
            res.context("HTTP server error")?;
        }
        _ = shutdown_signal() => {
            tracing::info!(grace = ?SHUTDOWN_GRACE, "shutdown signal received, draining");
            let _ = shutdown_tx.send(true);
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        }
    }

    for worker in workers {
        worker.abort();
    }
    if let Err(e) = overlay.write_snapshot(&peers_file) {
        tracing::warn!(error = %e, "final peer snapshot write failed");
    }
    tracing::info!("floodnet-node stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// mine — One proof-of-work round against a local node
// ---------------------------------------------------------------------------

/// Mines one block for the node listening on the given local port and
/// prints the outcome. An empty pending pool is a normal result, not an
/// error exit.
async fn mine_block(args: cli::MineArgs) -> Result<()> {
    logging::init_logging("floodnet_node=info,floodnet_protocol=info", LogFormat::Pretty);

    let client = NodeClient::new().context("failed to build HTTP client")?;
    let status = client
        .get_status_json(&format!("http://127.0.0.1:{}", args.port))
        .await
        .with_context(|| format!("no node answering on port {}", args.port))?;
    let node_id = status["nodeId"]
        .as_str()
        .context("malformed status response: missing nodeId")?
        .to_string();

    let miner = Miner::new(node_id, args.port, args.difficulty)
        .context("failed to build miner")?
        .with_previous_hash(args.previous_hash);

    match miner.run().await {
        Ok(report) => {
            println!();
            println!("Block mined");
            println!("  Hash         : {}", report.block_hash);
            println!("  Nonce        : {}", report.nonce);
            println!("  Transactions : {}", report.transactions);
            println!("  Search time  : {} ms", report.elapsed.as_millis());
            println!("  Accepted     : {}", if report.accepted { "yes" } else { "no" });
            println!("  Became head  : {}", if report.became_head { "yes" } else { "no" });
            Ok(())
        }
        Err(MinerError::NothingToMine) => {
            println!("Nothing to mine: the pending pool is empty.");
            Ok(())
        }
        Err(e) => Err(e).context("mining failed"),
    }
}

// ---------------------------------------------------------------------------
// status — Query a running node
// ---------------------------------------------------------------------------

/// Queries a running node's `/status` endpoint and prints a summary.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let client = NodeClient::new().context("failed to build HTTP client")?;
    let json = client
        .get_status_json(&args.url)
        .await
        .with_context(|| format!("failed to query {}", args.url))?;

    println!("Node Status");
    if let Some(node_id) = json["nodeId"].as_str() {
        println!("  Node ID     : {}", node_id);
    }
    if let (Some(ip), Some(port)) = (json["ip"].as_str(), json["port"].as_u64()) {
        println!("  Address     : {}:{}", ip, port);
    }
    if let Some(blocks) = json["blocks"].as_u64() {
        println!("  Blocks      : {}", blocks);
    }
    if let Some(active) = json["activeConnections"].as_u64() {
        println!("  Active      : {}", active);
    }
    if let Some(known) = json["totalPeers"].as_u64() {
        println!("  Known peers : {}", known);
    }
    if let Some(groups) = json.get("connectionsByGroup") {
        println!(
            "  By group    : {} internal / {} external",
            groups["internal"].as_u64().unwrap_or(0),
            groups["external"].as_u64().unwrap_or(0),
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// version
// ---------------------------------------------------------------------------

/// Prints version information to stdout.
fn print_version() {
    println!("floodnet-node {}", env!("CARGO_PKG_VERSION"));
    if let Some(commit) = option_env!("GIT_COMMIT") {
        println!("commit    {}", commit);
    }
    if let Some(ts) = option_env!("BUILD_TIMESTAMP") {
        println!("built     {}", ts);
    }
}

// ---------------------------------------------------------------------------
// Startup banner
// ---------------------------------------------------------------------------

/// Prints a short configuration summary once the listener is up.
fn print_startup_banner(identity: &NodeIdentity, difficulty: usize, seeds: usize) {
    println!();
    println!("  floodnet node v{}", env!("CARGO_PKG_VERSION"));
    println!("  Node ID    : {}", identity.node_id);
    println!("  Group      : {}", identity.group());
    println!("  Address    : http://{}", identity.addr());
    println!("  Difficulty : {} leading hex zeros", difficulty);
    println!(
        "  Mode       : {}",
        if seeds == 0 { "standalone" } else { "bootstrapped" }
    );
    println!();
}

// ---------------------------------------------------------------------------
// Shutdown signal
// ---------------------------------------------------------------------------

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
