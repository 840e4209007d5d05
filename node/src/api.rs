//! # HTTP API
//!
//! Builds the axum router that is both the node's operator surface and
//! its peer-to-peer transport. Every endpoint speaks JSON with permissive
//! CORS, because the same port also feeds browser-based visualizers.
//!
//! | Method | Path         | Description                                  |
//! |--------|--------------|----------------------------------------------|
//! | GET    | `/status`    | Node identity and peer summary               |
//! | GET    | `/peers`     | Active peers as `[{ip,port,nodeId}]`         |
//! | GET    | `/inventory` | Block hashes, pending pool, balances, head   |
//! | GET    | `/getblocks` | Blocks: all, `?mainchain=true`, or `?hash=X` |
//! | GET    | `/balance`   | The balance table                            |
//! | GET    | `/consensus` | Head metadata and fork counts                |
//! | GET    | `/ping`      | Liveness probe                               |
//! | GET    | `/metrics`   | Prometheus text format                       |
//! | POST   | `/register`  | Peer introduction; returns peers + inventory |
//! | POST   | `/inv`       | Submit a transaction (flooded on accept)     |
//! | POST   | `/block`     | Submit a block (flooded on accept)           |
//! | POST   | `/sync`      | Peer-list or inventory anti-entropy push     |

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::debug;

use floodnet_protocol::ledger::{AddStatus, Block, Ledger, Transaction};
use floodnet_protocol::net::wire::{
    BalancesView, PeerAddr, PingResponse, RegisterRequest, RegisterResponse, RejectResponse,
    StatusView, SubmitResponse, SyncInventoryAck, SyncPayload, SyncPeersAck,
};
use floodnet_protocol::{NodeIdentity, OverlayManager, Propagator};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone — everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Who we are on the overlay.
    pub identity: NodeIdentity,
    /// Chain state and consensus.
    pub ledger: Arc<Ledger>,
    /// Peer tables and connection caps.
    pub overlay: Arc<OverlayManager>,
    /// Fan-out engine for accepted blocks and transactions.
    pub propagator: Arc<Propagator>,
    /// Prometheus handles.
    pub metrics: SharedMetrics,
}

impl AppState {
    fn refresh_metrics(&self) {
        self.metrics.observe(&self.ledger, &self.overlay);
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/status", get(status_handler))
        .route("/peers", get(peers_handler))
        .route("/inventory", get(inventory_handler))
        .route("/getblocks", get(get_blocks_handler))
        .route("/balance", get(balance_handler))
        .route("/consensus", get(consensus_handler))
        .route("/ping", get(ping_handler))
        .route("/metrics", get(metrics_handler))
        .route("/register", post(register_handler))
        .route("/inv", post(inv_handler))
        .route("/block", post(block_handler))
        .route("/sync", post(sync_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Read handlers
// ---------------------------------------------------------------------------

/// `GET /ping` — liveness probe. Answering this is what earns a peer its
/// slot in someone's active set.
async fn ping_handler() -> Json<PingResponse> {
    Json(PingResponse::alive())
}

/// `GET /status` — identity plus a summary of both peer tables.
async fn status_handler(State(state): State<AppState>) -> Json<StatusView> {
    Json(StatusView {
        node_id: state.identity.node_id.clone(),
        ip: state.identity.ip.clone(),
        port: state.identity.port,
        blocks: state.ledger.total_blocks(),
        total_peers: state.overlay.known_len(),
        active_connections: state.overlay.active_len(),
        connections_by_group: state.overlay.group_counts(),
        connections: state.overlay.active_peers(),
        all_peers: state.overlay.known_peers(),
    })
}

/// `GET /peers` — the active connections, the set we flood to.
async fn peers_handler(State(state): State<AppState>) -> Json<Vec<PeerAddr>> {
    Json(state.overlay.active_peers())
}

/// `GET /inventory` — block hashes, pending pool, balances, consensus.
async fn inventory_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.ledger.inventory())
}

/// Query parameters for `GET /getblocks`.
#[derive(Debug, Deserialize)]
struct GetBlocksQuery {
    hash: Option<String>,
    mainchain: Option<bool>,
}

/// `GET /getblocks` — one block by hash, the main chain, or everything.
/// Always answers with an array so clients have one shape to parse.
async fn get_blocks_handler(
    State(state): State<AppState>,
    Query(query): Query<GetBlocksQuery>,
) -> impl IntoResponse {
    if let Some(hash) = query.hash {
        return match state.ledger.block(&hash) {
            Some(block) => (StatusCode::OK, Json(vec![block])).into_response(),
            None => (
                StatusCode::NOT_FOUND,
                Json(RejectResponse::new("unknown block hash")),
            )
                .into_response(),
        };
    }
    if query.mainchain.unwrap_or(false) {
        return Json(state.ledger.main_chain()).into_response();
    }
    Json(state.ledger.all_blocks()).into_response()
}

/// `GET /balance` — the full balance table.
async fn balance_handler(State(state): State<AppState>) -> Json<BalancesView> {
    Json(BalancesView {
        balances: state.ledger.balances(),
    })
}

/// `GET /consensus` — head metadata including the head block itself.
async fn consensus_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.ledger.consensus_view())
}

/// `GET /metrics` — Prometheus text exposition.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.refresh_metrics();
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Write handlers
// ---------------------------------------------------------------------------

/// `POST /register` — a peer introduces itself. We record it, probe it
/// with `/ping` in the background (aliveness is proven by ping, not by
/// registration), and answer with our peers and full inventory so a
/// bootstrapping node starts warm.
async fn register_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    if req.node_id.is_empty() || req.ip.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(RejectResponse::new("nodeId and ip are required")),
        )
            .into_response();
    }

    let caller = PeerAddr {
        ip: req.ip,
        port: req.port,
        node_id: req.node_id,
    };
    state.overlay.learn_peer(&caller);
    debug!(peer = %caller.node_id, addr = %caller.addr(), "inbound registration");

    let overlay = Arc::clone(&state.overlay);
    tokio::spawn(async move {
        overlay.try_establish_connection(&caller).await;
    });

    state.refresh_metrics();
    Json(RegisterResponse {
        status: "registered".into(),
        peers: state.overlay.active_peers(),
        node_id: state.identity.node_id.clone(),
        ip: state.identity.ip.clone(),
        port: state.identity.port,
        blocks: state.ledger.all_blocks(),
        transactions: state.ledger.pending_transactions(),
    })
    .into_response()
}

/// `POST /inv` — submit a transaction. Accepted transactions are flooded;
/// duplicates are a cheap no-op; invalid ones answer 400 and change
/// nothing.
async fn inv_handler(
    State(state): State<AppState>,
    Json(tx): Json<Transaction>,
) -> impl IntoResponse {
    match state.ledger.add_transaction(tx.clone()) {
        Ok(AddStatus::Added) => {
            state.metrics.transactions_accepted_total.inc();
            state.refresh_metrics();
            state.propagator.broadcast_transaction(tx);
            Json(SubmitResponse::added()).into_response()
        }
        Ok(_) => Json(SubmitResponse::already_exists()).into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(RejectResponse::new(e.to_string())),
        )
            .into_response(),
    }
}

/// `POST /block` — submit a block. Both stored and orphan-parked blocks
/// report `added` and are flooded onward; a peer may hold the parent we
/// are missing.
async fn block_handler(
    State(state): State<AppState>,
    Json(block): Json<Block>,
) -> impl IntoResponse {
    match state.ledger.add_block(block.clone()) {
        Ok(AddStatus::AlreadyKnown) => Json(SubmitResponse::already_exists()).into_response(),
        Ok(_) => {
            state.metrics.blocks_accepted_total.inc();
            state.refresh_metrics();
            state.propagator.broadcast_block(block);
            Json(SubmitResponse::added()).into_response()
        }
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(RejectResponse::new(e.to_string())),
        )
            .into_response(),
    }
}

/// `POST /sync` — anti-entropy push. A peer-list payload tops up the
/// known table; an inventory payload feeds blocks and transactions
/// through normal admission. Merged data is not re-flooded: sync is the
/// backstop, flooding already did the fan-out.
async fn sync_handler(
    State(state): State<AppState>,
    Json(payload): Json<SyncPayload>,
) -> impl IntoResponse {
    match payload {
        SyncPayload::Peers { peers } => {
            let added = state.overlay.learn_peers(&peers);
            state.refresh_metrics();
            Json(SyncPeersAck {
                status: "ok".into(),
                added,
            })
            .into_response()
        }
        SyncPayload::Inventory {
            blocks,
            transactions,
        } => {
            let mut added_blocks = 0;
            for block in blocks {
                match state.ledger.add_block(block) {
                    Ok(AddStatus::Added) | Ok(AddStatus::Orphaned) => added_blocks += 1,
                    Ok(AddStatus::AlreadyKnown) => {}
                    Err(e) => debug!(error = %e, "sync block not admitted"),
                }
            }
            let mut added_transactions = 0;
            for tx in transactions {
                match state.ledger.add_transaction(tx) {
                    Ok(AddStatus::Added) => added_transactions += 1,
                    Ok(_) => {}
                    Err(e) => debug!(error = %e, "sync transaction not admitted"),
                }
            }
            state.refresh_metrics();
            Json(SyncInventoryAck {
                added_blocks,
                added_transactions,
            })
            .into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
