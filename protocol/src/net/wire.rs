//! # Wire Types
//!
//! Every JSON payload exchanged between nodes, in one place so the axum
//! handlers and the outbound client can never drift apart. Field names are
//! camelCase on the wire; structs keep Rust naming and let serde translate.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ledger::{Block, Transaction};

// ---------------------------------------------------------------------------
// Peers
// ---------------------------------------------------------------------------

/// A peer's reachable address as advertised between nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerAddr {
    pub ip: String,
    pub port: u16,
    pub node_id: String,
}

impl PeerAddr {
    /// `ip:port` form used as the request target.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Body of `POST /register`: the caller introducing itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub node_id: String,
    pub ip: String,
    pub port: u16,
}

/// Response to `POST /register`: who we are, who we talk to, and our
/// current inventory so a bootstrapping node starts with a full picture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub status: String,
    pub peers: Vec<PeerAddr>,
    pub node_id: String,
    pub ip: String,
    pub port: u16,
    pub blocks: Vec<Block>,
    pub transactions: Vec<Transaction>,
}

// ---------------------------------------------------------------------------
// Submission results
// ---------------------------------------------------------------------------

/// Result of `POST /inv` and `POST /block`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub status: String,
}

impl SubmitResponse {
    pub fn added() -> Self {
        Self { status: "added".into() }
    }

    pub fn already_exists() -> Self {
        Self { status: "already_exists".into() }
    }
}

/// 400-class body for invalid submissions. The reason is for operators
/// reading logs, not for programmatic dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectResponse {
    pub status: String,
    pub reason: String,
}

impl RejectResponse {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { status: "rejected".into(), reason: reason.into() }
    }
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

/// Body of `POST /sync`. One endpoint, two payload shapes; serde picks the
/// variant by the fields present. `Inventory` is listed first because its
/// field set is disjoint from `Peers` and ambiguity must fail loudly in
/// tests, not silently in production.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SyncPayload {
    Inventory {
        blocks: Vec<Block>,
        transactions: Vec<Transaction>,
    },
    Peers { peers: Vec<PeerAddr> },
}

/// Acknowledgement for a peer-list sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPeersAck {
    pub status: String,
    pub added: usize,
}

/// Acknowledgement for an inventory sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncInventoryAck {
    pub added_blocks: usize,
    pub added_transactions: usize,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Consensus summary embedded in `/inventory` and `/consensus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusSummary {
    pub current_head: Option<String>,
    pub chain_height: u64,
    pub total_blocks: usize,
    pub forked_blocks: usize,
}

/// Response to `GET /inventory`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryView {
    pub blocks: Vec<String>,
    pub transactions: Vec<Transaction>,
    pub balances: HashMap<String, i64>,
    pub consensus: ConsensusSummary,
}

/// Response to `GET /consensus`: the summary plus the head block itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusView {
    pub current_head: Option<String>,
    pub chain_height: u64,
    pub head_block: Option<Block>,
    pub total_blocks: usize,
    pub forked_blocks: usize,
}

/// Response to `GET /balance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancesView {
    pub balances: HashMap<String, i64>,
}

/// Active-connection counts split by group class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCounts {
    pub internal: usize,
    pub external: usize,
}

/// Response to `GET /status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub node_id: String,
    pub ip: String,
    pub port: u16,
    pub blocks: usize,
    pub total_peers: usize,
    pub active_connections: usize,
    pub connections_by_group: GroupCounts,
    pub connections: Vec<PeerAddr>,
    pub all_peers: Vec<PeerAddr>,
}

/// Response to `GET /ping`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub status: String,
}

impl PingResponse {
    pub fn alive() -> Self {
        Self { status: "alive".into() }
    }
}
