//! # Blocks
//!
//! The unit of consensus. A block's identity is the SHA-256 of its
//! canonical preimage: the compact JSON of every field except `hash`, in
//! declared order, with the decimal nonce string appended. Two nodes that
//! disagree on a single preimage byte silently fork, so the encoding is
//! pinned by fixture tests below and must never drift.

use serde::{Deserialize, Serialize};

use crate::config::ZERO_HASH;
use crate::crypto::{merkle_root, sha256_hex};
use crate::ledger::Transaction;

/// A block as it travels on the wire (camelCase field names).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Genesis blocks skip proof-of-work and mint the endowment.
    pub is_genesis: bool,
    /// Hash of the parent block; all zeros for genesis.
    pub previous_hash: String,
    /// Creation time as a decimal unix-milliseconds string.
    pub timestamp: String,
    /// Decimal nonce string found by the miner.
    pub nonce: String,
    /// Node id of the block producer.
    pub creator: String,
    /// Merkle root of `transactions`; empty string when there are none.
    pub merkle_root: String,
    /// Number of transactions carried.
    pub count: usize,
    /// Transactions in application order.
    pub transactions: Vec<Transaction>,
    /// Declared SHA-256 identity. Must equal [`Block::compute_hash`].
    pub hash: String,
}

/// Borrowed view of a block with the `hash` field omitted, used to build
/// the canonical preimage. Field order mirrors [`Block`] exactly.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Preimage<'a> {
    is_genesis: bool,
    previous_hash: &'a str,
    timestamp: &'a str,
    nonce: &'a str,
    creator: &'a str,
    merkle_root: &'a str,
    count: usize,
    transactions: &'a [Transaction],
}

impl Block {
    /// Builds an unhashed candidate block over the given transactions.
    /// The caller searches for a nonce and stamps the hash afterwards.
    pub fn candidate(
        previous_hash: impl Into<String>,
        creator: impl Into<String>,
        timestamp_millis: i64,
        transactions: Vec<Transaction>,
    ) -> Self {
        Self {
            is_genesis: false,
            previous_hash: previous_hash.into(),
            timestamp: timestamp_millis.to_string(),
            nonce: String::new(),
            creator: creator.into(),
            merkle_root: merkle_root(&transactions),
            count: transactions.len(),
            transactions,
            hash: String::new(),
        }
    }

    /// Builds the genesis block for `creator`, hash already stamped.
    /// Genesis carries no transactions and no proof-of-work.
    pub fn genesis(creator: impl Into<String>, timestamp_millis: i64) -> Self {
        let mut block = Self {
            is_genesis: true,
            previous_hash: ZERO_HASH.to_string(),
            timestamp: timestamp_millis.to_string(),
            nonce: "0".to_string(),
            creator: creator.into(),
            merkle_root: String::new(),
            count: 0,
            transactions: Vec::new(),
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    /// The canonical hashing preimage: compact JSON without the `hash`
    /// field, concatenated with the nonce string.
    pub fn preimage(&self) -> String {
        let view = Preimage {
            is_genesis: self.is_genesis,
            previous_hash: &self.previous_hash,
            timestamp: &self.timestamp,
            nonce: &self.nonce,
            creator: &self.creator,
            merkle_root: &self.merkle_root,
            count: self.count,
            transactions: &self.transactions,
        };
        let mut encoded = serde_json::to_string(&view).unwrap_or_default();
        encoded.push_str(&self.nonce);
        encoded
    }

    /// Recomputes the block's identity from its current fields.
    pub fn compute_hash(&self) -> String {
        sha256_hex(self.preimage().as_bytes())
    }

    /// `true` when the Merkle root and count actually describe the carried
    /// transactions.
    pub fn commitments_match(&self) -> bool {
        self.count == self.transactions.len() && self.merkle_root == merkle_root(&self.transactions)
    }
}
