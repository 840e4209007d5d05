//! # Miner
//!
//! Proof-of-work block construction over a node's pending pool. The miner
//! is a pure HTTP client of the node it mines for: it reads `/inventory`,
//! resolves the parent via `/getblocks?mainchain=true`, searches a nonce,
//! and submits the result to `/block` like any other peer would. Nothing
//! is rolled back on failure; a losing block simply never becomes head.
//!
//! One invocation mines one block, synchronously. The nonce search is
//! CPU-bound and single-threaded; at the default difficulty of four hex
//! zeros it finishes in well under a second.

use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::{MAX_TX_PER_BLOCK, ZERO_HASH};
use crate::crypto::meets_difficulty;
use crate::ledger::Block;
use crate::net::{NetError, NodeClient};

/// Hard stop for the nonce search. At difficulty 4 the expected search is
/// ~65k attempts; hitting this bound means the difficulty is misconfigured.
const NONCE_SEARCH_LIMIT: u64 = 100_000_000;

/// How many times, and how often, the miner polls the node to confirm the
/// submitted block landed.
const INCLUSION_POLL_ATTEMPTS: u32 = 5;
const INCLUSION_POLL_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, thiserror::Error)]
pub enum MinerError {
    /// The pending pool was empty; there is nothing worth a block.
    #[error("no pending transactions to mine")]
    NothingToMine,

    /// The local node could not be reached or rejected the submission.
    #[error(transparent)]
    Net(#[from] NetError),

    /// The nonce search hit its hard bound without a solution.
    #[error("nonce search exhausted after {0} attempts")]
    SearchExhausted(u64),
}

/// Result of one mining run, for the CLI to print.
#[derive(Debug, Clone)]
pub struct MineReport {
    pub block_hash: String,
    pub nonce: String,
    pub transactions: usize,
    pub elapsed: Duration,
    /// The node stored the block.
    pub accepted: bool,
    /// The block is the chain head as of the last poll.
    pub became_head: bool,
}

/// A single-shot proof-of-work miner bound to one local node.
pub struct Miner {
    node_id: String,
    port: u16,
    difficulty: usize,
    previous_hash: Option<String>,
    client: NodeClient,
}

impl Miner {
    pub fn new(
        node_id: impl Into<String>,
        port: u16,
        difficulty: usize,
    ) -> Result<Self, NetError> {
        Ok(Self {
            node_id: node_id.into(),
            port,
            difficulty,
            previous_hash: None,
            client: NodeClient::new()?,
        })
    }

    /// Mine on an explicit parent instead of the node's current tip.
    /// Useful for deliberately producing forks in test setups.
    pub fn with_previous_hash(mut self, previous_hash: Option<String>) -> Self {
        self.previous_hash = previous_hash;
        self
    }

    /// Runs one full mining round against the local node.
    pub async fn run(&self) -> Result<MineReport, MinerError> {
        let local = format!("127.0.0.1:{}", self.port);

        let inventory = self.client.get_inventory(&local).await?;
        let mut txs = inventory.transactions;
        txs.truncate(MAX_TX_PER_BLOCK);
        if txs.is_empty() {
            return Err(MinerError::NothingToMine);
        }

        let parent = match &self.previous_hash {
            Some(hash) => hash.clone(),
            None => self
                .client
                .get_main_chain(&local)
                .await?
                .last()
                .map(|b| b.hash.clone())
                .unwrap_or_else(|| ZERO_HASH.to_string()),
        };

        let started = Instant::now();
        let mut block = Block::candidate(
            parent,
            self.node_id.clone(),
            Utc::now().timestamp_millis(),
            txs,
        );
        let nonce = search_nonce(&mut block, self.difficulty, NONCE_SEARCH_LIMIT)
            .ok_or(MinerError::SearchExhausted(NONCE_SEARCH_LIMIT))?;
        let elapsed = started.elapsed();
        info!(
            block = %block.hash,
            nonce,
            transactions = block.count,
            elapsed_ms = elapsed.as_millis() as u64,
            "proof-of-work found"
        );

        let submit = self.client.send_block(&local, &block).await?;
        let mut accepted = submit.status == "added" || submit.status == "already_exists";
        let mut became_head = false;

        for attempt in 0..INCLUSION_POLL_ATTEMPTS {
            if let Ok(view) = self.client.get_inventory(&local).await {
                if view.blocks.iter().any(|h| *h == block.hash) {
                    accepted = true;
                    became_head =
                        view.consensus.current_head.as_deref() == Some(block.hash.as_str());
                    break;
                }
            }
            debug!(attempt, "block not visible yet, polling again");
            sleep(INCLUSION_POLL_DELAY).await;
        }

        Ok(MineReport {
            block_hash: block.hash,
            nonce: block.nonce,
            transactions: block.count,
            elapsed,
            accepted,
            became_head,
        })
    }
}

/// Iterates `nonce = 1, 2, …` until the block's preimage hash carries
/// `difficulty` leading hex zeros, then stamps `hash` and returns the
/// winning nonce. `None` when `limit` attempts were not enough.
pub fn search_nonce(block: &mut Block, difficulty: usize, limit: u64) -> Option<u64> {
    for nonce in 1..=limit {
        block.nonce = nonce.to_string();
        let hash = block.compute_hash();
        if meets_difficulty(&hash, difficulty) {
            block.hash = hash;
            return Some(nonce);
        }
    }
    None
}
