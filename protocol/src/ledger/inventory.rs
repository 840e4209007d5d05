//! # Chain State
//!
//! The plain in-memory maps behind the ledger: blocks by hash, the height
//! index, the chain head, the pending pool, and the balance table. All
//! methods are synchronous and lock-free; [`Ledger`](super::Ledger) owns
//! the single write lock and calls in here with it held, which is what
//! makes a reorganization atomic.

use std::collections::HashMap;

use crate::ledger::{Block, Transaction};
use crate::net::wire::ConsensusSummary;

/// Clamp a wire amount into the signed balance domain. A transfer larger
/// than `i64::MAX` can never be covered, so the clamp only ever turns an
/// absurd request into a plain insufficient-funds rejection.
pub(crate) fn amount_i64(amount: u64) -> i64 {
    i64::try_from(amount).unwrap_or(i64::MAX)
}

/// All chain state a node holds. Balances are signed: a reorganization
/// reverts and replays transfers in bulk, and intermediate negatives are
/// legal as long as the books balance when the dust settles.
#[derive(Debug, Default)]
pub struct ChainState {
    pub(crate) blocks: HashMap<String, Block>,
    pub(crate) heights: HashMap<String, u64>,
    pub(crate) head: Option<String>,
    pub(crate) pending: HashMap<String, Transaction>,
    pub(crate) balances: HashMap<String, i64>,
    pub(crate) genesis_hash: Option<String>,
}

impl ChainState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_block(&self, hash: &str) -> bool {
        self.blocks.contains_key(hash)
    }

    pub fn genesis_exists(&self) -> bool {
        self.genesis_hash.is_some()
    }

    pub fn height_of(&self, hash: &str) -> Option<u64> {
        self.heights.get(hash).copied()
    }

    /// Height of the current head; 0 when the chain is empty.
    pub fn head_height(&self) -> u64 {
        self.head
            .as_deref()
            .and_then(|h| self.height_of(h))
            .unwrap_or(0)
    }

    pub fn balance_of(&self, account: &str) -> i64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn insert_block(&mut self, block: Block, height: u64) {
        if block.is_genesis {
            self.genesis_hash = Some(block.hash.clone());
        }
        self.heights.insert(block.hash.clone(), height);
        self.blocks.insert(block.hash.clone(), block);
    }

    pub fn credit(&mut self, account: &str, amount: i64) {
        *self.balances.entry(account.to_string()).or_insert(0) += amount;
    }

    pub fn debit(&mut self, account: &str, amount: i64) {
        *self.balances.entry(account.to_string()).or_insert(0) -= amount;
    }

    /// Moves one transfer's value from sender to receiver.
    pub fn apply_transaction(&mut self, tx: &Transaction) {
        let amount = amount_i64(tx.amount);
        self.debit(&tx.sender, amount);
        self.credit(&tx.receiver, amount);
    }

    /// Undoes [`apply_transaction`](Self::apply_transaction).
    pub fn revert_transaction(&mut self, tx: &Transaction) {
        let amount = amount_i64(tx.amount);
        self.credit(&tx.sender, amount);
        self.debit(&tx.receiver, amount);
    }

    /// Applies every transaction of an adopted block and clears them from
    /// the pending pool.
    pub fn apply_block_transactions(&mut self, block: &Block) {
        for tx in &block.transactions {
            self.apply_transaction(tx);
            self.pending.remove(&tx.id);
        }
    }

    /// Reverses an abandoned block: balances roll back in reverse order and
    /// every transaction returns to the pending pool, where the next mined
    /// block can pick it up again.
    pub fn revert_block_transactions(&mut self, block: &Block) {
        for tx in block.transactions.iter().rev() {
            self.revert_transaction(tx);
            self.pending.insert(tx.id.clone(), tx.clone());
        }
    }

    /// Dry-runs a block's transactions against a shadow copy of the
    /// balances. Every transfer must be well formed and covered by the
    /// sender's funds at its position in the sequence. Returns the failing
    /// index and a reason on rejection.
    pub fn simulate_block_transactions(
        &self,
        txs: &[Transaction],
    ) -> Result<(), (usize, String)> {
        let mut shadow = self.balances.clone();
        for (index, tx) in txs.iter().enumerate() {
            if !tx.is_well_formed() {
                return Err((index, "malformed transaction".into()));
            }
            let amount = amount_i64(tx.amount);
            let available = shadow.get(&tx.sender).copied().unwrap_or(0);
            if available < amount {
                return Err((
                    index,
                    format!("sender {} has {available}, needs {amount}", tx.sender),
                ));
            }
            *shadow.entry(tx.sender.clone()).or_insert(0) -= amount;
            *shadow.entry(tx.receiver.clone()).or_insert(0) += amount;
        }
        Ok(())
    }

    /// Hashes from genesis up to and including `tip`, by walking
    /// `previousHash` links. Stops at the first missing parent, so a
    /// disconnected tip yields a partial chain.
    pub fn ancestry(&self, tip: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut cursor = tip.to_string();
        while let Some(block) = self.blocks.get(&cursor) {
            chain.push(cursor.clone());
            if block.is_genesis {
                break;
            }
            cursor = block.previous_hash.clone();
        }
        chain.reverse();
        chain
    }

    /// The main chain as blocks, genesis first. Empty when headless.
    pub fn main_chain(&self) -> Vec<Block> {
        let Some(head) = self.head.as_deref() else {
            return Vec::new();
        };
        self.ancestry(head)
            .iter()
            .filter_map(|h| self.blocks.get(h).cloned())
            .collect()
    }

    /// Pending transactions in a stable serving order: oldest first,
    /// id as tie-break. The miner consumes these front-to-back.
    pub fn pending_sorted(&self) -> Vec<Transaction> {
        let mut txs: Vec<Transaction> = self.pending.values().cloned().collect();
        txs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        txs
    }

    /// Sum of all balances. Stays equal to the genesis endowment at rest;
    /// the conservation tests audit this after every mutation.
    pub fn total_balance(&self) -> i64 {
        self.balances.values().sum()
    }

    pub fn summary(&self) -> ConsensusSummary {
        let chain_height = self.head_height();
        let total_blocks = self.blocks.len();
        let forked_blocks = if total_blocks == 0 {
            0
        } else {
            total_blocks.saturating_sub(chain_height as usize + 1)
        };
        ConsensusSummary {
            current_head: self.head.clone(),
            chain_height,
            total_blocks,
            forked_blocks,
        }
    }
}
