//! # Consensus Engine
//!
//! Admission and fork choice over [`ChainState`]. One writer lock makes
//! every mutation (including a full reorganization) atomic with respect
//! to readers; the seen-set lives outside the lock so the flooding hot
//! path can deduplicate without contending with a reorg in progress.
//!
//! ## Fork choice
//!
//! Highest chain wins. At equal height, the lexicographically smaller
//! block hash wins, which gives every node the same deterministic pick
//! with no extra communication. Losing branches stay in storage; their
//! blocks count as forks until they grow past the head.
//!
//! ## Orphans
//!
//! A block whose parent is unknown is parked in a bounded pool keyed by
//! the missing parent, then connected and validated when the ancestor
//! arrives. Heights are derived only from a present parent, never guessed,
//! so the height index cannot be poisoned by out-of-order delivery.

use std::collections::VecDeque;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_DIFFICULTY, GENESIS_ENDOWMENT, MAX_ORPHAN_BLOCKS};
use crate::crypto::meets_difficulty;
use crate::ledger::inventory::amount_i64;
use crate::ledger::{Block, ChainState, Transaction};
use crate::net::wire::{ConsensusSummary, ConsensusView, InventoryView};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of submitting a block or transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddStatus {
    /// Accepted and stored. The caller should flood it to peers.
    Added,
    /// Seen before; nothing changed. Idempotent flooding relies on this.
    AlreadyKnown,
    /// Block parked until its parent arrives. Still worth flooding:
    /// a peer may hold the ancestor we are missing.
    Orphaned,
}

/// Rejection reasons. None of these mutate state and none are propagated
/// to peers beyond the local HTTP status code.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The declared hash is not the hash of the block's canonical
    /// preimage. Either the sender encodes differently or the block was
    /// tampered with; both are fatal for consensus, so the block is
    /// refused outright.
    #[error("declared hash {declared} does not match recomputed {computed}")]
    HashMismatch { declared: String, computed: String },

    /// The recomputed hash does not carry enough leading zeros.
    #[error("block hash lacks {difficulty} leading hex zeros")]
    InsufficientWork { difficulty: usize },

    /// A second genesis block. One endowment per universe.
    #[error("genesis block already exists")]
    GenesisExists,

    /// Merkle root or count disagree with the carried transactions.
    #[error("block commitments do not match carried transactions")]
    CommitmentMismatch,

    /// A transaction inside the block failed simulation.
    #[error("invalid transaction at position {index}: {reason}")]
    InvalidTransactions { index: usize, reason: String },

    /// A submitted transaction is structurally invalid.
    #[error("malformed transaction")]
    InvalidTransaction,

    /// The sender cannot cover the transfer from confirmed funds.
    #[error("insufficient balance: {sender} has {available}, needs {requested}")]
    InsufficientBalance {
        sender: String,
        available: i64,
        requested: u64,
    },
}

// ---------------------------------------------------------------------------
// Orphan pool
// ---------------------------------------------------------------------------

/// Bounded FIFO of blocks waiting for their parent. Linear scans are fine
/// at this size; the pool exists to survive out-of-order flooding, not to
/// store a chain.
#[derive(Debug, Default)]
struct OrphanPool {
    parked: VecDeque<Block>,
}

impl OrphanPool {
    fn insert(&mut self, block: Block) {
        if self.parked.iter().any(|b| b.hash == block.hash) {
            return;
        }
        if self.parked.len() >= MAX_ORPHAN_BLOCKS {
            if let Some(dropped) = self.parked.pop_front() {
                warn!(block = %dropped.hash, "orphan pool full, dropping oldest");
            }
        }
        self.parked.push_back(block);
    }

    /// Removes and returns every parked block whose parent is `parent`.
    fn take_children(&mut self, parent: &str) -> Vec<Block> {
        let mut children = Vec::new();
        let mut keep = VecDeque::with_capacity(self.parked.len());
        for block in self.parked.drain(..) {
            if block.previous_hash == parent {
                children.push(block);
            } else {
                keep.push_back(block);
            }
        }
        self.parked = keep;
        children
    }

    fn len(&self) -> usize {
        self.parked.len()
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// The node's inventory and consensus engine. Shared across HTTP handlers
/// and periodic workers behind an `Arc`; interior locking keeps every
/// mutation serialized.
pub struct Ledger {
    difficulty: usize,
    state: RwLock<ChainState>,
    /// Hashes and transaction ids already processed. Grows monotonically
    /// for the process lifetime; this is what makes flooding idempotent.
    seen: DashMap<String, ()>,
    orphans: Mutex<OrphanPool>,
}

impl Ledger {
    /// Creates a ledger requiring `difficulty` leading hex zeros of
    /// proof-of-work. Tests run at 1; the network default is
    /// [`DEFAULT_DIFFICULTY`].
    pub fn new(difficulty: usize) -> Self {
        Self {
            difficulty,
            state: RwLock::new(ChainState::new()),
            seen: DashMap::new(),
            orphans: Mutex::new(OrphanPool::default()),
        }
    }

    pub fn with_default_difficulty() -> Self {
        Self::new(DEFAULT_DIFFICULTY)
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    // -- Admission ---------------------------------------------------------

    /// Admits a block: dedup, identity check, proof-of-work, transaction
    /// simulation, storage, fork choice, orphan reconciliation. The whole
    /// sequence runs under one write lock.
    pub fn add_block(&self, block: Block) -> Result<AddStatus, LedgerError> {
        if self.seen.contains_key(&block.hash) {
            return Ok(AddStatus::AlreadyKnown);
        }
        let mut state = self.state.write();
        self.add_block_locked(&mut state, block)
    }

    fn add_block_locked(
        &self,
        state: &mut ChainState,
        block: Block,
    ) -> Result<AddStatus, LedgerError> {
        if state.contains_block(&block.hash) {
            return Ok(AddStatus::AlreadyKnown);
        }

        let computed = block.compute_hash();
        if computed != block.hash {
            return Err(LedgerError::HashMismatch {
                declared: block.hash.clone(),
                computed,
            });
        }

        if block.is_genesis {
            return self.add_genesis_locked(state, block);
        }

        if !meets_difficulty(&computed, self.difficulty) {
            return Err(LedgerError::InsufficientWork {
                difficulty: self.difficulty,
            });
        }
        if !block.commitments_match() {
            return Err(LedgerError::CommitmentMismatch);
        }

        let Some(parent_height) = state.height_of(&block.previous_hash) else {
            debug!(block = %block.hash, parent = %block.previous_hash, "parking orphan block");
            self.seen.insert(block.hash.clone(), ());
            self.orphans.lock().insert(block);
            return Ok(AddStatus::Orphaned);
        };

        state
            .simulate_block_transactions(&block.transactions)
            .map_err(|(index, reason)| LedgerError::InvalidTransactions { index, reason })?;

        let hash = block.hash.clone();
        let height = parent_height + 1;
        self.seen.insert(hash.clone(), ());

        let current_head = state.head.clone();
        match current_head {
            Some(head) if head == block.previous_hash => {
                // Plain extension of the tip: apply in place, no reorg.
                state.apply_block_transactions(&block);
                state.insert_block(block, height);
                state.head = Some(hash.clone());
                debug!(block = %hash, height, "chain extended");
            }
            Some(head) => {
                let head_height = state.head_height();
                state.insert_block(block, height);
                if height > head_height || (height == head_height && hash < head) {
                    self.reorg_locked(state, &head, &hash);
                } else {
                    debug!(block = %hash, height, "stored side-branch block");
                }
            }
            None => {
                // Parent known but no head cannot happen on a rooted chain;
                // adopt the block rather than lose it.
                state.apply_block_transactions(&block);
                state.insert_block(block, height);
                state.head = Some(hash.clone());
            }
        }

        let connected = self.drain_orphans_locked(state, &hash);
        if connected > 0 {
            info!(parent = %hash, connected, "connected queued orphan blocks");
        }
        Ok(AddStatus::Added)
    }

    fn add_genesis_locked(
        &self,
        state: &mut ChainState,
        block: Block,
    ) -> Result<AddStatus, LedgerError> {
        if state.genesis_exists() {
            return Err(LedgerError::GenesisExists);
        }
        let hash = block.hash.clone();
        let creator = block.creator.clone();
        state.insert_block(block, 0);
        state.head = Some(hash.clone());
        state.credit(&creator, GENESIS_ENDOWMENT);
        self.seen.insert(hash.clone(), ());
        info!(block = %hash, creator = %creator, endowment = GENESIS_ENDOWMENT, "genesis block accepted");

        self.drain_orphans_locked(state, &hash);
        Ok(AddStatus::Added)
    }

    /// Switches the head from `old_head` to `new_head`: the abandoned
    /// suffix is rolled back in reverse (its transactions return to the
    /// pending pool), the adopted suffix is applied in order. Runs with
    /// the write lock already held, so no reader ever observes the
    /// half-rolled state.
    fn reorg_locked(&self, state: &mut ChainState, old_head: &str, new_head: &str) {
        let old_chain = state.ancestry(old_head);
        let new_chain = state.ancestry(new_head);

        let mut common = 0;
        while common < old_chain.len()
            && common < new_chain.len()
            && old_chain[common] == new_chain[common]
        {
            common += 1;
        }

        for hash in old_chain[common..].iter().rev() {
            if let Some(block) = state.blocks.get(hash).cloned() {
                state.revert_block_transactions(&block);
            }
        }
        for hash in &new_chain[common..] {
            if let Some(block) = state.blocks.get(hash).cloned() {
                state.apply_block_transactions(&block);
            }
        }
        state.head = Some(new_head.to_string());

        info!(
            from = %old_head,
            to = %new_head,
            rolled_back = old_chain.len() - common,
            applied = new_chain.len() - common,
            "chain reorganized"
        );
    }

    /// Re-admits every parked block whose parent just landed. Recursion
    /// through `add_block_locked` drains whole descendant chains.
    fn drain_orphans_locked(&self, state: &mut ChainState, parent: &str) -> usize {
        let children = self.orphans.lock().take_children(parent);
        let mut connected = 0;
        for child in children {
            let child_hash = child.hash.clone();
            match self.add_block_locked(state, child) {
                Ok(AddStatus::Added) => connected += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(block = %child_hash, error = %e, "queued orphan rejected on connection")
                }
            }
        }
        connected
    }

    /// Admits a transaction into the pending pool: dedup, structural
    /// checks, then coverage against confirmed balances. Pending spends
    /// are deliberately not projected; two submissions can both clear
    /// here and fight it out at block-inclusion time.
    pub fn add_transaction(&self, tx: Transaction) -> Result<AddStatus, LedgerError> {
        if self.seen.contains_key(&tx.id) {
            return Ok(AddStatus::AlreadyKnown);
        }
        if !tx.is_well_formed() {
            return Err(LedgerError::InvalidTransaction);
        }

        let mut state = self.state.write();
        if state.pending.contains_key(&tx.id) {
            return Ok(AddStatus::AlreadyKnown);
        }
        let available = state.balance_of(&tx.sender);
        let requested = amount_i64(tx.amount);
        if available < requested {
            return Err(LedgerError::InsufficientBalance {
                sender: tx.sender.clone(),
                available,
                requested: tx.amount,
            });
        }

        self.seen.insert(tx.id.clone(), ());
        debug!(tx = %tx.id, sender = %tx.sender, amount = tx.amount, "transaction pooled");
        state.pending.insert(tx.id.clone(), tx);
        Ok(AddStatus::Added)
    }

    // -- Queries -----------------------------------------------------------

    pub fn inventory(&self) -> InventoryView {
        let state = self.state.read();
        InventoryView {
            blocks: state.blocks.keys().cloned().collect(),
            transactions: state.pending_sorted(),
            balances: state.balances.clone(),
            consensus: state.summary(),
        }
    }

    pub fn consensus_summary(&self) -> ConsensusSummary {
        self.state.read().summary()
    }

    pub fn consensus_view(&self) -> ConsensusView {
        let state = self.state.read();
        let summary = state.summary();
        let head_block = state
            .head
            .as_deref()
            .and_then(|h| state.blocks.get(h).cloned());
        ConsensusView {
            current_head: summary.current_head,
            chain_height: summary.chain_height,
            head_block,
            total_blocks: summary.total_blocks,
            forked_blocks: summary.forked_blocks,
        }
    }

    pub fn block(&self, hash: &str) -> Option<Block> {
        self.state.read().blocks.get(hash).cloned()
    }

    pub fn all_blocks(&self) -> Vec<Block> {
        self.state.read().blocks.values().cloned().collect()
    }

    pub fn main_chain(&self) -> Vec<Block> {
        self.state.read().main_chain()
    }

    pub fn head(&self) -> Option<String> {
        self.state.read().head.clone()
    }

    pub fn balances(&self) -> std::collections::HashMap<String, i64> {
        self.state.read().balances.clone()
    }

    pub fn balance_of(&self, account: &str) -> i64 {
        self.state.read().balance_of(account)
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.state.read().pending_sorted()
    }

    pub fn pending_len(&self) -> usize {
        self.state.read().pending.len()
    }

    pub fn total_blocks(&self) -> usize {
        self.state.read().blocks.len()
    }

    pub fn has_blocks(&self) -> bool {
        self.total_blocks() > 0
    }

    /// Sum of all balances; the conservation audit used by tests and the
    /// occasional curious operator.
    pub fn total_balance(&self) -> i64 {
        self.state.read().total_balance()
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.lock().len()
    }
}
