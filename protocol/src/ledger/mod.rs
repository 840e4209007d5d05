//! # Ledger
//!
//! Chain state and the rules that govern it.
//!
//! ```text
//! transaction.rs — the transfer type and its canonical encoding
//! block.rs       — the block type, preimage, and proof-of-work identity
//! inventory.rs   — ChainState: blocks, heights, head, pending pool, balances
//! consensus.rs   — Ledger: admission, fork choice, reorganization, queries
//! ```
//!
//! The [`Ledger`] performs no I/O. Flooding accepted blocks and
//! transactions to peers is the caller's job, keyed off the returned
//! [`AddStatus`]; receivers deduplicate by the monotonic seen-set, so
//! over-delivery is harmless.

pub mod block;
pub mod consensus;
pub mod inventory;
pub mod transaction;

pub use block::Block;
pub use consensus::{AddStatus, Ledger, LedgerError};
pub use inventory::ChainState;
pub use transaction::Transaction;
