//! # Transactions
//!
//! A transfer of coins between two node ids. Transactions are immutable
//! once they enter the pending pool; their canonical JSON encoding is the
//! Merkle-leaf input, so the field order declared here is consensus
//! material and must never be reordered.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single value transfer.
///
/// Wire form is camelCase-free (every field is one word) compact JSON in
/// declared order:
/// `{"id":…,"sender":…,"receiver":…,"amount":…,"timestamp":…}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Opaque unique id (UUID v4 for locally created transactions).
    pub id: String,
    /// Node id of the paying party.
    pub sender: String,
    /// Node id of the receiving party.
    pub receiver: String,
    /// Transfer amount. Zero is invalid; the type rules out negatives.
    pub amount: u64,
    /// Creation time, unix milliseconds.
    pub timestamp: i64,
}

impl Transaction {
    /// Creates a new transaction with a fresh UUID and the current time.
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>, amount: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Canonical compact JSON encoding, the Merkle-leaf preimage.
    ///
    /// `serde_json` emits struct fields in declaration order with no
    /// whitespace, which is exactly the stability this needs.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Structural validity: non-empty parties and id, positive amount.
    /// Balance coverage is the ledger's job, not the transaction's.
    pub fn is_well_formed(&self) -> bool {
        !self.id.is_empty()
            && !self.sender.is_empty()
            && !self.receiver.is_empty()
            && self.amount > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_fills_id_and_timestamp() {
        let tx = Transaction::new("alice", "bob", 10);
        assert!(!tx.id.is_empty());
        assert!(tx.timestamp > 0);
        assert!(tx.is_well_formed());
    }

    #[test]
    fn canonical_json_is_pinned() {
        // Byte-exact: this string feeds the Merkle tree on every node.
        let tx = Transaction {
            id: "11111111-1111-1111-1111-111111111111".into(),
            sender: "a".repeat(32),
            receiver: "b".repeat(32),
            amount: 25,
            timestamp: 1_700_000_000_000,
        };
        assert_eq!(
            tx.canonical_json(),
            format!(
                "{{\"id\":\"11111111-1111-1111-1111-111111111111\",\
                 \"sender\":\"{}\",\"receiver\":\"{}\",\
                 \"amount\":25,\"timestamp\":1700000000000}}",
                "a".repeat(32),
                "b".repeat(32)
            )
        );
    }

    #[test]
    fn zero_amount_is_malformed() {
        let tx = Transaction::new("alice", "bob", 0);
        assert!(!tx.is_well_formed());
    }

    #[test]
    fn empty_parties_are_malformed() {
        let mut tx = Transaction::new("alice", "bob", 5);
        tx.sender.clear();
        assert!(!tx.is_well_formed());

        let mut tx = Transaction::new("alice", "bob", 5);
        tx.receiver.clear();
        assert!(!tx.is_well_formed());
    }

    #[test]
    fn serde_roundtrip_preserves_fields() {
        let tx = Transaction::new("alice", "bob", 7);
        let json = serde_json::to_string(&tx).unwrap();
        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(tx, back);
    }
}
