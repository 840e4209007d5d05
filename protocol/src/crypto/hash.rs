//! # Hashing Utilities
//!
//! SHA-256 is the only digest in floodnet. Block identity, transaction
//! Merkle leaves, and the proof-of-work target all run through the same
//! `sha256_hex` primitive so that every node derives byte-identical
//! results from byte-identical input.
//!
//! ## Canonical input is the caller's problem
//!
//! These functions hash whatever bytes they are handed. The canonical
//! encodings (compact JSON in declared field order) live next to the
//! [`Transaction`](crate::ledger::Transaction) and
//! [`Block`](crate::ledger::Block) types; the pinned fixtures over there
//! are what actually protect consensus from encoding drift.

use sha2::{Digest, Sha256};

use crate::ledger::Transaction;

/// Compute the SHA-256 hash of the input and return it hex-encoded.
///
/// Hex strings rather than byte arrays, because hashes live their whole
/// life inside JSON payloads and map keys here; decoding them back to
/// bytes would just be churn.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Returns `true` if `hash` carries at least `difficulty` leading hex zeros.
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

/// Compute the Merkle root of a transaction sequence.
///
/// Leaves are `sha256_hex` digests of each transaction's canonical JSON.
/// While more than one node remains, an odd level duplicates its last
/// element, then adjacent pairs are combined as `sha256_hex(left || right)`
/// over the hex strings. The empty sequence has the empty root: a block
/// with no transactions commits to nothing.
///
/// A single transaction's root is its own leaf hash; there is no
/// self-pairing step, so order and membership are still fully committed.
pub fn merkle_root(txs: &[Transaction]) -> String {
    if txs.is_empty() {
        return String::new();
    }

    let mut level: Vec<String> = txs
        .iter()
        .map(|tx| sha256_hex(tx.canonical_json().as_bytes()))
        .collect();

    while level.len() > 1 {
        if level.len() % 2 != 0 {
            // Odd level: duplicate the last leaf, Bitcoin-style.
            level.push(level.last().cloned().unwrap_or_default());
        }
        level = level
            .chunks(2)
            .map(|pair| sha256_hex(format!("{}{}", pair[0], pair[1]).as_bytes()))
            .collect();
    }

    level.remove(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Transaction;

    fn fixture_tx(id: &str, sender: &str, receiver: &str, amount: u64, ts: i64) -> Transaction {
        Transaction {
            id: id.to_string(),
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            amount,
            timestamp: ts,
        }
    }

    fn tx1() -> Transaction {
        fixture_tx(
            "11111111-1111-1111-1111-111111111111",
            &"a".repeat(32),
            &"b".repeat(32),
            25,
            1_700_000_000_000,
        )
    }

    fn tx2() -> Transaction {
        fixture_tx(
            "22222222-2222-2222-2222-222222222222",
            &"b".repeat(32),
            &"c".repeat(32),
            10,
            1_700_000_000_100,
        )
    }

    fn tx3() -> Transaction {
        fixture_tx(
            "33333333-3333-3333-3333-333333333333",
            &"c".repeat(32),
            &"d".repeat(32),
            5,
            1_700_000_000_200,
        )
    }

    #[test]
    fn sha256_known_vector() {
        // SHA-256 of the empty string, the vector everyone pins.
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256_is_deterministic() {
        assert_eq!(sha256_hex(b"floodnet"), sha256_hex(b"floodnet"));
        assert_ne!(sha256_hex(b"floodnet"), sha256_hex(b"Floodnet"));
    }

    #[test]
    fn difficulty_check_counts_leading_zeros() {
        assert!(meets_difficulty("0000ab", 4));
        assert!(meets_difficulty("0000ab", 3));
        assert!(!meets_difficulty("000fab", 4));
        assert!(!meets_difficulty("00", 4));
        assert!(meets_difficulty("anything", 0));
    }

    #[test]
    fn merkle_of_empty_is_empty() {
        assert_eq!(merkle_root(&[]), "");
    }

    #[test]
    fn merkle_single_leaf_pinned() {
        // Pinned against an independent SHA-256 implementation. If this
        // moves, the canonical transaction encoding moved with it.
        assert_eq!(
            merkle_root(&[tx1()]),
            "93425d8196794d8bd203789d4c9a3f8853ce5af5727b19a8e5a1d295d7631566"
        );
    }

    #[test]
    fn merkle_two_leaves_pinned() {
        assert_eq!(
            merkle_root(&[tx1(), tx2()]),
            "306c33ca31279f871d423f2f6551785a1af73cb292aaab042171c2454ebf3c2c"
        );
    }

    #[test]
    fn merkle_odd_level_duplicates_last() {
        // Three leaves: [l1, l2, l3] pads to [l1, l2, l3, l3].
        assert_eq!(
            merkle_root(&[tx1(), tx2(), tx3()]),
            "6efd71774c4537dc1d6b5f16c591ebcc83eaccb8a1e0158eb9fa08ee47c22c67"
        );
    }

    #[test]
    fn merkle_is_order_sensitive() {
        // Consensus depends on every node agreeing on transaction order.
        assert_ne!(merkle_root(&[tx1(), tx2()]), merkle_root(&[tx2(), tx1()]));
    }
}
