//! End-to-end consensus scenarios over the ledger engine, mined at
//! difficulty 1 so every test finds a nonce in a handful of attempts.
//! These mirror the situations a node actually faces on the network:
//! lone-genesis startup, plain transfers, overdrafts, equal-height forks,
//! longer-chain takeovers, and out-of-order block arrival.

use floodnet_protocol::config::{GENESIS_ENDOWMENT, ZERO_HASH};
use floodnet_protocol::crypto::meets_difficulty;
use floodnet_protocol::ledger::{AddStatus, Block, Ledger, LedgerError, Transaction};
use floodnet_protocol::miner::search_nonce;

const DIFFICULTY: usize = 1;

fn node(c: char) -> String {
    std::iter::repeat(c).take(32).collect()
}

fn tx(id: &str, sender: &str, receiver: &str, amount: u64, ts: i64) -> Transaction {
    Transaction {
        id: id.into(),
        sender: sender.into(),
        receiver: receiver.into(),
        amount,
        timestamp: ts,
    }
}

/// Mines a block on `parent` carrying `txs`, at test difficulty.
fn mine(parent: &str, creator: &str, txs: Vec<Transaction>, ts: i64) -> Block {
    let mut block = Block::candidate(parent, creator, ts, txs);
    search_nonce(&mut block, DIFFICULTY, u64::MAX).expect("difficulty 1 always solves");
    block
}

fn ledger_with_genesis(creator: &str) -> (Ledger, String) {
    let ledger = Ledger::new(DIFFICULTY);
    let genesis = Block::genesis(creator, 1_700_000_000_000);
    let hash = genesis.hash.clone();
    assert_eq!(ledger.add_block(genesis).unwrap(), AddStatus::Added);
    (ledger, hash)
}

// ---------------------------------------------------------------------------
// Startup and transfers
// ---------------------------------------------------------------------------

#[test]
fn standalone_node_starts_with_endowed_genesis() {
    let creator = node('a');
    let (ledger, genesis_hash) = ledger_with_genesis(&creator);

    let inventory = ledger.inventory();
    assert_eq!(inventory.blocks, vec![genesis_hash.clone()]);
    assert_eq!(inventory.balances.get(&creator), Some(&GENESIS_ENDOWMENT));
    assert_eq!(inventory.consensus.current_head, Some(genesis_hash));
    assert_eq!(inventory.consensus.chain_height, 0);
    assert_eq!(inventory.consensus.forked_blocks, 0);
}

#[test]
fn transfer_is_pooled_then_mined_into_the_chain() {
    let alice = node('a');
    let bob = node('b');
    let (ledger, genesis_hash) = ledger_with_genesis(&alice);

    let transfer = tx("t1", &alice, &bob, 30, 1);
    assert_eq!(ledger.add_transaction(transfer.clone()).unwrap(), AddStatus::Added);
    assert_eq!(ledger.pending_len(), 1);

    let block = mine(&genesis_hash, &alice, vec![transfer], 2);
    assert_eq!(ledger.add_block(block.clone()).unwrap(), AddStatus::Added);

    assert_eq!(ledger.balance_of(&alice), 70);
    assert_eq!(ledger.balance_of(&bob), 30);
    assert_eq!(ledger.pending_len(), 0);
    assert_eq!(ledger.consensus_summary().chain_height, 1);
    assert_eq!(ledger.head(), Some(block.hash));
    assert_eq!(ledger.total_balance(), GENESIS_ENDOWMENT);
}

#[test]
fn overdraft_transaction_is_rejected_without_side_effects() {
    let alice = node('a');
    let (ledger, _) = ledger_with_genesis(&alice);

    let pending_before = ledger.pending_len();
    let balances_before = ledger.balances();

    let overdraft = tx("t1", &alice, &node('c'), 200, 1);
    assert!(matches!(
        ledger.add_transaction(overdraft),
        Err(LedgerError::InsufficientBalance { .. })
    ));

    assert_eq!(ledger.pending_len(), pending_before);
    assert_eq!(ledger.balances(), balances_before);
}

#[test]
fn resubmitting_a_transaction_is_idempotent() {
    let alice = node('a');
    let (ledger, _) = ledger_with_genesis(&alice);

    let transfer = tx("t1", &alice, &node('b'), 10, 1);
    assert_eq!(ledger.add_transaction(transfer.clone()).unwrap(), AddStatus::Added);
    assert_eq!(
        ledger.add_transaction(transfer).unwrap(),
        AddStatus::AlreadyKnown
    );
    assert_eq!(ledger.pending_len(), 1);
}

#[test]
fn resubmitting_a_block_changes_nothing() {
    let alice = node('a');
    let (ledger, genesis_hash) = ledger_with_genesis(&alice);

    let transfer = tx("t1", &alice, &node('b'), 10, 1);
    ledger.add_transaction(transfer.clone()).unwrap();
    let block = mine(&genesis_hash, &alice, vec![transfer], 2);

    assert_eq!(ledger.add_block(block.clone()).unwrap(), AddStatus::Added);
    let balances = ledger.balances();
    let head = ledger.head();

    assert_eq!(ledger.add_block(block).unwrap(), AddStatus::AlreadyKnown);
    assert_eq!(ledger.balances(), balances);
    assert_eq!(ledger.head(), head);
}

// ---------------------------------------------------------------------------
// Forks
// ---------------------------------------------------------------------------

#[test]
fn equal_height_fork_resolves_to_smaller_hash() {
    let alice = node('a');
    let (ledger, genesis_hash) = ledger_with_genesis(&alice);

    // Two competitors off the same parent with disjoint transactions.
    let block_a = mine(
        &genesis_hash,
        &alice,
        vec![tx("ta", &alice, &node('b'), 10, 1)],
        2,
    );
    let block_b = mine(
        &genesis_hash,
        &alice,
        vec![tx("tb", &alice, &node('c'), 20, 1)],
        3,
    );

    ledger.add_block(block_a.clone()).unwrap();
    ledger.add_block(block_b.clone()).unwrap();

    let winner = if block_a.hash < block_b.hash {
        &block_a
    } else {
        &block_b
    };
    let loser = if block_a.hash < block_b.hash {
        &block_b
    } else {
        &block_a
    };

    assert_eq!(ledger.head(), Some(winner.hash.clone()));

    // The loser is stored but off the main chain.
    assert!(ledger.block(&loser.hash).is_some());
    let main: Vec<String> = ledger.main_chain().iter().map(|b| b.hash.clone()).collect();
    assert_eq!(main, vec![genesis_hash, winner.hash.clone()]);
    assert_eq!(ledger.consensus_summary().forked_blocks, 1);

    // Balances follow the winner; the loser's transfer returned to (or
    // stayed in) the pending pool domain, not the balance table.
    assert_eq!(ledger.total_balance(), GENESIS_ENDOWMENT);
    let winner_tx = &winner.transactions[0];
    assert_eq!(
        ledger.balance_of(&winner_tx.receiver),
        winner_tx.amount as i64
    );
}

#[test]
fn longer_chain_takes_over_and_replays_balances() {
    let alice = node('a');
    let (ledger, genesis_hash) = ledger_with_genesis(&alice);

    // Chain A: one block paying bob.
    let a1 = mine(
        &genesis_hash,
        &alice,
        vec![tx("ta", &alice, &node('b'), 10, 1)],
        2,
    );
    ledger.add_block(a1.clone()).unwrap();
    assert_eq!(ledger.head(), Some(a1.hash.clone()));
    assert_eq!(ledger.balance_of(&node('b')), 10);

    // Chain B: two empty blocks off genesis, strictly higher. At height 1
    // the tie may fall either way; b2 settles it at height 2.
    let b1 = mine(&genesis_hash, &alice, Vec::new(), 3);
    let b2 = mine(&b1.hash, &alice, Vec::new(), 4);
    ledger.add_block(b1.clone()).unwrap();
    let interim = ledger.head().unwrap();
    assert!(interim == a1.hash || interim == b1.hash);

    ledger.add_block(b2.clone()).unwrap();
    assert_eq!(ledger.head(), Some(b2.hash.clone()));
    assert_eq!(ledger.consensus_summary().chain_height, 2);

    // Chain B carries no transfers, so balances equal genesis-only state
    // and the abandoned transfer is pending again.
    assert_eq!(ledger.balance_of(&alice), GENESIS_ENDOWMENT);
    assert_eq!(ledger.balance_of(&node('b')), 0);
    assert!(ledger
        .pending_transactions()
        .iter()
        .any(|t| t.id == "ta"));
    assert_eq!(ledger.total_balance(), GENESIS_ENDOWMENT);
}

#[test]
fn reorg_restores_abandoned_transactions_to_pending() {
    let alice = node('a');
    let bob = node('b');
    let (ledger, genesis_hash) = ledger_with_genesis(&alice);

    let paid = tx("paid", &alice, &bob, 25, 1);
    ledger.add_transaction(paid.clone()).unwrap();
    let a1 = mine(&genesis_hash, &alice, vec![paid.clone()], 2);
    ledger.add_block(a1).unwrap();
    assert_eq!(ledger.pending_len(), 0);

    // A two-block empty branch wins.
    let b1 = mine(&genesis_hash, &bob, Vec::new(), 3);
    let b2 = mine(&b1.hash, &bob, Vec::new(), 4);
    ledger.add_block(b1).unwrap();
    ledger.add_block(b2.clone()).unwrap();

    assert_eq!(ledger.head(), Some(b2.hash));
    // The abandoned transfer is eligible for the next mined block again.
    let pending = ledger.pending_transactions();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0], paid);
    assert_eq!(ledger.balance_of(&bob), 0);
}

// ---------------------------------------------------------------------------
// Out-of-order arrival
// ---------------------------------------------------------------------------

#[test]
fn blocks_arriving_in_reverse_order_still_connect() {
    let alice = node('a');
    let (ledger, genesis_hash) = ledger_with_genesis(&alice);

    let c1 = mine(&genesis_hash, &alice, Vec::new(), 2);
    let c2 = mine(&c1.hash, &alice, Vec::new(), 3);
    let c3 = mine(&c2.hash, &alice, Vec::new(), 4);

    assert_eq!(ledger.add_block(c3.clone()).unwrap(), AddStatus::Orphaned);
    assert_eq!(ledger.add_block(c2.clone()).unwrap(), AddStatus::Orphaned);
    assert_eq!(ledger.orphan_count(), 2);
    assert_eq!(ledger.consensus_summary().chain_height, 0);

    // The missing link arrives; the whole chain snaps into place.
    assert_eq!(ledger.add_block(c1).unwrap(), AddStatus::Added);
    assert_eq!(ledger.orphan_count(), 0);
    assert_eq!(ledger.head(), Some(c3.hash));
    assert_eq!(ledger.consensus_summary().chain_height, 3);
    assert_eq!(ledger.consensus_summary().forked_blocks, 0);
}

#[test]
fn orphan_with_spending_transactions_validates_on_connection() {
    let alice = node('a');
    let bob = node('b');
    let (ledger, genesis_hash) = ledger_with_genesis(&alice);

    let c1 = mine(
        &genesis_hash,
        &alice,
        vec![tx("t1", &alice, &bob, 40, 1)],
        2,
    );
    // Spends bob's 40 from c1, so it only validates once c1 is applied.
    let c2 = mine(&c1.hash, &bob, vec![tx("t2", &bob, &alice, 15, 2)], 3);

    assert_eq!(ledger.add_block(c2.clone()).unwrap(), AddStatus::Orphaned);
    assert_eq!(ledger.add_block(c1).unwrap(), AddStatus::Added);

    assert_eq!(ledger.head(), Some(c2.hash));
    assert_eq!(ledger.balance_of(&alice), 75);
    assert_eq!(ledger.balance_of(&bob), 25);
    assert_eq!(ledger.total_balance(), GENESIS_ENDOWMENT);
}

// ---------------------------------------------------------------------------
// Invariants
// ---------------------------------------------------------------------------

#[test]
fn conservation_holds_across_a_busy_session() {
    let alice = node('a');
    let bob = node('b');
    let carol = node('c');
    let (ledger, genesis_hash) = ledger_with_genesis(&alice);

    let b1 = mine(
        &genesis_hash,
        &alice,
        vec![
            tx("t1", &alice, &bob, 40, 1),
            tx("t2", &alice, &carol, 10, 2),
        ],
        3,
    );
    ledger.add_block(b1.clone()).unwrap();
    assert_eq!(ledger.total_balance(), GENESIS_ENDOWMENT);

    let b2 = mine(&b1.hash, &bob, vec![tx("t3", &bob, &carol, 5, 4)], 5);
    ledger.add_block(b2.clone()).unwrap();
    assert_eq!(ledger.total_balance(), GENESIS_ENDOWMENT);

    // A competing branch forces a reorg; the books must still balance.
    let f1 = mine(&genesis_hash, &carol, Vec::new(), 6);
    let f2 = mine(&f1.hash, &carol, Vec::new(), 7);
    let f3 = mine(&f2.hash, &carol, Vec::new(), 8);
    for block in [f1, f2, f3] {
        ledger.add_block(block).unwrap();
        assert_eq!(ledger.total_balance(), GENESIS_ENDOWMENT);
    }
    assert_eq!(ledger.consensus_summary().chain_height, 3);
}

#[test]
fn every_stored_block_satisfies_its_proof_of_work() {
    let alice = node('a');
    let (ledger, genesis_hash) = ledger_with_genesis(&alice);

    let b1 = mine(&genesis_hash, &alice, Vec::new(), 2);
    let b2 = mine(&b1.hash, &alice, Vec::new(), 3);
    ledger.add_block(b1).unwrap();
    ledger.add_block(b2).unwrap();

    for block in ledger.all_blocks() {
        if block.is_genesis {
            continue;
        }
        assert!(meets_difficulty(&block.compute_hash(), DIFFICULTY));
        assert_eq!(block.compute_hash(), block.hash);
    }
}

#[test]
fn main_chain_walks_from_genesis_to_head() {
    let alice = node('a');
    let (ledger, genesis_hash) = ledger_with_genesis(&alice);

    let b1 = mine(&genesis_hash, &alice, Vec::new(), 2);
    let b2 = mine(&b1.hash, &alice, Vec::new(), 3);
    ledger.add_block(b1.clone()).unwrap();
    ledger.add_block(b2.clone()).unwrap();

    let chain = ledger.main_chain();
    let hashes: Vec<&str> = chain.iter().map(|b| b.hash.as_str()).collect();
    assert_eq!(hashes, vec![genesis_hash.as_str(), b1.hash.as_str(), b2.hash.as_str()]);
    assert!(chain[0].is_genesis);
    assert_eq!(chain[0].previous_hash, ZERO_HASH);
    for pair in chain.windows(2) {
        assert_eq!(pair[1].previous_hash, pair[0].hash);
    }
}
