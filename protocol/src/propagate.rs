//! # Propagator
//!
//! Best-effort flooding of blocks, transactions, and peer lists to the
//! active set. Callers fire and forget; each broadcast runs on its own
//! task, fans out in parallel under the shared 5 s request deadline, and
//! settles peer health with the overlay afterwards. Receivers deduplicate
//! by their seen-set, so a redelivered message costs one table lookup.
//!
//! Failure policy per peer and round: a failed delivery burns one retry
//! credit and joins a single bulk retry 5 s later. Failing that retry, or
//! running out of credits, evicts the peer and triggers the overlay's
//! replacement search.

use std::sync::Arc;

use futures::future::join_all;
use rand::seq::SliceRandom;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::{MAX_PEER_RETRIES, PROPAGATION_RETRY_DELAY};
use crate::ledger::{Block, Ledger, Transaction};
use crate::net::wire::PeerAddr;
use crate::net::NodeClient;
use crate::overlay::OverlayManager;

/// One message kind fanned out to the overlay.
#[derive(Debug, Clone)]
enum Payload {
    Block(Block),
    Transaction(Transaction),
    Peers(Vec<PeerAddr>),
}

impl Payload {
    fn kind(&self) -> &'static str {
        match self {
            Payload::Block(_) => "block",
            Payload::Transaction(_) => "transaction",
            Payload::Peers(_) => "peers",
        }
    }
}

/// Fan-out engine over the overlay's active connections. Cheap to clone —
/// each broadcast clones it into its own task.
#[derive(Clone)]
pub struct Propagator {
    client: NodeClient,
    overlay: Arc<OverlayManager>,
}

impl Propagator {
    pub fn new(client: NodeClient, overlay: Arc<OverlayManager>) -> Self {
        Self { client, overlay }
    }

    /// Floods a block to all active peers. Returns immediately.
    pub fn broadcast_block(&self, block: Block) {
        self.spawn(Payload::Block(block));
    }

    /// Floods a transaction to all active peers. Returns immediately.
    pub fn broadcast_transaction(&self, tx: Transaction) {
        self.spawn(Payload::Transaction(tx));
    }

    /// Pushes our current active peer list to every active peer. Driven by
    /// the 45 s timer.
    pub fn broadcast_peers(&self) {
        let peers = self.overlay.active_peers();
        if peers.is_empty() {
            return;
        }
        self.spawn(Payload::Peers(peers));
    }

    /// One round of push-based anti-entropy: the full inventory goes to a
    /// single randomly chosen active peer. Flooding already reached the
    /// well-connected; this catches the node that missed a message while
    /// it was being evicted and replaced somewhere else.
    pub async fn sync_inventory_once(&self, ledger: &Ledger) {
        let mut targets = self.overlay.active_targets();
        if targets.is_empty() {
            return;
        }
        targets.shuffle(&mut rand::thread_rng());
        let (node_id, addr) = targets.swap_remove(0);

        let blocks = ledger.all_blocks();
        let transactions = ledger.pending_transactions();
        match self.client.sync_inventory(&addr, blocks, transactions).await {
            Ok(ack) => {
                self.overlay.mark_success(&node_id);
                if ack.added_blocks + ack.added_transactions > 0 {
                    debug!(
                        peer = %node_id,
                        added_blocks = ack.added_blocks,
                        added_transactions = ack.added_transactions,
                        "inventory sync delivered new data"
                    );
                }
            }
            Err(e) => {
                self.overlay.record_failure(&node_id);
                debug!(peer = %node_id, error = %e, "inventory sync failed");
            }
        }
    }

    fn spawn(&self, payload: Payload) {
        let this = self.clone();
        tokio::spawn(async move {
            this.deliver(payload).await;
        });
    }

    async fn deliver(&self, payload: Payload) {
        let targets = self.overlay.active_targets();
        if targets.is_empty() {
            debug!(kind = payload.kind(), "no active peers, nothing to propagate");
            return;
        }

        let failed = self.send_round(&targets, &payload).await;
        if failed.is_empty() {
            return;
        }

        // First failure: burn a retry credit. Peers already out of credit
        // are evicted now; the rest get one bulk retry.
        let mut retryable = Vec::new();
        for (node_id, addr) in failed {
            let retries = self.overlay.record_failure(&node_id);
            if retries >= MAX_PEER_RETRIES {
                warn!(peer = %node_id, retries, "retry budget exhausted, evicting");
                self.overlay.evict_and_replace(&node_id).await;
            } else {
                retryable.push((node_id, addr));
            }
        }
        if retryable.is_empty() {
            return;
        }

        sleep(PROPAGATION_RETRY_DELAY).await;
        let failed_again = self.send_round(&retryable, &payload).await;
        for (node_id, _) in failed_again {
            warn!(peer = %node_id, kind = payload.kind(), "bulk retry failed, evicting");
            self.overlay.record_failure(&node_id);
            self.overlay.evict_and_replace(&node_id).await;
        }
    }

    /// Sends `payload` to every target in parallel. Successes are settled
    /// with the overlay; failures are returned for the retry pass.
    async fn send_round(
        &self,
        targets: &[(String, String)],
        payload: &Payload,
    ) -> Vec<(String, String)> {
        let attempts = targets.iter().map(|(node_id, addr)| async move {
            let ok = match payload {
                Payload::Block(block) => self.client.send_block(addr, block).await.is_ok(),
                Payload::Transaction(tx) => self.client.send_transaction(addr, tx).await.is_ok(),
                Payload::Peers(peers) => {
                    self.client.sync_peers(addr, peers.clone()).await.is_ok()
                }
            };
            (node_id.clone(), addr.clone(), ok)
        });

        let mut failed = Vec::new();
        for (node_id, addr, ok) in join_all(attempts).await {
            if ok {
                self.overlay.mark_success(&node_id);
            } else {
                debug!(peer = %node_id, kind = payload.kind(), "propagation failed");
                failed.push((node_id, addr));
            }
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::NodeIdentity;

    fn propagator() -> Arc<Propagator> {
        let identity = NodeIdentity {
            node_id: "a".repeat(32),
            ip: "127.0.0.1".into(),
            port: 7100,
        };
        let client = NodeClient::new().unwrap();
        let overlay = Arc::new(OverlayManager::new(identity, client.clone()));
        Arc::new(Propagator::new(client, overlay))
    }

    #[tokio::test]
    async fn empty_overlay_is_a_noop() {
        let p = propagator();
        // Nothing to deliver to; must return without touching the network.
        p.deliver(Payload::Peers(vec![])).await;
    }

    #[tokio::test]
    async fn dead_peer_burns_retry_credit() {
        let p = propagator();
        let dead = PeerAddr {
            ip: "127.0.0.1".into(),
            port: 1,
            node_id: "b".repeat(32),
        };
        // Admit the dead peer directly so the round targets it.
        p.overlay.learn_peer(&dead);
        assert!(!p.overlay.try_establish_connection(&dead).await);

        // No active targets since establish failed; a round over an
        // explicit target still reports the failure.
        let failed = p
            .send_round(
                &[(dead.node_id.clone(), dead.addr())],
                &Payload::Transaction(Transaction::new("x", "y", 1)),
            )
            .await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, dead.node_id);
    }
}
