//! # Prometheus Metrics
//!
//! Operational metrics served at `GET /metrics` on the node's port.
//! Registered in a dedicated [`prometheus::Registry`] so they do not
//! collide with any default global registry consumers.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

use floodnet_protocol::{Ledger, OverlayManager};

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles wrap `Arc` internally) so it can be
/// shared across request handlers and background tasks.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Height of the current chain head.
    pub chain_height: IntGauge,
    /// Blocks stored, side branches included.
    pub total_blocks: IntGauge,
    /// Current size of the pending transaction pool.
    pub pending_transactions: IntGauge,
    /// Active overlay connections.
    pub active_connections: IntGauge,
    /// Known peers, active or not.
    pub known_peers: IntGauge,
    /// Total blocks accepted by this node.
    pub blocks_accepted_total: IntCounter,
    /// Total transactions accepted into the pending pool.
    pub transactions_accepted_total: IntCounter,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("floodnet".into()), None)
            .expect("failed to create prometheus registry");

        fn gauge(registry: &Registry, name: &str, help: &str) -> IntGauge {
            let g = IntGauge::new(name, help).expect("metric creation");
            registry.register(Box::new(g.clone())).expect("metric registration");
            g
        }

        fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
            let c = IntCounter::new(name, help).expect("metric creation");
            registry.register(Box::new(c.clone())).expect("metric registration");
            c
        }

        let chain_height = gauge(&registry, "chain_height", "Height of the current chain head");
        let total_blocks = gauge(
            &registry,
            "total_blocks",
            "Blocks stored, side branches included",
        );
        let pending_transactions = gauge(
            &registry,
            "pending_transactions",
            "Current size of the pending transaction pool",
        );
        let active_connections = gauge(
            &registry,
            "active_connections",
            "Active overlay connections",
        );
        let known_peers = gauge(&registry, "known_peers", "Known peers, active or not");
        let blocks_accepted_total = counter(
            &registry,
            "blocks_accepted_total",
            "Total blocks accepted by this node",
        );
        let transactions_accepted_total = counter(
            &registry,
            "transactions_accepted_total",
            "Total transactions accepted into the pending pool",
        );

        Self {
            registry,
            chain_height,
            total_blocks,
            pending_transactions,
            active_connections,
            known_peers,
            blocks_accepted_total,
            transactions_accepted_total,
        }
    }

    /// Refreshes every gauge from the live subsystems. Called after
    /// mutations and by the periodic workers.
    pub fn observe(&self, ledger: &Ledger, overlay: &OverlayManager) {
        let summary = ledger.consensus_summary();
        self.chain_height.set(summary.chain_height as i64);
        self.total_blocks.set(summary.total_blocks as i64);
        self.pending_transactions.set(ledger.pending_len() as i64);
        self.active_connections.set(overlay.active_len() as i64);
        self.known_peers.set(overlay.known_len() as i64);
    }

    /// Encodes all registered metrics into the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;
