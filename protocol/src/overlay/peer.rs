//! Peer bookkeeping: the in-memory record behind both overlay tables.

use std::time::{Duration, Instant};

use crate::identity::group_of;
use crate::net::wire::PeerAddr;

/// Everything the overlay tracks about one peer. The wire never sees this
/// type: addresses travel as [`PeerAddr`], while `last_seen` and `retries`
/// are local health state.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub node_id: String,
    pub ip: String,
    pub port: u16,
    /// First hex character of the node id.
    pub group: char,
    /// Monotonic timestamp of the last successful contact.
    pub last_seen: Instant,
    /// Consecutive failures since the last success.
    pub retries: u32,
}

impl PeerRecord {
    pub fn from_addr(peer: &PeerAddr) -> Self {
        Self {
            node_id: peer.node_id.clone(),
            ip: peer.ip.clone(),
            port: peer.port,
            group: group_of(&peer.node_id),
            last_seen: Instant::now(),
            retries: 0,
        }
    }

    /// `ip:port` request target.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn to_peer_addr(&self) -> PeerAddr {
        PeerAddr {
            ip: self.ip.clone(),
            port: self.port,
            node_id: self.node_id.clone(),
        }
    }

    /// Records a successful contact: fresh `last_seen`, retry budget back
    /// to zero.
    pub fn mark_alive(&mut self) {
        self.last_seen = Instant::now();
        self.retries = 0;
    }

    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}
