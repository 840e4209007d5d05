//! # Node Identity
//!
//! A node is identified by 16 random bytes, hex-encoded to a 32-character
//! id that is stable for the process lifetime. The first hex character of
//! the id is the node's **group**, the partition used to balance internal
//! versus external connections in the overlay.

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Number of random bytes behind a node id (32 hex characters).
const NODE_ID_BYTES: usize = 16;

/// Returns the group character of a node id: its first hex character.
///
/// An empty id maps to `'0'` so malformed peers land in a real group
/// instead of panicking the classifier.
pub fn group_of(node_id: &str) -> char {
    node_id.chars().next().unwrap_or('0').to_ascii_lowercase()
}

/// The local node's identity: id, observed address, and listening port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// 32 lowercase hex characters from 16 random bytes.
    pub node_id: String,
    /// The IP other nodes can reach us on (public, or 127.0.0.1 in
    /// localhost mode).
    pub ip: String,
    /// TCP port the HTTP server listens on.
    pub port: u16,
}

impl NodeIdentity {
    /// Generates a fresh random identity for the given address.
    pub fn generate(ip: impl Into<String>, port: u16) -> Self {
        let mut bytes = [0u8; NODE_ID_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self {
            node_id: hex::encode(bytes),
            ip: ip.into(),
            port,
        }
    }

    /// The node's group: first hex character of the id.
    pub fn group(&self) -> char {
        group_of(&self.node_id)
    }

    /// `ip:port` form used for outbound requests and peer comparison.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}
