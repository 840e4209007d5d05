//! # Overlay Manager
//!
//! Owns the two peer tables and every rule about who gets a connection
//! slot. Slots are split by group: up to four peers whose node id starts
//! with our own hex character (internal) and four from the rest of the id
//! space (external). The caps are re-checked at intent, after the ping,
//! and at exchange acceptance, because discovery runs concurrently and a
//! slot that looked free before an await may be gone after it.
//!
//! Locks are never held across an await: every network call works on a
//! snapshot and re-validates under the lock when it writes back.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::config::{
    MAX_EXTERNAL_CONNECTIONS, MAX_INTERNAL_CONNECTIONS, MAX_PEER_RETRIES, PEER_TIMEOUT,
};
use crate::identity::NodeIdentity;
use crate::ledger::{Block, Transaction};
use crate::net::wire::{GroupCounts, PeerAddr, RegisterRequest};
use crate::net::NodeClient;
use crate::overlay::PeerRecord;

/// What bootstrap brought home: how many seeds answered, plus their
/// inventory for the caller to feed through the ledger.
#[derive(Debug, Default)]
pub struct BootstrapReport {
    pub connected: usize,
    pub blocks: Vec<Block>,
    pub transactions: Vec<Transaction>,
}

/// Peer discovery, health, and connection-cap enforcement.
pub struct OverlayManager {
    identity: NodeIdentity,
    client: NodeClient,
    /// Every peer we have ever learned about (and not yet expired).
    known: RwLock<HashMap<String, PeerRecord>>,
    /// Peers that answered `/ping` and receive our floods.
    active: RwLock<HashMap<String, PeerRecord>>,
    /// Single-flight guard for the exchange loop: a slow tick makes the
    /// next one skip instead of stack.
    exchange_in_flight: AtomicBool,
}

impl OverlayManager {
    pub fn new(identity: NodeIdentity, client: NodeClient) -> Self {
        Self {
            identity,
            client,
            known: RwLock::new(HashMap::new()),
            active: RwLock::new(HashMap::new()),
            exchange_in_flight: AtomicBool::new(false),
        }
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    fn register_request(&self) -> RegisterRequest {
        RegisterRequest {
            node_id: self.identity.node_id.clone(),
            ip: self.identity.ip.clone(),
            port: self.identity.port,
        }
    }

    // -- Group accounting --------------------------------------------------

    fn is_internal(&self, group: char) -> bool {
        group == self.identity.group()
    }

    fn counts_locked(active: &HashMap<String, PeerRecord>, own_group: char) -> GroupCounts {
        let internal = active.values().filter(|p| p.group == own_group).count();
        GroupCounts {
            internal,
            external: active.len() - internal,
        }
    }

    pub fn group_counts(&self) -> GroupCounts {
        Self::counts_locked(&self.active.read(), self.identity.group())
    }

    /// Intent-time capacity check. Advisory only; admission re-checks
    /// under the write lock.
    pub fn has_capacity_for(&self, group: char) -> bool {
        let counts = self.group_counts();
        if self.is_internal(group) {
            counts.internal < MAX_INTERNAL_CONNECTIONS
        } else {
            counts.external < MAX_EXTERNAL_CONNECTIONS
        }
    }

    pub fn caps_saturated(&self) -> bool {
        let counts = self.group_counts();
        counts.internal >= MAX_INTERNAL_CONNECTIONS && counts.external >= MAX_EXTERNAL_CONNECTIONS
    }

    // -- Table maintenance -------------------------------------------------

    fn is_self(&self, peer: &PeerAddr) -> bool {
        peer.node_id == self.identity.node_id
            || (peer.ip == self.identity.ip && peer.port == self.identity.port)
    }

    /// Records a peer in the known table. Returns `true` when it is new.
    pub fn learn_peer(&self, peer: &PeerAddr) -> bool {
        if self.is_self(peer) || peer.node_id.is_empty() {
            return false;
        }
        let mut known = self.known.write();
        if known.contains_key(&peer.node_id) {
            false
        } else {
            known.insert(peer.node_id.clone(), PeerRecord::from_addr(peer));
            true
        }
    }

    pub fn learn_peers(&self, peers: &[PeerAddr]) -> usize {
        peers.iter().filter(|p| self.learn_peer(p)).count()
    }

    pub fn is_active(&self, node_id: &str) -> bool {
        self.active.read().contains_key(node_id)
    }

    /// Inserts a peer into the active set iff its group class still has a
    /// free slot. The count and the insert share one write lock, which is
    /// what makes the cap race-free.
    fn admit_active(&self, record: PeerRecord) -> bool {
        let own_group = self.identity.group();
        let mut active = self.active.write();
        if active.contains_key(&record.node_id) {
            return true;
        }
        let counts = Self::counts_locked(&active, own_group);
        let fits = if record.group == own_group {
            counts.internal < MAX_INTERNAL_CONNECTIONS
        } else {
            counts.external < MAX_EXTERNAL_CONNECTIONS
        };
        if fits {
            debug!(peer = %record.node_id, addr = %record.addr(), "peer admitted to active set");
            active.insert(record.node_id.clone(), record);
        }
        fits
    }

    /// Marks a successful contact in both tables.
    pub fn mark_success(&self, node_id: &str) {
        if let Some(record) = self.active.write().get_mut(node_id) {
            record.mark_alive();
        }
        if let Some(record) = self.known.write().get_mut(node_id) {
            record.mark_alive();
        }
    }

    /// Counts one failure against the peer and returns the new total.
    pub fn record_failure(&self, node_id: &str) -> u32 {
        let mut retries = 0;
        if let Some(record) = self.active.write().get_mut(node_id) {
            record.retries += 1;
            retries = record.retries;
        }
        if let Some(record) = self.known.write().get_mut(node_id) {
            record.retries += 1;
            retries = retries.max(record.retries);
        }
        retries
    }

    /// Drops a peer from the active set. It stays known until the timeout
    /// sweep collects it, but its spent retry budget keeps it out of the
    /// replacement search.
    pub fn evict(&self, node_id: &str) -> Option<PeerRecord> {
        let removed = self.active.write().remove(node_id);
        if let Some(record) = &removed {
            info!(peer = %node_id, addr = %record.addr(), "peer evicted from active set");
        }
        removed
    }

    /// Eviction plus replacement search, the propagator's terminal verdict
    /// on a peer.
    pub async fn evict_and_replace(&self, node_id: &str) {
        if let Some(record) = self.evict(node_id) {
            let internal = self.is_internal(record.group);
            self.try_replace_disconnected_peer(internal).await;
        }
    }

    // -- Connection establishment ------------------------------------------

    /// The full admission handshake: intent cap check, `/ping`, post-ping
    /// cap re-check, insert. Returns `true` when the peer ends up active.
    pub async fn try_establish_connection(&self, peer: &PeerAddr) -> bool {
        if self.is_self(peer) || self.is_active(&peer.node_id) {
            return false;
        }
        self.learn_peer(peer);

        let group = crate::identity::group_of(&peer.node_id);
        if !self.has_capacity_for(group) {
            return false;
        }

        match self.client.ping(&peer.addr()).await {
            Ok(_) => {
                let mut record = PeerRecord::from_addr(peer);
                record.mark_alive();
                let admitted = self.admit_active(record);
                if admitted {
                    self.mark_success(&peer.node_id);
                }
                admitted
            }
            Err(e) => {
                debug!(peer = %peer.node_id, addr = %peer.addr(), error = %e, "ping failed");
                false
            }
        }
    }

    /// Searches known-but-inactive peers of the given class for a stand-in
    /// after an eviction.
    pub async fn try_replace_disconnected_peer(&self, internal: bool) {
        let own_group = self.identity.group();
        let mut candidates: Vec<PeerAddr> = {
            let known = self.known.read();
            let active = self.active.read();
            known
                .values()
                .filter(|p| !active.contains_key(&p.node_id))
                .filter(|p| (p.group == own_group) == internal)
                .filter(|p| p.retries <= MAX_PEER_RETRIES)
                .map(|p| p.to_peer_addr())
                .collect()
        };
        candidates.shuffle(&mut rand::thread_rng());

        for candidate in candidates {
            if self.try_establish_connection(&candidate).await {
                info!(peer = %candidate.node_id, "replacement peer connected");
                return;
            }
        }
        debug!(internal, "no replacement peer available");
    }

    // -- Bootstrap ---------------------------------------------------------

    /// Registers with each seed (`ip:port`), adopts responders as active
    /// connections, merges their advertised peers, and hands their
    /// inventory back to the caller for ledger admission.
    pub async fn bootstrap(&self, seeds: &[String]) -> BootstrapReport {
        let mut report = BootstrapReport::default();
        let me = self.register_request();

        for seed in seeds {
            let Some((ip, port)) = parse_addr(seed) else {
                warn!(seed = %seed, "ignoring malformed bootstrap address");
                continue;
            };

            match self.client.register(seed, &me).await {
                Ok(resp) => {
                    info!(seed = %seed, peer = %resp.node_id, "bootstrap register succeeded");
                    report.connected += 1;

                    // The responder answered over this address; trust the
                    // dialed target over whatever it believes its IP is.
                    let responder = PeerAddr {
                        ip: ip.clone(),
                        port,
                        node_id: resp.node_id.clone(),
                    };
                    if !self.is_self(&responder) {
                        self.learn_peer(&responder);
                        let mut record = PeerRecord::from_addr(&responder);
                        record.mark_alive();
                        self.admit_active(record);
                    }

                    let mut advertised = resp.peers;
                    advertised.shuffle(&mut rand::thread_rng());
                    self.learn_peers(&advertised);
                    for peer in &advertised {
                        if self.caps_saturated() {
                            break;
                        }
                        self.try_establish_connection(peer).await;
                    }

                    report.blocks.extend(resp.blocks);
                    report.transactions.extend(resp.transactions);
                }
                Err(e) => {
                    warn!(seed = %seed, error = %e, "bootstrap register failed");
                }
            }
        }
        report
    }

    // -- Peer exchange -----------------------------------------------------

    /// One tick of the 30 s peer-exchange loop. Guarded single-flight: if
    /// the previous tick is still awaiting slow peers, this one is a no-op.
    pub async fn exchange_tick(&self) {
        if self
            .exchange_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("peer exchange still running, skipping tick");
            return;
        }
        self.run_exchange().await;
        self.exchange_in_flight.store(false, Ordering::SeqCst);
    }

    async fn run_exchange(&self) {
        if self.caps_saturated() {
            return;
        }

        let partners: Vec<(String, String)> = self
            .active
            .read()
            .values()
            .filter(|p| p.retries <= MAX_PEER_RETRIES)
            .map(|p| (p.node_id.clone(), p.addr()))
            .collect();

        let mut internal_candidates: Vec<PeerAddr> = Vec::new();
        let mut external_candidates: Vec<PeerAddr> = Vec::new();
        let own_group = self.identity.group();

        for (node_id, addr) in partners {
            match self.client.get_peers(&addr).await {
                Ok(peers) => {
                    self.mark_success(&node_id);
                    for peer in peers {
                        if self.is_self(&peer) || self.is_active(&peer.node_id) {
                            continue;
                        }
                        if crate::identity::group_of(&peer.node_id) == own_group {
                            internal_candidates.push(peer);
                        } else {
                            external_candidates.push(peer);
                        }
                    }
                }
                Err(e) => {
                    let retries = self.record_failure(&node_id);
                    debug!(peer = %node_id, retries, error = %e, "peer exchange request failed");
                    if retries > MAX_PEER_RETRIES {
                        if let Some(record) = self.evict(&node_id) {
                            let internal = self.is_internal(record.group);
                            self.try_replace_disconnected_peer(internal).await;
                        }
                    }
                }
            }
        }

        {
            let mut rng = rand::thread_rng();
            internal_candidates.shuffle(&mut rng);
            external_candidates.shuffle(&mut rng);
        }

        for candidate in internal_candidates.iter().chain(&external_candidates) {
            if self.caps_saturated() {
                break;
            }
            self.try_establish_connection(candidate).await;
        }
    }

    // -- Cleanup & persistence ---------------------------------------------

    /// Drops peers silent past [`PEER_TIMEOUT`] from both tables. Returns
    /// `(active_dropped, known_dropped)`.
    pub fn cleanup_expired(&self) -> (usize, usize) {
        let active_dropped = {
            let mut active = self.active.write();
            let before = active.len();
            active.retain(|_, p| !p.is_expired(PEER_TIMEOUT));
            before - active.len()
        };
        let known_dropped = {
            let mut known = self.known.write();
            let before = known.len();
            known.retain(|_, p| !p.is_expired(PEER_TIMEOUT));
            before - known.len()
        };
        if active_dropped + known_dropped > 0 {
            info!(active_dropped, known_dropped, "expired peers removed");
        }
        (active_dropped, known_dropped)
    }

    /// Writes the known-peer table as JSON. Operational convenience: a
    /// restarted node re-reads it to skip cold discovery.
    pub fn write_snapshot(&self, path: &Path) -> std::io::Result<()> {
        let peers = self.known_peers();
        let encoded = serde_json::to_vec_pretty(&peers)?;
        std::fs::write(path, encoded)
    }

    /// Seeds the known table from a snapshot file, if one exists. Returns
    /// how many peers were learned.
    pub fn load_snapshot(&self, path: &Path) -> std::io::Result<usize> {
        if !path.exists() {
            return Ok(0);
        }
        let raw = std::fs::read(path)?;
        let peers: Vec<PeerAddr> = serde_json::from_slice(&raw)?;
        Ok(self.learn_peers(&peers))
    }

    // -- Views -------------------------------------------------------------

    pub fn active_peers(&self) -> Vec<PeerAddr> {
        self.active.read().values().map(|p| p.to_peer_addr()).collect()
    }

    pub fn known_peers(&self) -> Vec<PeerAddr> {
        self.known.read().values().map(|p| p.to_peer_addr()).collect()
    }

    /// `(node_id, ip:port)` pairs the propagator fans out to.
    pub fn active_targets(&self) -> Vec<(String, String)> {
        self.active
            .read()
            .values()
            .map(|p| (p.node_id.clone(), p.addr()))
            .collect()
    }

    pub fn active_len(&self) -> usize {
        self.active.read().len()
    }

    pub fn known_len(&self) -> usize {
        self.known.read().len()
    }
}

/// Splits `ip:port`. Returns `None` on anything that does not parse.
fn parse_addr(addr: &str) -> Option<(String, u16)> {
    let (ip, port) = addr.rsplit_once(':')?;
    let port = port.parse().ok()?;
    if ip.is_empty() {
        return None;
    }
    Some((ip.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn manager_with_group(group: char) -> OverlayManager {
        let mut node_id = group.to_string();
        node_id.push_str(&"0".repeat(31));
        let identity = NodeIdentity {
            node_id,
            ip: "127.0.0.1".into(),
            port: 7100,
        };
        OverlayManager::new(identity, NodeClient::new().unwrap())
    }

    fn peer(group: char, suffix: u32) -> PeerAddr {
        PeerAddr {
            ip: "10.0.0.1".into(),
            port: 8000 + suffix as u16,
            node_id: format!("{group}{suffix:031x}"),
        }
    }

    fn admit(manager: &OverlayManager, p: &PeerAddr) -> bool {
        let mut record = PeerRecord::from_addr(p);
        record.mark_alive();
        manager.admit_active(record)
    }

    #[test]
    fn parse_addr_accepts_ip_port() {
        assert_eq!(parse_addr("1.2.3.4:7100"), Some(("1.2.3.4".into(), 7100)));
        assert_eq!(parse_addr("nonsense"), None);
        assert_eq!(parse_addr(":7100"), None);
        assert_eq!(parse_addr("1.2.3.4:notaport"), None);
    }

    #[test]
    fn learn_peer_rejects_self() {
        let manager = manager_with_group('a');
        let me = PeerAddr {
            ip: "127.0.0.1".into(),
            port: 7100,
            node_id: manager.identity().node_id.clone(),
        };
        assert!(!manager.learn_peer(&me));

        // Same address under a different id is still us.
        let me_other_id = PeerAddr {
            ip: "127.0.0.1".into(),
            port: 7100,
            node_id: "b".repeat(32),
        };
        assert!(!manager.learn_peer(&me_other_id));
        assert_eq!(manager.known_len(), 0);
    }

    #[test]
    fn internal_cap_is_enforced() {
        let manager = manager_with_group('a');
        for i in 0..MAX_INTERNAL_CONNECTIONS as u32 {
            assert!(admit(&manager, &peer('a', i)));
        }
        // Fifth internal peer bounces; an external one still fits.
        assert!(!admit(&manager, &peer('a', 99)));
        assert!(admit(&manager, &peer('b', 0)));

        let counts = manager.group_counts();
        assert_eq!(counts.internal, MAX_INTERNAL_CONNECTIONS);
        assert_eq!(counts.external, 1);
    }

    #[test]
    fn external_cap_is_enforced() {
        let manager = manager_with_group('a');
        let groups = ['b', 'c', 'd', 'e', 'f'];
        let mut admitted = 0;
        for (i, g) in groups.iter().enumerate() {
            if admit(&manager, &peer(*g, i as u32)) {
                admitted += 1;
            }
        }
        assert_eq!(admitted, MAX_EXTERNAL_CONNECTIONS);
        assert!(!manager.caps_saturated()); // internal side still open
    }

    #[test]
    fn saturation_needs_both_caps() {
        let manager = manager_with_group('a');
        for i in 0..4 {
            assert!(admit(&manager, &peer('a', i)));
            assert!(admit(&manager, &peer('b', i)));
        }
        assert!(manager.caps_saturated());
        assert_eq!(manager.active_len(), 8);
    }

    #[test]
    fn failure_budget_and_eviction() {
        let manager = manager_with_group('a');
        let p = peer('b', 1);
        assert!(admit(&manager, &p));

        assert_eq!(manager.record_failure(&p.node_id), 1);
        assert_eq!(manager.record_failure(&p.node_id), 2);
        manager.mark_success(&p.node_id);
        // Success resets the budget.
        assert_eq!(manager.record_failure(&p.node_id), 1);

        assert!(manager.evict(&p.node_id).is_some());
        assert!(!manager.is_active(&p.node_id));
        assert_eq!(manager.evict(&p.node_id).map(|r| r.node_id), None);
    }

    #[test]
    fn cleanup_drops_expired_peers() {
        let manager = manager_with_group('a');
        let fresh = peer('b', 1);
        let stale = peer('c', 2);
        admit(&manager, &fresh);
        admit(&manager, &stale);
        manager.learn_peer(&fresh);
        manager.learn_peer(&stale);

        manager
            .active
            .write()
            .get_mut(&stale.node_id)
            .unwrap()
            .last_seen = Instant::now() - Duration::from_secs(700);
        manager
            .known
            .write()
            .get_mut(&stale.node_id)
            .unwrap()
            .last_seen = Instant::now() - Duration::from_secs(700);

        let (active_dropped, known_dropped) = manager.cleanup_expired();
        assert_eq!((active_dropped, known_dropped), (1, 1));
        assert!(manager.is_active(&fresh.node_id));
        assert!(!manager.is_active(&stale.node_id));
    }

    #[test]
    fn snapshot_roundtrip() {
        let manager = manager_with_group('a');
        manager.learn_peer(&peer('b', 1));
        manager.learn_peer(&peer('c', 2));

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("peers.json");
        manager.write_snapshot(&path).expect("write snapshot");

        let restored = manager_with_group('a');
        let learned = restored.load_snapshot(&path).expect("load snapshot");
        assert_eq!(learned, 2);
        assert_eq!(restored.known_len(), 2);
    }

    #[test]
    fn load_snapshot_missing_file_is_empty() {
        let manager = manager_with_group('a');
        let dir = tempfile::tempdir().expect("tempdir");
        let learned = manager
            .load_snapshot(&dir.path().join("absent.json"))
            .expect("missing file is fine");
        assert_eq!(learned, 0);
    }

    #[tokio::test]
    async fn establish_against_dead_peer_fails() {
        let manager = manager_with_group('a');
        let dead = PeerAddr {
            ip: "127.0.0.1".into(),
            port: 1,
            node_id: "b".repeat(32),
        };
        assert!(!manager.try_establish_connection(&dead).await);
        assert!(!manager.is_active(&dead.node_id));
        // It is still remembered for later attempts.
        assert_eq!(manager.known_len(), 1);
    }
}
