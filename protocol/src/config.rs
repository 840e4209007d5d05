//! # Protocol Configuration & Constants
//!
//! Every magic number in floodnet lives here. The overlay caps, timer
//! periods, and retry budgets below define how the network behaves under
//! churn; the consensus constants define what counts as a valid chain.
//! Change them on a live network and your node forks off alone.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Consensus Parameters
// ---------------------------------------------------------------------------

/// Required number of leading hex zeros in a block hash. Four zeros keeps a
/// single-threaded nonce search in the tens-of-milliseconds range on
/// commodity hardware, which is what an HTTP-coordinated devnet wants.
pub const DEFAULT_DIFFICULTY: usize = 4;

/// Coins credited to the creator of the genesis block. The one and only
/// mint event in the system; every later balance is a redistribution.
pub const GENESIS_ENDOWMENT: i64 = 100;

/// The `previousHash` of a genesis block, and the parent used when mining
/// on an empty chain. Sixty-four hex zeros, matching the digest width.
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Upper bound on pending transactions packed into a mined block.
pub const MAX_TX_PER_BLOCK: usize = 10;

/// Cap on blocks parked while their parent is missing. Oldest entries are
/// dropped first when the pool overflows.
pub const MAX_ORPHAN_BLOCKS: usize = 256;

// ---------------------------------------------------------------------------
// Overlay Parameters
// ---------------------------------------------------------------------------

/// Maximum outgoing connections to peers in our own group (same first hex
/// character of the node id).
pub const MAX_INTERNAL_CONNECTIONS: usize = 4;

/// Maximum outgoing connections to peers outside our group.
pub const MAX_EXTERNAL_CONNECTIONS: usize = 4;

/// Consecutive failures tolerated before a peer is evicted from the active
/// set and a replacement search starts.
pub const MAX_PEER_RETRIES: u32 = 3;

/// A peer silent for this long is dropped from both tables.
pub const PEER_TIMEOUT: Duration = Duration::from_secs(600);

// ---------------------------------------------------------------------------
// Timer Periods
// ---------------------------------------------------------------------------

/// How often the peer-exchange loop asks active peers for their peers.
pub const PEER_EXCHANGE_INTERVAL: Duration = Duration::from_secs(30);

/// How often the node pushes its full inventory to one random active peer.
/// Anti-entropy backstop for anything flooding missed.
pub const INVENTORY_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// How often the active peer list is broadcast to all active peers.
pub const PEER_BROADCAST_INTERVAL: Duration = Duration::from_secs(45);

/// Fast sweep for expired peers.
pub const PEER_CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

/// How often the known-peer table is snapshotted to disk.
pub const PEER_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Transport Parameters
// ---------------------------------------------------------------------------

/// Deadline for every outbound HTTP request. A peer slower than this is
/// treated exactly like a dead one.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause before the single bulk retry of a failed propagation round.
pub const PROPAGATION_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Grace period for draining in-flight requests at shutdown.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Default listening port for a node.
pub const DEFAULT_PORT: u16 = 7100;

/// HTTP service queried for the node's own public IP when `--localhost`
/// is not given. Returns the address as a bare text body.
pub const PUBLIC_IP_SERVICE: &str = "https://api.ipify.org";
