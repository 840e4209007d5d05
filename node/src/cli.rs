//! # CLI Interface
//!
//! Defines the command-line argument structure for `floodnet-node` using
//! `clap` derive. Supports four subcommands: `run`, `mine`, `status`,
//! and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use floodnet_protocol::config::{DEFAULT_DIFFICULTY, DEFAULT_PORT};

/// floodnet peer node.
///
/// Joins an HTTP-spoken overlay network, floods transactions and blocks,
/// mines proof-of-work blocks over the pending pool, and converges on one
/// chain under forks.
#[derive(Parser, Debug)]
#[command(
    name = "floodnet-node",
    about = "floodnet peer node",
    version,
    propagate_version = true
)]
pub struct NodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the floodnet node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a node and serve the HTTP API.
    Run(RunArgs),
    /// Mine one block against a running local node.
    Mine(MineArgs),
    /// Query the status of a running node via its HTTP endpoint.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Port the HTTP API listens on.
    pub port: u16,

    /// Single bootstrap peer as `ip:port`.
    #[arg(long)]
    pub peer: Option<String>,

    /// Comma-separated list of bootstrap peers (`a:b,c:d`).
    #[arg(long, value_delimiter = ',')]
    pub peers: Vec<String>,

    /// Use 127.0.0.1 as our address instead of querying the public-IP
    /// service. The right choice for multi-node setups on one machine.
    #[arg(long)]
    pub localhost: bool,

    /// Required leading hex zeros for proof-of-work.
    #[arg(long, env = "FLOODNET_DIFFICULTY", default_value_t = DEFAULT_DIFFICULTY)]
    pub difficulty: usize,

    /// Where the known-peer snapshot is written every 60 s.
    ///
    /// Defaults to `peers-<port>.json` in the working directory.
    #[arg(long, env = "FLOODNET_PEERS_FILE")]
    pub peers_file: Option<PathBuf>,

    /// Default log level when RUST_LOG is not set.
    #[arg(long, env = "FLOODNET_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "FLOODNET_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

impl RunArgs {
    /// The effective bootstrap list: `--peer` plus every `--peers` entry,
    /// blanks dropped.
    pub fn bootstrap_peers(&self) -> Vec<String> {
        self.peer
            .iter()
            .chain(self.peers.iter())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Snapshot path, defaulting next to the working directory.
    pub fn peers_file_path(&self) -> PathBuf {
        self.peers_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("peers-{}.json", self.port)))
    }
}

/// Arguments for the `mine` subcommand.
#[derive(Parser, Debug)]
pub struct MineArgs {
    /// Port of the local node to mine for.
    pub port: u16,

    /// Mine on this parent instead of the node's current chain tip.
    #[arg(long)]
    pub previous_hash: Option<String>,

    /// Required leading hex zeros for proof-of-work.
    #[arg(long, env = "FLOODNET_DIFFICULTY", default_value_t = DEFAULT_DIFFICULTY)]
    pub difficulty: usize,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// HTTP endpoint of the running node.
    #[arg(long, default_value_t = format!("http://127.0.0.1:{DEFAULT_PORT}"))]
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        NodeCli::command().debug_assert();
    }

    #[test]
    fn bootstrap_peers_merges_both_flags() {
        let cli = NodeCli::parse_from([
            "floodnet-node",
            "run",
            "7100",
            "--peer",
            "10.0.0.1:7100",
            "--peers",
            "10.0.0.2:7100,10.0.0.3:7100",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(
            args.bootstrap_peers(),
            vec!["10.0.0.1:7100", "10.0.0.2:7100", "10.0.0.3:7100"]
        );
    }

    #[test]
    fn run_defaults() {
        let cli = NodeCli::parse_from(["floodnet-node", "run", "7100"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.port, 7100);
        assert!(args.bootstrap_peers().is_empty());
        assert!(!args.localhost);
        assert_eq!(args.difficulty, DEFAULT_DIFFICULTY);
        assert_eq!(args.peers_file_path(), PathBuf::from("peers-7100.json"));
    }

    #[test]
    fn mine_accepts_previous_hash() {
        let cli = NodeCli::parse_from([
            "floodnet-node",
            "mine",
            "7100",
            "--previous-hash",
            "00ab",
            "--difficulty",
            "1",
        ]);
        let Commands::Mine(args) = cli.command else {
            panic!("expected mine");
        };
        assert_eq!(args.previous_hash.as_deref(), Some("00ab"));
        assert_eq!(args.difficulty, 1);
    }
}
