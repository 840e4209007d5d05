//! # Outbound HTTP Client
//!
//! One `reqwest::Client` with the protocol-wide 5 s deadline, wrapped in
//! typed helpers per endpoint. Everything that leaves this node (overlay
//! pings, peer exchange, flooding, mining submissions, the operator
//! `status` command) goes through here, so the timeout and error
//! semantics are in exactly one place.

use crate::config::{PUBLIC_IP_SERVICE, REQUEST_TIMEOUT};
use crate::ledger::{Block, Transaction};
use crate::net::wire::{
    InventoryView, PeerAddr, PingResponse, RegisterRequest, RegisterResponse, SubmitResponse,
    SyncInventoryAck, SyncPayload, SyncPeersAck,
};

/// Outbound transport failures. A non-2xx answer and a dead socket are
/// deliberately the same severity to the callers: both count against the
/// peer's retry budget.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Connection failure, timeout, or undecodable body.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The peer answered with a non-success status.
    #[error("peer returned HTTP {status}")]
    Status { status: u16 },
}

/// Thin typed wrapper over a shared `reqwest::Client`. Cheap to clone.
#[derive(Debug, Clone)]
pub struct NodeClient {
    http: reqwest::Client,
}

impl NodeClient {
    /// Builds the shared client with the protocol request deadline.
    pub fn new() -> Result<Self, NetError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http })
    }

    fn url(addr: &str, path: &str) -> String {
        format!("http://{addr}{path}")
    }

    fn check(resp: reqwest::Response) -> Result<reqwest::Response, NetError> {
        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else {
            Err(NetError::Status {
                status: status.as_u16(),
            })
        }
    }

    /// `GET /ping` — liveness probe used before admitting a peer.
    pub async fn ping(&self, addr: &str) -> Result<PingResponse, NetError> {
        let resp = self.http.get(Self::url(addr, "/ping")).send().await?;
        Ok(Self::check(resp)?.json().await?)
    }

    /// `GET /peers` — the peer's active connections.
    pub async fn get_peers(&self, addr: &str) -> Result<Vec<PeerAddr>, NetError> {
        let resp = self.http.get(Self::url(addr, "/peers")).send().await?;
        Ok(Self::check(resp)?.json().await?)
    }

    /// `POST /register` — introduce ourselves; returns the peer's view and
    /// inventory for bootstrap.
    pub async fn register(
        &self,
        addr: &str,
        me: &RegisterRequest,
    ) -> Result<RegisterResponse, NetError> {
        let resp = self
            .http
            .post(Self::url(addr, "/register"))
            .json(me)
            .send()
            .await?;
        Ok(Self::check(resp)?.json().await?)
    }

    /// `POST /inv` — flood one transaction.
    pub async fn send_transaction(
        &self,
        addr: &str,
        tx: &Transaction,
    ) -> Result<SubmitResponse, NetError> {
        let resp = self
            .http
            .post(Self::url(addr, "/inv"))
            .json(tx)
            .send()
            .await?;
        Ok(Self::check(resp)?.json().await?)
    }

    /// `POST /block` — flood one block.
    pub async fn send_block(&self, addr: &str, block: &Block) -> Result<SubmitResponse, NetError> {
        let resp = self
            .http
            .post(Self::url(addr, "/block"))
            .json(block)
            .send()
            .await?;
        Ok(Self::check(resp)?.json().await?)
    }

    /// `POST /sync` with a peer list.
    pub async fn sync_peers(
        &self,
        addr: &str,
        peers: Vec<PeerAddr>,
    ) -> Result<SyncPeersAck, NetError> {
        let resp = self
            .http
            .post(Self::url(addr, "/sync"))
            .json(&SyncPayload::Peers { peers })
            .send()
            .await?;
        Ok(Self::check(resp)?.json().await?)
    }

    /// `POST /sync` with blocks and pending transactions (anti-entropy).
    pub async fn sync_inventory(
        &self,
        addr: &str,
        blocks: Vec<Block>,
        transactions: Vec<Transaction>,
    ) -> Result<SyncInventoryAck, NetError> {
        let resp = self
            .http
            .post(Self::url(addr, "/sync"))
            .json(&SyncPayload::Inventory {
                blocks,
                transactions,
            })
            .send()
            .await?;
        Ok(Self::check(resp)?.json().await?)
    }

    /// `GET /inventory` — block hashes, pending pool, balances, summary.
    pub async fn get_inventory(&self, addr: &str) -> Result<InventoryView, NetError> {
        let resp = self.http.get(Self::url(addr, "/inventory")).send().await?;
        Ok(Self::check(resp)?.json().await?)
    }

    /// `GET /getblocks?mainchain=true` — the peer's main chain in order.
    pub async fn get_main_chain(&self, addr: &str) -> Result<Vec<Block>, NetError> {
        let resp = self
            .http
            .get(Self::url(addr, "/getblocks?mainchain=true"))
            .send()
            .await?;
        Ok(Self::check(resp)?.json().await?)
    }

    /// `GET /status` against a full URL, for the operator CLI.
    pub async fn get_status_json(&self, base_url: &str) -> Result<serde_json::Value, NetError> {
        let url = format!("{}/status", base_url.trim_end_matches('/'));
        let resp = self.http.get(url).send().await?;
        Ok(Self::check(resp)?.json().await?)
    }

    /// Asks the public-IP service what address the world sees us under.
    pub async fn public_ip(&self) -> Result<String, NetError> {
        let resp = self.http.get(PUBLIC_IP_SERVICE).send().await?;
        Ok(Self::check(resp)?.text().await?.trim().to_string())
    }
}
