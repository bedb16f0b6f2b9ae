//! Peer registry and outbound relay for HashLedger
//!
//! Peers are identified by their base URL. Every outbound call is
//! best-effort: a fan-out to all peers runs the calls concurrently, logs the
//! ones that fail, and reports counts instead of failing as a whole.

use crate::blockchain::Block;
use crate::consensus::CandidateLedger;
use crate::error::ChainError;
use crate::transaction::Transaction;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("peer {peer} answered with status {status}")]
    Status { peer: String, status: u16 },
}

impl From<RelayError> for ChainError {
    fn from(err: RelayError) -> Self {
        ChainError::NetworkError(err.to_string())
    }
}

// ============================================================================
// Wire bodies
// ============================================================================

/// Everything a node serves at `GET /blockchain`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerView {
    pub chain: Vec<Block>,
    pub pending_transactions: Vec<Transaction>,
    pub current_node_url: String,
    pub network_nodes: Vec<String>,
}

impl From<LedgerView> for CandidateLedger {
    fn from(view: LedgerView) -> Self {
        CandidateLedger {
            chain: view.chain,
            pending_transactions: view.pending_transactions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransactionBody {
    pub new_transaction: Transaction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBlockBody {
    pub new_block: Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNodeBody {
    pub new_node_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkNodesBody {
    pub all_network_nodes: Vec<String>,
}

/// Result of a fan-out to every registered peer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

// ============================================================================
// Network node
// ============================================================================

/// This node's URL, the peers it knows, and a shared HTTP client.
pub struct NetworkNode {
    current_node_url: String,
    peers: RwLock<Vec<String>>,
    client: reqwest::Client,
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

impl NetworkNode {
    pub fn new(current_node_url: &str, request_timeout: Duration) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ChainError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            current_node_url: normalize_url(current_node_url),
            peers: RwLock::new(Vec::new()),
            client,
        })
    }

    pub fn current_node_url(&self) -> &str {
        &self.current_node_url
    }

    /// Add a peer unless it is already known or is this node. Returns true if added.
    pub fn register_node(&self, url: &str) -> bool {
        let url = normalize_url(url);
        if url.is_empty() || url == self.current_node_url {
            return false;
        }

        let mut peers = self.peers.write();
        if peers.contains(&url) {
            return false;
        }
        peers.push(url);
        true
    }

    /// Register each URL in turn; returns how many were new.
    pub fn register_nodes_bulk<I, S>(&self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        urls.into_iter()
            .filter(|url| self.register_node(url.as_ref()))
            .count()
    }

    pub fn list_peers(&self) -> Vec<String> {
        self.peers.read().clone()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    async fn fan_out<B>(&self, path: &'static str, body: B) -> BroadcastReport
    where
        B: Serialize + Send + Sync + 'static,
    {
        let body = Arc::new(body);
        let mut tasks = JoinSet::new();

        for peer in self.list_peers() {
            let client = self.client.clone();
            let body = body.clone();
            tasks.spawn(async move {
                let url = format!("{}{}", peer, path);
                let result = post_json(&client, &url, &*body).await;
                (peer, result)
            });
        }

        let mut report = BroadcastReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((peer, Ok(()))) => {
                    debug!(peer = %peer, path, "peer call delivered");
                    report.delivered += 1;
                }
                Ok((peer, Err(e))) => {
                    warn!(peer = %peer, path, "peer call failed: {}", e);
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(path, "peer call task failed: {}", e);
                    report.failed += 1;
                }
            }
        }
        report
    }

    pub async fn broadcast_transaction(&self, transaction: &Transaction) -> BroadcastReport {
        self.fan_out(
            "/transaction",
            NewTransactionBody {
                new_transaction: transaction.clone(),
            },
        )
        .await
    }

    pub async fn broadcast_block(&self, block: &Block) -> BroadcastReport {
        self.fan_out(
            "/receive-new-block",
            NewBlockBody {
                new_block: block.clone(),
            },
        )
        .await
    }

    /// Tell every known peer about `new_node_url`, then send the new node the
    /// full membership list (our peers plus ourselves).
    ///
    /// Peer failures are only counted; failing to reach the new node is an error.
    pub async fn announce_node(&self, new_node_url: &str) -> Result<BroadcastReport, RelayError> {
        let new_node_url = normalize_url(new_node_url);
        let report = self
            .fan_out(
                "/register-node",
                NewNodeBody {
                    new_node_url: new_node_url.clone(),
                },
            )
            .await;

        let mut all_network_nodes = self.list_peers();
        all_network_nodes.push(self.current_node_url.clone());
        let url = format!("{}/register-nodes-bulk", new_node_url);
        post_json(&self.client, &url, &BulkNodesBody { all_network_nodes }).await?;

        Ok(report)
    }

    /// Ask `bootstrap_url` to register this node with its whole network.
    pub async fn join_network(&self, bootstrap_url: &str) -> Result<(), RelayError> {
        let bootstrap_url = normalize_url(bootstrap_url);
        let url = format!("{}/register-and-broadcast-node", bootstrap_url);
        post_json(
            &self.client,
            &url,
            &NewNodeBody {
                new_node_url: self.current_node_url.clone(),
            },
        )
        .await?;
        self.register_node(&bootstrap_url);
        Ok(())
    }

    /// Fetch every peer's ledger. Unreachable or malformed peers are skipped.
    pub async fn fetch_ledgers(&self) -> Vec<LedgerView> {
        let mut tasks = JoinSet::new();
        for peer in self.list_peers() {
            let client = self.client.clone();
            tasks.spawn(async move {
                let result = get_ledger(&client, &peer).await;
                (peer, result)
            });
        }

        let mut ledgers = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(view))) => ledgers.push(view),
                Ok((peer, Err(e))) => warn!(peer = %peer, "failed to fetch peer ledger: {}", e),
                Err(e) => warn!("ledger fetch task failed: {}", e),
            }
        }
        ledgers
    }
}

async fn post_json<B: Serialize + ?Sized>(
    client: &reqwest::Client,
    url: &str,
    body: &B,
) -> Result<(), RelayError> {
    let response = client.post(url).json(body).send().await?;
    if !response.status().is_success() {
        return Err(RelayError::Status {
            peer: url.to_string(),
            status: response.status().as_u16(),
        });
    }
    Ok(())
}

async fn get_ledger(client: &reqwest::Client, peer: &str) -> Result<LedgerView, RelayError> {
    let url = format!("{}/blockchain", peer);
    let response = client.get(&url).send().await?;
    if !response.status().is_success() {
        return Err(RelayError::Status {
            peer: url,
            status: response.status().as_u16(),
        });
    }
    Ok(response.json::<LedgerView>().await?)
}
