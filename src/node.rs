use crate::blockchain::{Block, Blockchain};
use crate::config::Config;
use crate::consensus::{CandidateLedger, Consensus};
use crate::crypto::generate_id;
use crate::error::ChainError;
use crate::miner;
use crate::network::{BroadcastReport, LedgerView, NetworkNode};
use crate::transaction::Transaction;
use rayon::ThreadPool;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Attempts before `mine` gives up on a chain that keeps moving under it.
pub const MAX_MINING_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeState {
    Booting,
    Syncing,
    Ready,
}

/// Result of `GET /mine`: the block plus the reward queued for the next one.
#[derive(Debug, Clone, Serialize)]
pub struct MineOutcome {
    pub block: Block,
    pub reward: Transaction,
    pub block_broadcast: BroadcastReport,
    pub reward_broadcast: BroadcastReport,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusOutcome {
    pub replaced: bool,
    pub peers_consulted: usize,
    pub chain: Vec<Block>,
    pub pending_transactions: Vec<Transaction>,
}

#[derive(Debug, Default)]
struct NodeCounters {
    blocks_mined: AtomicU64,
    blocks_received: AtomicU64,
    transactions_admitted: AtomicU64,
    consensus_rounds: AtomicU64,
    chain_replacements: AtomicU64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct NodeCountersSnapshot {
    pub blocks_mined: u64,
    pub blocks_received: u64,
    pub transactions_admitted: u64,
    pub consensus_rounds: u64,
    pub chain_replacements: u64,
}

/// One ledger node: the guarded chain state plus its view of the network.
pub struct Node {
    pub config: Config,
    pub blockchain: Arc<RwLock<Blockchain>>,
    pub network: Arc<NetworkNode>,
    state: RwLock<NodeState>,
    node_address: String,
    counters: NodeCounters,
    /// Present when `miner.threads > 1`; shared by every mining attempt.
    miner_pool: Option<Arc<ThreadPool>>,
}

impl Node {
    pub fn new(config: Config) -> Result<Self, ChainError> {
        config.validate()?;

        let blockchain = Blockchain::with_difficulty(&config.miner.difficulty_prefix);
        let network = NetworkNode::new(
            &config.network.node_url(),
            Duration::from_secs(config.network.request_timeout_secs),
        )?;
        let node_address = config.miner.node_address.clone().unwrap_or_else(generate_id);
        let miner_pool = if config.miner.threads > 1 {
            Some(Arc::new(miner::build_pool(config.miner.threads)?))
        } else {
            None
        };

        info!(
            node_url = %network.current_node_url(),
            node_address = %node_address,
            difficulty = %config.miner.difficulty_prefix,
            "ledger node created"
        );

        Ok(Self {
            config,
            blockchain: Arc::new(RwLock::new(blockchain)),
            network: Arc::new(network),
            state: RwLock::new(NodeState::Booting),
            node_address,
            counters: NodeCounters::default(),
            miner_pool,
        })
    }

    /// Recipient of this node's mining rewards.
    pub fn node_address(&self) -> &str {
        &self.node_address
    }

    pub async fn state(&self) -> NodeState {
        *self.state.read().await
    }

    pub async fn set_state(&self, state: NodeState) {
        *self.state.write().await = state;
    }

    pub fn counters(&self) -> NodeCountersSnapshot {
        NodeCountersSnapshot {
            blocks_mined: self.counters.blocks_mined.load(Ordering::Relaxed),
            blocks_received: self.counters.blocks_received.load(Ordering::Relaxed),
            transactions_admitted: self.counters.transactions_admitted.load(Ordering::Relaxed),
            consensus_rounds: self.counters.consensus_rounds.load(Ordering::Relaxed),
            chain_replacements: self.counters.chain_replacements.load(Ordering::Relaxed),
        }
    }

    pub async fn ledger_view(&self) -> LedgerView {
        let blockchain = self.blockchain.read().await;
        LedgerView {
            chain: blockchain.chain().to_vec(),
            pending_transactions: blockchain.pending_transactions().to_vec(),
            current_node_url: self.network.current_node_url().to_string(),
            network_nodes: self.network.list_peers(),
        }
    }

    /// Admit a transaction; returns the index of the block it should land in.
    pub async fn submit_transaction(&self, transaction: Transaction) -> u64 {
        let index = self
            .blockchain
            .write()
            .await
            .add_transaction_to_pending(transaction);
        self.counters.transactions_admitted.fetch_add(1, Ordering::Relaxed);
        index
    }

    /// Create and admit a transaction locally, then relay it to every peer.
    pub async fn create_and_broadcast_transaction(
        &self,
        amount: f64,
        sender: String,
        recipient: String,
    ) -> (Transaction, u64, BroadcastReport) {
        let transaction = Transaction::new(amount, sender, recipient);
        let index = self.submit_transaction(transaction.clone()).await;
        let report = self.network.broadcast_transaction(&transaction).await;
        (transaction, index, report)
    }

    /// Mine the pending pool without holding the lock during proof-of-work.
    ///
    /// The job is snapshotted under a read lock and solved on a blocking
    /// thread. The commit re-checks the tip and pool under the write lock; a
    /// stale solution is dropped and the search restarts from a new snapshot.
    pub async fn mine(&self) -> Result<Block, ChainError> {
        let prefix = self.config.miner.difficulty_prefix.clone();

        for attempt in 1..=MAX_MINING_ATTEMPTS {
            let job = self.blockchain.read().await.mining_job();
            let prefix_for_search = prefix.clone();
            let pool = self.miner_pool.clone();

            let mined = tokio::task::spawn_blocking(move || {
                miner::mine_with_pool(job, &prefix_for_search, pool.as_deref())
            })
            .await
            .map_err(|e| ChainError::MiningError(format!("Mining task failed: {}", e)))??;

            match self.blockchain.write().await.commit_mined(mined) {
                Ok(block) => {
                    self.counters.blocks_mined.fetch_add(1, Ordering::Relaxed);
                    info!(
                        index = block.index,
                        nonce = block.nonce,
                        transactions = block.transactions.len(),
                        hash = %block.hash,
                        "mined new block"
                    );
                    return Ok(block);
                }
                Err(ChainError::MiningError(reason)) => {
                    debug!(attempt, "discarding stale proof of work: {}", reason);
                }
                Err(e) => return Err(e),
            }
        }

        Err(ChainError::MiningError(format!(
            "Chain changed during each of {} mining attempts",
            MAX_MINING_ATTEMPTS
        )))
    }

    /// Mine, relay the block, then queue and relay this node's reward.
    ///
    /// The reward is admitted after the block is committed, so it is paid out
    /// in the following block.
    pub async fn mine_and_broadcast(&self) -> Result<MineOutcome, ChainError> {
        let block = self.mine().await?;
        let block_broadcast = self.network.broadcast_block(&block).await;

        let reward = Transaction::reward(self.config.miner.reward, self.node_address.clone());
        self.submit_transaction(reward.clone()).await;
        let reward_broadcast = self.network.broadcast_transaction(&reward).await;

        Ok(MineOutcome {
            block,
            reward,
            block_broadcast,
            reward_broadcast,
        })
    }

    /// Append a block announced by a peer.
    pub async fn receive_block(&self, block: Block) -> Result<(), ChainError> {
        let index = block.index;
        let result = self.blockchain.write().await.accept_block(block);
        match &result {
            Ok(()) => {
                self.counters.blocks_received.fetch_add(1, Ordering::Relaxed);
                info!(index, "accepted block from peer");
            }
            Err(e) => warn!(index, "rejected block from peer: {}", e),
        }
        result
    }

    pub async fn register_and_broadcast_node(&self, new_node_url: &str) -> Result<BroadcastReport, ChainError> {
        self.network.register_node(new_node_url);
        let report = self.network.announce_node(new_node_url).await?;
        info!(new_node = %new_node_url, delivered = report.delivered, failed = report.failed, "node announced");
        Ok(report)
    }

    /// Fetch every peer's ledger and adopt the longest valid chain, if longer.
    pub async fn run_consensus(&self) -> ConsensusOutcome {
        let ledgers = self.network.fetch_ledgers().await;
        let peers_consulted = ledgers.len();
        let candidates: Vec<CandidateLedger> = ledgers.into_iter().map(CandidateLedger::from).collect();

        let mut blockchain = self.blockchain.write().await;
        let replaced = Consensus::resolve_and_apply(&mut blockchain, candidates);

        self.counters.consensus_rounds.fetch_add(1, Ordering::Relaxed);
        if replaced {
            self.counters.chain_replacements.fetch_add(1, Ordering::Relaxed);
        }
        info!(peers_consulted, replaced, length = blockchain.len(), "consensus round finished");

        ConsensusOutcome {
            replaced,
            peers_consulted,
            chain: blockchain.chain().to_vec(),
            pending_transactions: blockchain.pending_transactions().to_vec(),
        }
    }

    /// Join each configured bootstrap peer, then sync with the network.
    pub async fn bootstrap(&self) {
        self.set_state(NodeState::Syncing).await;

        for peer in &self.config.network.bootstrap_peers {
            match self.network.join_network(peer).await {
                Ok(()) => info!(peer = %peer, "joined network through bootstrap peer"),
                Err(e) => warn!(peer = %peer, "bootstrap peer unreachable: {}", e),
            }
        }

        if self.network.peer_count() > 0 {
            self.run_consensus().await;
        }

        self.set_state(NodeState::Ready).await;
    }

    /// Serve the relay API until the process exits.
    #[cfg(feature = "api")]
    pub async fn start(self: Arc<Self>) -> Result<(), Box<dyn std::error::Error>> {
        let port = self.config.network.port;
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
        info!("API server listening on 0.0.0.0:{}", port);

        let node = self.clone();
        tokio::spawn(async move {
            node.bootstrap().await;
        });

        crate::api::serve(self, listener).await
    }
}
