use crate::crypto::{self, Address};
use crate::error::ChainError;
use crate::miner::{self, MinedBlock, MiningJob};
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};

use super::validation::ValidatedChain;

pub const GENESIS_INDEX: u64 = 1;
pub const GENESIS_NONCE: u64 = 100;
pub const GENESIS_HASH: &str = "0";
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Four leading hex zeros.
pub const DEFAULT_DIFFICULTY_PREFIX: &str = "0000";

/// The part of a block covered by its hash, besides the previous hash and nonce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockData {
    pub transactions: Vec<Transaction>,
    pub index: u64,
}

impl BlockData {
    /// Stable JSON form used as hash input. Key order follows field order.
    pub fn canonical_json(&self) -> Result<String, ChainError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub nonce: u64,
    pub hash: String,
    pub previous_block_hash: String,
}

impl Block {
    /// The fixed first block. Only the timestamp varies between nodes.
    pub fn genesis() -> Self {
        Block {
            index: GENESIS_INDEX,
            timestamp: now_millis(),
            transactions: Vec::new(),
            nonce: GENESIS_NONCE,
            hash: GENESIS_HASH.to_string(),
            previous_block_hash: GENESIS_PREVIOUS_HASH.to_string(),
        }
    }

    pub fn is_genesis_sentinel(&self) -> bool {
        self.index == GENESIS_INDEX
            && self.nonce == GENESIS_NONCE
            && self.hash == GENESIS_HASH
            && self.previous_block_hash == GENESIS_PREVIOUS_HASH
            && self.transactions.is_empty()
    }

    pub fn data(&self) -> BlockData {
        BlockData {
            transactions: self.transactions.clone(),
            index: self.index,
        }
    }

    /// Digest of this block's contents, ignoring the stored `hash`.
    pub fn compute_hash(&self) -> Result<String, ChainError> {
        crypto::digest_block(&self.previous_block_hash, &self.data(), self.nonce)
    }
}

pub(crate) fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

/// A node's chain and pending pool, mutated only through these methods.
#[derive(Debug, Clone)]
pub struct Blockchain {
    chain: Vec<Block>,
    pending_transactions: Vec<Transaction>,
    difficulty_prefix: String,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    /// Create a chain holding only the genesis block, at the default difficulty.
    pub fn new() -> Self {
        Self::with_difficulty(DEFAULT_DIFFICULTY_PREFIX)
    }

    pub fn with_difficulty(difficulty_prefix: &str) -> Self {
        Blockchain {
            chain: vec![Block::genesis()],
            pending_transactions: Vec::new(),
            difficulty_prefix: difficulty_prefix.to_string(),
        }
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending_transactions
    }

    pub fn difficulty_prefix(&self) -> &str {
        &self.difficulty_prefix
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Always false: a chain holds at least its genesis block.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn last_block(&self) -> &Block {
        // The chain starts with genesis and is only ever replaced by a validated,
        // therefore non-empty, chain.
        &self.chain[self.chain.len() - 1]
    }

    pub fn create_transaction(&self, amount: f64, sender: Address, recipient: Address) -> Transaction {
        Transaction::new(amount, sender, recipient)
    }

    /// Queue a transaction and return the index of the block expected to hold it.
    pub fn add_transaction_to_pending(&mut self, transaction: Transaction) -> u64 {
        self.pending_transactions.push(transaction);
        self.last_block().index + 1
    }

    /// Snapshot of everything proof-of-work needs for the next block.
    pub fn mining_job(&self) -> MiningJob {
        let last = self.last_block();
        MiningJob {
            previous_hash: last.hash.clone(),
            data: BlockData {
                transactions: self.pending_transactions.clone(),
                index: last.index + 1,
            },
        }
    }

    /// Mine the pending pool into a new block while holding `&mut self`.
    pub fn mine_block(&mut self) -> Result<Block, ChainError> {
        let job = self.mining_job();
        let mined = miner::mine(job, &self.difficulty_prefix)?;
        self.commit_mined(mined)
    }

    /// Append a block mined from an earlier [`MiningJob`].
    ///
    /// Fails with `MiningError` if the tip moved or the pool no longer begins
    /// with the job's transactions. On success the job's transactions are
    /// drained from the front of the pool in the same step as the append.
    pub fn commit_mined(&mut self, mined: MinedBlock) -> Result<Block, ChainError> {
        let MinedBlock { job, nonce, hash } = mined;
        let last = self.last_block();

        if last.hash != job.previous_hash || last.index + 1 != job.data.index {
            return Err(ChainError::MiningError(format!(
                "Stale mining job: tip is now block {} ({})",
                last.index, last.hash
            )));
        }

        let snapshot_len = job.data.transactions.len();
        if !self.pending_transactions.starts_with(&job.data.transactions) {
            return Err(ChainError::MiningError(
                "Stale mining job: pending pool changed underneath it".to_string(),
            ));
        }

        let block = Block {
            index: job.data.index,
            timestamp: now_millis(),
            transactions: job.data.transactions,
            nonce,
            hash,
            previous_block_hash: job.previous_hash,
        };

        self.pending_transactions.drain(..snapshot_len);
        self.chain.push(block.clone());
        Ok(block)
    }

    /// Append a block mined elsewhere.
    ///
    /// The block must extend the current tip and carry a correct hash that
    /// meets the difficulty prefix. Its transactions leave the pending pool.
    pub fn accept_block(&mut self, block: Block) -> Result<(), ChainError> {
        let last = self.last_block();

        if block.previous_block_hash != last.hash {
            return Err(ChainError::InvalidBlockLinkage);
        }

        if block.index != last.index + 1 {
            return Err(ChainError::InvalidBlock(format!(
                "Invalid block index. Expected {}, but got {}.",
                last.index + 1,
                block.index
            )));
        }

        let computed = block.compute_hash()?;
        if computed != block.hash {
            return Err(ChainError::InvalidBlock(format!(
                "Hash mismatch. Expected {}, but got {}.",
                computed, block.hash
            )));
        }

        if !crypto::meets_difficulty(&computed, &self.difficulty_prefix) {
            return Err(ChainError::InvalidProofOfWork);
        }

        self.pending_transactions
            .retain(|pending| !block.transactions.iter().any(|tx| tx.id == pending.id));
        self.chain.push(block);
        Ok(())
    }

    /// Swap in a peer's chain and pool wholesale.
    pub fn replace_chain(&mut self, chain: ValidatedChain, pending_transactions: Vec<Transaction>) {
        self.chain = chain.into_blocks();
        self.pending_transactions = pending_transactions;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::validate_chain;

    #[test]
    fn test_genesis_block_values() {
        let blockchain = Blockchain::new();
        let genesis = &blockchain.chain()[0];

        assert_eq!(blockchain.len(), 1);
        assert_eq!(genesis.index, 1);
        assert_eq!(genesis.nonce, 100);
        assert_eq!(genesis.hash, "0");
        assert_eq!(genesis.previous_block_hash, "0");
        assert!(genesis.transactions.is_empty());
        assert!(genesis.is_genesis_sentinel());
    }

    #[test]
    fn test_add_transaction_returns_next_index() {
        let mut blockchain = Blockchain::new();
        let tx = blockchain.create_transaction(5.0, "A".to_string(), "B".to_string());
        assert!(blockchain.pending_transactions().is_empty());

        assert_eq!(blockchain.add_transaction_to_pending(tx.clone()), 2);
        assert_eq!(blockchain.add_transaction_to_pending(tx), 2);
        assert_eq!(blockchain.pending_transactions().len(), 2);
    }

    #[test]
    fn test_mine_block_scenario() {
        let mut blockchain = Blockchain::new();
        let tx = blockchain.create_transaction(5.0, "A".to_string(), "B".to_string());
        blockchain.add_transaction_to_pending(tx.clone());
        let pool_before = blockchain.pending_transactions().to_vec();

        let block = blockchain.mine_block().unwrap();
        assert_eq!(block.index, 2);
        assert_eq!(block.previous_block_hash, "0");
        assert_eq!(block.transactions, pool_before);
        assert_eq!(block.transactions[0].amount, 5.0);
        assert!(block.hash.starts_with("0000"));
        assert_eq!(block.compute_hash().unwrap(), block.hash);
        assert!(blockchain.pending_transactions().is_empty());

        let second = blockchain.mine_block().unwrap();
        assert_eq!(second.index, 3);
        assert!(second.transactions.is_empty());
        assert_eq!(second.previous_block_hash, block.hash);
        assert!(second.hash.starts_with("0000"));
        assert!(validate_chain(blockchain.chain(), DEFAULT_DIFFICULTY_PREFIX));
    }

    #[test]
    fn test_stale_job_is_rejected_after_tip_moves() {
        let mut blockchain = Blockchain::with_difficulty("0");
        let job = blockchain.mining_job();
        let mined = miner::mine(job, "0").unwrap();

        blockchain.mine_block().unwrap();
        let err = blockchain.commit_mined(mined).unwrap_err();
        assert!(matches!(err, ChainError::MiningError(_)));
        assert_eq!(blockchain.len(), 2);
    }

    #[test]
    fn test_commit_keeps_transactions_admitted_during_search() {
        let mut blockchain = Blockchain::with_difficulty("0");
        let first = Transaction::new(1.0, "A".to_string(), "B".to_string());
        blockchain.add_transaction_to_pending(first.clone());

        let mined = miner::mine(blockchain.mining_job(), "0").unwrap();
        let late = Transaction::new(2.0, "C".to_string(), "D".to_string());
        blockchain.add_transaction_to_pending(late.clone());

        let block = blockchain.commit_mined(mined).unwrap();
        assert_eq!(block.transactions, vec![first]);
        assert_eq!(blockchain.pending_transactions(), &[late]);
    }

    #[test]
    fn test_accept_block_from_peer() {
        let mut miner_chain = Blockchain::with_difficulty("00");
        let mut follower = miner_chain.clone();

        let tx = Transaction::new(3.0, "A".to_string(), "B".to_string());
        miner_chain.add_transaction_to_pending(tx.clone());
        follower.add_transaction_to_pending(tx);
        let unrelated = Transaction::new(9.0, "X".to_string(), "Y".to_string());
        follower.add_transaction_to_pending(unrelated.clone());

        let block = miner_chain.mine_block().unwrap();
        follower.accept_block(block.clone()).unwrap();

        assert_eq!(follower.last_block(), &block);
        assert_eq!(follower.pending_transactions(), &[unrelated]);
    }

    #[test]
    fn test_accept_block_rejects_bad_link_and_hash() {
        let mut source = Blockchain::with_difficulty("00");
        let block = source.mine_block().unwrap();

        let mut target = source.clone();
        let mut unlinked = block.clone();
        unlinked.previous_block_hash = "ff".to_string();
        assert_eq!(
            target.accept_block(unlinked).unwrap_err(),
            ChainError::InvalidBlockLinkage
        );

        let mut fresh = Blockchain::with_difficulty("00");
        fresh.chain = vec![source.chain()[0].clone()];
        let mut forged = block.clone();
        forged.hash = "00forged".to_string();
        assert!(matches!(
            fresh.accept_block(forged).unwrap_err(),
            ChainError::InvalidBlock(_)
        ));

        fresh.accept_block(block).unwrap();
        assert_eq!(fresh.len(), 2);
        assert_eq!(target.len(), 2);
    }
}
