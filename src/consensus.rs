use crate::blockchain::{Block, Blockchain, ValidatedChain};
use crate::transaction::Transaction;

/// A peer's chain together with the pending pool it reported alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateLedger {
    pub chain: Vec<Block>,
    pub pending_transactions: Vec<Transaction>,
}

/// Outcome of a consensus round
#[derive(Debug, Clone, PartialEq)]
pub enum ConsensusDecision {
    /// Keep the local chain: nothing longer, or the longest candidate is invalid.
    Retained,
    Replaced {
        chain: ValidatedChain,
        pending_transactions: Vec<Transaction>,
    },
}

impl ConsensusDecision {
    pub fn is_replaced(&self) -> bool {
        matches!(self, ConsensusDecision::Replaced { .. })
    }
}

/// Longest-valid-chain selection
pub struct Consensus;

impl Consensus {
    /// Pick the longest of the local chain and the candidates by block count.
    ///
    /// Ties go to the local chain, and among equally long candidates to the
    /// first one offered. A winning candidate that fails validation means no
    /// replacement at all; shorter candidates are not considered in its place.
    pub fn resolve(
        local_chain: &[Block],
        candidates: Vec<CandidateLedger>,
        difficulty_prefix: &str,
    ) -> ConsensusDecision {
        let mut longest: Option<CandidateLedger> = None;
        let mut max_len = local_chain.len();

        for candidate in candidates {
            if candidate.chain.len() > max_len {
                max_len = candidate.chain.len();
                longest = Some(candidate);
            }
        }

        let Some(winner) = longest else {
            return ConsensusDecision::Retained;
        };

        match ValidatedChain::new(winner.chain, difficulty_prefix) {
            Ok(chain) => ConsensusDecision::Replaced {
                chain,
                pending_transactions: winner.pending_transactions,
            },
            Err(e) => {
                tracing::warn!(length = max_len, "rejected longest candidate chain: {}", e);
                ConsensusDecision::Retained
            }
        }
    }

    /// Resolve against `blockchain` and adopt the winner. Returns true on replacement.
    pub fn resolve_and_apply(blockchain: &mut Blockchain, candidates: Vec<CandidateLedger>) -> bool {
        let decision = Self::resolve(blockchain.chain(), candidates, blockchain.difficulty_prefix());
        match decision {
            ConsensusDecision::Replaced {
                chain,
                pending_transactions,
            } => {
                tracing::info!(
                    old_length = blockchain.len(),
                    new_length = chain.len(),
                    "replacing local chain"
                );
                blockchain.replace_chain(chain, pending_transactions);
                true
            }
            ConsensusDecision::Retained => false,
        }
    }
}
