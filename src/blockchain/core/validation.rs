use crate::crypto;
use crate::error::ChainError;

use super::chain::Block;

/// Check a whole chain, reporting the first problem found.
///
/// The first block must be the genesis sentinel. Every later block must link
/// to its predecessor's hash, carry the next index, and store a hash that
/// matches the recomputed digest and meets `difficulty_prefix`.
pub fn check_chain(chain: &[Block], difficulty_prefix: &str) -> Result<(), ChainError> {
    let genesis = chain
        .first()
        .ok_or_else(|| ChainError::InvalidChain("Chain is empty.".to_string()))?;

    if !genesis.is_genesis_sentinel() {
        return Err(ChainError::InvalidChain(
            "First block is not the genesis block.".to_string(),
        ));
    }

    for pair in chain.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);

        if cur.previous_block_hash != prev.hash {
            return Err(ChainError::InvalidChain(format!(
                "Block {} does not link to block {}.",
                cur.index, prev.index
            )));
        }

        if cur.index != prev.index + 1 {
            return Err(ChainError::InvalidChain(format!(
                "Block {} follows block {}.",
                cur.index, prev.index
            )));
        }

        let computed = crypto::digest_block(&prev.hash, &cur.data(), cur.nonce)?;
        if !crypto::meets_difficulty(&computed, difficulty_prefix) {
            return Err(ChainError::InvalidChain(format!(
                "Block {} fails proof of work.",
                cur.index
            )));
        }
        if computed != cur.hash {
            return Err(ChainError::InvalidChain(format!(
                "Block {} stores hash {} but its contents hash to {}.",
                cur.index, cur.hash, computed
            )));
        }
    }

    Ok(())
}

pub fn validate_chain(chain: &[Block], difficulty_prefix: &str) -> bool {
    check_chain(chain, difficulty_prefix).is_ok()
}

/// A chain that has passed [`check_chain`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedChain(Vec<Block>);

impl ValidatedChain {
    pub fn new(chain: Vec<Block>, difficulty_prefix: &str) -> Result<Self, ChainError> {
        check_chain(&chain, difficulty_prefix)?;
        Ok(ValidatedChain(chain))
    }

    pub fn blocks(&self) -> &[Block] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.0
    }
}
