//! Proof-of-work mining
//!
//! The search is a pure function of `(previous_hash, block data, prefix)`:
//! nonces are tried from zero upwards and the first one whose digest starts
//! with the difficulty prefix wins. The parallel search scans fixed batches
//! and keeps the lowest hit of each batch, so both searches agree on the
//! nonce.

use crate::blockchain::BlockData;
use crate::crypto::{hash_payload, meets_difficulty};
use crate::error::ChainError;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::time::Instant;

/// Nonces handed to the thread pool per round of the parallel search.
pub const PARALLEL_BATCH_SIZE: u64 = 1 << 14;

/// Inputs to proof-of-work, captured from the chain at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct MiningJob {
    pub previous_hash: String,
    pub data: BlockData,
}

/// A solved [`MiningJob`], ready to be committed to the chain it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct MinedBlock {
    pub job: MiningJob,
    pub nonce: u64,
    pub hash: String,
}

pub fn proof_of_work(
    previous_hash: &str,
    data: &BlockData,
    difficulty_prefix: &str,
) -> Result<u64, ChainError> {
    let payload = data.canonical_json()?;

    (0..=u64::MAX)
        .find(|nonce| meets_difficulty(&hash_payload(previous_hash, *nonce, &payload), difficulty_prefix))
        .ok_or_else(|| ChainError::MiningError("Nonce space exhausted".to_string()))
}

/// Worker pool for [`proof_of_work_parallel`]. Build once and reuse across jobs.
pub fn build_pool(threads: usize) -> Result<ThreadPool, ChainError> {
    ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|i| format!("pow-{}", i))
        .build()
        .map_err(|e| ChainError::MiningError(format!("Failed to start mining threads: {}", e)))
}

/// Same result as [`proof_of_work`], searched on the threads of `pool`.
pub fn proof_of_work_parallel(
    previous_hash: &str,
    data: &BlockData,
    difficulty_prefix: &str,
    pool: &ThreadPool,
) -> Result<u64, ChainError> {
    let payload = data.canonical_json()?;

    pool.install(|| {
        let mut start = 0u64;
        loop {
            let end = start.saturating_add(PARALLEL_BATCH_SIZE);
            let hit = (start..end).into_par_iter().find_first(|nonce| {
                meets_difficulty(&hash_payload(previous_hash, *nonce, &payload), difficulty_prefix)
            });

            if let Some(nonce) = hit {
                return Ok(nonce);
            }
            if end == u64::MAX {
                return Err(ChainError::MiningError("Nonce space exhausted".to_string()));
            }
            start = end;
        }
    })
}

/// Solve a job on the calling thread.
pub fn mine(job: MiningJob, difficulty_prefix: &str) -> Result<MinedBlock, ChainError> {
    mine_with_pool(job, difficulty_prefix, None)
}

/// Solve a job, on `pool` when one is given, otherwise on the calling thread.
pub fn mine_with_pool(
    job: MiningJob,
    difficulty_prefix: &str,
    pool: Option<&ThreadPool>,
) -> Result<MinedBlock, ChainError> {
    let started = Instant::now();

    let nonce = match pool {
        Some(pool) => proof_of_work_parallel(&job.previous_hash, &job.data, difficulty_prefix, pool)?,
        None => proof_of_work(&job.previous_hash, &job.data, difficulty_prefix)?,
    };
    let hash = hash_payload(&job.previous_hash, nonce, &job.data.canonical_json()?);

    tracing::debug!(
        index = job.data.index,
        nonce,
        parallel = pool.is_some(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "proof of work solved"
    );

    Ok(MinedBlock { job, nonce, hash })
}
