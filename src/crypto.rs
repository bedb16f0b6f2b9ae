//! Hashing primitives for HashLedger
//!
//! Every node must derive byte-identical digests from the same logical block,
//! so block payloads are hashed from their canonical JSON form (see
//! [`BlockData::canonical_json`]).

use crate::blockchain::BlockData;
use crate::error::Result;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Address type. Addresses are opaque strings with no key binding.
pub type Address = String;

/// Sender used by mining-reward transactions.
pub const REWARD_SENDER: &str = "00";

/// SHA-256 of `data` as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hash an already-serialized block payload.
///
/// The input is `previous_hash ‖ decimal(nonce) ‖ payload`. Proof-of-work
/// calls this directly so the payload is only serialized once per search.
pub fn hash_payload(previous_hash: &str, nonce: u64, payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(previous_hash.as_bytes());
    hasher.update(nonce.to_string().as_bytes());
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

/// Digest of a block's contents.
pub fn digest_block(previous_hash: &str, data: &BlockData, nonce: u64) -> Result<String> {
    let payload = data.canonical_json()?;
    Ok(hash_payload(previous_hash, nonce, &payload))
}

/// Whether `hash` satisfies the difficulty prefix.
pub fn meets_difficulty(hash: &str, prefix: &str) -> bool {
    hash.starts_with(prefix)
}

/// Fresh random 128-bit identifier as 32 hex chars.
///
/// Used both for transaction ids and for generated node addresses.
pub fn generate_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
