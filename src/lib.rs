//! HashLedger - an educational proof-of-work ledger
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Chain state, validation and lookups
//! - [`transaction`] - Transaction records
//!
//! ## Consensus & Mining
//! - [`miner`] - Proof-of-work search
//! - [`consensus`] - Longest-valid-chain resolution
//!
//! ## Cryptography
//! - [`crypto`] - Block digests and identifiers
//!
//! ## Networking & Integration
//! - [`network`] - Peer registry and outbound relay
//! - [`node`] - A running ledger node
//! - [`api`] - HTTP relay API
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//! - [`logging`] - Tracing subscriber setup

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod transaction;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod consensus;
pub mod miner;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// Networking
// ============================================================================
pub mod network;
pub mod node;

// ============================================================================
// Integration
// ============================================================================
#[cfg(feature = "api")]
pub mod api;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
pub mod logging;
