// Thin re-export module: implementation is in `blockchain/core.rs`, split
// into chain management, queries, and validation.

pub mod core;
pub use core::*;
