//! Transaction module: types live in `transaction/types.rs`

pub mod types;

pub use types::*;
