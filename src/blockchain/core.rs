// core.rs splits the ledger engine into submodules: chain ownership and
// mutation, read-only queries, and whole-chain validation.
pub mod chain;
pub mod state;
pub mod validation;

pub use chain::*;
pub use state::*;
pub use validation::*;
