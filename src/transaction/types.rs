/// Transaction types for HashLedger
use crate::crypto::{generate_id, Address, REWARD_SENDER};
use serde::{Deserialize, Serialize};

/// A value transfer between two opaque addresses.
///
/// Field order is part of the block digest: `amount, sender, recipient, id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub amount: f64,
    pub sender: Address,
    pub recipient: Address,
    pub id: String,
}

impl Transaction {
    /// Build a transaction with a fresh id. Amounts are not checked.
    pub fn new(amount: f64, sender: Address, recipient: Address) -> Self {
        Self {
            amount,
            sender,
            recipient,
            id: generate_id(),
        }
    }

    /// Mining reward paid from the reserved sender.
    pub fn reward(amount: f64, recipient: Address) -> Self {
        Self::new(amount, REWARD_SENDER.to_string(), recipient)
    }

    pub fn is_reward(&self) -> bool {
        self.sender == REWARD_SENDER
    }

    /// True if `address` sends or receives in this transaction.
    pub fn involves(&self, address: &str) -> bool {
        self.sender == address || self.recipient == address
    }
}
