use crate::transaction::Transaction;
use serde::Serialize;

use super::chain::{Block, Blockchain};

/// Confirmed activity and balance of one address.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressData {
    pub address_transactions: Vec<Transaction>,
    pub address_balance: f64,
}

impl Blockchain {
    pub fn get_block(&self, hash: &str) -> Option<&Block> {
        self.chain().iter().find(|block| block.hash == hash)
    }

    /// Find a confirmed transaction together with the block holding it.
    pub fn get_transaction(&self, id: &str) -> Option<(&Transaction, &Block)> {
        self.chain().iter().find_map(|block| {
            block
                .transactions
                .iter()
                .find(|tx| tx.id == id)
                .map(|tx| (tx, block))
        })
    }

    /// All confirmed transactions touching `address`, oldest first, and the
    /// resulting balance (received minus sent).
    pub fn get_address_data(&self, address: &str) -> AddressData {
        let address_transactions: Vec<Transaction> = self
            .chain()
            .iter()
            .flat_map(|block| block.transactions.iter())
            .filter(|tx| tx.involves(address))
            .cloned()
            .collect();

        let address_balance = address_transactions.iter().fold(0.0, |balance, tx| {
            if tx.recipient == address {
                balance + tx.amount
            } else {
                balance - tx.amount
            }
        });

        AddressData {
            address_transactions,
            address_balance,
        }
    }
}
