use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents a pending transaction that has not been sealed into a block yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender's identifier, `None` for a system-minted reward
    pub sender: Option<String>,

    /// Recipient's identifier
    pub recipient: String,

    /// Amount being transferred
    pub amount: f64,

    /// Timestamp supplied by the caller
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    /// Creates a new transaction
    ///
    /// No validation is applied here, callers enforce their own rules.
    pub fn new(
        sender: Option<String>,
        recipient: String,
        amount: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Transaction {
            sender,
            recipient,
            amount,
            timestamp,
        }
    }

    /// Creates a reward transaction crediting `recipient`
    pub fn new_reward(recipient: String, amount: f64) -> Self {
        Transaction::new(None, recipient, amount, Utc::now())
    }

    /// Checks if the transaction was minted by the system
    pub fn is_reward(&self) -> bool {
        self.sender.is_none()
    }
}

/// Durable audit entry written to the ledger for one message exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub sender: String,
    pub recipient: String,
    /// Base64 ciphertext
    pub encrypted_message: String,
    /// Base64 signature, `None` when the sender did not sign
    pub signature: Option<String>,
    pub decrypted_message: String,
    pub timestamp: DateTime<Utc>,
    pub block_index: u64,
    pub block_hash: String,
    pub previous_block_hash: String,
}
