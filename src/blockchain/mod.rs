// Blockchain module
//
// This module contains the hash-chained ledger:
// - Block structure and hashing
// - Blockchain structure with the pending buffer and reward settlement
// - Pending transactions and persisted transaction records
// - Ledger persistence

pub mod block;
pub mod chain;
pub mod storage;
pub mod transaction;

// Re-export main components for easier access
pub use block::{Block, BlockData, MessagePayload};
pub use chain::{Blockchain, BlockchainError};
pub use storage::{JsonFileLedger, LedgerRecorder, StorageError, TransactionLog};
pub use transaction::{Transaction, TransactionRecord};
