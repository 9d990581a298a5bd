use chrono::{DateTime, Utc};
use log::{debug, info};
use thiserror::Error;

use super::block::{Block, BlockData};
use super::transaction::Transaction;

/// Errors that can occur during blockchain operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Chain has no blocks")]
    EmptyChain,

    #[error("Invalid chain: {0}")]
    InvalidChain(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Represents the blockchain
///
/// The chain is owned by exactly one driver per run and mutated through
/// `&mut self`, so there is no shared state to lock.
#[derive(Debug, Clone)]
pub struct Blockchain {
    /// The chain of blocks
    chain: Vec<Block>,

    /// Pending transactions to be included in the next block
    pending_transactions: Vec<Transaction>,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    /// Creates a new blockchain seeded with the genesis block
    pub fn new() -> Self {
        Blockchain {
            chain: vec![Self::create_genesis_block()],
            pending_transactions: Vec::new(),
        }
    }

    /// Creates the genesis block (first block in the chain)
    fn create_genesis_block() -> Block {
        Block::genesis()
    }

    /// Gets the last block in the chain
    pub fn get_last_block(&self) -> Result<&Block, BlockchainError> {
        self.chain.last().ok_or(BlockchainError::EmptyChain)
    }

    /// Seals `candidate` onto the end of the chain
    ///
    /// The candidate's index, previous hash and hash are overwritten. Its
    /// payload is accepted as-is.
    ///
    /// # Arguments
    ///
    /// * `candidate` - Block built with `Block::candidate`
    ///
    /// # Returns
    ///
    /// The block as it now sits in the chain
    pub fn add_block_to_chain(&mut self, mut candidate: Block) -> Result<&Block, BlockchainError> {
        let last_block = self.get_last_block()?;

        candidate.index = last_block.index + 1;
        candidate.previous_hash = Some(last_block.hash.clone());
        candidate.hash = candidate.compute_hash()?;

        info!("Appended block {} ({})", candidate.index, candidate.hash);
        self.chain.push(candidate);

        self.get_last_block()
    }

    /// Adds a transaction to the pending buffer
    ///
    /// # Arguments
    ///
    /// * `sender` - Sender of the transaction, `None` for a reward
    /// * `recipient` - Recipient of the transaction
    /// * `amount` - Amount transferred
    /// * `timestamp` - When the transaction was made
    pub fn add_transaction_to_pending(
        &mut self,
        sender: Option<String>,
        recipient: String,
        amount: f64,
        timestamp: DateTime<Utc>,
    ) {
        debug!("Queued transaction {:?} -> {} ({})", sender, recipient, amount);
        self.pending_transactions
            .push(Transaction::new(sender, recipient, amount, timestamp));
    }

    /// Seals the pending buffer into a new block, then queues the reward
    ///
    /// The reward is not part of the block just created: it stays in the
    /// pending buffer and is sealed by the next settlement.
    ///
    /// # Arguments
    ///
    /// * `reward_address` - Recipient of the reward transaction
    /// * `reward_amount` - Amount of the reward
    ///
    /// # Returns
    ///
    /// The newly appended block
    pub fn process_pending_transactions_with_reward(
        &mut self,
        reward_address: &str,
        reward_amount: f64,
    ) -> Result<&Block, BlockchainError> {
        let transactions = std::mem::take(&mut self.pending_transactions);
        let sealed = transactions.len();

        let candidate = Block::candidate(BlockData::TransactionBatch { transactions });
        self.add_block_to_chain(candidate)?;

        self.pending_transactions
            .push(Transaction::new_reward(reward_address.to_string(), reward_amount));
        info!(
            "Settled {} pending transaction(s), queued reward of {} for {}",
            sealed, reward_amount, reward_address
        );

        self.get_last_block()
    }

    /// Gets the entire blockchain
    pub fn get_chain(&self) -> &[Block] {
        &self.chain
    }

    /// Gets all pending transactions
    pub fn get_pending_transactions(&self) -> &[Transaction] {
        &self.pending_transactions
    }

    /// Re-walks the chain checking genesis, linkage and every block hash
    pub fn verify_chain(&self) -> Result<(), BlockchainError> {
        let genesis = self.chain.first().ok_or(BlockchainError::EmptyChain)?;
        if genesis.index != 0
            || genesis.previous_hash.is_some()
            || !genesis.hash.is_empty()
            || !genesis.is_genesis()
        {
            return Err(BlockchainError::InvalidChain(
                "genesis block has been altered".to_string(),
            ));
        }

        for pair in self.chain.windows(2) {
            let (previous_block, current_block) = (&pair[0], &pair[1]);

            if current_block.index != previous_block.index + 1 {
                return Err(BlockchainError::InvalidChain(format!(
                    "block {} follows block {}",
                    current_block.index, previous_block.index
                )));
            }

            if current_block.previous_hash.as_deref() != Some(previous_block.hash.as_str()) {
                return Err(BlockchainError::InvalidChain(format!(
                    "block {} does not link to its predecessor",
                    current_block.index
                )));
            }

            if !current_block.has_hashable_timestamp()
                || current_block.hash != current_block.compute_hash()?
            {
                return Err(BlockchainError::InvalidChain(format!(
                    "block {} hash does not match its contents",
                    current_block.index
                )));
            }
        }

        debug!("Verified chain of {} block(s)", self.chain.len());
        Ok(())
    }

    /// Validates the blockchain
    ///
    /// # Returns
    ///
    /// true if the blockchain is valid, false otherwise
    pub fn is_valid(&self) -> bool {
        self.verify_chain().is_ok()
    }
}
