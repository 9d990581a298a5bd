use chrono::{DateTime, SecondsFormat, SubsecRound, Timelike, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::transaction::Transaction;

/// Payload carried by the genesis block
pub const GENESIS_NOTE: &str = "Genesis Block";

/// Payload of a block, tagged by kind so that hashing is unambiguous
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockData {
    /// Fixed payload of block 0
    Genesis { note: String },

    /// Pending transactions sealed by a reward settlement
    TransactionBatch { transactions: Vec<Transaction> },

    /// One encrypted message exchanged between two parties
    MessageExchange(MessagePayload),
}

/// Message exchange as it is stored inside a block
///
/// Only public key material is ever recorded here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub sender: String,
    pub recipient: String,
    pub sender_public_key: String,
    pub recipient_public_key: String,
    /// Base64 ciphertext
    pub encrypted_message: String,
    /// Base64 signature over the ciphertext bytes
    pub signature: Option<String>,
    pub decrypted_message: String,
}

/// Represents a block in the chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Index of the block in the chain
    pub index: u64,

    /// Hash of the previous block, `None` only for genesis
    pub previous_hash: Option<String>,

    /// Timestamp when the block was created
    pub timestamp: DateTime<Utc>,

    /// Payload sealed by this block
    pub data: BlockData,

    /// Hash of the current block (empty for genesis)
    pub hash: String,
}

impl Block {
    /// Creates the genesis block
    ///
    /// Its hash is the empty sentinel and is never recomputed.
    pub fn genesis() -> Self {
        Block {
            index: 0,
            previous_hash: None,
            timestamp: block_timestamp(),
            data: BlockData::Genesis {
                note: GENESIS_NOTE.to_string(),
            },
            hash: String::new(),
        }
    }

    /// Creates an unsealed block around `data`
    ///
    /// Index, previous hash and hash are placeholders until the chain
    /// appends the block.
    pub fn candidate(data: BlockData) -> Self {
        Block {
            index: 0,
            previous_hash: None,
            timestamp: block_timestamp(),
            data,
            hash: String::new(),
        }
    }

    /// Whether the timestamp is exactly representable in the hash input
    ///
    /// Hashes cover the timestamp at millisecond precision, so anything
    /// finer would go unhashed.
    pub fn has_hashable_timestamp(&self) -> bool {
        self.timestamp.nanosecond() % 1_000_000 == 0
    }

    /// Whether this block carries the genesis payload
    pub fn is_genesis(&self) -> bool {
        matches!(self.data, BlockData::Genesis { .. })
    }

    /// Recomputes this block's hash from its own fields
    pub fn compute_hash(&self) -> Result<String, serde_json::Error> {
        calculate_hash(
            self.index,
            self.previous_hash.as_deref(),
            &self.timestamp,
            &self.data,
        )
    }
}

/// Current time truncated to the millisecond precision blocks are hashed at
fn block_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Calculates a block hash
///
/// SHA-256 over `index ∥ previous_hash ∥ timestamp ∥ canonical(data)`,
/// rendered as lowercase hex. A missing previous hash contributes nothing.
///
/// # Arguments
///
/// * `index` - Position of the block in the chain
/// * `previous_hash` - Hash of the preceding block, `None` for genesis
/// * `timestamp` - Block creation time, hashed as RFC 3339 with milliseconds
/// * `data` - Payload, hashed in its canonical JSON form
///
/// # Returns
///
/// The hash as a 64-character hex string
pub fn calculate_hash(
    index: u64,
    previous_hash: Option<&str>,
    timestamp: &DateTime<Utc>,
    data: &BlockData,
) -> Result<String, serde_json::Error> {
    let mut hasher = Sha256::new();

    hasher.update(index.to_string().as_bytes());
    hasher.update(previous_hash.unwrap_or_default().as_bytes());
    hasher.update(timestamp.to_rfc3339_opts(SecondsFormat::Millis, true).as_bytes());
    hasher.update(canonical_json(data)?.as_bytes());

    Ok(hex::encode(hasher.finalize()))
}

/// Serializes `data` with object keys in sorted order
///
/// Going through `serde_json::Value` sorts every map by key, which keeps
/// the output independent of struct field declaration order.
pub fn canonical_json<T: Serialize>(data: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(data)?;
    serde_json::to_string(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> BlockData {
        BlockData::TransactionBatch {
            transactions: vec![Transaction::new(
                Some("alice".to_string()),
                "bob".to_string(),
                10.0,
                Utc::now(),
            )],
        }
    }

    #[test]
    fn test_genesis_block() {
        let block = Block::genesis();

        assert_eq!(block.index, 0);
        assert_eq!(block.previous_hash, None);
        assert_eq!(block.hash, "");
        assert!(block.is_genesis());
        assert_eq!(
            block.data,
            BlockData::Genesis {
                note: "Genesis Block".to_string()
            }
        );
    }

    #[test]
    fn test_calculate_hash_is_deterministic() {
        let timestamp = Utc::now();
        let data = batch();

        let first = calculate_hash(1, Some("abc"), &timestamp, &data).unwrap();
        let second = calculate_hash(1, Some("abc"), &timestamp, &data).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 64); // SHA-256 hash is 64 characters in hex
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_calculate_hash_covers_every_field() {
        let timestamp = Utc::now();
        let data = batch();
        let base = calculate_hash(1, Some("abc"), &timestamp, &data).unwrap();

        assert_ne!(base, calculate_hash(2, Some("abc"), &timestamp, &data).unwrap());
        assert_ne!(base, calculate_hash(1, Some("abd"), &timestamp, &data).unwrap());
        assert_ne!(
            base,
            calculate_hash(1, Some("abc"), &(timestamp + chrono::Duration::seconds(1)), &data)
                .unwrap()
        );

        let other = BlockData::TransactionBatch { transactions: vec![] };
        assert_ne!(base, calculate_hash(1, Some("abc"), &timestamp, &other).unwrap());
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let payload = MessagePayload {
            sender: "alice".to_string(),
            recipient: "bob".to_string(),
            sender_public_key: "spk".to_string(),
            recipient_public_key: "rpk".to_string(),
            encrypted_message: "c2VjcmV0".to_string(),
            signature: None,
            decrypted_message: "secret".to_string(),
        };

        let json = canonical_json(&BlockData::MessageExchange(payload)).unwrap();

        assert_eq!(
            json,
            r#"{"decryptedMessage":"secret","encryptedMessage":"c2VjcmV0","kind":"message_exchange","recipient":"bob","recipientPublicKey":"rpk","sender":"alice","senderPublicKey":"spk","signature":null}"#
        );
    }

    #[test]
    fn test_new_blocks_have_millisecond_timestamps() {
        let genesis = Block::genesis();
        let candidate = Block::candidate(batch());

        assert!(genesis.has_hashable_timestamp());
        assert!(candidate.has_hashable_timestamp());
        assert_eq!(candidate.timestamp.nanosecond() % 1_000_000, 0);
    }

    #[test]
    fn test_serialized_block_reproduces_its_hash() {
        let mut block = Block::candidate(batch());
        block.index = 1;
        block.previous_hash = Some(String::new());
        block.hash = block.compute_hash().unwrap();

        let json = serde_json::to_string(&block).unwrap();
        let restored: Block = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.timestamp, block.timestamp);
        assert_eq!(restored.compute_hash().unwrap(), block.hash);
    }

    #[test]
    fn test_compute_hash_matches_free_function() {
        let mut block = Block::candidate(batch());
        block.index = 3;
        block.previous_hash = Some("prev".to_string());

        let expected =
            calculate_hash(3, Some("prev"), &block.timestamp, &block.data).unwrap();
        assert_eq!(block.compute_hash().unwrap(), expected);
    }
}
