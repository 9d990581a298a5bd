use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::info;
use tempfile::NamedTempFile;
use thiserror::Error;

use super::transaction::TransactionRecord;
use crate::messaging::MessageExchangeRecord;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Ledger at {} is not a valid record list: {source}", .path.display())]
    CorruptLedger {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid party name: {0:?}")]
    InvalidPartyName(String),
}

impl StorageError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Append-only store of transaction records
pub trait TransactionLog {
    /// Loads every record in append order
    fn load_records(&self) -> Result<Vec<TransactionRecord>, StorageError>;

    /// Appends one record, returning the number of records now stored
    fn append_record(&mut self, record: &TransactionRecord) -> Result<usize, StorageError>;
}

/// Ledger kept as one pretty-printed JSON array on disk
///
/// Each append rewrites the whole file through a temporary sibling and an
/// atomic rename. Only one writer may use a given path at a time.
#[derive(Debug, Clone)]
pub struct JsonFileLedger {
    path: PathBuf,
}

impl JsonFileLedger {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        JsonFileLedger { path: path.into() }
    }

    fn write_records(&self, records: &[TransactionRecord]) -> Result<(), StorageError> {
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(directory).map_err(|e| StorageError::io(directory, e))?;

        let mut file = NamedTempFile::new_in(directory).map_err(|e| StorageError::io(directory, e))?;
        serde_json::to_writer_pretty(&mut file, records)?;
        file.write_all(b"\n")
            .and_then(|_| file.as_file().sync_all())
            .map_err(|e| StorageError::io(file.path(), e))?;

        file.persist(&self.path)
            .map_err(|e| StorageError::io(&self.path, e.error))?;

        Ok(())
    }
}

impl TransactionLog for JsonFileLedger {
    fn load_records(&self) -> Result<Vec<TransactionRecord>, StorageError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };

        serde_json::from_str(&contents).map_err(|source| StorageError::CorruptLedger {
            path: self.path.clone(),
            source,
        })
    }

    fn append_record(&mut self, record: &TransactionRecord) -> Result<usize, StorageError> {
        let mut records = self.load_records()?;
        let created = records.is_empty() && !self.path.exists();

        records.push(record.clone());
        self.write_records(&records)?;

        if created {
            info!("Created ledger {} with its first record", self.path.display());
        } else {
            info!("Saved record {} to ledger {}", records.len(), self.path.display());
        }

        Ok(records.len())
    }
}

/// Turns message exchanges into durable ledger records
#[derive(Debug)]
pub struct LedgerRecorder<L> {
    log: L,
}

impl<L: TransactionLog> LedgerRecorder<L> {
    pub fn new(log: L) -> Self {
        LedgerRecorder { log }
    }

    /// Appends `record` to the underlying log
    pub fn append_transaction(&mut self, record: &TransactionRecord) -> Result<usize, StorageError> {
        self.log.append_record(record)
    }

    /// Merges an exchange with its block metadata and appends the result
    ///
    /// # Arguments
    ///
    /// * `sender` - Name of the sending party
    /// * `recipient` - Name of the receiving party
    /// * `exchange` - Outcome of the exchange and the block that sealed it
    /// * `previous_block_hash` - Hash of the block that was last in the chain
    ///   before the exchange was sealed
    ///
    /// # Returns
    ///
    /// The record as it was appended
    pub fn record_exchange(
        &mut self,
        sender: &str,
        recipient: &str,
        exchange: &MessageExchangeRecord,
        previous_block_hash: &str,
    ) -> Result<TransactionRecord, StorageError> {
        let record = TransactionRecord {
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            encrypted_message: exchange.encrypted_message.clone(),
            signature: exchange.signature.clone(),
            decrypted_message: exchange.decrypted_message.clone(),
            timestamp: Utc::now(),
            block_index: exchange.block_index,
            block_hash: exchange.block_hash.clone(),
            previous_block_hash: previous_block_hash.to_string(),
        };

        self.append_transaction(&record)?;
        Ok(record)
    }

    pub fn records(&self) -> Result<Vec<TransactionRecord>, StorageError> {
        self.log.load_records()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(index: u64) -> TransactionRecord {
        TransactionRecord {
            sender: "alice".to_string(),
            recipient: "bob".to_string(),
            encrypted_message: format!("cipher-{index}"),
            signature: if index % 2 == 0 { Some("c2ln".to_string()) } else { None },
            decrypted_message: format!("message {index}"),
            timestamp: Utc::now(),
            block_index: index,
            block_hash: format!("hash-{index}"),
            previous_block_hash: format!("hash-{}", index.saturating_sub(1)),
        }
    }

    #[test]
    fn test_missing_ledger_has_no_records() {
        let dir = TempDir::new().unwrap();
        let ledger = JsonFileLedger::new(dir.path().join("messagesStorage.json"));

        assert!(ledger.load_records().unwrap().is_empty());
    }

    #[test]
    fn test_appends_keep_insertion_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("messagesStorage.json");
        let mut ledger = JsonFileLedger::new(&path);

        let written: Vec<_> = (1..=4).map(record).collect();
        for (i, entry) in written.iter().enumerate() {
            assert_eq!(ledger.append_record(entry).unwrap(), i + 1);
        }

        let contents = fs::read_to_string(&path).unwrap();
        let reloaded: Vec<TransactionRecord> = serde_json::from_str(&contents).unwrap();
        assert_eq!(reloaded, written);
        // pretty-printed array
        assert!(contents.starts_with("[\n"));
    }

    #[test]
    fn test_append_to_existing_ledger() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("messagesStorage.json");

        let existing: Vec<_> = (1..=3).map(record).collect();
        fs::write(&path, serde_json::to_string_pretty(&existing).unwrap()).unwrap();

        let mut recorder = LedgerRecorder::new(JsonFileLedger::new(&path));
        let new_record = record(9);
        assert_eq!(recorder.append_transaction(&new_record).unwrap(), 4);

        let records = recorder.records().unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(&records[..3], &existing[..]);
        assert_eq!(records[3], new_record);
    }

    #[test]
    fn test_corrupt_ledger_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("messagesStorage.json");
        fs::write(&path, "{ not json").unwrap();

        let mut ledger = JsonFileLedger::new(&path);
        let result = ledger.append_record(&record(1));

        assert!(matches!(result, Err(StorageError::CorruptLedger { .. })));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_creates_missing_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("ledger.json");
        let mut ledger = JsonFileLedger::new(&path);

        ledger.append_record(&record(1)).unwrap();

        assert_eq!(ledger.load_records().unwrap().len(), 1);
    }

    #[test]
    fn test_record_exchange_merges_block_metadata() {
        let dir = TempDir::new().unwrap();
        let mut recorder = LedgerRecorder::new(JsonFileLedger::new(dir.path().join("l.json")));

        let exchange = MessageExchangeRecord {
            encrypted_message: "Y2lwaGVy".to_string(),
            signature: Some("c2ln".to_string()),
            decrypted_message: "hello".to_string(),
            block_index: 1,
            block_hash: "h1".to_string(),
        };

        let record = recorder.record_exchange("alice", "bob", &exchange, "").unwrap();

        assert_eq!(record.sender, "alice");
        assert_eq!(record.recipient, "bob");
        assert_eq!(record.encrypted_message, "Y2lwaGVy");
        assert_eq!(record.signature.as_deref(), Some("c2ln"));
        assert_eq!(record.decrypted_message, "hello");
        assert_eq!(record.block_index, 1);
        assert_eq!(record.block_hash, "h1");
        assert_eq!(record.previous_block_hash, "");
        assert_eq!(recorder.records().unwrap(), vec![record]);
    }
}
