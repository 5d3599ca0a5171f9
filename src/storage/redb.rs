//! ReDB storage implementation for the ceremony ledger.
//!
//! Provides persistent storage for:
//! - Ceremony status entries, keyed by payload id
//! - Key generation records (roster, threshold, key fingerprint)
//!
//! Keys are hex-encoded payload ids and values are JSON for simplicity.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::{CeremonyError, CeremonyResultOf};

const CEREMONIES: TableDefinition<&str, &[u8]> = TableDefinition::new("ceremonies");
const KEYGEN_RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("keygen_records");

/// Storage wrapper for ReDB.
///
/// Thread-safe via internal Arc. Clone is cheap.
#[derive(Clone)]
pub struct Storage {
    db: Arc<Database>,
}

impl Storage {
    /// Open or create a database at the given path.
    ///
    /// Creates parent directories if they don't exist.
    pub fn open(path: &Path) -> CeremonyResultOf<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path).map_err(|e| CeremonyError::Storage(e.to_string()))?;
        let storage = Self::init(db)?;

        tracing::info!(path = %path.display(), "Opened ceremony ledger");
        Ok(storage)
    }

    /// Open a database that lives only as long as the process.
    pub fn open_memory() -> CeremonyResultOf<Self> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(|e| CeremonyError::Storage(e.to_string()))?;
        Self::init(db)
    }

    fn init(db: Database) -> CeremonyResultOf<Self> {
        let write_txn = db.begin_write()?;
        {
            // Opening the tables creates them if they don't exist
            let _ = write_txn.open_table(CEREMONIES)?;
            let _ = write_txn.open_table(KEYGEN_RECORDS)?;
        }
        write_txn.commit()?;
        Ok(Self { db: Arc::new(db) })
    }

    // =========================================================================
    // Ceremony entries
    // =========================================================================

    /// Store a ceremony entry.
    pub fn put_ceremony<T: Serialize>(&self, payload_id: &str, entry: &T) -> CeremonyResultOf<()> {
        let value = serde_json::to_vec(entry)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(CEREMONIES)?;
            table.insert(payload_id, value.as_slice())?;
        }
        write_txn.commit()?;
        tracing::debug!(payload_id, "Stored ceremony entry");
        Ok(())
    }

    /// Get a ceremony entry by payload id.
    pub fn get_ceremony<T: DeserializeOwned>(&self, payload_id: &str) -> CeremonyResultOf<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CEREMONIES)?;

        match table.get(payload_id)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    /// Every stored ceremony entry, in key order.
    pub fn list_ceremonies<T: DeserializeOwned>(&self) -> CeremonyResultOf<Vec<(String, T)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CEREMONIES)?;

        table
            .iter()?
            .map(|entry| {
                let (k, v) = entry?;
                Ok((k.value().to_string(), decode(v.value())?))
            })
            .collect()
    }

    /// Delete a ceremony entry and its keygen record, if any.
    pub fn delete_ceremony(&self, payload_id: &str) -> CeremonyResultOf<bool> {
        let write_txn = self.db.begin_write()?;
        let deleted = {
            let mut ceremonies = write_txn.open_table(CEREMONIES)?;
            let mut records = write_txn.open_table(KEYGEN_RECORDS)?;
            records.remove(payload_id)?;
            ceremonies.remove(payload_id)?.is_some()
        };
        write_txn.commit()?;

        if deleted {
            tracing::debug!(payload_id, "Deleted ceremony entry");
        }
        Ok(deleted)
    }

    // =========================================================================
    // Keygen records
    // =========================================================================

    /// Write a keygen record and its completed ceremony entry in one transaction.
    pub fn commit_keygen<R: Serialize, E: Serialize>(
        &self,
        payload_id: &str,
        record: &R,
        entry: &E,
    ) -> CeremonyResultOf<()> {
        let record = serde_json::to_vec(record)?;
        let entry = serde_json::to_vec(entry)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut records = write_txn.open_table(KEYGEN_RECORDS)?;
            records.insert(payload_id, record.as_slice())?;
            let mut ceremonies = write_txn.open_table(CEREMONIES)?;
            ceremonies.insert(payload_id, entry.as_slice())?;
        }
        write_txn.commit()?;
        tracing::debug!(payload_id, "Stored keygen record");
        Ok(())
    }

    /// Get a keygen record by the payload id of its key generation.
    pub fn get_keygen_record<T: DeserializeOwned>(
        &self,
        keygen_id: &str,
    ) -> CeremonyResultOf<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(KEYGEN_RECORDS)?;

        match table.get(keygen_id)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }
}

// Stored bytes were written by us; a decode failure is corruption, not bad input.
fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CeremonyResultOf<T> {
    serde_json::from_slice(bytes).map_err(|e| CeremonyError::Storage(e.to_string()))
}
