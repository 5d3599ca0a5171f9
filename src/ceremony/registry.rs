//! Ceremony ledger keyed by payload id.
//!
//! Every admitted request reserves its payload id here before the engine
//! runs. Ids are never released by the coordinator: a failed ceremony keeps
//! its id burned and a retry needs a fresh one.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ceremony::payload::PayloadId;
use crate::ceremony::request::Threshold;
use crate::ceremony::roster::Roster;
use crate::ceremony::types::CeremonyKind;
use crate::config::Ciphersuite;
use crate::error::{CeremonyError, CeremonyResultOf, RequestError};
use crate::storage::Storage;

const INTERRUPTED_REASON: &str = "interrupted by coordinator restart";

/// Lifecycle state of one ceremony.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CeremonyState {
    InFlight,
    Completed,
    Failed { reason: String },
}

impl CeremonyState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InFlight)
    }
}

/// Ledger entry for one payload id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CeremonyStatus {
    pub payload_id: PayloadId,
    pub kind: CeremonyKind,
    #[serde(flatten)]
    pub state: CeremonyState,
    pub updated_at: DateTime<Utc>,
}

impl CeremonyStatus {
    fn new(payload_id: PayloadId, kind: CeremonyKind, state: CeremonyState) -> Self {
        Self {
            payload_id,
            kind,
            state,
            updated_at: Utc::now(),
        }
    }
}

/// What the coordinator remembers about a completed key generation.
///
/// The share itself is returned to the caller and never stored; only its
/// fingerprint is kept to recognise it when it comes back for signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeygenRecord {
    pub keygen_id: PayloadId,
    pub roster: Roster,
    pub threshold: Threshold,
    pub ciphersuite: Ciphersuite,
    pub group_key: String,
    pub share_fingerprint: String,
    pub completed_at: DateTime<Utc>,
}

/// Payload id ledger backed by [`Storage`].
///
/// Reads are served from memory; every state change is written through.
pub struct Registry {
    entries: Mutex<HashMap<PayloadId, CeremonyStatus>>,
    storage: Storage,
}

impl Registry {
    /// Load the ledger from storage.
    ///
    /// Entries left in flight by a previous process can never finish, so they
    /// are marked failed. Their ids stay burned.
    pub fn new(storage: Storage) -> CeremonyResultOf<Self> {
        let mut entries = HashMap::new();
        for (key, mut status) in storage.list_ceremonies::<CeremonyStatus>()? {
            if status.state == CeremonyState::InFlight {
                status.state = CeremonyState::Failed {
                    reason: INTERRUPTED_REASON.to_string(),
                };
                status.updated_at = Utc::now();
                storage.put_ceremony(&key, &status)?;
                tracing::warn!(payload_id = %status.payload_id, "Marked interrupted ceremony as failed");
            }
            entries.insert(status.payload_id, status);
        }

        if !entries.is_empty() {
            tracing::info!(count = entries.len(), "Loaded ceremony ledger");
        }

        Ok(Self {
            entries: Mutex::new(entries),
            storage,
        })
    }

    /// Ledger with no durable state.
    pub fn in_memory() -> CeremonyResultOf<Self> {
        Self::new(Storage::open_memory()?)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PayloadId, CeremonyStatus>> {
        // Entries are only replaced whole, so a poisoned map is still consistent
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically claim `payload_id` for a new ceremony.
    ///
    /// Exactly one of any number of concurrent callers with the same id wins.
    pub fn reserve(&self, payload_id: PayloadId, kind: CeremonyKind) -> CeremonyResultOf<()> {
        let mut entries = self.lock();
        if entries.contains_key(&payload_id) {
            return Err(RequestError::DuplicatePayloadId(payload_id).into());
        }

        let status = CeremonyStatus::new(payload_id, kind, CeremonyState::InFlight);
        self.storage.put_ceremony(&payload_id.to_hex(), &status)?;
        entries.insert(payload_id, status);
        Ok(())
    }

    /// Record a finished key generation, then mark its id completed.
    pub fn complete_keygen(&self, record: KeygenRecord) -> CeremonyResultOf<()> {
        let payload_id = record.keygen_id;
        let mut entries = self.lock();
        let status = Self::transition(&entries, payload_id, CeremonyState::Completed)?;
        self.storage
            .commit_keygen(&payload_id.to_hex(), &record, &status)?;
        entries.insert(payload_id, status);
        Ok(())
    }

    /// Mark an in-flight ceremony completed.
    pub fn complete(&self, payload_id: PayloadId) -> CeremonyResultOf<()> {
        self.finish(payload_id, CeremonyState::Completed)
    }

    /// Mark an in-flight ceremony failed.
    ///
    /// The in-memory entry turns terminal even when the write-through fails;
    /// an entry left in flight on disk is failed again on the next load.
    pub fn fail(&self, payload_id: PayloadId, reason: impl Into<String>) -> CeremonyResultOf<()> {
        let mut entries = self.lock();
        let status = Self::transition(
            &entries,
            payload_id,
            CeremonyState::Failed {
                reason: reason.into(),
            },
        )?;
        let persisted = self.storage.put_ceremony(&payload_id.to_hex(), &status);
        entries.insert(payload_id, status);
        persisted
    }

    fn finish(&self, payload_id: PayloadId, state: CeremonyState) -> CeremonyResultOf<()> {
        let mut entries = self.lock();
        let status = Self::transition(&entries, payload_id, state)?;
        self.storage.put_ceremony(&payload_id.to_hex(), &status)?;
        entries.insert(payload_id, status);
        Ok(())
    }

    fn transition(
        entries: &HashMap<PayloadId, CeremonyStatus>,
        payload_id: PayloadId,
        state: CeremonyState,
    ) -> CeremonyResultOf<CeremonyStatus> {
        match entries.get(&payload_id) {
            Some(current) if current.state == CeremonyState::InFlight => {
                Ok(CeremonyStatus::new(payload_id, current.kind, state))
            }
            Some(current) => Err(CeremonyError::Internal(format!(
                "ceremony {payload_id} is already {:?}",
                current.state
            ))),
            None => Err(CeremonyError::Internal(format!(
                "ceremony {payload_id} was never reserved"
            ))),
        }
    }

    /// Current status of a payload id.
    pub fn status(&self, payload_id: &PayloadId) -> Option<CeremonyStatus> {
        self.lock().get(payload_id).cloned()
    }

    /// Record of a key generation that completed successfully.
    ///
    /// `None` if the id is unknown, still in flight, failed, or was not a
    /// key generation.
    pub fn completed_keygen(&self, keygen_id: &PayloadId) -> CeremonyResultOf<Option<KeygenRecord>> {
        let completed = self.lock().get(keygen_id).is_some_and(|status| {
            status.kind == CeremonyKind::KeyGen && status.state == CeremonyState::Completed
        });
        if !completed {
            return Ok(None);
        }
        self.storage.get_keygen_record(&keygen_id.to_hex())
    }

    /// Remove terminal entries last updated before `cutoff`.
    ///
    /// Pruned ids become reusable. Returns the number of entries removed.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> CeremonyResultOf<usize> {
        let mut entries = self.lock();
        let stale: Vec<PayloadId> = entries
            .values()
            .filter(|status| status.state.is_terminal() && status.updated_at < cutoff)
            .map(|status| status.payload_id)
            .collect();

        for payload_id in &stale {
            self.storage.delete_ceremony(&payload_id.to_hex())?;
            entries.remove(payload_id);
        }

        if !stale.is_empty() {
            tracing::info!(count = stale.len(), "Pruned ceremony ledger");
        }
        Ok(stale.len())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
