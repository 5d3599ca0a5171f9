//! Signing engine seam.
//!
//! The coordinator validates and sequences ceremonies; the engine runs the
//! threshold protocol itself. The engine is handed only requests that passed
//! every validation step, and its failures are passed through to the caller
//! as [`CeremonyError::EngineFailure`].

pub mod local;
mod macros;

use std::future::Future;

use thiserror::Error;

use crate::ceremony::payload::{DIGEST_LEN, PayloadId};
use crate::ceremony::request::Threshold;
use crate::ceremony::roster::{PeerId, Roster};
use crate::ceremony::types::{CeremonyKind, CeremonyResult, KeyMaterial};
use crate::error::CeremonyError;

pub use self::local::LocalFrostEngine;

/// Engine-side ceremony failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Insufficient participants: need {required}, have {available}")]
    InsufficientParticipants { required: u16, available: u16 },

    #[error("Peer {0} did not respond")]
    UnresponsivePeer(PeerId),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("Engine unavailable: {0}")]
    Unavailable(String),
}

impl From<EngineError> for CeremonyError {
    fn from(err: EngineError) -> Self {
        Self::EngineFailure(err.to_string())
    }
}

/// Ceremony-specific engine input.
#[derive(Debug, Clone)]
pub enum EngineTask {
    KeyGen,
    Sign {
        message: [u8; DIGEST_LEN],
        /// Roster recorded for the key generation, in party-index order.
        keygen_roster: Roster,
        /// 1-based keygen party index of each signing peer.
        signer_indices: Vec<u16>,
        key: KeyMaterial,
    },
}

impl EngineTask {
    pub fn kind(&self) -> CeremonyKind {
        match self {
            Self::KeyGen => CeremonyKind::KeyGen,
            Self::Sign { .. } => CeremonyKind::SignOffline,
        }
    }
}

/// A fully validated ceremony, ready to run.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub payload_id: PayloadId,
    pub kind: EngineTask,
    pub roster: Roster,
    pub sender: PeerId,
    pub threshold: Threshold,
}

/// Runs threshold ceremonies on behalf of the coordinator.
pub trait SigningEngine: Send + Sync {
    fn run_ceremony(
        &self,
        request: EngineRequest,
    ) -> impl Future<Output = Result<CeremonyResult, EngineError>> + Send;
}
