//! In-process FROST engine.
//!
//! Simulates every roster member inside one process: the DKG runs all
//! parties' rounds locally and the resulting share bundle (every party's key
//! package plus the public key package) is returned as the key material's
//! opaque share. Intended for development and tests; a networked engine
//! replaces it in deployments where parties hold their own shares.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use frost_ed25519 as frost_ed;
use frost_secp256k1 as frost_secp;
use frost_secp256k1::rand_core::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::macros::{impl_local_keygen, impl_local_sign};
use super::{EngineError, EngineRequest, EngineTask, SigningEngine};
use crate::ceremony::payload::PayloadId;
use crate::ceremony::request::Threshold;
use crate::ceremony::roster::{PeerId, Roster};
use crate::ceremony::types::{CeremonyResult, KeyMaterial, Signature};
use crate::config::Ciphersuite;

/// Length of a FROST response scalar for both supported ciphersuites.
const SCALAR_LEN: usize = 32;

/// Largest roster this engine will simulate. Every party handles a package
/// from every other party, so work grows with the square of the roster.
pub const MAX_LOCAL_PARTIES: u16 = 64;

/// Opaque share payload carried inside [`KeyMaterial`].
///
/// Only ever held briefly; its serialized form is wrapped in `Zeroizing`.
#[derive(Serialize, Deserialize)]
struct ShareBundle {
    min_signers: u16,
    public_key_package: String,
    /// Base64 key package per 1-based party index.
    key_packages: BTreeMap<u16, String>,
}

/// Signing quorum fixed at key generation.
///
/// FROST needs at least two signers, so a threshold of one still requires two.
pub fn signing_quorum(threshold: Threshold) -> u16 {
    threshold.t.max(2)
}

impl_local_keygen!(keygen_secp256k1, frost_secp);
impl_local_keygen!(keygen_ed25519, frost_ed);
impl_local_sign!(sign_secp256k1, frost_secp);
impl_local_sign!(sign_ed25519, frost_ed);

/// FROST engine that plays every party itself.
#[derive(Debug, Clone)]
pub struct LocalFrostEngine {
    ciphersuite: Ciphersuite,
    unresponsive: Arc<HashSet<PeerId>>,
}

impl LocalFrostEngine {
    /// Engine producing keys on `ciphersuite`.
    ///
    /// Signing follows the ciphersuite recorded in the key material.
    pub fn new(ciphersuite: Ciphersuite) -> Self {
        Self {
            ciphersuite,
            unresponsive: Arc::new(HashSet::new()),
        }
    }

    /// Simulate peers that never answer protocol rounds.
    #[must_use]
    pub fn with_unresponsive(mut self, peers: impl IntoIterator<Item = PeerId>) -> Self {
        self.unresponsive = Arc::new(peers.into_iter().collect());
        self
    }

    pub fn ciphersuite(&self) -> Ciphersuite {
        self.ciphersuite
    }

    fn run_blocking(&self, request: EngineRequest) -> Result<CeremonyResult, EngineError> {
        match request.kind {
            EngineTask::KeyGen => self.keygen(&request.roster, request.threshold, request.payload_id),
            EngineTask::Sign {
                message,
                keygen_roster,
                signer_indices,
                key,
            } => self.sign(&message, &keygen_roster, &signer_indices, &key),
        }
    }

    fn keygen(
        &self,
        roster: &Roster,
        threshold: Threshold,
        payload_id: PayloadId,
    ) -> Result<CeremonyResult, EngineError> {
        if threshold.n > MAX_LOCAL_PARTIES {
            return Err(EngineError::Unavailable(format!(
                "local engine simulates at most {MAX_LOCAL_PARTIES} parties, roster has {}",
                threshold.n
            )));
        }

        // DKG needs every party
        if let Some(peer) = roster.peer_ids().find(|id| self.unresponsive.contains(*id)) {
            return Err(EngineError::UnresponsivePeer(peer.clone()));
        }

        let min_signers = signing_quorum(threshold);
        let (group_key, bundle) = match self.ciphersuite {
            Ciphersuite::Secp256k1 => keygen_secp256k1(threshold.n, min_signers)?,
            Ciphersuite::Ed25519 => keygen_ed25519(threshold.n, min_signers)?,
        };

        let share = Zeroizing::new(serde_json::to_vec(&bundle).map_err(|e| {
            EngineError::Protocol(format!("Failed to encode share bundle: {e}"))
        })?);

        tracing::debug!(
            payload_id = %payload_id,
            ciphersuite = %self.ciphersuite,
            max_signers = threshold.n,
            min_signers,
            "Local DKG finished"
        );

        Ok(CeremonyResult::KeyGen(KeyMaterial::new(
            payload_id,
            self.ciphersuite,
            group_key,
            &share,
        )))
    }

    fn sign(
        &self,
        message: &[u8],
        keygen_roster: &Roster,
        signer_indices: &[u16],
        key: &KeyMaterial,
    ) -> Result<CeremonyResult, EngineError> {
        let share = Zeroizing::new(
            key.share_bytes()
                .map_err(|e| EngineError::InvalidKeyMaterial(format!("Invalid share base64: {e}")))?,
        );
        let bundle: ShareBundle = serde_json::from_slice(&share)
            .map_err(|e| EngineError::InvalidKeyMaterial(format!("Invalid share bundle: {e}")))?;

        // Drop parties that never answer
        let responsive: Vec<u16> = signer_indices
            .iter()
            .copied()
            .filter(|index| {
                keygen_roster
                    .entries()
                    .get(usize::from(*index).saturating_sub(1))
                    .is_none_or(|entry| !self.unresponsive.contains(entry.id()))
            })
            .collect();

        let available = u16::try_from(responsive.len()).unwrap_or(u16::MAX);
        if available < bundle.min_signers {
            return Err(EngineError::InsufficientParticipants {
                required: bundle.min_signers,
                available,
            });
        }

        let (group_key, signature) = match key.ciphersuite() {
            Ciphersuite::Secp256k1 => sign_secp256k1(message, &bundle, &responsive)?,
            Ciphersuite::Ed25519 => sign_ed25519(message, &bundle, &responsive)?,
        };

        let group_key = hex::encode(group_key);
        if group_key != key.group_key() {
            return Err(EngineError::InvalidKeyMaterial(
                "Share bundle does not belong to the stated group key".to_string(),
            ));
        }

        split_signature(key.ciphersuite(), &signature, group_key).map(CeremonyResult::SignOffline)
    }
}

/// Split a serialized FROST signature into `R || z`.
///
/// For secp256k1 `R` is a compressed point and its prefix gives the
/// recovery id (0x02 even, 0x03 odd).
fn split_signature(
    ciphersuite: Ciphersuite,
    bytes: &[u8],
    group_key: String,
) -> Result<Signature, EngineError> {
    if bytes.len() <= SCALAR_LEN {
        return Err(EngineError::Protocol(format!(
            "Signature too short: {} bytes",
            bytes.len()
        )));
    }
    let (r, s) = bytes.split_at(bytes.len() - SCALAR_LEN);

    let recovery_id = match ciphersuite {
        Ciphersuite::Secp256k1 => match r.first() {
            Some(0x02) => Some(0),
            Some(0x03) => Some(1),
            other => {
                return Err(EngineError::Protocol(format!(
                    "Invalid secp256k1 commitment prefix: {other:?}"
                )));
            }
        },
        Ciphersuite::Ed25519 => None,
    };

    Ok(Signature {
        ciphersuite,
        r: hex::encode(r),
        s: hex::encode(s),
        recovery_id,
        group_key,
    })
}

impl SigningEngine for LocalFrostEngine {
    async fn run_ceremony(&self, request: EngineRequest) -> Result<CeremonyResult, EngineError> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.run_blocking(request))
            .await
            .map_err(|e| EngineError::Unavailable(format!("Engine task failed: {e}")))?
    }
}
