//! Ceremony payload: what ceremony to run and the inputs it needs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ceremony::roster::Roster;
use crate::ceremony::types::CeremonyKind;
use crate::error::PayloadError;

/// Length of the message digest signed by a `SignOffline` ceremony.
pub const DIGEST_LEN: usize = 32;

/// 32-byte identifier scoping one ceremony instance.
///
/// Serializes as a JSON array of 32 numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadId([u8; 32]);

impl PayloadId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; 32]> for PayloadId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for PayloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for PayloadId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|e| format!("Invalid payload id hex: {e}"))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| format!("Invalid payload id length: expected 32, got {}", b.len()))?;
        Ok(Self(bytes))
    }
}

/// Inputs of a signing ceremony over a key from a prior key generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignOffline {
    /// Digest to sign. Kept as raw bytes so a wrong length surfaces as a typed error.
    pub message: Vec<u8>,
    /// Payload id of the key generation ceremony that produced the key.
    pub keygen_id: PayloadId,
    /// Roster that ran that key generation, in key generation order.
    pub keygen_peers: Roster,
}

impl SignOffline {
    pub fn new(message: [u8; DIGEST_LEN], keygen_id: PayloadId, keygen_peers: Roster) -> Self {
        Self {
            message: message.to_vec(),
            keygen_id,
            keygen_peers,
        }
    }

    /// The message as a fixed-size digest, if it has the right length.
    pub fn digest(&self) -> Option<[u8; DIGEST_LEN]> {
        self.message.as_slice().try_into().ok()
    }

    /// Checks that need nothing but the payload itself.
    pub fn validate_shape(&self) -> Result<(), PayloadError> {
        match self.message.len() {
            0 => return Err(PayloadError::EmptyMessage),
            DIGEST_LEN => {}
            actual => {
                return Err(PayloadError::InvalidDigestLength {
                    expected: DIGEST_LEN,
                    actual,
                });
            }
        }
        if self.keygen_peers.is_empty() {
            return Err(PayloadError::EmptyKeygenRoster);
        }
        Ok(())
    }

    /// Full validation against the roster recorded for `keygen_id`.
    ///
    /// The payload cannot resolve `keygen_id` on its own; the caller supplies
    /// the recorded roster.
    pub fn validate(&self, recorded_keygen_roster: &Roster) -> Result<(), PayloadError> {
        self.validate_shape()?;
        if let Some(stray) = self.keygen_peers.first_outside(recorded_keygen_roster) {
            return Err(PayloadError::KeygenRosterMismatch(stray.clone()));
        }
        Ok(())
    }
}

/// What ceremony to run.
///
/// On the wire this is `{"KeyGen": null}` or `{"SignOffline": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WirePayload", into = "WirePayload")]
pub enum CeremonyPayload {
    /// Fresh distributed key generation.
    KeyGen,
    /// Signing with a key produced by an earlier `KeyGen`.
    SignOffline(SignOffline),
}

impl CeremonyPayload {
    pub fn kind(&self) -> CeremonyKind {
        match self {
            Self::KeyGen => CeremonyKind::KeyGen,
            Self::SignOffline(_) => CeremonyKind::SignOffline,
        }
    }

    pub fn as_sign_offline(&self) -> Option<&SignOffline> {
        match self {
            Self::SignOffline(sign) => Some(sign),
            Self::KeyGen => None,
        }
    }

    /// Validate the payload.
    ///
    /// `KeyGen` always succeeds. `SignOffline` runs its shape checks, plus the
    /// roster-membership check when the recorded keygen roster is supplied.
    pub fn validate(&self, recorded_keygen_roster: Option<&Roster>) -> Result<(), PayloadError> {
        match (self, recorded_keygen_roster) {
            (Self::KeyGen, _) => Ok(()),
            (Self::SignOffline(sign), Some(roster)) => sign.validate(roster),
            (Self::SignOffline(sign), None) => sign.validate_shape(),
        }
    }
}

// Unit variant written as `{"KeyGen": null}`, matching existing clients.
#[derive(Serialize, Deserialize)]
enum WirePayload {
    KeyGen(()),
    SignOffline(SignOffline),
}

impl From<WirePayload> for CeremonyPayload {
    fn from(wire: WirePayload) -> Self {
        match wire {
            WirePayload::KeyGen(()) => Self::KeyGen,
            WirePayload::SignOffline(sign) => Self::SignOffline(sign),
        }
    }
}

impl From<CeremonyPayload> for WirePayload {
    fn from(payload: CeremonyPayload) -> Self {
        match payload {
            CeremonyPayload::KeyGen => Self::KeyGen(()),
            CeremonyPayload::SignOffline(sign) => Self::SignOffline(sign),
        }
    }
}
