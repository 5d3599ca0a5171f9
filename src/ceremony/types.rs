//! Ceremony outputs: key material and signatures.

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::ceremony::payload::PayloadId;
use crate::config::Ciphersuite;

/// Which kind of ceremony a payload or result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CeremonyKind {
    KeyGen,
    SignOffline,
}

impl fmt::Display for CeremonyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyGen => write!(f, "KeyGen"),
            Self::SignOffline => write!(f, "SignOffline"),
        }
    }
}

/// Opaque output of a key generation ceremony.
///
/// Scoped to the payload id that produced it. The caller persists it and
/// hands it back verbatim to a signing ceremony referencing that id.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    #[zeroize(skip)]
    keygen_id: PayloadId,
    #[zeroize(skip)]
    ciphersuite: Ciphersuite,
    /// Group verifying key (hex).
    #[zeroize(skip)]
    group_key: String,
    /// Engine-specific share blob (base64).
    share: String,
}

impl KeyMaterial {
    pub fn new(
        keygen_id: PayloadId,
        ciphersuite: Ciphersuite,
        group_key: String,
        share_bytes: &[u8],
    ) -> Self {
        Self {
            keygen_id,
            ciphersuite,
            group_key,
            share: BASE64.encode(share_bytes),
        }
    }

    pub fn keygen_id(&self) -> PayloadId {
        self.keygen_id
    }

    pub fn ciphersuite(&self) -> Ciphersuite {
        self.ciphersuite
    }

    pub fn group_key(&self) -> &str {
        &self.group_key
    }

    /// Decode the share blob.
    pub fn share_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.share)
    }

    /// SHA-256 over the encoded share, hex encoded.
    ///
    /// The coordinator keeps only this fingerprint to match key material
    /// against the key generation that produced it.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.share.as_bytes()))
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("keygen_id", &self.keygen_id)
            .field("ciphersuite", &self.ciphersuite)
            .field("group_key", &self.group_key)
            .field("share", &"<redacted>")
            .finish()
    }
}

/// Threshold signature produced by a signing ceremony.
///
/// For secp256k1, `r` is the compressed commitment point and `recovery_id`
/// its y-parity. Ed25519 signatures carry no recovery id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub ciphersuite: Ciphersuite,
    /// Commitment part (hex).
    pub r: String,
    /// Response scalar (hex).
    pub s: String,
    pub recovery_id: Option<u8>,
    /// Group key the signature verifies under (hex).
    pub group_key: String,
}

impl Signature {
    /// Concatenated `r || s` bytes in the ciphersuite's native encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>, hex::FromHexError> {
        let mut bytes = hex::decode(&self.r)?;
        bytes.extend(hex::decode(&self.s)?);
        Ok(bytes)
    }
}

/// Successful outcome of a ceremony, tagged by the payload type that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CeremonyResult {
    KeyGen(KeyMaterial),
    SignOffline(Signature),
}

impl CeremonyResult {
    pub fn kind(&self) -> CeremonyKind {
        match self {
            Self::KeyGen(_) => CeremonyKind::KeyGen,
            Self::SignOffline(_) => CeremonyKind::SignOffline,
        }
    }
}

impl From<KeyMaterial> for CeremonyResult {
    fn from(key: KeyMaterial) -> Self {
        Self::KeyGen(key)
    }
}

impl From<Signature> for CeremonyResult {
    fn from(signature: Signature) -> Self {
        Self::SignOffline(signature)
    }
}
