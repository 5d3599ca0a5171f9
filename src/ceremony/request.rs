//! Ceremony request: one validated, immutable unit of work.

use serde::{Deserialize, Serialize};

use crate::ceremony::payload::{CeremonyPayload, PayloadId, SignOffline};
use crate::ceremony::roster::{PeerId, Roster};
use crate::ceremony::types::CeremonyKind;
use crate::error::{PayloadError, RequestError};

/// Threshold pair `(t, n)`.
///
/// `n` participants, tolerating up to `t` corrupt or unresponsive ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threshold {
    pub t: u16,
    pub n: u16,
}

impl Threshold {
    pub const fn new(t: u16, n: u16) -> Self {
        Self { t, n }
    }

    /// Require `1 <= t < n` and `n == roster_len`.
    pub fn validate(self, roster_len: usize) -> Result<(), RequestError> {
        let in_range = self.t >= 1 && self.t < self.n && usize::from(self.n) == roster_len;
        if in_range {
            Ok(())
        } else {
            Err(RequestError::ThresholdOutOfRange {
                t: self.t,
                n: self.n,
                roster_len,
            })
        }
    }
}

/// Unvalidated request as it arrives over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCeremonyRequest {
    pub payload_id: PayloadId,
    pub payload_type: CeremonyPayload,
    pub peers: Roster,
    pub sender: PeerId,
    pub t: u16,
    pub n: u16,
}

/// A request whose roster, threshold and payload shape have been validated.
///
/// Checks that need coordinator state (keygen lineage, payload id
/// freshness) happen when the coordinator admits the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCeremonyRequest", into = "RawCeremonyRequest")]
pub struct CeremonyRequest {
    payload_id: PayloadId,
    payload_type: CeremonyPayload,
    peers: Roster,
    sender: PeerId,
    threshold: Threshold,
}

impl CeremonyRequest {
    /// Validate and build a request.
    ///
    /// Fails fast in a fixed order: roster, threshold, payload shape.
    pub fn new(
        payload_id: PayloadId,
        payload_type: CeremonyPayload,
        peers: Roster,
        sender: PeerId,
        t: u16,
        n: u16,
    ) -> Result<Self, RequestError> {
        peers.validate(&sender)?;

        let threshold = Threshold::new(t, n);
        threshold.validate(peers.len())?;

        payload_type.validate(None)?;
        if let CeremonyPayload::SignOffline(sign) = &payload_type {
            sign.keygen_peers.ensure_unique()?;
        }

        Ok(Self {
            payload_id,
            payload_type,
            peers,
            sender,
            threshold,
        })
    }

    pub fn payload_id(&self) -> PayloadId {
        self.payload_id
    }

    pub fn payload_type(&self) -> &CeremonyPayload {
        &self.payload_type
    }

    pub fn kind(&self) -> CeremonyKind {
        self.payload_type.kind()
    }

    pub fn peers(&self) -> &Roster {
        &self.peers
    }

    pub fn sender(&self) -> &PeerId {
        &self.sender
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    pub fn sign_offline(&self) -> Option<&SignOffline> {
        self.payload_type.as_sign_offline()
    }

    /// Check a signing request against the roster recorded for its `keygen_id`.
    ///
    /// Both the claimed `keygen_peers` and the signing roster itself must be
    /// drawn from the recorded roster. A `KeyGen` request passes trivially.
    pub fn check_keygen_lineage(&self, recorded_keygen_roster: &Roster) -> Result<(), RequestError> {
        let Some(sign) = self.sign_offline() else {
            return Ok(());
        };
        sign.validate(recorded_keygen_roster)?;
        if let Some(stray) = self.peers.first_outside(recorded_keygen_roster) {
            return Err(PayloadError::KeygenRosterMismatch(stray.clone()).into());
        }
        Ok(())
    }

    /// 1-based keygen party index of every signing peer, in signing roster order.
    ///
    /// Only meaningful after `check_keygen_lineage` succeeded.
    pub fn signer_indices(&self, recorded_keygen_roster: &Roster) -> Result<Vec<u16>, RequestError> {
        self.peers
            .peer_ids()
            .map(|id| {
                recorded_keygen_roster
                    .position(id)
                    .ok_or_else(|| PayloadError::KeygenRosterMismatch(id.clone()).into())
            })
            .collect()
    }
}

impl TryFrom<RawCeremonyRequest> for CeremonyRequest {
    type Error = RequestError;

    fn try_from(raw: RawCeremonyRequest) -> Result<Self, Self::Error> {
        Self::new(
            raw.payload_id,
            raw.payload_type,
            raw.peers,
            raw.sender,
            raw.t,
            raw.n,
        )
    }
}

impl From<CeremonyRequest> for RawCeremonyRequest {
    fn from(request: CeremonyRequest) -> Self {
        Self {
            payload_id: request.payload_id,
            payload_type: request.payload_type,
            peers: request.peers,
            sender: request.sender,
            t: request.threshold.t,
            n: request.threshold.n,
        }
    }
}

/// Anything the coordinator can admit as a ceremony request.
///
/// Lets the coordinator check the payload kind before the rest of an
/// unvalidated wire request is validated.
pub trait CeremonyInput {
    fn payload_id(&self) -> PayloadId;
    fn kind(&self) -> CeremonyKind;
    fn into_request(self) -> Result<CeremonyRequest, RequestError>;

    /// Require a specific payload kind.
    fn expect_kind(&self, expected: CeremonyKind) -> Result<(), RequestError> {
        let actual = self.kind();
        if actual == expected {
            Ok(())
        } else {
            Err(RequestError::WrongPayloadType { expected, actual })
        }
    }
}

impl CeremonyInput for CeremonyRequest {
    fn payload_id(&self) -> PayloadId {
        self.payload_id
    }

    fn kind(&self) -> CeremonyKind {
        self.payload_type.kind()
    }

    fn into_request(self) -> Result<CeremonyRequest, RequestError> {
        Ok(self)
    }
}

impl CeremonyInput for RawCeremonyRequest {
    fn payload_id(&self) -> PayloadId {
        self.payload_id
    }

    fn kind(&self) -> CeremonyKind {
        self.payload_type.kind()
    }

    fn into_request(self) -> Result<CeremonyRequest, RequestError> {
        CeremonyRequest::try_from(self)
    }
}
