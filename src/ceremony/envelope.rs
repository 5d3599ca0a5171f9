//! Result envelope returned across the string boundary and the HTTP surface.

use serde::{Deserialize, Serialize};

use crate::ceremony::payload::PayloadId;
use crate::ceremony::types::{CeremonyResult, KeyMaterial};
use crate::error::{CeremonyError, ErrorBody};

/// Success or failure of one ceremony, tagged with the payload id it belongs to.
///
/// `payload_id` is `None` only when the request could not be parsed far
/// enough to find one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResultEnvelope {
    Ok {
        payload_id: PayloadId,
        result: CeremonyResult,
    },
    Error {
        payload_id: Option<PayloadId>,
        error: ErrorBody,
    },
}

impl ResultEnvelope {
    pub fn ok(payload_id: PayloadId, result: CeremonyResult) -> Self {
        Self::Ok { payload_id, result }
    }

    pub fn error(payload_id: Option<PayloadId>, error: &CeremonyError) -> Self {
        Self::Error {
            payload_id,
            error: error.to_body(),
        }
    }

    /// Wrap a coordinator outcome.
    pub fn from_outcome<T: Into<CeremonyResult>>(
        payload_id: PayloadId,
        outcome: Result<T, CeremonyError>,
    ) -> Self {
        match outcome {
            Ok(value) => Self::ok(payload_id, value.into()),
            Err(err) => Self::error(Some(payload_id), &err),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn payload_id(&self) -> Option<PayloadId> {
        match self {
            Self::Ok { payload_id, .. } => Some(*payload_id),
            Self::Error { payload_id, .. } => *payload_id,
        }
    }

    pub fn result(&self) -> Option<&CeremonyResult> {
        match self {
            Self::Ok { result, .. } => Some(result),
            Self::Error { .. } => None,
        }
    }

    pub fn error_body(&self) -> Option<&ErrorBody> {
        match self {
            Self::Ok { .. } => None,
            Self::Error { error, .. } => Some(error),
        }
    }

    /// Key material carried by a successful keygen envelope.
    pub fn into_key_material(self) -> Option<KeyMaterial> {
        match self {
            Self::Ok {
                result: CeremonyResult::KeyGen(key),
                ..
            } => Some(key),
            _ => None,
        }
    }

    /// JSON encoding of the envelope.
    ///
    /// Falls back to a fixed internal-error envelope if encoding fails, so the
    /// boundary always has a string to hand back.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to encode result envelope");
            r#"{"status":"error","payload_id":null,"error":{"kind":"internal","code":"INTERNAL_ERROR","message":"Internal error"}}"#
                .to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ceremony::types::Signature;
    use crate::config::Ciphersuite;
    use crate::error::{ErrorKind, RequestError};

    #[test]
    fn test_ok_envelope_shape() {
        let sig = Signature {
            ciphersuite: Ciphersuite::Secp256k1,
            r: "02aa".to_string(),
            s: "bb".to_string(),
            recovery_id: Some(0),
            group_key: "03cc".to_string(),
        };
        let envelope = ResultEnvelope::from_outcome(PayloadId::new([1; 32]), Ok::<_, CeremonyError>(sig));
        let json: serde_json::Value = serde_json::from_str(&envelope.to_json()).unwrap();

        assert_eq!(json["status"], "ok");
        assert_eq!(json["payload_id"].as_array().unwrap().len(), 32);
        assert_eq!(json["result"]["SignOffline"]["r"], "02aa");
    }

    #[test]
    fn test_error_envelope_shape() {
        let err = CeremonyError::Request(RequestError::DuplicatePayloadId(PayloadId::new([2; 32])));
        let envelope = ResultEnvelope::from_outcome::<KeyMaterial>(PayloadId::new([2; 32]), Err(err));
        assert!(!envelope.is_ok());

        let json: serde_json::Value = serde_json::from_str(&envelope.to_json()).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"]["kind"], "validation");
        assert_eq!(json["error"]["code"], "DUPLICATE_PAYLOAD_ID");

        let parsed: ResultEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.error_body().unwrap().kind, ErrorKind::Validation);
    }

    #[test]
    fn test_unparsed_request_has_null_payload_id() {
        let envelope =
            ResultEnvelope::error(None, &CeremonyError::MalformedInput("expected value".to_string()));
        let json: serde_json::Value = serde_json::from_str(&envelope.to_json()).unwrap();
        assert!(json["payload_id"].is_null());
        assert_eq!(json["error"]["code"], "MALFORMED_INPUT");
    }

    #[test]
    fn test_keygen_envelope_yields_key_material() {
        let key = KeyMaterial::new(PayloadId::new([3; 32]), Ciphersuite::Ed25519, "aa".to_string(), b"s");
        let envelope = ResultEnvelope::ok(PayloadId::new([3; 32]), key.clone().into());
        let round: ResultEnvelope = serde_json::from_str(&envelope.to_json()).unwrap();
        assert_eq!(round.into_key_material(), Some(key));
    }
}
