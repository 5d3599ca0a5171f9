//! String-in, string-out entry points.
//!
//! Every input is a JSON string and every outcome, including malformed
//! input, comes back as a JSON [`ResultEnvelope`]. These functions never
//! panic and never return an `Err`.

use serde::Deserialize;

use crate::auth::{AuthHeader, Authenticator, ClientContext};
use crate::ceremony::{
    CeremonyKind, Coordinator, KeyMaterial, PayloadId, RawCeremonyRequest, ResultEnvelope,
};
use crate::engine::SigningEngine;
use crate::error::CeremonyError;

/// Run a key generation from a JSON request.
///
/// Resolves to the JSON envelope carrying the key material.
pub async fn ext_run_keygen<E: SigningEngine, A: Authenticator>(
    coordinator: &Coordinator<E, A>,
    auth_header: &str,
    payload: &str,
    client_identity: &str,
    client_addr: &str,
    enable_log: bool,
) -> String {
    let request = match parse_request(payload) {
        Ok(request) => request,
        Err(envelope) => return envelope.to_json(),
    };
    let payload_id = request.payload_id;
    let client = ClientContext::new(client_identity, client_addr);

    let outcome = coordinator
        .run_keygen(&AuthHeader::from(auth_header), request, &client, enable_log)
        .await;
    ResultEnvelope::from_outcome(payload_id, outcome).to_json()
}

/// Run a signing ceremony from a JSON request and JSON key material.
///
/// `local_key` may be bare key material or the whole envelope returned by
/// [`ext_run_keygen`].
pub async fn ext_run_sign<E: SigningEngine, A: Authenticator>(
    coordinator: &Coordinator<E, A>,
    auth_header: &str,
    payload: &str,
    local_key: &str,
    client_identity: &str,
    client_addr: &str,
    enable_log: bool,
) -> String {
    let request = match parse_request(payload) {
        Ok(request) => request,
        Err(envelope) => return envelope.to_json(),
    };
    let payload_id = request.payload_id;
    let auth_header = AuthHeader::from(auth_header);
    let client = ClientContext::new(client_identity, client_addr);

    let key = coordinator
        .precheck(&auth_header, &request, CeremonyKind::SignOffline, &client)
        .and_then(|()| parse_key_material(local_key));
    let key = match key {
        Ok(key) => key,
        Err(err) => {
            tracing::warn!(code = err.error_code(), error = %err, "Signing request rejected");
            return ResultEnvelope::error(Some(payload_id), &err).to_json();
        }
    };

    let outcome = coordinator
        .run_sign(&auth_header, request, key, &client, enable_log)
        .await;
    ResultEnvelope::from_outcome(payload_id, outcome).to_json()
}

fn parse_request(payload: &str) -> Result<RawCeremonyRequest, ResultEnvelope> {
    serde_json::from_str(payload).map_err(|e| {
        let err = CeremonyError::MalformedInput(format!("invalid ceremony request: {e}"));
        ResultEnvelope::error(recover_payload_id(payload), &err)
    })
}

/// Best-effort payload id from a request that failed to parse as a whole.
fn recover_payload_id(payload: &str) -> Option<PayloadId> {
    #[derive(Deserialize)]
    struct IdOnly {
        payload_id: PayloadId,
    }
    serde_json::from_str::<IdOnly>(payload)
        .ok()
        .map(|id| id.payload_id)
}

fn parse_key_material(local_key: &str) -> Result<KeyMaterial, CeremonyError> {
    let value = serde_json::from_str(local_key).map_err(|_| {
        CeremonyError::MalformedInput("local_key is not valid JSON".to_string())
    })?;
    key_material_from_value(value)
}

/// Key material given either bare or as a keygen success envelope.
pub(crate) fn key_material_from_value(
    local_key: serde_json::Value,
) -> Result<KeyMaterial, CeremonyError> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum KeyInput {
        Bare(KeyMaterial),
        Envelope(ResultEnvelope),
    }

    match serde_json::from_value::<KeyInput>(local_key) {
        Ok(KeyInput::Bare(key)) => Ok(key),
        Ok(KeyInput::Envelope(envelope)) => envelope.into_key_material().ok_or_else(|| {
            CeremonyError::MalformedInput(
                "local_key envelope does not carry key material".to_string(),
            )
        }),
        Err(_) => Err(CeremonyError::MalformedInput(
            "local_key is neither key material nor a keygen result envelope".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenAuth;
    use crate::ceremony::Registry;
    use crate::config::Ciphersuite;
    use crate::engine::LocalFrostEngine;

    fn coordinator() -> Coordinator<LocalFrostEngine> {
        Coordinator::in_memory(LocalFrostEngine::new(Ciphersuite::Secp256k1)).unwrap()
    }

    fn ids(byte: u8) -> String {
        serde_json::to_string(&PayloadId::new([byte; 32])).unwrap()
    }

    fn keygen_payload(byte: u8) -> String {
        format!(
            r#"{{"payload_id":{},"payload_type":{{"KeyGen":null}},
            "peers":[["alice","/ip4/10.0.0.3/tcp/2619/ws"],["bob","/ip4/10.0.0.3/tcp/2620/ws"],["carol","/ip4/10.0.0.3/tcp/2621/ws"]],
            "sender":"alice","t":2,"n":3}}"#,
            ids(byte)
        )
    }

    fn sign_payload(byte: u8, keygen: u8) -> String {
        format!(
            r#"{{"payload_id":{},"payload_type":{{"SignOffline":{{"message":{},"keygen_id":{},
            "keygen_peers":[["alice","/ip4/10.0.0.3/tcp/2619/ws"],["bob","/ip4/10.0.0.3/tcp/2620/ws"],["carol","/ip4/10.0.0.3/tcp/2621/ws"]]}}}},
            "peers":[["alice","/ip4/10.0.0.3/tcp/2619/ws"],["bob","/ip4/10.0.0.3/tcp/2620/ws"]],
            "sender":"alice","t":1,"n":2}}"#,
            ids(byte),
            serde_json::to_string(&[7u8; 32]).unwrap(),
            ids(keygen)
        )
    }

    fn parse(json: &str) -> serde_json::Value {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn test_keygen_result_feeds_sign_directly() {
        let coordinator = coordinator();
        let keygen = ext_run_keygen(&coordinator, "", &keygen_payload(1), "wallet", "127.0.0.1", false).await;
        assert_eq!(parse(&keygen)["status"], "ok");

        let sign = ext_run_sign(
            &coordinator,
            "",
            &sign_payload(2, 1),
            &keygen,
            "wallet",
            "127.0.0.1",
            true,
        )
        .await;
        let sign = parse(&sign);
        assert_eq!(sign["status"], "ok", "{sign}");
        assert_eq!(sign["result"]["SignOffline"]["ciphersuite"], "secp256k1");
    }

    #[tokio::test]
    async fn test_bare_key_material_accepted() {
        let coordinator = coordinator();
        let keygen = ext_run_keygen(&coordinator, "", &keygen_payload(1), "", "", false).await;
        let key = parse(&keygen)["result"]["KeyGen"].to_string();

        let sign = ext_run_sign(&coordinator, "", &sign_payload(2, 1), &key, "", "", false).await;
        assert_eq!(parse(&sign)["status"], "ok");
    }

    #[tokio::test]
    async fn test_garbage_never_panics() {
        let coordinator = coordinator();
        for payload in ["", "not json", "{}", "[1,2,3]", r#"{"payload_id":[1,2]}"#] {
            let out = ext_run_keygen(&coordinator, "", payload, "", "", false).await;
            let out = parse(&out);
            assert_eq!(out["status"], "error");
            assert_eq!(out["error"]["code"], "MALFORMED_INPUT");
            assert!(out["payload_id"].is_null());
        }
    }

    #[tokio::test]
    async fn test_payload_id_recovered_from_partial_request() {
        let coordinator = coordinator();
        let payload = format!(r#"{{"payload_id":{},"peers":"oops"}}"#, ids(4));
        let out = parse(&ext_run_keygen(&coordinator, "", &payload, "", "", false).await);
        assert_eq!(out["error"]["code"], "MALFORMED_INPUT");
        assert_eq!(out["payload_id"].as_array().unwrap().len(), 32);
    }

    #[tokio::test]
    async fn test_bad_local_key() {
        let coordinator = coordinator();
        let out = ext_run_sign(&coordinator, "", &sign_payload(2, 1), "{}", "", "", false).await;
        let out = parse(&out);
        assert_eq!(out["error"]["code"], "MALFORMED_INPUT");
        assert!(!out["payload_id"].is_null());
    }

    #[tokio::test]
    async fn test_auth_outranks_bad_local_key() {
        let coordinator = Coordinator::new(
            LocalFrostEngine::new(Ciphersuite::Secp256k1),
            StaticTokenAuth::new("tok"),
            Registry::in_memory().unwrap(),
        );
        let out = ext_run_sign(&coordinator, "wrong", &sign_payload(2, 1), "{}", "", "", false).await;
        let out = parse(&out);
        assert_eq!(out["error"]["code"], "UNAUTHORIZED");

        let out = ext_run_sign(&coordinator, "tok", &sign_payload(2, 1), "{}", "", "", false).await;
        assert_eq!(parse(&out)["error"]["code"], "MALFORMED_INPUT");
    }

    #[tokio::test]
    async fn test_wrong_kind_outranks_bad_local_key() {
        let coordinator = coordinator();
        let out = ext_run_sign(&coordinator, "", &keygen_payload(3), "not json", "", "", false).await;
        let out = parse(&out);
        assert_eq!(out["error"]["code"], "WRONG_PAYLOAD_TYPE");
        assert!(coordinator.registry().is_empty());
    }

    #[tokio::test]
    async fn test_threshold_error_reaches_envelope() {
        let coordinator = coordinator();
        let payload = keygen_payload(5).replace(r#""t":2"#, r#""t":3"#);
        let out = parse(&ext_run_keygen(&coordinator, "", &payload, "", "", false).await);
        assert_eq!(out["error"]["code"], "THRESHOLD_OUT_OF_RANGE");
        assert_eq!(out["error"]["kind"], "validation");
    }
}
