//! Ceremony HTTP endpoints.
//!
//! Each endpoint answers with a [`ResultEnvelope`]; failures also carry the
//! HTTP status of the underlying [`CeremonyError`].

use actix_web::error::InternalError;
use actix_web::{HttpRequest, HttpResponse, ResponseError, web};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthHeader, ClientContext};
use crate::ceremony::{
    CeremonyKind, CeremonyResult, DefaultCoordinator, PayloadId, RawCeremonyRequest, ResultEnvelope,
    Signature,
};
use crate::error::{CeremonyError, CeremonyResultOf, RequestError};
use crate::ext::key_material_from_value;

/// Header carrying the opaque ceremony auth token.
pub const AUTH_HEADER: &str = "x-ceremony-auth";
/// Header naming the calling client, for logs.
pub const CLIENT_IDENTITY_HEADER: &str = "x-client-identity";

/// `?log=true` turns on per-ceremony diagnostics.
#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub log: bool,
}

/// Body of `POST /ceremony/sign`.
///
/// `local_key` is bare key material or a keygen success envelope. It is
/// decoded only after the caller and payload kind have been checked.
#[derive(Debug, Serialize, Deserialize)]
pub struct SignBody {
    pub request: RawCeremonyRequest,
    pub local_key: serde_json::Value,
}

/// JSON extractor config: body limit, and envelope-shaped parse errors.
pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(|err, _req| {
            let ceremony_err = CeremonyError::MalformedInput(err.to_string());
            let response = HttpResponse::build(ceremony_err.status_code())
                .json(ResultEnvelope::error(None, &ceremony_err));
            InternalError::from_response(err, response).into()
        })
}

fn caller(req: &HttpRequest) -> (AuthHeader, ClientContext) {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    let addr = req
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_default();
    (
        AuthHeader::new(header(AUTH_HEADER)),
        ClientContext::new(header(CLIENT_IDENTITY_HEADER), addr),
    )
}

fn respond<T: Into<CeremonyResult>>(payload_id: PayloadId, outcome: CeremonyResultOf<T>) -> HttpResponse {
    match outcome {
        Ok(value) => HttpResponse::Ok().json(ResultEnvelope::ok(payload_id, value.into())),
        Err(e) => HttpResponse::build(e.status_code()).json(ResultEnvelope::error(Some(payload_id), &e)),
    }
}

/// POST /ceremony/keygen
///
/// Run a distributed key generation.
#[tracing::instrument(skip_all, fields(payload_id = %request.payload_id))]
pub async fn keygen(
    coordinator: web::Data<DefaultCoordinator>,
    req: HttpRequest,
    query: web::Query<LogQuery>,
    request: web::Json<RawCeremonyRequest>,
) -> HttpResponse {
    let request = request.into_inner();
    let payload_id = request.payload_id;
    let (auth_header, client) = caller(&req);

    let outcome = coordinator
        .run_keygen(&auth_header, request, &client, query.log)
        .await;
    respond(payload_id, outcome)
}

/// POST /ceremony/sign
///
/// Run a signing ceremony with key material from an earlier key generation.
#[tracing::instrument(skip_all, fields(payload_id = %body.request.payload_id))]
pub async fn sign(
    coordinator: web::Data<DefaultCoordinator>,
    req: HttpRequest,
    query: web::Query<LogQuery>,
    body: web::Json<SignBody>,
) -> HttpResponse {
    let SignBody { request, local_key } = body.into_inner();
    let payload_id = request.payload_id;
    let (auth_header, client) = caller(&req);

    let key = coordinator
        .precheck(&auth_header, &request, CeremonyKind::SignOffline, &client)
        .and_then(|()| key_material_from_value(local_key));
    let key = match key {
        Ok(key) => key,
        Err(e) => return respond::<Signature>(payload_id, Err(e)),
    };

    let outcome = coordinator
        .run_sign(&auth_header, request, key, &client, query.log)
        .await;
    respond(payload_id, outcome)
}

/// GET /ceremony/{payload_id}
///
/// Ledger status of a payload id (hex encoded).
#[tracing::instrument(skip(coordinator))]
pub async fn status(coordinator: web::Data<DefaultCoordinator>, path: web::Path<String>) -> HttpResponse {
    let payload_id = match path.parse::<PayloadId>() {
        Ok(id) => id,
        Err(e) => {
            let err = CeremonyError::MalformedInput(e);
            return HttpResponse::build(err.status_code()).json(ResultEnvelope::error(None, &err));
        }
    };

    match coordinator.ceremony_status(&payload_id) {
        Some(status) => HttpResponse::Ok().json(status),
        None => {
            let err = CeremonyError::from(RequestError::UnknownPayloadId(payload_id));
            HttpResponse::build(err.status_code()).json(ResultEnvelope::error(Some(payload_id), &err))
        }
    }
}

/// Configure ceremony routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/ceremony")
            .route("/keygen", web::post().to(keygen))
            .route("/sign", web::post().to(sign))
            .route("/{payload_id}", web::get().to(status)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use serde_json::{Value, json};

    fn peers() -> Value {
        json!([
            ["alice", "/ip4/10.0.0.3/tcp/2619/ws"],
            ["bob", "/ip4/10.0.0.3/tcp/2620/ws"],
            ["carol", "/ip4/10.0.0.3/tcp/2621/ws"]
        ])
    }

    fn bytes(byte: u8) -> Value {
        serde_json::to_value([byte; 32]).unwrap()
    }

    fn keygen_body(id: u8, t: u16) -> Value {
        json!({
            "payload_id": bytes(id),
            "payload_type": {"KeyGen": null},
            "peers": peers(),
            "sender": "alice",
            "t": t,
            "n": 3
        })
    }

    macro_rules! app {
        ($coordinator:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($coordinator))
                    .app_data(json_config(64 * 1024))
                    .configure(configure),
            )
            .await
        };
    }

    fn coordinator() -> DefaultCoordinator {
        DefaultCoordinator::from_settings(&Settings::for_tests()).unwrap()
    }

    #[actix_rt::test]
    async fn test_keygen_sign_and_status() {
        let app = app!(coordinator());

        let req = test::TestRequest::post()
            .uri("/ceremony/keygen")
            .set_json(keygen_body(1, 2))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let envelope: Value = test::read_body_json(resp).await;
        let key = envelope["result"]["KeyGen"].clone();

        let sign = json!({
            "request": {
                "payload_id": bytes(2),
                "payload_type": {"SignOffline": {
                    "message": bytes(9),
                    "keygen_id": bytes(1),
                    "keygen_peers": peers()
                }},
                "peers": [["bob", "/ip4/10.0.0.3/tcp/2620/ws"], ["carol", "/ip4/10.0.0.3/tcp/2621/ws"]],
                "sender": "bob",
                "t": 1,
                "n": 2
            },
            "local_key": key
        });
        let req = test::TestRequest::post()
            .uri("/ceremony/sign?log=true")
            .set_json(sign)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let envelope: Value = test::read_body_json(resp).await;
        assert_eq!(envelope["status"], "ok");
        assert!(envelope["result"]["SignOffline"]["s"].is_string());

        let uri = format!("/ceremony/{}", PayloadId::new([2; 32]).to_hex());
        let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let status: Value = test::read_body_json(resp).await;
        assert_eq!(status["state"], "completed");
        assert_eq!(status["kind"], "SignOffline");
    }

    #[actix_rt::test]
    async fn test_validation_errors_map_to_status_codes() {
        let app = app!(coordinator());

        let req = test::TestRequest::post()
            .uri("/ceremony/keygen")
            .set_json(keygen_body(3, 3))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let envelope: Value = test::read_body_json(resp).await;
        assert_eq!(envelope["error"]["code"], "THRESHOLD_OUT_OF_RANGE");

        for expected in [StatusCode::OK, StatusCode::CONFLICT] {
            let req = test::TestRequest::post()
                .uri("/ceremony/keygen")
                .set_json(keygen_body(4, 2))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), expected);
        }
    }

    #[actix_rt::test]
    async fn test_malformed_body_gets_envelope() {
        let app = app!(coordinator());

        let req = test::TestRequest::post()
            .uri("/ceremony/keygen")
            .insert_header(("content-type", "application/json"))
            .set_payload("{\"payload_id\": [1, 2]}")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let envelope: Value = test::read_body_json(resp).await;
        assert_eq!(envelope["error"]["code"], "MALFORMED_INPUT");
        assert!(envelope["payload_id"].is_null());
    }

    #[actix_rt::test]
    async fn test_auth_header_checked() {
        let settings = Settings::for_tests().with_auth_token("tok");
        let app = app!(DefaultCoordinator::from_settings(&settings).unwrap());

        let req = test::TestRequest::post()
            .uri("/ceremony/keygen")
            .set_json(keygen_body(5, 2))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/ceremony/keygen")
            .insert_header((AUTH_HEADER, "tok"))
            .set_json(keygen_body(5, 2))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_rt::test]
    async fn test_status_lookup_errors() {
        let app = app!(coordinator());

        let resp = test::call_service(&app, test::TestRequest::get().uri("/ceremony/zz").to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let uri = format!("/ceremony/{}", PayloadId::new([7; 32]).to_hex());
        let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let envelope: Value = test::read_body_json(resp).await;
        assert_eq!(envelope["status"], "error");
        assert_eq!(envelope["error"]["code"], "UNKNOWN_PAYLOAD_ID");
        assert_eq!(envelope["payload_id"], bytes(7));

        let resp = test::call_service(&app, test::TestRequest::get().uri("/ceremony/zz").to_request()).await;
        let envelope: Value = test::read_body_json(resp).await;
        assert_eq!(envelope["error"]["code"], "MALFORMED_INPUT");
    }

    #[actix_rt::test]
    async fn test_sign_checks_auth_before_key() {
        let settings = Settings::for_tests().with_auth_token("tok");
        let app = app!(DefaultCoordinator::from_settings(&settings).unwrap());

        let sign = json!({
            "request": {
                "payload_id": bytes(8),
                "payload_type": {"SignOffline": {
                    "message": bytes(9),
                    "keygen_id": bytes(1),
                    "keygen_peers": peers()
                }},
                "peers": [["bob", "/ip4/10.0.0.3/tcp/2620/ws"], ["carol", "/ip4/10.0.0.3/tcp/2621/ws"]],
                "sender": "bob",
                "t": 1,
                "n": 2
            },
            "local_key": {"not": "a key"}
        });
        let req = test::TestRequest::post()
            .uri("/ceremony/sign")
            .set_json(&sign)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/ceremony/sign")
            .insert_header((AUTH_HEADER, "tok"))
            .set_json(&sign)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let envelope: Value = test::read_body_json(resp).await;
        assert_eq!(envelope["error"]["code"], "MALFORMED_INPUT");
    }
}
