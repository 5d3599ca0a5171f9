//! Service token middleware for the HTTP surface.
//!
//! Guards the transport with INTERNAL_SERVICE_TOKEN. Health and build info
//! stay public. The per-request ceremony auth header is a separate check done
//! by the coordinator.

use std::sync::Arc;

use actix_web::body::{EitherBody, MessageBody};
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready};
use actix_web::http::header::{AUTHORIZATION, HeaderMap};
use actix_web::{Error, HttpResponse};
use futures_util::future::{LocalBoxFuture, Ready, ready};

use crate::ceremony::ResultEnvelope;
use crate::config::Settings;
use crate::error::CeremonyError;

const PUBLIC_PATHS: &[&str] = &["/health", "/build-info"];
const TOKEN_HEADER: &str = "x-internal-token";

/// When a service token is demanded and what it must be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenPolicy {
    /// Every non-public request must present the token.
    Required(String),
    /// A presented token must match, but none is needed.
    Optional(String),
    /// No token configured.
    Open,
    /// Token demanded but never configured: reject everything.
    Misconfigured,
}

impl TokenPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        match (settings.internal_token_required(), settings.internal_token()) {
            (true, Some(token)) => Self::Required(token.to_string()),
            (true, None) => Self::Misconfigured,
            (false, Some(token)) => Self::Optional(token.to_string()),
            (false, None) => Self::Open,
        }
    }

    /// Whether a request carrying `provided` may pass.
    pub fn allows(&self, provided: Option<&str>) -> bool {
        match (self, provided) {
            (Self::Open, _) | (Self::Optional(_), None) => true,
            (Self::Required(expected) | Self::Optional(expected), Some(provided)) => {
                provided == expected
            }
            (Self::Required(_) | Self::Misconfigured, None) | (Self::Misconfigured, Some(_)) => {
                false
            }
        }
    }
}

/// Token from `Authorization: Bearer` or, failing that, `X-Internal-Token`.
fn presented_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    let fallback = || {
        headers
            .get(TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
    };
    bearer.or_else(fallback).map(|token| token.trim().to_string())
}

/// Middleware enforcing the service token on every non-public path.
#[derive(Clone)]
pub struct InternalAuth {
    policy: Arc<TokenPolicy>,
}

impl InternalAuth {
    pub fn new(settings: &Settings) -> Self {
        Self::with_policy(TokenPolicy::from_settings(settings))
    }

    pub fn with_policy(policy: TokenPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for InternalAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = InternalAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(InternalAuthMiddleware {
            service,
            policy: Arc::clone(&self.policy),
        }))
    }
}

pub struct InternalAuthMiddleware<S> {
    service: S,
    policy: Arc<TokenPolicy>,
}

impl<S, B> Service<ServiceRequest> for InternalAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let public = PUBLIC_PATHS.contains(&req.path());
        if !public && !self.policy.allows(presented_token(req.headers()).as_deref()) {
            tracing::warn!(path = %req.path(), "Rejected request without valid service token");
            let err = CeremonyError::Unauthorized("missing or invalid service token".to_string());
            let response = HttpResponse::Unauthorized().json(ResultEnvelope::error(None, &err));
            let (req, _pl) = req.into_parts();
            return Box::pin(async move {
                Ok(ServiceResponse::new(req, response.map_into_right_body()))
            });
        }

        let fut = self.service.call(req);
        Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
    }
}
