//! Ceremony coordinator: validates requests, sequences them against the
//! ledger and dispatches them to the signing engine.
//!
//! Validation runs in a fixed order and the first failure wins:
//! auth, payload kind, roster, threshold, payload shape, keygen lineage
//! (sign only), key material (sign only), payload id freshness. Nothing
//! before the final step consumes the payload id, and nothing reaches the
//! engine unless every step passed.

use chrono::Utc;
use tracing::Instrument;

use crate::auth::{AllowAll, AuthHeader, Authenticator, ClientContext, ConfiguredAuth};
use crate::ceremony::payload::PayloadId;
use crate::ceremony::registry::{CeremonyStatus, KeygenRecord, Registry};
use crate::ceremony::request::{CeremonyInput, CeremonyRequest};
use crate::ceremony::types::{CeremonyKind, CeremonyResult, KeyMaterial, Signature};
use crate::config::Settings;
use crate::engine::{EngineRequest, EngineTask, LocalFrostEngine, SigningEngine};
use crate::error::{CeremonyError, CeremonyResultOf, RequestError};
use crate::storage::Storage;

/// Coordinator wired from settings.
pub type DefaultCoordinator = Coordinator<LocalFrostEngine, ConfiguredAuth>;

/// Owns the ceremony ledger and the engine it dispatches to.
pub struct Coordinator<E, A = AllowAll> {
    engine: E,
    auth: A,
    registry: Registry,
}

impl DefaultCoordinator {
    /// Build a coordinator from settings.
    ///
    /// Uses a file-backed ledger when `CEREMONY_DB_PATH` is set, otherwise an
    /// in-memory one.
    pub fn from_settings(settings: &Settings) -> CeremonyResultOf<Self> {
        let storage = match settings.db_path() {
            Some(path) => Storage::open(path)?,
            None => {
                tracing::info!("No CEREMONY_DB_PATH set, ceremony ledger is in-memory");
                Storage::open_memory()?
            }
        };
        Ok(Self::new(
            LocalFrostEngine::new(settings.ciphersuite()),
            ConfiguredAuth::from_settings(settings),
            Registry::new(storage)?,
        ))
    }
}

impl<E: SigningEngine> Coordinator<E, AllowAll> {
    /// Coordinator with an in-memory ledger that accepts every caller.
    pub fn in_memory(engine: E) -> CeremonyResultOf<Self> {
        Ok(Self::new(engine, AllowAll, Registry::in_memory()?))
    }
}

impl<E: SigningEngine, A: Authenticator> Coordinator<E, A> {
    pub fn new(engine: E, auth: A, registry: Registry) -> Self {
        Self {
            engine,
            auth,
            registry,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Ledger status of a payload id.
    pub fn ceremony_status(&self, payload_id: &PayloadId) -> Option<CeremonyStatus> {
        self.registry.status(payload_id)
    }

    /// Record of a completed key generation.
    pub fn keygen_record(&self, keygen_id: &PayloadId) -> CeremonyResultOf<Option<KeygenRecord>> {
        self.registry.completed_keygen(keygen_id)
    }

    /// First two admission steps: caller auth, then payload kind.
    ///
    /// Callers that decode more input of their own (such as key material)
    /// run this first so those steps keep their precedence.
    pub fn precheck(
        &self,
        auth_header: &AuthHeader,
        input: &impl CeremonyInput,
        expected: CeremonyKind,
        client: &ClientContext,
    ) -> CeremonyResultOf<()> {
        self.auth.authenticate(auth_header, client)?;
        input.expect_kind(expected)?;
        Ok(())
    }

    /// Run a distributed key generation ceremony.
    ///
    /// `enable_log` adds per-step diagnostics and never changes the outcome.
    pub async fn run_keygen(
        &self,
        auth_header: &AuthHeader,
        request: impl CeremonyInput,
        client: &ClientContext,
        enable_log: bool,
    ) -> CeremonyResultOf<KeyMaterial> {
        let span = tracing::info_span!(
            "keygen",
            payload_id = %request.payload_id(),
            client = %client.identity,
            addr = %client.addr,
        );
        self.keygen_inner(auth_header, request, client, enable_log)
            .instrument(span)
            .await
    }

    /// Run a signing ceremony with key material from a completed key generation.
    ///
    /// `enable_log` adds per-step diagnostics and never changes the outcome.
    pub async fn run_sign(
        &self,
        auth_header: &AuthHeader,
        request: impl CeremonyInput,
        local_key: KeyMaterial,
        client: &ClientContext,
        enable_log: bool,
    ) -> CeremonyResultOf<Signature> {
        let span = tracing::info_span!(
            "sign",
            payload_id = %request.payload_id(),
            client = %client.identity,
            addr = %client.addr,
        );
        self.sign_inner(auth_header, request, local_key, client, enable_log)
            .instrument(span)
            .await
    }

    async fn keygen_inner(
        &self,
        auth_header: &AuthHeader,
        input: impl CeremonyInput,
        client: &ClientContext,
        enable_log: bool,
    ) -> CeremonyResultOf<KeyMaterial> {
        let request = self
            .admit(auth_header, input, CeremonyKind::KeyGen, client, enable_log)
            .inspect_err(log_rejection)?;
        self.reserve(&request)?;

        let payload_id = request.payload_id();
        let outcome = self.keygen_reserved(&request, enable_log).await;
        self.settle(payload_id, outcome)
    }

    async fn keygen_reserved(
        &self,
        request: &CeremonyRequest,
        enable_log: bool,
    ) -> CeremonyResultOf<KeyMaterial> {
        let payload_id = request.payload_id();
        let engine_request = EngineRequest {
            payload_id,
            kind: EngineTask::KeyGen,
            roster: request.peers().clone(),
            sender: request.sender().clone(),
            threshold: request.threshold(),
        };

        let key = match self.dispatch(engine_request, enable_log).await? {
            CeremonyResult::KeyGen(key) if key.keygen_id() == payload_id => key,
            CeremonyResult::KeyGen(key) => {
                return Err(self.engine_fault(
                    payload_id,
                    format!("engine scoped key material to {}", key.keygen_id()),
                ));
            }
            other => {
                return Err(self.engine_fault(
                    payload_id,
                    format!("engine returned a {} result for a KeyGen ceremony", other.kind()),
                ));
            }
        };

        self.registry.complete_keygen(KeygenRecord {
            keygen_id: payload_id,
            roster: request.peers().clone(),
            threshold: request.threshold(),
            ciphersuite: key.ciphersuite(),
            group_key: key.group_key().to_string(),
            share_fingerprint: key.fingerprint(),
            completed_at: Utc::now(),
        })?;

        tracing::info!(
            group_key = %key.group_key(),
            ciphersuite = %key.ciphersuite(),
            "Key generation completed"
        );
        Ok(key)
    }

    async fn sign_inner(
        &self,
        auth_header: &AuthHeader,
        input: impl CeremonyInput,
        local_key: KeyMaterial,
        client: &ClientContext,
        enable_log: bool,
    ) -> CeremonyResultOf<Signature> {
        let (request, record) = self
            .admit_sign(auth_header, input, &local_key, client, enable_log)
            .inspect_err(log_rejection)?;
        let signer_indices = request
            .signer_indices(&record.roster)
            .map_err(CeremonyError::from)
            .inspect_err(log_rejection)?;
        let Some(message) = request.sign_offline().and_then(|sign| sign.digest()) else {
            return Err(CeremonyError::Internal("admitted request lost its digest".to_string()));
        };
        self.reserve(&request)?;

        let payload_id = request.payload_id();
        let keygen_id = record.keygen_id;
        let engine_request = EngineRequest {
            payload_id,
            kind: EngineTask::Sign {
                message,
                keygen_roster: record.roster,
                signer_indices,
                key: local_key,
            },
            roster: request.peers().clone(),
            sender: request.sender().clone(),
            threshold: request.threshold(),
        };

        let outcome = self.sign_reserved(engine_request, enable_log).await;
        let signature = self.settle(payload_id, outcome)?;
        tracing::info!(keygen_id = %keygen_id, "Signing completed");
        Ok(signature)
    }

    async fn sign_reserved(
        &self,
        engine_request: EngineRequest,
        enable_log: bool,
    ) -> CeremonyResultOf<Signature> {
        let payload_id = engine_request.payload_id;
        let signature = match self.dispatch(engine_request, enable_log).await? {
            CeremonyResult::SignOffline(signature) => signature,
            other => {
                return Err(self.engine_fault(
                    payload_id,
                    format!("engine returned a {} result for a SignOffline ceremony", other.kind()),
                ));
            }
        };

        self.registry.complete(payload_id)?;
        Ok(signature)
    }

    /// Make sure a reserved ceremony never stays in flight once it has ended.
    fn settle<T>(&self, payload_id: PayloadId, outcome: CeremonyResultOf<T>) -> CeremonyResultOf<T> {
        let Err(err) = &outcome else {
            return outcome;
        };
        let in_flight = self
            .registry
            .status(&payload_id)
            .is_some_and(|status| !status.state.is_terminal());
        if in_flight {
            tracing::error!(error = %err, "Ceremony failed after reservation");
            if let Err(e) = self.registry.fail(payload_id, err.to_string()) {
                tracing::error!(error = %e, "Failed to record ceremony failure");
            }
        }
        outcome
    }

    /// Steps shared by both ceremonies, up to and including payload shape.
    fn admit(
        &self,
        auth_header: &AuthHeader,
        input: impl CeremonyInput,
        expected: CeremonyKind,
        client: &ClientContext,
        enable_log: bool,
    ) -> CeremonyResultOf<CeremonyRequest> {
        self.precheck(auth_header, &input, expected, client)?;
        let request = input.into_request()?;

        if enable_log {
            tracing::debug!(
                kind = %request.kind(),
                t = request.threshold().t,
                n = request.threshold().n,
                peers = request.peers().len(),
                sender = %request.sender(),
                "Request passed intrinsic validation"
            );
        }
        Ok(request)
    }

    /// Signing admission: lineage and key material checks on top of [`Self::admit`].
    fn admit_sign(
        &self,
        auth_header: &AuthHeader,
        input: impl CeremonyInput,
        local_key: &KeyMaterial,
        client: &ClientContext,
        enable_log: bool,
    ) -> CeremonyResultOf<(CeremonyRequest, KeygenRecord)> {
        let request = self.admit(auth_header, input, CeremonyKind::SignOffline, client, enable_log)?;
        let Some(sign) = request.sign_offline() else {
            return Err(RequestError::WrongPayloadType {
                expected: CeremonyKind::SignOffline,
                actual: request.kind(),
            }
            .into());
        };

        let keygen_id = sign.keygen_id;
        let record = self
            .registry
            .completed_keygen(&keygen_id)?
            .ok_or(RequestError::UnknownKeygenId(keygen_id))?;
        request.check_keygen_lineage(&record.roster)?;

        if local_key.keygen_id() != keygen_id {
            return Err(RequestError::KeyMaterialMismatch(format!(
                "key material belongs to {}, request references {keygen_id}",
                local_key.keygen_id()
            ))
            .into());
        }
        if local_key.fingerprint() != record.share_fingerprint
            || local_key.group_key() != record.group_key
            || local_key.ciphersuite() != record.ciphersuite
        {
            return Err(RequestError::KeyMaterialMismatch(format!(
                "key material is not the output of key generation {keygen_id}"
            ))
            .into());
        }

        if enable_log {
            tracing::debug!(
                keygen_id = %keygen_id,
                keygen_peers = record.roster.len(),
                "Signing request matches its key generation"
            );
        }
        Ok((request, record))
    }

    fn reserve(&self, request: &CeremonyRequest) -> CeremonyResultOf<()> {
        self.registry
            .reserve(request.payload_id(), request.kind())
            .inspect_err(log_rejection)?;
        tracing::info!(
            kind = %request.kind(),
            t = request.threshold().t,
            n = request.threshold().n,
            "Ceremony accepted"
        );
        Ok(())
    }

    /// Hand a reserved ceremony to the engine, burning the id on failure.
    async fn dispatch(
        &self,
        request: EngineRequest,
        enable_log: bool,
    ) -> CeremonyResultOf<CeremonyResult> {
        let payload_id = request.payload_id;
        if enable_log {
            tracing::debug!(
                kind = %request.kind.kind(),
                roster = request.roster.len(),
                "Dispatching to signing engine"
            );
        }

        match self.engine.run_ceremony(request).await {
            Ok(result) => Ok(result),
            Err(err) => Err(self.engine_fault(payload_id, err.to_string())),
        }
    }

    /// Mark the ceremony failed and build the error returned to the caller.
    fn engine_fault(&self, payload_id: PayloadId, reason: String) -> CeremonyError {
        tracing::error!(reason = %reason, "Ceremony failed in engine");
        if let Err(e) = self.registry.fail(payload_id, reason.clone()) {
            tracing::error!(error = %e, "Failed to record ceremony failure");
        }
        CeremonyError::EngineFailure(reason)
    }
}

fn log_rejection(err: &CeremonyError) {
    tracing::warn!(code = err.error_code(), error = %err, "Ceremony request rejected");
}
