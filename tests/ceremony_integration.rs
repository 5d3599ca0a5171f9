//! Integration tests for key generation and signing ceremonies.
//!
//! These tests drive the public `Coordinator` API end to end with the local
//! FROST engine, a dispatch-counting mock engine, and file-backed ledgers.
//!
//! Run with: cargo test --test `ceremony_integration`

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;
use tokio::sync::Barrier;

use ceremony_coordinator::auth::{AuthHeader, ClientContext, StaticTokenAuth};
use ceremony_coordinator::ceremony::{
    CeremonyPayload, CeremonyRequest, CeremonyResult, CeremonyState, Coordinator, KeyMaterial,
    PayloadId, PeerEntry, PeerId, RawCeremonyRequest, Registry, Roster, SignOffline,
};
use ceremony_coordinator::config::{Ciphersuite, Settings};
use ceremony_coordinator::engine::{EngineError, EngineRequest, EngineTask, SigningEngine};
use ceremony_coordinator::{CeremonyError, DefaultCoordinator, LocalFrostEngine};

const DIGEST: [u8; 32] = [0x5a; 32];

fn roster(ids: &[&str]) -> Roster {
    ids.iter()
        .enumerate()
        .map(|(i, id)| PeerEntry::new(*id, format!("/ip4/10.0.0.3/tcp/{}/ws", 2619 + i).as_str()))
        .collect()
}

fn full_roster() -> Roster {
    roster(&["alice", "bob", "carol"])
}

fn keygen(id: u8) -> RawCeremonyRequest {
    RawCeremonyRequest {
        payload_id: PayloadId::new([id; 32]),
        payload_type: CeremonyPayload::KeyGen,
        peers: full_roster(),
        sender: PeerId::from("alice"),
        t: 2,
        n: 3,
    }
}

fn sign(id: u8, keygen_id: u8, signers: &[&str], keygen_peers: Roster) -> RawCeremonyRequest {
    let peers = full_roster()
        .iter()
        .filter(|entry| signers.contains(&entry.id().as_str()))
        .cloned()
        .collect::<Roster>();
    let n = u16::try_from(peers.len()).unwrap();
    RawCeremonyRequest {
        payload_id: PayloadId::new([id; 32]),
        payload_type: CeremonyPayload::SignOffline(SignOffline::new(
            DIGEST,
            PayloadId::new([keygen_id; 32]),
            keygen_peers,
        )),
        peers,
        sender: PeerId::from(signers[0]),
        t: n - 1,
        n,
    }
}

fn local(ciphersuite: Ciphersuite) -> Coordinator<LocalFrostEngine> {
    Coordinator::in_memory(LocalFrostEngine::new(ciphersuite)).unwrap()
}

fn anon() -> (AuthHeader, ClientContext) {
    (AuthHeader::default(), ClientContext::new("wallet", "127.0.0.1"))
}

fn code(err: &CeremonyError) -> &'static str {
    err.error_code()
}

/// Engine that counts dispatches and never produces a result.
#[derive(Clone, Default)]
struct MockEngine {
    dispatched: Arc<AtomicUsize>,
}

impl SigningEngine for MockEngine {
    async fn run_ceremony(&self, request: EngineRequest) -> Result<CeremonyResult, EngineError> {
        self.dispatched.fetch_add(1, Ordering::SeqCst);
        match request.kind {
            EngineTask::KeyGen => Err(EngineError::Unavailable("mock engine".to_string())),
            EngineTask::Sign { .. } => Err(EngineError::Protocol("mock engine".to_string())),
        }
    }
}

async fn run_full_keygen_and_signing_flow(ciphersuite: Ciphersuite) {
    let coordinator = local(ciphersuite);
    let (auth, client) = anon();

    // Key generation over three peers, 2-of-3
    let key = coordinator
        .run_keygen(&auth, keygen(1), &client, false)
        .await
        .unwrap();
    assert_eq!(key.keygen_id(), PayloadId::new([1; 32]));
    assert_eq!(key.ciphersuite(), ciphersuite);

    // Signing by a two-peer subset of the key generation roster
    let signature = coordinator
        .run_sign(&auth, sign(2, 1, &["alice", "bob"], full_roster()), key.clone(), &client, false)
        .await
        .unwrap();
    assert_eq!(signature.ciphersuite, ciphersuite);
    assert_eq!(signature.group_key, key.group_key());
    match ciphersuite {
        Ciphersuite::Secp256k1 => assert!(signature.recovery_id.is_some()),
        Ciphersuite::Ed25519 => assert!(signature.recovery_id.is_none()),
    }

    // A different subset signs with the same key
    coordinator
        .run_sign(&auth, sign(3, 1, &["bob", "carol"], full_roster()), key, &client, false)
        .await
        .unwrap();

    for id in [1, 2, 3] {
        let status = coordinator.ceremony_status(&PayloadId::new([id; 32])).unwrap();
        assert_eq!(status.state, CeremonyState::Completed);
    }
}

#[tokio::test]
async fn test_full_flow_secp256k1() {
    run_full_keygen_and_signing_flow(Ciphersuite::Secp256k1).await;
}

#[tokio::test]
async fn test_full_flow_ed25519() {
    run_full_keygen_and_signing_flow(Ciphersuite::Ed25519).await;
}

#[tokio::test]
async fn test_keygen_peers_outside_recorded_roster() {
    let coordinator = local(Ciphersuite::Secp256k1);
    let (auth, client) = anon();
    let key = coordinator.run_keygen(&auth, keygen(1), &client, false).await.unwrap();

    let forged = roster(&["alice", "bob", "mallory"]);
    let err = coordinator
        .run_sign(&auth, sign(2, 1, &["alice", "bob"], forged), key, &client, false)
        .await
        .unwrap_err();
    assert_eq!(code(&err), "KEYGEN_ROSTER_MISMATCH");

    // Rejected before reservation, so the id is still free
    assert!(coordinator.ceremony_status(&PayloadId::new([2; 32])).is_none());
}

#[tokio::test]
async fn test_threshold_rejected_before_dispatch() {
    let engine = MockEngine::default();
    let dispatched = Arc::clone(&engine.dispatched);
    let coordinator = Coordinator::in_memory(engine).unwrap();
    let (auth, client) = anon();

    let mut request = keygen(1);
    request.t = 3;
    let err = coordinator.run_keygen(&auth, request, &client, false).await.unwrap_err();

    assert_eq!(code(&err), "THRESHOLD_OUT_OF_RANGE");
    assert_eq!(dispatched.load(Ordering::SeqCst), 0);
    assert!(coordinator.registry().is_empty());
}

#[tokio::test]
async fn test_validation_failures_never_dispatch() {
    let engine = MockEngine::default();
    let dispatched = Arc::clone(&engine.dispatched);
    let coordinator = Coordinator::in_memory(engine).unwrap();
    let (auth, client) = anon();

    let mut duplicate_peer = keygen(1);
    duplicate_peer.peers = roster(&["alice", "alice", "bob"]);

    let mut stranger = keygen(2);
    stranger.sender = PeerId::from("mallory");

    let mut empty = keygen(3);
    empty.peers = Roster::new(Vec::new());
    empty.t = 0;
    empty.n = 0;

    let mut n_mismatch = keygen(4);
    n_mismatch.n = 4;

    for (request, expected) in [
        (duplicate_peer, "DUPLICATE_PEER"),
        (stranger, "SENDER_NOT_IN_ROSTER"),
        (empty, "EMPTY_ROSTER"),
        (n_mismatch, "THRESHOLD_OUT_OF_RANGE"),
        (sign(5, 1, &["alice", "bob"], full_roster()), "WRONG_PAYLOAD_TYPE"),
    ] {
        let err = coordinator.run_keygen(&auth, request, &client, false).await.unwrap_err();
        assert_eq!(code(&err), expected);
    }

    // Signing against a key generation the ledger never saw
    let key = KeyMaterial::new(PayloadId::new([9; 32]), Ciphersuite::Secp256k1, "02aa".to_string(), b"share");
    let err = coordinator
        .run_sign(&auth, sign(6, 9, &["alice", "bob"], full_roster()), key, &client, false)
        .await
        .unwrap_err();
    assert_eq!(code(&err), "UNKNOWN_KEYGEN_ID");

    assert_eq!(dispatched.load(Ordering::SeqCst), 0);
    assert!(coordinator.registry().is_empty());
}

#[tokio::test]
async fn test_engine_failure_burns_payload_id() {
    let engine = MockEngine::default();
    let dispatched = Arc::clone(&engine.dispatched);
    let coordinator = Coordinator::in_memory(engine).unwrap();
    let (auth, client) = anon();

    let err = coordinator.run_keygen(&auth, keygen(1), &client, false).await.unwrap_err();
    assert!(matches!(err, CeremonyError::EngineFailure(ref reason) if reason.contains("mock engine")));
    assert_eq!(code(&err), "ENGINE_FAILURE");

    let status = coordinator.ceremony_status(&PayloadId::new([1; 32])).unwrap();
    assert!(matches!(status.state, CeremonyState::Failed { .. }));

    // Retrying the same id is a duplicate, not a second dispatch
    let err = coordinator.run_keygen(&auth, keygen(1), &client, false).await.unwrap_err();
    assert_eq!(code(&err), "DUPLICATE_PAYLOAD_ID");
    assert_eq!(dispatched.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unresponsive_signer_surfaces_engine_error() {
    let engine = LocalFrostEngine::new(Ciphersuite::Secp256k1).with_unresponsive([PeerId::from("bob")]);
    let coordinator = Coordinator::in_memory(engine).unwrap();
    let (auth, client) = anon();

    // Keygen needs every peer, so a silent peer fails it outright
    let err = coordinator.run_keygen(&auth, keygen(1), &client, false).await.unwrap_err();
    assert_eq!(code(&err), "ENGINE_FAILURE");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_payload_id() {
    const CALLERS: usize = 8;

    let coordinator = Arc::new(local(Ciphersuite::Ed25519));
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                let (auth, client) = anon();
                barrier.wait().await;
                coordinator.run_keygen(&auth, keygen(7), &client, false).await
            })
        })
        .collect();

    let mut ok = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(err) => {
                assert_eq!(code(&err), "DUPLICATE_PAYLOAD_ID");
                duplicates += 1;
            }
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(duplicates, CALLERS - 1);
}

#[tokio::test]
async fn test_logging_does_not_change_outcomes() {
    let quiet = local(Ciphersuite::Secp256k1);
    let loud = local(Ciphersuite::Secp256k1);
    let (auth, client) = anon();

    let mut bad = keygen(1);
    bad.t = 0;
    let a = quiet.run_keygen(&auth, bad.clone(), &client, false).await.unwrap_err();
    let b = loud.run_keygen(&auth, bad, &client, true).await.unwrap_err();
    assert_eq!(a.to_body(), b.to_body());

    let key_a = quiet.run_keygen(&auth, keygen(2), &client, false).await.unwrap();
    let key_b = loud.run_keygen(&auth, keygen(2), &client, true).await.unwrap();
    assert_eq!(key_a.keygen_id(), key_b.keygen_id());

    let sig_a = quiet
        .run_sign(&auth, sign(3, 2, &["alice", "carol"], full_roster()), key_a, &client, false)
        .await;
    let sig_b = loud
        .run_sign(&auth, sign(3, 2, &["alice", "carol"], full_roster()), key_b, &client, true)
        .await;
    assert!(sig_a.is_ok() && sig_b.is_ok());
}

#[tokio::test]
async fn test_auth_checked_first() {
    let coordinator = Coordinator::new(
        LocalFrostEngine::new(Ciphersuite::Secp256k1),
        StaticTokenAuth::new("hunter2"),
        Registry::in_memory().unwrap(),
    );
    let client = ClientContext::default();

    // Even an invalid request reports the auth failure
    let mut bad = keygen(1);
    bad.t = 9;
    let err = coordinator
        .run_keygen(&AuthHeader::new("nope"), bad, &client, false)
        .await
        .unwrap_err();
    assert_eq!(code(&err), "UNAUTHORIZED");

    coordinator
        .run_keygen(&AuthHeader::new("Bearer hunter2"), keygen(1), &client, false)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_validated_request_type_accepted() {
    let coordinator = local(Ciphersuite::Secp256k1);
    let (auth, client) = anon();

    let request = CeremonyRequest::try_from(keygen(1)).unwrap();
    coordinator.run_keygen(&auth, request, &client, false).await.unwrap();
}

#[tokio::test]
async fn test_ledger_survives_restart() {
    let dir = TempDir::new().unwrap();
    let settings = Settings::for_tests().with_db_path(dir.path().join("ledger.redb"));
    let (auth, client) = anon();

    let key = {
        let coordinator = DefaultCoordinator::from_settings(&settings).unwrap();
        coordinator.run_keygen(&auth, keygen(1), &client, false).await.unwrap()
    };

    let coordinator = DefaultCoordinator::from_settings(&settings).unwrap();

    // Consumed ids stay consumed
    let err = coordinator.run_keygen(&auth, keygen(1), &client, false).await.unwrap_err();
    assert_eq!(code(&err), "DUPLICATE_PAYLOAD_ID");

    // Keygen record is still there for signing
    coordinator
        .run_sign(&auth, sign(2, 1, &["bob", "carol"], full_roster()), key, &client, false)
        .await
        .unwrap();
}
