//! Ceremony request model, validation and sequencing.
//!
//! - `roster`: peers taking part in a ceremony
//! - `payload`: what ceremony to run and its inputs
//! - `request`: validated request with threshold
//! - `types`: key material, signatures and results
//! - `registry`: payload id ledger and keygen records
//! - `coordinator`: admission and dispatch to the signing engine
//! - `envelope`: result envelope for string and HTTP callers

pub mod coordinator;
pub mod envelope;
pub mod payload;
pub mod registry;
pub mod request;
pub mod roster;
pub mod types;

pub use coordinator::{Coordinator, DefaultCoordinator};
pub use envelope::ResultEnvelope;
pub use payload::{CeremonyPayload, DIGEST_LEN, PayloadId, SignOffline};
pub use registry::{CeremonyState, CeremonyStatus, KeygenRecord, Registry};
pub use request::{CeremonyInput, CeremonyRequest, RawCeremonyRequest, Threshold};
pub use roster::{PeerAddress, PeerEntry, PeerId, Roster};
pub use types::{CeremonyKind, CeremonyResult, KeyMaterial, Signature};
