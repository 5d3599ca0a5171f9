//! Peer roster: the ordered participant set of one ceremony.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RosterError;

/// Opaque peer identity, unique within a roster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transport-level address of a peer (typically a multiaddress).
///
/// Reachability is the transport's concern; the coordinator never parses it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerAddress(String);

impl PeerAddress {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerAddress {
    fn from(addr: &str) -> Self {
        Self(addr.to_string())
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `(PeerId, PeerAddress)` pair. Serializes as a two-element JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerEntry(pub PeerId, pub PeerAddress);

impl PeerEntry {
    pub fn new(id: impl Into<PeerId>, addr: impl Into<PeerAddress>) -> Self {
        Self(id.into(), addr.into())
    }

    pub fn id(&self) -> &PeerId {
        &self.0
    }

    pub fn address(&self) -> &PeerAddress {
        &self.1
    }
}

/// Ordered sequence of peers taking part in one ceremony.
///
/// Order is significant: a peer's 1-based position is its party index
/// inside the threshold protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster(Vec<PeerEntry>);

impl Roster {
    pub fn new(entries: Vec<PeerEntry>) -> Self {
        Self(entries)
    }

    pub fn entries(&self) -> &[PeerEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerEntry> {
        self.0.iter()
    }

    pub fn peer_ids(&self) -> impl Iterator<Item = &PeerId> {
        self.0.iter().map(PeerEntry::id)
    }

    /// Check whether `peer_id` is a member of this roster.
    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.0.iter().any(|entry| entry.id() == peer_id)
    }

    /// 1-based position of `peer_id` in this roster.
    pub fn position(&self, peer_id: &PeerId) -> Option<u16> {
        self.0
            .iter()
            .position(|entry| entry.id() == peer_id)
            .and_then(|index| u16::try_from(index + 1).ok())
    }

    /// Fail on the first repeated peer id.
    pub fn ensure_unique(&self) -> Result<(), RosterError> {
        let mut ids = HashSet::with_capacity(self.0.len());
        for entry in &self.0 {
            if !ids.insert(entry.id()) {
                return Err(RosterError::DuplicatePeer(entry.id().clone()));
            }
        }

        // Each address belongs to exactly one peer
        let mut addresses = HashSet::with_capacity(self.0.len());
        for entry in &self.0 {
            if !addresses.insert(entry.address()) {
                return Err(RosterError::DuplicateAddress(entry.address().clone()));
            }
        }
        Ok(())
    }

    /// Validate the roster for a ceremony sent by `sender`.
    ///
    /// Checks emptiness, then uniqueness, then sender membership.
    pub fn validate(&self, sender: &PeerId) -> Result<(), RosterError> {
        if self.is_empty() {
            return Err(RosterError::EmptyRoster);
        }
        self.ensure_unique()?;
        if !self.contains(sender) {
            return Err(RosterError::SenderNotInRoster(sender.clone()));
        }
        Ok(())
    }

    /// First peer of `self` that is not a member of `superset`.
    pub fn first_outside<'a>(&'a self, superset: &Roster) -> Option<&'a PeerId> {
        self.peer_ids().find(|id| !superset.contains(id))
    }
}

impl FromIterator<PeerEntry> for Roster {
    fn from_iter<I: IntoIterator<Item = PeerEntry>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Roster {
    type Item = &'a PeerEntry;
    type IntoIter = std::slice::Iter<'a, PeerEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
