//! The ordered set of participants in a signing run.

use crate::{bls::PublicKey, Error};
use std::{collections::HashSet, net::SocketAddr};

/// A participant: the key it signs with and where it can be reached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub public_key: PublicKey,
    pub address: SocketAddr,
}

/// Ordered, non-empty list of [Identity]s with unique public keys.
///
/// The position of an identity is its index in every [crate::mask::Mask] of the run. The
/// identity at index 0 is the initiator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Roster {
    identities: Vec<Identity>,
}

impl Roster {
    pub fn new(identities: Vec<Identity>) -> Result<Self, Error> {
        if identities.is_empty() {
            return Err(Error::EmptyRoster);
        }
        let mut seen = HashSet::with_capacity(identities.len());
        for (index, identity) in identities.iter().enumerate() {
            if !seen.insert(&identity.public_key) {
                return Err(Error::DuplicateParticipant(index as u32));
            }
        }
        Ok(Self { identities })
    }

    /// Number of participants.
    pub fn len(&self) -> u32 {
        self.identities.len() as u32
    }

    /// Always false (rosters cannot be empty).
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&Identity> {
        self.identities.get(index as usize)
    }

    pub fn index_of(&self, public_key: &PublicKey) -> Option<u32> {
        self.identities
            .iter()
            .position(|identity| &identity.public_key == public_key)
            .map(|index| index as u32)
    }

    /// The participant that starts the run and assembles the final signature.
    pub fn initiator(&self) -> &Identity {
        &self.identities[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.identities.iter()
    }

    pub fn public_keys(&self) -> Vec<PublicKey> {
        self.identities
            .iter()
            .map(|identity| identity.public_key.clone())
            .collect()
    }

    /// Returns a roster with `public_key` moved to index 0 (the others keep their relative order),
    /// or `None` if `public_key` is not a participant.
    pub fn rooted_at(&self, public_key: &PublicKey) -> Option<Roster> {
        let index = self.index_of(public_key)? as usize;
        let mut identities = Vec::with_capacity(self.identities.len());
        identities.push(self.identities[index].clone());
        identities.extend(
            self.identities
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .map(|(_, identity)| identity.clone()),
        );
        Some(Self { identities })
    }
}
