//! Uniform selection of gossip targets.

use crate::Error;
use rand::{seq::SliceRandom, Rng};

/// Selects distinct peers from a roster, never including the local participant.
#[derive(Clone, Debug)]
pub struct Sampler<P> {
    peers: Vec<P>,
}

impl<P: Clone + PartialEq> Sampler<P> {
    pub fn new<'a>(participants: impl IntoIterator<Item = &'a P>, me: &P) -> Self
    where
        P: 'a,
    {
        let peers = participants
            .into_iter()
            .filter(|peer| *peer != me)
            .cloned()
            .collect();
        Self { peers }
    }

    /// Number of peers that can be sampled.
    pub fn available(&self) -> usize {
        self.peers.len()
    }

    /// Returns `k` distinct peers chosen uniformly at random.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, k: usize) -> Result<Vec<P>, Error> {
        if k > self.peers.len() {
            return Err(Error::InsufficientPeers {
                requested: k,
                available: self.peers.len(),
            });
        }
        Ok(self.peers.choose_multiple(rng, k).cloned().collect())
    }
}
