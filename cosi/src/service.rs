//! Turn signature requests into signing runs.
//!
//! A [Service] owns a participant's key and a [Registry]. It can either initiate a run for a
//! [SignatureRequest] or join a run started by another participant.

use crate::{
    bls::{PrivateKey, PublicKey},
    gossip::{Engine, Mailbox},
    registry::{BoxedVerifier, Registry, Signer},
    roster::Roster,
    signature::BlsSignature,
    Error,
};
use bytes::Bytes;
use commonware_cryptography::{
    sha256::{self, Digest},
    Signer as _,
};
use commonware_p2p::{Receiver, Sender};
use commonware_runtime::{Clock, Metrics, Spawner};
use rand::Rng;
use std::time::Duration;
use tracing::info;

/// A message to collectively sign with the given roster.
#[derive(Clone, Debug)]
pub struct SignatureRequest {
    pub message: Bytes,
    pub roster: Roster,
}

/// The outcome of a successful run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureResponse {
    /// SHA-256 of the signed message.
    pub hash: Digest,
    pub signature: BlsSignature,
}

pub struct Service {
    registry: Registry,
    private_key: PrivateKey,
    threshold: Option<u32>,
    timeout: Option<Duration>,
}

impl Service {
    pub fn new(registry: Registry, private_key: PrivateKey) -> Self {
        Self {
            registry,
            private_key,
            threshold: None,
            timeout: None,
        }
    }

    /// Require `threshold` signers instead of the default.
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Wait at most `timeout` for enough signers.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn public_key(&self) -> PublicKey {
        self.private_key.public_key()
    }

    fn signer(&self, roster: Roster) -> Signer {
        let mut signer = Signer::new(self.private_key.clone(), roster);
        signer.threshold = self.threshold;
        if let Some(timeout) = self.timeout {
            signer.timeout = timeout;
        }
        signer
    }

    /// Create an engine that joins a run of `protocol` over `roster` (already rooted at the
    /// initiator).
    pub fn participate<E: Clock + Spawner + Metrics + Rng>(
        &self,
        protocol: &str,
        context: E,
        roster: Roster,
    ) -> Result<(Engine<E, BoxedVerifier>, Mailbox), Error> {
        self.registry.create(protocol, context, self.signer(roster))
    }

    /// Initiate a run of `protocol` for `request` and wait for its result.
    ///
    /// The roster is rooted at this service's key, so other participants must join with
    /// `request.roster.rooted_at(&service.public_key())`.
    pub async fn sign<E: Clock + Spawner + Metrics + Rng>(
        &self,
        protocol: &str,
        context: E,
        request: SignatureRequest,
        network: (
            impl Sender<PublicKey = PublicKey>,
            impl Receiver<PublicKey = PublicKey>,
        ),
    ) -> Result<SignatureResponse, Error> {
        let roster = request
            .roster
            .rooted_at(&self.public_key())
            .ok_or(Error::NotInRoster)?;
        let (engine, mut mailbox) = self.participate(protocol, context, roster)?;
        engine.start(network);

        let result = mailbox.start(request.message.clone()).await?;
        let signature = result.await.map_err(|_| Error::EngineClosed)??;
        info!(protocol, "collected signature");
        Ok(SignatureResponse {
            hash: sha256::hash(&request.message),
            signature,
        })
    }
}
