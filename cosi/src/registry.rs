//! Named protocol factories.
//!
//! A [Registry] maps a protocol name to a factory producing the [crate::gossip::Verifier] and [Parameters]
//! every participant of that protocol runs with. Registries are built once with a [Builder] and
//! are immutable afterwards.

use crate::{
    bls::PrivateKey,
    gossip::{Config, Engine, Mailbox, Parameters, DEFAULT_TIMEOUT},
    roster::Roster,
    Error,
};
use bytes::Bytes;
use commonware_runtime::{Clock, Metrics, Spawner};
use rand::Rng;
use std::{collections::BTreeMap, sync::Arc, time::Duration};

/// Name of the protocol registered by [default_registry].
pub const DEFAULT_PROTOCOL: &str = "gossip-cosi";

/// A verifier that can be stored in a [Registry].
pub type BoxedVerifier = Box<dyn FnMut(&[u8], &[u8]) -> bool + Send>;

/// What a factory produces for every new run.
pub struct Protocol {
    pub verifier: BoxedVerifier,
    pub parameters: Parameters,
}

type Factory = Box<dyn Fn() -> Protocol + Send + Sync>;

/// Settings that differ between participants of the same protocol.
#[derive(Clone, Debug)]
pub struct Signer {
    pub private_key: PrivateKey,
    pub roster: Roster,

    /// Auxiliary data handed to the verifier.
    pub data: Bytes,

    /// Overrides the default threshold.
    pub threshold: Option<u32>,

    /// How long the initiator waits for enough signers.
    pub timeout: Duration,
}

impl Signer {
    pub fn new(private_key: PrivateKey, roster: Roster) -> Self {
        Self {
            private_key,
            roster,
            data: Bytes::new(),
            threshold: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Collects factories before freezing them into a [Registry].
#[derive(Default)]
pub struct Builder {
    factories: BTreeMap<String, Factory>,
}

impl Builder {
    /// Register `factory` under `name`.
    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Result<Self, Error>
    where
        F: Fn() -> Protocol + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::DuplicateProtocol(name));
        }
        self.factories.insert(name, Box::new(factory));
        Ok(self)
    }

    pub fn build(self) -> Registry {
        Registry {
            factories: Arc::new(self.factories),
        }
    }
}

/// Immutable map of protocol names to factories.
#[derive(Clone)]
pub struct Registry {
    factories: Arc<BTreeMap<String, Factory>>,
}

impl Registry {
    pub fn builder() -> Builder {
        Builder::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Create an engine for `signer` running protocol `name`.
    pub fn create<E: Clock + Spawner + Metrics + Rng>(
        &self,
        name: &str,
        context: E,
        signer: Signer,
    ) -> Result<(Engine<E, BoxedVerifier>, Mailbox), Error> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::UnknownProtocol(name.to_string()))?;
        let protocol = factory();
        let mut cfg = Config::new(signer.private_key, signer.roster, protocol.verifier);
        cfg.data = signer.data;
        cfg.threshold = signer.threshold;
        cfg.timeout = signer.timeout;
        cfg.parameters = protocol.parameters;
        Engine::new(context, cfg)
    }
}

/// Registry holding [DEFAULT_PROTOCOL], which signs every message.
pub fn default_registry() -> Registry {
    let mut factories: BTreeMap<String, Factory> = BTreeMap::new();
    factories.insert(
        DEFAULT_PROTOCOL.to_string(),
        Box::new(|| Protocol {
            verifier: Box::new(|_: &[u8], _: &[u8]| true),
            parameters: Parameters::default(),
        }),
    );
    Registry {
        factories: Arc::new(factories),
    }
}
