use super::Verifier;
use crate::{
    bls::PrivateKey,
    roster::Roster,
    threshold::{default_threshold, validate},
    Error,
};
use bytes::Bytes;
use commonware_cryptography::Signer as _;
use std::time::Duration;

/// How long the initiator waits for enough signers by default.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// When every participant stops by default, measured from engine start.
pub const DEFAULT_SHUTDOWN_AFTER: Duration = Duration::from_secs(11);

/// How long the initiator waits to be started by default.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(1);

/// Shortest accepted response timeout.
pub const MIN_TIMEOUT: Duration = Duration::from_micros(500);

/// Tunables shared by every participant running the same protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Parameters {
    /// Interval between two rumors.
    pub gossip_tick: Duration,

    /// Number of peers each rumor is sent to.
    pub rumor_peers: usize,

    /// Number of peers a shutdown proof is sent to when entering shutdown.
    pub shutdown_peers: usize,

    /// Whether to aggregate sibling ranges as they complete.
    pub tree_mode: bool,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            gossip_tick: Duration::from_millis(100),
            rumor_peers: 2,
            shutdown_peers: 2,
            tree_mode: false,
        }
    }
}

/// Configuration for the [`Engine`](super::Engine).
pub struct Config<V: Verifier> {
    /// Key used to sign the message.
    pub private_key: PrivateKey,

    /// Participants of the run (index 0 is the initiator).
    pub roster: Roster,

    /// Decides whether to sign a message.
    pub verifier: V,

    /// Auxiliary data handed to the verifier alongside the message.
    pub data: Bytes,

    /// Number of signers required (defaults to [default_threshold]).
    pub threshold: Option<u32>,

    /// How long the initiator waits for enough signers after being started.
    pub timeout: Duration,

    /// Hard deadline (from engine start) after which the engine stops.
    pub shutdown_after: Duration,

    /// How long the initiator waits to be started.
    pub start_timeout: Duration,

    /// Gossip tunables.
    pub parameters: Parameters,

    /// The maximum size of the mailbox backlog.
    pub mailbox_size: usize,

    /// The maximum size of the message being signed.
    pub max_message_size: usize,
}

impl<V: Verifier> Config<V> {
    /// Configuration with default timings and parameters.
    pub fn new(private_key: PrivateKey, roster: Roster, verifier: V) -> Self {
        Self {
            private_key,
            roster,
            verifier,
            data: Bytes::new(),
            threshold: None,
            timeout: DEFAULT_TIMEOUT,
            shutdown_after: DEFAULT_SHUTDOWN_AFTER,
            start_timeout: DEFAULT_START_TIMEOUT,
            parameters: Parameters::default(),
            mailbox_size: 16,
            max_message_size: 1024 * 1024,
        }
    }

    /// Returns the index of this participant and the effective threshold.
    pub(super) fn validate(&self) -> Result<(u32, u32), Error> {
        let index = self
            .roster
            .index_of(&self.private_key.public_key())
            .ok_or(Error::NotInRoster)?;
        if self.timeout < MIN_TIMEOUT {
            return Err(Error::UnrealisticTimeout(self.timeout));
        }
        if self.parameters.gossip_tick.is_zero() {
            return Err(Error::UnrealisticTimeout(self.parameters.gossip_tick));
        }
        let participants = self.roster.len();
        let threshold = self
            .threshold
            .unwrap_or_else(|| default_threshold(participants));
        validate(threshold, participants)?;
        Ok((index, threshold))
    }
}
