//! Collectively sign messages with BLS12-381 over a gossip network.
//!
//! An initiator asks every participant of a [roster::Roster] to co-sign a message. Participants
//! that accept the message sign it and spread what they know (their own signature and every
//! signature they have heard of) to a few random peers at a fixed interval. Once the initiator
//! knows of enough distinct signers to satisfy a threshold, it aggregates them into a single
//! [signature::BlsSignature] (an aggregate signature followed by a participation bitmask) and
//! disseminates an authenticated [shutdown::ShutdownProof] so every participant eventually stops
//! gossiping.
//!
//! # Components
//!
//! - [bls]: signing, verification and aggregation primitives.
//! - [mask]: participation bitmasks.
//! - [response]: the per-signer unit and the accumulator it is collected in.
//! - [aggregator]: flat and tree strategies for merging accumulators.
//! - [threshold]: Byzantine threshold and policies.
//! - [gossip]: the per-participant [gossip::Engine].
//! - [registry]: named protocol factories.
//! - [service]: turns a signature request into a run (the [service::Service] front door).
//!
//! Participants exchange messages over any [commonware_p2p::Sender] and [commonware_p2p::Receiver]
//! keyed by their [bls::PublicKey].
//!
//! # Status
//!
//! `commonware-cosi` is **ALPHA** software and is not yet recommended for production use. Developers should
//! expect breaking changes and occasional instability.

#![doc(
    html_logo_url = "https://commonware.xyz/imgs/rustdoc_logo.svg",
    html_favicon_url = "https://commonware.xyz/favicon.ico"
)]

use std::time::Duration;
use thiserror::Error;

pub mod aggregator;
pub mod bls;
pub mod gossip;
pub mod mask;
pub mod registry;
pub mod response;
pub mod roster;
pub mod sampler;
pub mod service;
pub mod shutdown;
pub mod signature;
pub mod threshold;
pub mod wire;

#[cfg(test)]
pub(crate) mod mocks;

/// Errors that can occur while collectively signing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("bls: {0}")]
    Bls(#[from] bls::Error),

    // Configuration
    #[error("empty roster")]
    EmptyRoster,
    #[error("duplicate participant at index {0}")]
    DuplicateParticipant(u32),
    #[error("not in roster")]
    NotInRoster,
    #[error("no proposal message specified")]
    MissingMessage,
    #[error("unrealistic timeout: {0:?}")]
    UnrealisticTimeout(Duration),
    #[error("threshold ({threshold}) bigger than number of participants ({participants})")]
    ThresholdTooLarge { threshold: u32, participants: u32 },
    #[error("threshold of {0} smaller than one participant")]
    ThresholdTooSmall(u32),
    #[error("not the initiator")]
    NotInitiator,
    #[error("message too large: {size} > {max}")]
    MessageTooLarge { size: usize, max: usize },

    // Sequencing
    #[error("timeout, did you forget to call start?")]
    StartTimeout,
    #[error("protocol finished prematurely")]
    PrematureTermination,
    #[error("already started")]
    AlreadyStarted,
    #[error("engine closed")]
    EngineClosed,
    #[error("network closed")]
    NetworkClosed,

    // Signatures and masks
    #[error("mask width mismatch: expected {expected} participants, got {actual}")]
    MaskLength { expected: u32, actual: u32 },
    #[error("invalid mask encoding: expected {expected} bytes, got {actual}")]
    MaskBytes { expected: usize, actual: usize },
    #[error("index {index} out of range for {participants} participants")]
    IndexOutOfRange { index: u32, participants: u32 },
    #[error("mask does not match range {0}")]
    MaskMismatch(response::Key),
    #[error("signature too short to get mask")]
    SignatureTooShort,
    #[error("no responses to aggregate")]
    NoResponses,
    #[error("no public keys provided")]
    NoPublicKeys,
    #[error("no message provided")]
    NoMessage,
    #[error("the policy is not fulfilled: {0} signers")]
    PolicyNotFulfilled(u32),

    // Gossip
    #[error("not enough peers: requested {requested}, available {available}")]
    InsufficientPeers { requested: usize, available: usize },
    #[error("protocol did not complete: {signers}/{threshold} signers")]
    Incomplete { signers: u32, threshold: u32 },

    // Registry
    #[error("protocol already registered: {0}")]
    DuplicateProtocol(String),
    #[error("no such protocol: {0}")]
    UnknownProtocol(String),
}
