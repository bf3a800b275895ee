//! Collect signatures from a roster by gossiping partial aggregates.
//!
//! # Overview
//!
//! Every participant runs an [Engine]. The engine of the initiator (roster index 0) waits to be
//! started through its [Mailbox] with the message to sign. All other engines start gossiping
//! immediately and learn the message from the first rumor that carries it.
//!
//! # Details
//!
//! Each engine keeps a [crate::response::ResponseMap] of verified responses. On every tick it
//! sends that map (and the message) to a few random peers. Incoming responses are verified
//! before they are merged, so a single invalid entry never poisons an aggregate. In tree mode,
//! sibling ranges are aggregated as soon as both are known and rumors shrink over time.
//!
//! When the initiator knows of enough signers, it aggregates them into a
//! [crate::signature::BlsSignature], returns it to the caller and sends a
//! [crate::shutdown::ShutdownProof] to a few peers. From then on every rumor it receives is
//! answered with the proof. Participants that verify a proof do the same, so the proof spreads
//! like the rumors did. Proofs that fail verification are counted and ignored.
//!
//! If the threshold is not reached within the configured timeout, the caller receives
//! [crate::Error::Incomplete]. Every engine stops at its hard deadline.

mod config;
pub use config::{
    Config, Parameters, DEFAULT_SHUTDOWN_AFTER, DEFAULT_START_TIMEOUT, DEFAULT_TIMEOUT, MIN_TIMEOUT,
};
mod engine;
pub use engine::Engine;
mod ingress;
pub use ingress::Mailbox;
mod metrics;

/// Decides whether to sign a proposed message.
pub trait Verifier: Send + 'static {
    /// Returns whether `message` (accompanied by the configured auxiliary `data`) should be signed.
    fn verify(&mut self, message: &[u8], data: &[u8]) -> bool;
}

impl<F: FnMut(&[u8], &[u8]) -> bool + Send + 'static> Verifier for F {
    fn verify(&mut self, message: &[u8], data: &[u8]) -> bool {
        self(message, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bls::{aggregate_signatures, sign as bls_sign, PrivateKey, PublicKey},
        mask::Mask,
        mocks,
        shutdown::ShutdownProof,
        signature::BlsSignature,
        threshold::default_threshold,
        wire, Error,
    };
    use bytes::Bytes;
    use commonware_codec::Encode;
    use commonware_cryptography::{PrivateKeyExt as _, Signer as _};
    use commonware_macros::test_traced;
    use commonware_p2p::{simulated::Oracle, Recipients, Sender as _};
    use commonware_runtime::{deterministic, Clock, Handle, Metrics, Runner};
    use std::time::Duration;

    const MESSAGE: &[u8] = b"proposal";

    struct Scenario {
        participants: u32,
        refuse: Vec<u32>,
        parameters: Parameters,
        threshold: Option<u32>,
        timeout: Duration,
        shutdown_after: Duration,
        success_rate: f64,
    }

    impl Default for Scenario {
        fn default() -> Self {
            Self {
                participants: 4,
                refuse: Vec::new(),
                parameters: Parameters::default(),
                threshold: None,
                timeout: Duration::from_secs(2),
                shutdown_after: Duration::from_secs(3),
                success_rate: 1.0,
            }
        }
    }

    /// Spawn an engine for every participant and return the initiator's mailbox, all handles (in
    /// roster order), if an `attacker` is given, its channel, and the network oracle (which must
    /// stay alive for the network to keep running).
    async fn spawn(
        context: &deterministic::Context,
        scenario: Scenario,
        attacker: Option<PublicKey>,
    ) -> (
        Mailbox,
        Vec<Handle<Result<(), Error>>>,
        Option<mocks::Channel>,
        Oracle<PublicKey>,
    ) {
        let (privates, roster) = mocks::participants(scenario.participants);
        let mut peers = roster.public_keys();
        peers.extend(attacker);
        let (oracle, mut channels) =
            mocks::network(context, &peers, mocks::link(scenario.success_rate)).await;
        let attacker = if channels.len() > privates.len() {
            channels.pop()
        } else {
            None
        };

        let mut initiator = None;
        let mut handles = Vec::new();
        for (i, (private, channel)) in privates.into_iter().zip(channels).enumerate() {
            let refuse = scenario.refuse.contains(&(i as u32));
            let mut cfg = Config::new(private, roster.clone(), move |_: &[u8], _: &[u8]| !refuse);
            cfg.parameters = scenario.parameters.clone();
            cfg.threshold = scenario.threshold;
            cfg.timeout = scenario.timeout;
            cfg.shutdown_after = scenario.shutdown_after;
            let (engine, mailbox) =
                Engine::new(context.with_label(&format!("peer_{i}")), cfg).unwrap();
            if i == 0 {
                initiator = Some(mailbox);
            }
            handles.push(engine.start(channel));
        }
        (initiator.unwrap(), handles, attacker, oracle)
    }

    async fn sign(mailbox: &mut Mailbox) -> Result<BlsSignature, Error> {
        let result = mailbox.start(Bytes::from_static(MESSAGE)).await.unwrap();
        result.await.unwrap()
    }

    async fn join(handles: Vec<Handle<Result<(), Error>>>) {
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(()));
        }
    }

    /// Current value of the counter `name` (0 if it was never registered).
    fn counter(context: &deterministic::Context, name: &str) -> u64 {
        context
            .encode()
            .lines()
            .filter_map(|line| line.split_once(' '))
            .find(|(metric, _)| *metric == name)
            .and_then(|(_, value)| value.parse().ok())
            .unwrap_or(0)
    }

    #[test_traced]
    fn test_all_sign() {
        let executor = deterministic::Runner::timed(Duration::from_secs(30));
        executor.start(|context| async move {
            let (_, roster) = mocks::participants(4);
            let (mut mailbox, handles, _, _oracle) =
                spawn(&context, Scenario::default(), None).await;
            let signature = sign(&mut mailbox).await.unwrap();
            let publics = roster.public_keys();
            assert!(signature.verify_aggregate(MESSAGE, &publics).is_ok());
            assert!(signature.mask(4).unwrap().count() >= default_threshold(4));
            join(handles).await;
        });
    }

    #[test_traced]
    fn test_one_refusal() {
        let executor = deterministic::Runner::timed(Duration::from_secs(30));
        executor.start(|context| async move {
            let (_, roster) = mocks::participants(4);
            let scenario = Scenario {
                refuse: vec![3],
                ..Default::default()
            };
            let (mut mailbox, handles, _, _oracle) = spawn(&context, scenario, None).await;
            let signature = sign(&mut mailbox).await.unwrap();
            assert!(signature
                .verify_aggregate(MESSAGE, &roster.public_keys())
                .is_ok());
            let signers: Vec<_> = signature.mask(4).unwrap().indices().collect();
            assert_eq!(signers, vec![0, 1, 2]);
            join(handles).await;
        });
    }

    #[test_traced]
    fn test_two_refusals() {
        let executor = deterministic::Runner::timed(Duration::from_secs(30));
        executor.start(|context| async move {
            let scenario = Scenario {
                refuse: vec![2, 3],
                ..Default::default()
            };
            let (mut mailbox, handles, _, _oracle) = spawn(&context, scenario, None).await;
            assert_eq!(
                sign(&mut mailbox).await,
                Err(Error::Incomplete {
                    signers: 2,
                    threshold: 3
                })
            );

            // Every engine still stops
            join(handles).await;
        });
    }

    #[test_traced]
    fn test_initiator_refuses() {
        let executor = deterministic::Runner::timed(Duration::from_secs(30));
        executor.start(|context| async move {
            let (_, roster) = mocks::participants(4);
            let scenario = Scenario {
                refuse: vec![0],
                ..Default::default()
            };
            let (mut mailbox, handles, _, _oracle) = spawn(&context, scenario, None).await;
            let signature = sign(&mut mailbox).await.unwrap();
            assert!(signature
                .verify_aggregate(MESSAGE, &roster.public_keys())
                .is_ok());
            assert!(!signature.mask(4).unwrap().is_enabled(0));
            join(handles).await;
        });
    }

    #[test_traced]
    fn test_tree_mode() {
        let executor = deterministic::Runner::timed(Duration::from_secs(30));
        executor.start(|context| async move {
            let (_, roster) = mocks::participants(8);
            let scenario = Scenario {
                participants: 8,
                parameters: Parameters {
                    tree_mode: true,
                    ..Parameters::default()
                },
                ..Default::default()
            };
            let (mut mailbox, handles, _, _oracle) = spawn(&context, scenario, None).await;
            let signature = sign(&mut mailbox).await.unwrap();
            assert!(signature
                .verify_aggregate(MESSAGE, &roster.public_keys())
                .is_ok());
            assert!(signature.mask(8).unwrap().count() >= default_threshold(8));
            join(handles).await;
        });
    }

    #[test_traced]
    fn test_full_threshold() {
        let executor = deterministic::Runner::timed(Duration::from_secs(30));
        executor.start(|context| async move {
            let scenario = Scenario {
                participants: 5,
                threshold: Some(5),
                ..Default::default()
            };
            let (mut mailbox, handles, _, _oracle) = spawn(&context, scenario, None).await;
            let signature = sign(&mut mailbox).await.unwrap();
            assert_eq!(signature.mask(5).unwrap().count(), 5);
            join(handles).await;
        });
    }

    #[test_traced]
    fn test_single_participant() {
        let executor = deterministic::Runner::timed(Duration::from_secs(30));
        executor.start(|context| async move {
            let (_, roster) = mocks::participants(1);
            let scenario = Scenario {
                participants: 1,
                ..Default::default()
            };
            let (mut mailbox, handles, _, _oracle) = spawn(&context, scenario, None).await;
            let signature = sign(&mut mailbox).await.unwrap();
            assert!(signature
                .verify_aggregate(MESSAGE, &roster.public_keys())
                .is_ok());
            join(handles).await;
        });
    }

    #[test_traced]
    fn test_lossy_network() {
        let executor = deterministic::Runner::timed(Duration::from_secs(60));
        executor.start(|context| async move {
            let (_, roster) = mocks::participants(7);
            let scenario = Scenario {
                participants: 7,
                timeout: Duration::from_secs(10),
                shutdown_after: Duration::from_secs(11),
                success_rate: 0.7,
                ..Default::default()
            };
            let (mut mailbox, handles, _, _oracle) = spawn(&context, scenario, None).await;
            let signature = sign(&mut mailbox).await.unwrap();
            assert!(signature
                .verify_aggregate(MESSAGE, &roster.public_keys())
                .is_ok());
            join(handles).await;
        });
    }

    #[test_traced]
    fn test_spoofed_shutdown() {
        let executor = deterministic::Runner::timed(Duration::from_secs(30));
        executor.start(|context| async move {
            let (privates, roster) = mocks::participants(4);
            let attacker = PrivateKey::from_seed(100).public_key();

            // Only nodes 0 and 3 sign, so the run can't finish on its own, and every node learns
            // the message on the first tick
            let scenario = Scenario {
                refuse: vec![1, 2],
                parameters: Parameters {
                    rumor_peers: 3,
                    ..Parameters::default()
                },
                ..Default::default()
            };
            let (mut mailbox, handles, attacker, _oracle) =
                spawn(&context, scenario, Some(attacker)).await;
            let (mut sender, _receiver) = attacker.unwrap();
            let result = mailbox.start(Bytes::from_static(MESSAGE)).await.unwrap();
            context.sleep(Duration::from_secs(1)).await;

            // A genuine aggregate of nodes 0..=2 whose outer layer is signed by node 1 instead of
            // the initiator
            let signatures: Vec<_> = privates[..3].iter().map(|p| bls_sign(p, MESSAGE)).collect();
            let mut mask = Mask::new(4);
            for i in 0..3 {
                mask.set(i).unwrap();
            }
            let aggregate = BlsSignature::new(&aggregate_signatures(&signatures).unwrap(), &mask);
            assert!(aggregate
                .verify_aggregate(MESSAGE, &roster.public_keys())
                .is_ok());
            let outer = bls_sign(&privates[1], aggregate.as_ref());
            let msg = wire::Message::Shutdown(ShutdownProof::from_parts(aggregate, outer))
                .encode()
                .freeze();
            let victim = roster.get(3).unwrap().public_key.clone();
            let sent = sender
                .send(Recipients::One(victim), msg, false)
                .await
                .unwrap();
            assert_eq!(sent.len(), 1);

            // The victim rejects the proof and keeps gossiping
            context.sleep(Duration::from_millis(200)).await;
            assert_eq!(counter(&context, "peer_3_spoofed_shutdowns_total"), 1);
            let before = counter(&context, "peer_3_rumors_sent_total");
            assert!(before > 0);
            context.sleep(Duration::from_millis(500)).await;
            let after = counter(&context, "peer_3_rumors_sent_total");
            assert!(after > before, "{after} <= {before}");

            assert_eq!(
                result.await.unwrap(),
                Err(Error::Incomplete {
                    signers: 2,
                    threshold: 3
                })
            );
            join(handles).await;
        });
    }

    #[test_traced]
    fn test_start_timeout() {
        let executor = deterministic::Runner::timed(Duration::from_secs(30));
        executor.start(|context| async move {
            let start = context.current();
            let (_mailbox, mut handles, _, _oracle) =
                spawn(&context, Scenario::default(), None).await;
            let initiator = handles.remove(0);
            assert_eq!(initiator.await.unwrap(), Err(Error::StartTimeout));
            let elapsed = context.current().duration_since(start).unwrap();
            assert!(elapsed >= DEFAULT_START_TIMEOUT);
            join(handles).await;
        });
    }

    #[test_traced]
    fn test_premature_termination() {
        let executor = deterministic::Runner::timed(Duration::from_secs(30));
        executor.start(|context| async move {
            let (mailbox, mut handles, _, _oracle) =
                spawn(&context, Scenario::default(), None).await;
            drop(mailbox);
            let initiator = handles.remove(0);
            assert_eq!(initiator.await.unwrap(), Err(Error::PrematureTermination));
            join(handles).await;
        });
    }

    #[test_traced]
    fn test_second_start() {
        let executor = deterministic::Runner::timed(Duration::from_secs(30));
        executor.start(|context| async move {
            let (_, roster) = mocks::participants(4);
            let (mut mailbox, handles, _, _oracle) =
                spawn(&context, Scenario::default(), None).await;
            let mut queued = mailbox.clone();
            let mut late = mailbox.clone();

            let result = mailbox.start(Bytes::from_static(MESSAGE)).await.unwrap();
            assert!(matches!(
                mailbox.start(Bytes::from_static(MESSAGE)).await,
                Err(Error::AlreadyStarted)
            ));

            // Queued behind the first start before the engine picked it up
            let refused = queued.start(Bytes::from_static(b"other")).await.unwrap();

            let signature = result.await.unwrap().unwrap();
            assert!(signature
                .verify_aggregate(MESSAGE, &roster.public_keys())
                .is_ok());
            assert_eq!(refused.await.unwrap(), Err(Error::AlreadyStarted));

            // The engine no longer accepts starts
            assert!(matches!(
                late.start(Bytes::from_static(MESSAGE)).await,
                Err(Error::EngineClosed)
            ));
            join(handles).await;
        });
    }

    #[test]
    fn test_invalid_config() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let (privates, roster) = mocks::participants(4);
            let verifier = |_: &[u8], _: &[u8]| true;

            let stranger = PrivateKey::from_seed(100);
            let cfg = Config::new(stranger, roster.clone(), verifier);
            assert!(matches!(
                Engine::new(context.with_label("stranger"), cfg),
                Err(Error::NotInRoster)
            ));

            let mut cfg = Config::new(privates[0].clone(), roster.clone(), verifier);
            cfg.timeout = Duration::from_micros(100);
            assert!(matches!(
                Engine::new(context.with_label("timeout"), cfg),
                Err(Error::UnrealisticTimeout(_))
            ));

            let mut cfg = Config::new(privates[0].clone(), roster.clone(), verifier);
            cfg.threshold = Some(5);
            assert!(matches!(
                Engine::new(context.with_label("large"), cfg),
                Err(Error::ThresholdTooLarge {
                    threshold: 5,
                    participants: 4
                })
            ));

            let mut cfg = Config::new(privates[0].clone(), roster.clone(), verifier);
            cfg.threshold = Some(0);
            assert!(matches!(
                Engine::new(context.with_label("small"), cfg),
                Err(Error::ThresholdTooSmall(0))
            ));
        });
    }

    #[test]
    fn test_mailbox_errors() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let (privates, roster) = mocks::participants(4);
            let verifier = |_: &[u8], _: &[u8]| true;

            let cfg = Config::new(privates[0].clone(), roster.clone(), verifier);
            let (_engine, mut mailbox) = Engine::new(context.with_label("initiator"), cfg).unwrap();
            assert!(matches!(
                mailbox.start(Bytes::new()).await,
                Err(Error::MissingMessage)
            ));

            let cfg = Config::new(privates[1].clone(), roster, verifier);
            let (_engine, mut mailbox) = Engine::new(context.with_label("follower"), cfg).unwrap();
            assert!(matches!(
                mailbox.start(Bytes::from_static(MESSAGE)).await,
                Err(Error::NotInitiator)
            ));
        });
    }

    #[test]
    fn test_message_too_large() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let (privates, roster) = mocks::participants(4);
            let verifier = |_: &[u8], _: &[u8]| true;
            let mut cfg = Config::new(privates[0].clone(), roster, verifier);
            cfg.max_message_size = 8;
            let (_engine, mut mailbox) = Engine::new(context.with_label("initiator"), cfg).unwrap();

            // Rejected before reaching the engine
            assert!(matches!(
                mailbox
                    .start(Bytes::from_static(b"a message longer than eight bytes"))
                    .await,
                Err(Error::MessageTooLarge { size: 33, max: 8 })
            ));

            // A message of exactly the limit is accepted
            assert_eq!(MESSAGE.len(), 8);
            assert!(mailbox.start(Bytes::from_static(MESSAGE)).await.is_ok());
        });
    }
}
