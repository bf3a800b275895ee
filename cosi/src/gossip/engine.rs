use super::{
    ingress::{Mailbox, Message},
    metrics, Config, Verifier,
};
use crate::{
    aggregator::Aggregator,
    bls::{self, PrivateKey, PublicKey},
    mask::Mask,
    response::{Key, Response, ResponseMap},
    sampler::Sampler,
    shutdown::ShutdownProof,
    signature::{assemble, BlsSignature},
    threshold::is_enough,
    wire::{self, Rumor},
    Error,
};
use bytes::Bytes;
use commonware_codec::{Decode, Encode};
use commonware_macros::select;
use commonware_p2p::{Receiver, Recipients, Sender};
use commonware_runtime::{Clock, Handle, Metrics, Spawner};
use futures::{
    channel::{mpsc, oneshot},
    StreamExt,
};
use rand::Rng;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, trace, warn};

/// Lifecycle of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// Initiator waiting for its message.
    WaitingForStart,
    /// Signing and gossiping.
    Active,
    /// Final signature known, answering rumors with the proof.
    SoftShutdown,
    Terminated,
}

/// Participant in a collective signing run.
pub struct Engine<E: Clock + Spawner + Metrics + Rng, V: Verifier> {
    // Configuration
    context: E,
    private_key: PrivateKey,
    publics: Vec<PublicKey>,
    index: u32,
    participants: u32,
    threshold: u32,
    verifier: V,
    data: Bytes,
    timeout: Duration,
    shutdown_after: Duration,
    start_timeout: Duration,
    gossip_tick: Duration,
    rumor_peers: usize,
    shutdown_peers: usize,
    aggregator: Aggregator,
    codec: wire::Config,
    sampler: Sampler<PublicKey>,

    // Message passing
    mailbox: mpsc::Receiver<Message>,
    responder: Option<oneshot::Sender<Result<BlsSignature, Error>>>,

    // State
    phase: Phase,
    message: Option<Bytes>,
    responses: ResponseMap,
    proof: Option<ShutdownProof>,
    deadline: SystemTime,
    response_deadline: Option<SystemTime>,
    next_tick: SystemTime,

    // Metrics
    metrics: metrics::Metrics,
}

impl<E: Clock + Spawner + Metrics + Rng, V: Verifier> Engine<E, V> {
    /// Creates a new engine with the given configuration.
    ///
    /// Returns a tuple of the engine and the mailbox used to start it.
    pub fn new(context: E, cfg: Config<V>) -> Result<(Self, Mailbox), Error> {
        let (index, threshold) = cfg.validate()?;
        let participants = cfg.roster.len();
        let publics = cfg.roster.public_keys();
        let sampler = Sampler::new(&publics, &publics[index as usize]);

        let (sender, receiver) = mpsc::channel(cfg.mailbox_size);
        let mailbox = Mailbox::new(index == 0, cfg.max_message_size, sender);
        let metrics = metrics::Metrics::init(context.clone());
        let now = context.current();
        let aggregator = if cfg.parameters.tree_mode {
            Aggregator::Tree
        } else {
            Aggregator::Flat
        };

        Ok((
            Self {
                context,
                private_key: cfg.private_key,
                publics,
                index,
                participants,
                threshold,
                verifier: cfg.verifier,
                data: cfg.data,
                timeout: cfg.timeout,
                shutdown_after: cfg.shutdown_after,
                start_timeout: cfg.start_timeout,
                gossip_tick: cfg.parameters.gossip_tick,
                rumor_peers: cfg.parameters.rumor_peers,
                shutdown_peers: cfg.parameters.shutdown_peers,
                aggregator,
                codec: wire::Config {
                    participants,
                    max_message_size: cfg.max_message_size,
                },
                sampler,

                mailbox: receiver,
                responder: None,

                phase: Phase::Active,
                message: None,
                responses: ResponseMap::new(),
                proof: None,
                deadline: now,
                response_deadline: None,
                next_tick: now,

                metrics,
            },
            mailbox,
        ))
    }

    /// Starts the engine with the given network channels.
    ///
    /// The handle resolves once the engine has terminated.
    pub fn start(
        self,
        network: (
            impl Sender<PublicKey = PublicKey>,
            impl Receiver<PublicKey = PublicKey>,
        ),
    ) -> Handle<Result<(), Error>> {
        self.context.clone().spawn(|_| self.run(network))
    }

    fn is_initiator(&self) -> bool {
        self.index == 0
    }

    async fn run(
        mut self,
        network: (
            impl Sender<PublicKey = PublicKey>,
            impl Receiver<PublicKey = PublicKey>,
        ),
    ) -> Result<(), Error> {
        let result = self.execute(network).await;
        if let Err(err) = &result {
            error!(?err, index = self.index, "run failed");
            if let Some(responder) = self.responder.take() {
                let _ = responder.send(Err(err.clone()));
            }
        }
        result
    }

    async fn execute(
        &mut self,
        (mut sender, mut receiver): (
            impl Sender<PublicKey = PublicKey>,
            impl Receiver<PublicKey = PublicKey>,
        ),
    ) -> Result<(), Error> {
        let start = self.context.current();
        self.deadline = start + self.shutdown_after;
        self.next_tick = start + self.gossip_tick;

        // Wait for the message to sign
        if self.is_initiator() {
            self.phase = Phase::WaitingForStart;
            let start_deadline = start + self.start_timeout;
            while self.phase == Phase::WaitingForStart {
                select! {
                    mail = self.mailbox.next() => {
                        let Some(Message::Start { message, responder }) = mail else {
                            return Err(Error::PrematureTermination);
                        };
                        self.handle_start(message, responder, &mut sender).await?;
                    },
                    msg = receiver.recv() => {
                        match msg {
                            Ok((peer, _)) => debug!(?peer, "dropping message before start"),
                            Err(err) => {
                                error!(?err, "receiver failed");
                                return Err(Error::NetworkClosed);
                            }
                        }
                    },
                    _ = self.context.sleep_until(start_deadline) => {
                        return Err(Error::StartTimeout);
                    },
                }
            }
        }

        // Gossip until the hard deadline
        while self.phase != Phase::Terminated {
            let alarm = self.alarm();
            select! {
                msg = receiver.recv() => {
                    let (peer, msg) = match msg {
                        Ok(msg) => msg,
                        Err(err) => {
                            error!(?err, "receiver failed");
                            self.terminate();
                            break;
                        }
                    };
                    self.handle_network(peer, msg, &mut sender).await?;
                },
                _ = self.context.sleep_until(alarm) => {
                    self.handle_alarm(&mut sender).await?;
                },
            }
        }
        debug!(
            index = self.index,
            signers = self.responses.signers(),
            "terminated"
        );
        Ok(())
    }

    /// Earliest pending timer.
    fn alarm(&self) -> SystemTime {
        match self.phase {
            Phase::Active => {
                let mut alarm = self.deadline.min(self.next_tick);
                if let Some(response_deadline) = self.response_deadline {
                    alarm = alarm.min(response_deadline);
                }
                alarm
            }
            _ => self.deadline,
        }
    }

    async fn handle_alarm(
        &mut self,
        sender: &mut impl Sender<PublicKey = PublicKey>,
    ) -> Result<(), Error> {
        let now = self.context.current();
        if now >= self.deadline {
            debug!(index = self.index, "hard deadline reached");
            self.terminate();
            return Ok(());
        }
        if self.phase != Phase::Active {
            return Ok(());
        }
        if self
            .response_deadline
            .is_some_and(|deadline| now >= deadline)
        {
            warn!(
                signers = self.responses.signers(),
                threshold = self.threshold,
                "timed out waiting for signers"
            );
            self.terminate();
            return Ok(());
        }
        if now >= self.next_tick {
            while self.next_tick <= now {
                self.next_tick += self.gossip_tick;
            }
            self.gossip(sender).await;
        }
        Ok(())
    }

    async fn handle_start(
        &mut self,
        message: Bytes,
        responder: oneshot::Sender<Result<BlsSignature, Error>>,
        sender: &mut impl Sender<PublicKey = PublicKey>,
    ) -> Result<(), Error> {
        info!(len = message.len(), "starting run");

        // Refuse any other start
        self.mailbox.close();
        while let Ok(Some(Message::Start { responder, .. })) = self.mailbox.try_next() {
            let _ = responder.send(Err(Error::AlreadyStarted));
        }

        self.message = Some(message);
        self.responder = Some(responder);
        self.response_deadline = Some(self.context.current() + self.timeout);
        self.phase = Phase::Active;
        self.sign()?;
        if is_enough(&self.responses, self.threshold) {
            self.shutdown(None, sender).await?;
        }
        Ok(())
    }

    /// Sign the known message (if the verifier accepts it) and merge our response.
    fn sign(&mut self) -> Result<(), Error> {
        let Some(message) = &self.message else {
            return Ok(());
        };
        if !self.verifier.verify(message, &self.data) {
            info!(index = self.index, "refusing to sign");
            return Ok(());
        }
        let response = Response::new(
            bls::sign(&self.private_key, message),
            Mask::with_index(self.participants, self.index)?,
        );
        let mut own = ResponseMap::new();
        own.insert(Key::leaf(self.index), response);
        self.aggregator
            .merge(&mut self.responses, own, self.participants)?;
        self.metrics.signers.set(self.responses.signers() as i64);
        debug!(index = self.index, "signed message");
        Ok(())
    }

    async fn handle_network(
        &mut self,
        peer: PublicKey,
        msg: Bytes,
        sender: &mut impl Sender<PublicKey = PublicKey>,
    ) -> Result<(), Error> {
        let msg = match wire::Message::decode_cfg(msg, &self.codec) {
            Ok(msg) => msg,
            Err(err) => {
                debug!(?err, ?peer, "failed to decode message");
                return Ok(());
            }
        };
        match (self.phase, msg) {
            (Phase::Active, wire::Message::Rumor(rumor)) => {
                self.metrics.rumors_received.inc();
                self.handle_rumor(rumor, sender).await
            }
            (Phase::Active, wire::Message::Shutdown(proof)) => {
                self.metrics.shutdowns_received.inc();
                self.handle_shutdown(peer, proof, sender).await
            }
            (Phase::SoftShutdown, wire::Message::Rumor(_)) => {
                // Answer stragglers with the proof
                self.metrics.rumors_received.inc();
                self.send_proof(Recipients::One(peer), sender).await;
                Ok(())
            }
            (phase, _) => {
                trace!(?phase, ?peer, "ignoring message");
                Ok(())
            }
        }
    }

    async fn handle_rumor(
        &mut self,
        rumor: Rumor,
        sender: &mut impl Sender<PublicKey = PublicKey>,
    ) -> Result<(), Error> {
        if self.message.is_none() && !rumor.message.is_empty() {
            debug!(index = self.index, "learned message");
            self.message = Some(rumor.message);
            self.sign()?;
        }
        let Some(message) = &self.message else {
            trace!("message not yet known");
            return Ok(());
        };

        // Only keep responses that add signers and verify
        let mut accepted = ResponseMap::new();
        for (key, response) in rumor.responses {
            if self.responses.covers(&key) {
                continue;
            }
            if let Err(err) = response.verify(&key, message, &self.publics) {
                warn!(?err, %key, "dropping invalid response");
                self.metrics.invalid_responses.inc();
                continue;
            }
            accepted.insert(key, response);
        }
        if !accepted.is_empty() {
            self.aggregator
                .merge(&mut self.responses, accepted, self.participants)?;
            self.metrics.signers.set(self.responses.signers() as i64);
            trace!(
                index = self.index,
                signers = self.responses.signers(),
                "merged responses"
            );
        }

        if self.is_initiator() && is_enough(&self.responses, self.threshold) {
            self.shutdown(None, sender).await?;
        }
        Ok(())
    }

    async fn handle_shutdown(
        &mut self,
        peer: PublicKey,
        proof: ShutdownProof,
        sender: &mut impl Sender<PublicKey = PublicKey>,
    ) -> Result<(), Error> {
        let result = match &self.message {
            Some(message) => proof.verify(message, &self.publics),
            None => Err(Error::NoMessage),
        };
        if let Err(err) = result {
            warn!(?err, ?peer, "got spoofed shutdown");
            self.metrics.spoofed_shutdowns.inc();
            return Ok(());
        }
        debug!(index = self.index, ?peer, "received valid shutdown");
        self.shutdown(Some(proof), sender).await
    }

    /// Enter soft shutdown, assembling (and reporting) the final signature if no proof is given.
    async fn shutdown(
        &mut self,
        adopted: Option<ShutdownProof>,
        sender: &mut impl Sender<PublicKey = PublicKey>,
    ) -> Result<(), Error> {
        let proof = match adopted {
            Some(proof) => proof,
            None => {
                let signature = assemble(&self.responses, self.participants)?;
                info!(
                    signers = self.responses.signers(),
                    threshold = self.threshold,
                    "created final signature"
                );
                ShutdownProof::new(signature, &self.private_key)
            }
        };
        if let Some(responder) = self.responder.take() {
            let _ = responder.send(Ok(proof.signature().clone()));
        }
        self.proof = Some(proof);
        self.phase = Phase::SoftShutdown;

        match self.sampler.sample(&mut self.context, self.shutdown_peers) {
            Ok(peers) => self.send_proof(Recipients::Some(peers), sender).await,
            Err(err) => debug!(?err, "couldn't get random peers for shutdown"),
        }
        Ok(())
    }

    async fn send_proof(
        &mut self,
        recipients: Recipients<PublicKey>,
        sender: &mut impl Sender<PublicKey = PublicKey>,
    ) {
        let Some(proof) = &self.proof else {
            return;
        };
        let msg = wire::Message::Shutdown(proof.clone()).encode().freeze();
        match sender.send(recipients, msg, false).await {
            Ok(sent) => {
                self.metrics.shutdowns_sent.inc_by(sent.len() as u64);
            }
            Err(err) => warn!(?err, "failed to send shutdown"),
        }
    }

    async fn gossip(&mut self, sender: &mut impl Sender<PublicKey = PublicKey>) {
        let peers = match self.sampler.sample(&mut self.context, self.rumor_peers) {
            Ok(peers) => peers,
            Err(err) => {
                debug!(?err, "couldn't get random peers");
                return;
            }
        };
        let rumor = Rumor {
            responses: self.responses.clone(),
            message: self.message.clone().unwrap_or_default(),
        };
        let msg = wire::Message::Rumor(rumor).encode().freeze();
        match sender.send(Recipients::Some(peers), msg, false).await {
            Ok(sent) => {
                self.metrics.rumors_sent.inc_by(sent.len() as u64);
            }
            Err(err) => warn!(?err, "failed to send rumor"),
        }
    }

    fn terminate(&mut self) {
        if self.phase == Phase::Terminated {
            return;
        }
        self.phase = Phase::Terminated;
        if let Some(responder) = self.responder.take() {
            let _ = responder.send(Err(Error::Incomplete {
                signers: self.responses.signers(),
                threshold: self.threshold,
            }));
        }
    }
}
