use crate::{signature::BlsSignature, Error};
use bytes::Bytes;
use futures::{
    channel::{mpsc, oneshot},
    SinkExt,
};

/// Message types that can be sent to the `Mailbox`
pub enum Message {
    /// Start collecting signatures on `message`.
    ///
    /// The responder is sent the final signature, or why none could be produced.
    Start {
        message: Bytes,
        responder: oneshot::Sender<Result<BlsSignature, Error>>,
    },
}

/// Ingress mailbox for [`Engine`](super::Engine).
///
/// An engine runs once: only the first [Mailbox::start] is accepted. Starts queued from clones
/// before the engine picks up the first one resolve to [Error::AlreadyStarted].
#[derive(Clone)]
pub struct Mailbox {
    initiator: bool,
    max_message_size: usize,
    started: bool,
    sender: mpsc::Sender<Message>,
}

impl Mailbox {
    pub(super) fn new(
        initiator: bool,
        max_message_size: usize,
        sender: mpsc::Sender<Message>,
    ) -> Self {
        Self {
            initiator,
            max_message_size,
            started: false,
            sender,
        }
    }

    /// Start the run (only valid on the initiator).
    ///
    /// Returns a receiver that resolves once the run completes.
    pub async fn start(
        &mut self,
        message: Bytes,
    ) -> Result<oneshot::Receiver<Result<BlsSignature, Error>>, Error> {
        if message.is_empty() {
            return Err(Error::MissingMessage);
        }
        if message.len() > self.max_message_size {
            return Err(Error::MessageTooLarge {
                size: message.len(),
                max: self.max_message_size,
            });
        }
        if !self.initiator {
            return Err(Error::NotInitiator);
        }
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        let (responder, receiver) = oneshot::channel();
        self.sender
            .send(Message::Start { message, responder })
            .await
            .map_err(|_| Error::EngineClosed)?;
        self.started = true;
        Ok(receiver)
    }
}
