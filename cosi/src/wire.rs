//! Messages exchanged between participants.

use crate::{response::ResponseMap, shutdown::ShutdownProof};
use bytes::{Buf, BufMut, Bytes};
use commonware_codec::{EncodeSize, Error as CodecError, Read, Write};

/// Bounds applied when decoding a [Message].
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Size of the roster (bounds masks, keys and the number of responses).
    pub participants: u32,

    /// Maximum length of the message being signed.
    pub max_message_size: usize,
}

/// Everything a participant knows: the responses it collected and the message being signed
/// (empty if not yet known).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rumor {
    pub responses: ResponseMap,
    pub message: Bytes,
}

impl Write for Rumor {
    fn write(&self, buf: &mut impl BufMut) {
        self.responses.write(buf);
        buf.put_u32(self.message.len() as u32);
        buf.put_slice(&self.message);
    }
}

impl EncodeSize for Rumor {
    fn encode_size(&self) -> usize {
        self.responses.encode_size() + 4 + self.message.len()
    }
}

impl Read for Rumor {
    type Cfg = Config;

    fn read_cfg(buf: &mut impl Buf, cfg: &Config) -> Result<Self, CodecError> {
        let responses = ResponseMap::read_cfg(buf, &cfg.participants)?;
        if buf.remaining() < 4 {
            return Err(CodecError::EndOfBuffer);
        }
        let len = buf.get_u32() as usize;
        if len > cfg.max_message_size {
            return Err(CodecError::Invalid("cosi::Rumor", "message too large"));
        }
        if buf.remaining() < len {
            return Err(CodecError::EndOfBuffer);
        }
        let message = buf.copy_to_bytes(len);
        Ok(Self { responses, message })
    }
}

/// A message sent over the network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Rumor(Rumor),
    Shutdown(ShutdownProof),
}

impl Write for Message {
    fn write(&self, buf: &mut impl BufMut) {
        match self {
            Message::Rumor(rumor) => {
                buf.put_u8(0);
                rumor.write(buf);
            }
            Message::Shutdown(proof) => {
                buf.put_u8(1);
                proof.write(buf);
            }
        }
    }
}

impl EncodeSize for Message {
    fn encode_size(&self) -> usize {
        1 + match self {
            Message::Rumor(rumor) => rumor.encode_size(),
            Message::Shutdown(proof) => proof.encode_size(),
        }
    }
}

impl Read for Message {
    type Cfg = Config;

    fn read_cfg(buf: &mut impl Buf, cfg: &Config) -> Result<Self, CodecError> {
        if buf.remaining() < 1 {
            return Err(CodecError::EndOfBuffer);
        }
        match buf.get_u8() {
            0 => Ok(Message::Rumor(Rumor::read_cfg(buf, cfg)?)),
            1 => Ok(Message::Shutdown(ShutdownProof::read_cfg(
                buf,
                &cfg.participants,
            )?)),
            _ => Err(CodecError::Invalid("cosi::Message", "unknown type")),
        }
    }
}
