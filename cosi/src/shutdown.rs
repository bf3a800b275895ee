//! Authenticated termination.
//!
//! Once the initiator has assembled the final signature, it signs the raw bytes of that
//! signature and disseminates both as a [ShutdownProof]. A participant only stops gossiping if
//! the final signature is a valid aggregate meeting the default threshold and the outer signature
//! was produced by the initiator (roster index 0).

use crate::{
    bls::{sign, verify, PrivateKey, PublicKey, Signature},
    signature::BlsSignature,
    Error,
};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error as CodecError, Read, ReadExt, Write};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShutdownProof {
    signature: BlsSignature,
    initiator: Signature,
}

impl ShutdownProof {
    /// Sign `signature` as the initiator.
    pub fn new(signature: BlsSignature, initiator: &PrivateKey) -> Self {
        let outer = sign(initiator, signature.as_ref());
        Self {
            signature,
            initiator: outer,
        }
    }

    pub fn from_parts(signature: BlsSignature, initiator: Signature) -> Self {
        Self {
            signature,
            initiator,
        }
    }

    /// The final collective signature.
    pub fn signature(&self) -> &BlsSignature {
        &self.signature
    }

    /// The initiator's signature over [ShutdownProof::signature].
    pub fn initiator(&self) -> &Signature {
        &self.initiator
    }

    /// Verify both layers of the proof against the run's `message` and roster keys (in roster
    /// order, initiator first).
    pub fn verify(&self, message: &[u8], publics: &[PublicKey]) -> Result<(), Error> {
        let Some(initiator) = publics.first() else {
            return Err(Error::NoPublicKeys);
        };
        self.signature.verify_aggregate(message, publics)?;
        verify(initiator, self.signature.as_ref(), &self.initiator)?;
        Ok(())
    }
}

impl Write for ShutdownProof {
    fn write(&self, buf: &mut impl BufMut) {
        self.signature.write(buf);
        self.initiator.write(buf);
    }
}

impl EncodeSize for ShutdownProof {
    fn encode_size(&self) -> usize {
        self.signature.encode_size() + self.initiator.encode_size()
    }
}

impl Read for ShutdownProof {
    type Cfg = u32;

    fn read_cfg(buf: &mut impl Buf, participants: &u32) -> Result<Self, CodecError> {
        let signature = BlsSignature::read_cfg(buf, participants)?;
        let initiator = Signature::read(buf)?;
        Ok(Self {
            signature,
            initiator,
        })
    }
}
