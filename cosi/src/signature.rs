//! The final collective signature.

use crate::{
    bls::{
        aggregate_public_keys, aggregate_signatures, parse_signature, verify, PublicKey, Signature,
        SIGNATURE_LENGTH,
    },
    mask::{self, Mask},
    response::ResponseMap,
    threshold::{Policy, Threshold},
    Error,
};
use bytes::{Buf, BufMut, Bytes};
use commonware_codec::{EncodeSize, Error as CodecError, Read, Write};
use commonware_utils::hex;
use std::fmt::{Debug, Formatter};

/// An aggregate signature followed by the mask of participants that contributed to it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BlsSignature(Bytes);

impl BlsSignature {
    pub fn new(signature: &Signature, mask: &Mask) -> Self {
        let mask = mask.to_bytes();
        let mut bytes = Vec::with_capacity(SIGNATURE_LENGTH + mask.len());
        bytes.extend_from_slice(signature);
        bytes.extend_from_slice(&mask);
        Self(bytes.into())
    }

    /// Wrap raw bytes without checking them (accessors do).
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self(bytes)
    }

    /// The aggregate signature bytes (without the mask).
    pub fn raw_signature(&self) -> Result<&[u8], Error> {
        if self.0.len() < SIGNATURE_LENGTH {
            return Err(Error::SignatureTooShort);
        }
        Ok(&self.0[..SIGNATURE_LENGTH])
    }

    pub fn signature(&self) -> Result<Signature, Error> {
        Ok(parse_signature(self.raw_signature()?)?)
    }

    /// The mask of contributors, given the roster size.
    pub fn mask(&self, participants: u32) -> Result<Mask, Error> {
        if self.0.len() < SIGNATURE_LENGTH {
            return Err(Error::SignatureTooShort);
        }
        Mask::from_bytes(participants, &self.0[SIGNATURE_LENGTH..])
    }

    /// Verify under the default threshold policy.
    pub fn verify_aggregate(&self, message: &[u8], publics: &[PublicKey]) -> Result<(), Error> {
        let policy = Threshold::default_for(publics.len() as u32);
        self.verify_aggregate_with_policy(message, publics, &policy)
    }

    /// Verify over `message` under the aggregate key of the signers in the mask, requiring
    /// `policy` to accept the mask.
    pub fn verify_aggregate_with_policy(
        &self,
        message: &[u8],
        publics: &[PublicKey],
        policy: &impl Policy,
    ) -> Result<(), Error> {
        if message.is_empty() {
            return Err(Error::NoMessage);
        }
        if publics.is_empty() {
            return Err(Error::NoPublicKeys);
        }
        let signature = self.signature()?;
        let mask = self.mask(publics.len() as u32)?;
        if !policy.check(&mask) {
            return Err(Error::PolicyNotFulfilled(mask.count()));
        }
        let public = aggregate_public_keys(mask.indices().map(|i| &publics[i as usize]))?;
        verify(&public, message, &signature)?;
        Ok(())
    }
}

impl AsRef<[u8]> for BlsSignature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for BlsSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex(&self.0))
    }
}

impl Write for BlsSignature {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.0);
    }
}

impl EncodeSize for BlsSignature {
    fn encode_size(&self) -> usize {
        self.0.len()
    }
}

impl Read for BlsSignature {
    type Cfg = u32;

    fn read_cfg(buf: &mut impl Buf, participants: &u32) -> Result<Self, CodecError> {
        let len = SIGNATURE_LENGTH + mask::length(*participants);
        if buf.remaining() < len {
            return Err(CodecError::EndOfBuffer);
        }
        Ok(Self(buf.copy_to_bytes(len)))
    }
}

/// Aggregate every entry of `responses` into a single [BlsSignature] over `participants`.
pub fn assemble(responses: &ResponseMap, participants: u32) -> Result<BlsSignature, Error> {
    if responses.is_empty() {
        return Err(Error::NoResponses);
    }
    let mut mask = Mask::new(participants);
    for (_, response) in responses.iter() {
        mask.merge(&response.mask)?;
    }
    let signature =
        aggregate_signatures(responses.iter().map(|(_, response)| &response.signature))?;
    Ok(BlsSignature::new(&signature, &mask))
}
