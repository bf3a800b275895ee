//! Signing and aggregation over [commonware_cryptography::bls12381].
//!
//! Public keys live in G1 (48 bytes) and signatures in G2 (96 bytes). Messages are signed without
//! a namespace using the `POP` (Proof of Possession) ciphersuite tag
//! `BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_`. Aggregating public keys is only safe when every
//! key in a roster was registered by its owner (the roster is trusted membership).

use commonware_codec::DecodeExt;
pub use commonware_cryptography::bls12381::{PrivateKey, PublicKey, Signature};
use commonware_cryptography::{
    bls12381::primitives::{
        group::{self, G1, G2},
        ops,
        variant::MinPk,
    },
    Signer as _, Verifier as _,
};
use thiserror::Error;

/// Length of a compressed public key.
pub const PUBLIC_KEY_LENGTH: usize = group::G1_ELEMENT_BYTE_LENGTH;

/// Length of a compressed signature.
pub const SIGNATURE_LENGTH: usize = group::G2_ELEMENT_BYTE_LENGTH;

/// Errors that can occur when working with BLS12-381 primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("nothing to aggregate")]
    EmptyAggregate,
}

/// Signs `message` with `private`.
///
/// Signatures are deterministic.
pub fn sign(private: &PrivateKey, message: &[u8]) -> Signature {
    private.sign(None, message)
}

/// Verifies a signature over `message`.
///
/// `public` may be an aggregate produced by [aggregate_public_keys].
pub fn verify(public: &PublicKey, message: &[u8], signature: &Signature) -> Result<(), Error> {
    if !public.verify(None, message, signature) {
        return Err(Error::InvalidSignature);
    }
    Ok(())
}

/// Parses a compressed signature, rejecting points outside of G2 and the point at infinity.
pub fn parse_signature(bytes: &[u8]) -> Result<Signature, Error> {
    Signature::decode(bytes).map_err(|_| Error::InvalidSignature)
}

/// Aggregates multiple signatures into one.
///
/// # Warning
///
/// This function assumes each `signature` was group checked (as done when decoding) and that the
/// same signer does not appear twice.
pub fn aggregate_signatures<'a, I>(signatures: I) -> Result<Signature, Error>
where
    I: IntoIterator<Item = &'a Signature>,
{
    let signatures: Vec<&G2> = signatures.into_iter().map(AsRef::<G2>::as_ref).collect();
    if signatures.is_empty() {
        return Err(Error::EmptyAggregate);
    }
    Ok(Signature::from(ops::aggregate_signatures::<MinPk, _>(
        signatures,
    )))
}

/// Aggregates multiple public keys into one.
///
/// # Warning
///
/// It is not safe to provide duplicate public keys.
pub fn aggregate_public_keys<'a, I>(public_keys: I) -> Result<PublicKey, Error>
where
    I: IntoIterator<Item = &'a PublicKey>,
{
    let public_keys: Vec<&G1> = public_keys.into_iter().map(AsRef::<G1>::as_ref).collect();
    if public_keys.is_empty() {
        return Err(Error::EmptyAggregate);
    }
    Ok(PublicKey::from(ops::aggregate_public_keys::<MinPk, _>(
        public_keys,
    )))
}
