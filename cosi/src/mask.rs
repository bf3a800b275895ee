//! Participation bitmasks.
//!
//! Bit `i` of a [Mask] records whether the participant at roster index `i` contributed to an
//! aggregate. On the wire, bits are packed least-significant-bit first inside each byte and the
//! width is implied by the roster size.

use crate::Error;
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error as CodecError, Read, Write};
use commonware_utils::{hex, BitVec};
use std::fmt::{Debug, Formatter};

/// Number of bytes required to hold a mask over `participants`.
pub fn length(participants: u32) -> usize {
    (participants as usize).div_ceil(8)
}

/// A fixed-width participation bitmask.
#[derive(Clone, PartialEq, Eq)]
pub struct Mask {
    bits: BitVec,
}

impl Mask {
    /// Create an empty mask over `participants`.
    pub fn new(participants: u32) -> Self {
        Self {
            bits: BitVec::zeroes(participants as usize),
        }
    }

    /// Create a mask with only `index` enabled.
    pub fn with_index(participants: u32, index: u32) -> Result<Self, Error> {
        let mut mask = Self::new(participants);
        mask.set(index)?;
        Ok(mask)
    }

    /// Parse a mask, rejecting the wrong length and bits beyond `participants`.
    pub fn from_bytes(participants: u32, bytes: &[u8]) -> Result<Self, Error> {
        let expected = length(participants);
        if bytes.len() != expected {
            return Err(Error::MaskBytes {
                expected,
                actual: bytes.len(),
            });
        }
        let mut mask = Self::new(participants);
        for (byte_index, byte) in bytes.iter().enumerate() {
            for bit in 0..8 {
                if byte & (1 << bit) == 0 {
                    continue;
                }
                let index = (byte_index * 8 + bit) as u32;
                mask.set(index)?;
            }
        }
        Ok(mask)
    }

    /// Width of the mask.
    pub fn participants(&self) -> u32 {
        self.bits.len() as u32
    }

    /// Enable `index`.
    pub fn set(&mut self, index: u32) -> Result<(), Error> {
        if index >= self.participants() {
            return Err(Error::IndexOutOfRange {
                index,
                participants: self.participants(),
            });
        }
        self.bits.set(index as usize);
        Ok(())
    }

    /// Returns whether `index` is enabled (out of range indices are not).
    pub fn is_enabled(&self, index: u32) -> bool {
        self.bits.get(index as usize).unwrap_or(false)
    }

    /// Number of enabled participants.
    pub fn count(&self) -> u32 {
        self.bits.count_ones() as u32
    }

    /// Union `other` into `self`.
    pub fn merge(&mut self, other: &Mask) -> Result<(), Error> {
        if other.participants() != self.participants() {
            return Err(Error::MaskLength {
                expected: self.participants(),
                actual: other.participants(),
            });
        }
        self.bits.or(&other.bits);
        Ok(())
    }

    /// Iterate over enabled indices in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, enabled)| *enabled)
            .map(|(index, _)| index as u32)
    }

    /// Serialized form of the mask.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; length(self.participants())];
        for index in self.indices() {
            bytes[(index / 8) as usize] |= 1 << (index % 8);
        }
        bytes
    }
}

impl Debug for Mask {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Mask({}/{}: {})",
            self.count(),
            self.participants(),
            hex(&self.to_bytes())
        )
    }
}

impl Write for Mask {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.to_bytes());
    }
}

impl EncodeSize for Mask {
    fn encode_size(&self) -> usize {
        length(self.participants())
    }
}

impl Read for Mask {
    type Cfg = u32;

    fn read_cfg(buf: &mut impl Buf, participants: &u32) -> Result<Self, CodecError> {
        let len = length(*participants);
        if buf.remaining() < len {
            return Err(CodecError::EndOfBuffer);
        }
        let mut bytes = vec![0; len];
        buf.copy_to_slice(&mut bytes);
        Self::from_bytes(*participants, &bytes)
            .map_err(|_| CodecError::Invalid("cosi::Mask", "bits beyond participants"))
    }
}
