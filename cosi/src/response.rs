//! Individual and partially aggregated responses, and the accumulator they are collected in.

use crate::{
    bls::{aggregate_public_keys, aggregate_signatures, verify, PublicKey, Signature},
    mask::Mask,
    Error,
};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error as CodecError, Read, ReadExt, Write};
use std::{
    collections::{btree_map, BTreeMap},
    fmt::{Display, Formatter},
    ops::RangeInclusive,
};

/// An inclusive range of roster indices covered by a [Response].
///
/// Keys order by `low` first, so iterating a [ResponseMap] visits ranges in ascending order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    low: u32,
    high: u32,
}

impl Key {
    /// Create a key covering `low..=high`, returning `None` if the range is inverted.
    pub fn new(low: u32, high: u32) -> Option<Self> {
        (low <= high).then_some(Self { low, high })
    }

    /// Key of a single signer.
    pub fn leaf(index: u32) -> Self {
        Self {
            low: index,
            high: index,
        }
    }

    pub fn low(&self) -> u32 {
        self.low
    }

    pub fn high(&self) -> u32 {
        self.high
    }

    /// Number of signers covered.
    pub fn width(&self) -> u32 {
        self.high - self.low + 1
    }

    pub fn is_leaf(&self) -> bool {
        self.low == self.high
    }

    /// Splits a non-leaf key into its two canonical halves.
    pub fn children(&self) -> Option<(Key, Key)> {
        if self.is_leaf() {
            return None;
        }
        let mid = self.low + self.width().next_power_of_two() / 2;
        Some((
            Self {
                low: self.low,
                high: mid - 1,
            },
            Self {
                low: mid,
                high: self.high,
            },
        ))
    }

    /// Returns whether every index of `other` is covered by `self`.
    pub fn contains(&self, other: &Key) -> bool {
        self.low <= other.low && other.high <= self.high
    }

    pub fn overlaps(&self, other: &Key) -> bool {
        self.low <= other.high && other.low <= self.high
    }

    pub fn indices(&self) -> RangeInclusive<u32> {
        self.low..=self.high
    }

    /// Returns whether the key is a leaf or an aligned power-of-two range (clipped to
    /// `participants`) whose right half is non-empty.
    pub fn is_canonical(&self, participants: u32) -> bool {
        if self.high >= participants {
            return false;
        }
        if self.is_leaf() {
            return true;
        }
        let size = self.width().next_power_of_two();
        if self.low % size != 0 {
            return false;
        }
        let full = self.width() == size;
        let clipped = self.high == participants - 1;
        (full || clipped) && self.low + size / 2 < participants
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_leaf() {
            write!(f, "{}", self.low)
        } else {
            write!(f, "{}..={}", self.low, self.high)
        }
    }
}

impl Write for Key {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.low);
        buf.put_u32(self.high);
    }
}

impl EncodeSize for Key {
    fn encode_size(&self) -> usize {
        8
    }
}

impl Read for Key {
    type Cfg = u32;

    fn read_cfg(buf: &mut impl Buf, participants: &u32) -> Result<Self, CodecError> {
        if buf.remaining() < 8 {
            return Err(CodecError::EndOfBuffer);
        }
        let low = buf.get_u32();
        let high = buf.get_u32();
        if low > high {
            return Err(CodecError::Invalid("cosi::Key", "inverted range"));
        }
        let key = Self { low, high };
        if !key.is_canonical(*participants) {
            return Err(CodecError::Invalid("cosi::Key", "not canonical"));
        }
        Ok(key)
    }
}

/// A signature over the run's message and the mask of signers it aggregates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub signature: Signature,
    pub mask: Mask,
}

impl Response {
    pub fn new(signature: Signature, mask: Mask) -> Self {
        Self { signature, mask }
    }

    /// Aggregate two responses over disjoint signers.
    pub fn combine(&self, other: &Response) -> Result<Response, Error> {
        let signature = aggregate_signatures([&self.signature, &other.signature])?;
        let mut mask = self.mask.clone();
        mask.merge(&other.mask)?;
        Ok(Self { signature, mask })
    }

    /// Checks that the mask enables exactly the indices of `key` and that the signature
    /// verifies over `message` under the aggregate key of those signers.
    pub fn verify(&self, key: &Key, message: &[u8], publics: &[PublicKey]) -> Result<(), Error> {
        let participants = publics.len() as u32;
        if self.mask.participants() != participants {
            return Err(Error::MaskLength {
                expected: participants,
                actual: self.mask.participants(),
            });
        }
        if key.high() >= participants {
            return Err(Error::IndexOutOfRange {
                index: key.high(),
                participants,
            });
        }
        if self.mask.count() != key.width() || !key.indices().all(|i| self.mask.is_enabled(i)) {
            return Err(Error::MaskMismatch(*key));
        }
        let public = aggregate_public_keys(key.indices().map(|i| &publics[i as usize]))?;
        verify(&public, message, &self.signature)?;
        Ok(())
    }
}

impl Write for Response {
    fn write(&self, buf: &mut impl BufMut) {
        self.signature.write(buf);
        self.mask.write(buf);
    }
}

impl EncodeSize for Response {
    fn encode_size(&self) -> usize {
        self.signature.encode_size() + self.mask.encode_size()
    }
}

impl Read for Response {
    type Cfg = u32;

    fn read_cfg(buf: &mut impl Buf, participants: &u32) -> Result<Self, CodecError> {
        let signature = Signature::read(buf)?;
        let mask = Mask::read_cfg(buf, participants)?;
        Ok(Self { signature, mask })
    }
}

/// Accumulator of [Response]s keyed by the (pairwise disjoint) range they cover.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseMap {
    entries: BTreeMap<Key, Response>,
}

impl ResponseMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Key) -> Option<&Response> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Response)> {
        self.entries.iter()
    }

    pub(crate) fn remove(&mut self, key: &Key) -> Option<Response> {
        self.entries.remove(key)
    }

    /// Returns the entry whose range covers `key`, if any.
    pub fn covering(&self, key: &Key) -> Option<&Key> {
        let bound = Key {
            low: key.low,
            high: u32::MAX,
        };
        self.entries
            .range(..=bound)
            .next_back()
            .map(|(existing, _)| existing)
            .filter(|existing| existing.contains(key))
    }

    /// Returns whether some entry already covers every index of `key`.
    pub fn covers(&self, key: &Key) -> bool {
        self.covering(key).is_some()
    }

    /// Insert `response` at `key`, keeping keys disjoint.
    ///
    /// Replaces an entry with the same key, drops entries strictly inside `key`, and does nothing
    /// if `key` is strictly inside (or partially overlaps) an existing entry. Returns whether the
    /// map changed.
    pub fn insert(&mut self, key: Key, response: Response) -> bool {
        // Entries starting before `key`
        let before = Key {
            low: key.low,
            high: 0,
        };
        if let Some((existing, _)) = self.entries.range(..before).next_back() {
            if existing.overlaps(&key) {
                return false;
            }
        }

        // Entries starting inside `key`
        let last = Key {
            low: key.high,
            high: u32::MAX,
        };
        let mut inside = Vec::new();
        for existing in self.entries.range(before..=last).map(|(k, _)| *k) {
            if existing == key {
                continue;
            }
            if !key.contains(&existing) {
                return false;
            }
            inside.push(existing);
        }
        for existing in inside {
            self.entries.remove(&existing);
        }
        self.entries.insert(key, response);
        true
    }

    /// Number of distinct signers covered.
    pub fn signers(&self) -> u32 {
        self.entries.keys().map(Key::width).sum()
    }
}

impl IntoIterator for ResponseMap {
    type Item = (Key, Response);
    type IntoIter = btree_map::IntoIter<Key, Response>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Write for ResponseMap {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.entries.len() as u32);
        for (key, response) in self.entries.iter() {
            key.write(buf);
            response.write(buf);
        }
    }
}

impl EncodeSize for ResponseMap {
    fn encode_size(&self) -> usize {
        4 + self
            .entries
            .iter()
            .map(|(key, response)| key.encode_size() + response.encode_size())
            .sum::<usize>()
    }
}

impl Read for ResponseMap {
    type Cfg = u32;

    fn read_cfg(buf: &mut impl Buf, participants: &u32) -> Result<Self, CodecError> {
        if buf.remaining() < 4 {
            return Err(CodecError::EndOfBuffer);
        }
        let len = buf.get_u32();
        if len > *participants {
            return Err(CodecError::Invalid("cosi::ResponseMap", "too many entries"));
        }
        let mut map = Self::new();
        for _ in 0..len {
            let key = Key::read_cfg(buf, participants)?;
            let response = Response::read_cfg(buf, participants)?;
            if map.entries.keys().any(|existing| existing.overlaps(&key)) {
                return Err(CodecError::Invalid("cosi::ResponseMap", "overlapping keys"));
            }
            map.entries.insert(key, response);
        }
        Ok(map)
    }
}
