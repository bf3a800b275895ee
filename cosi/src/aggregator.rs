//! Strategies for merging a [ResponseMap] received from a peer into the local one.
//!
//! [Aggregator::Flat] keeps one entry per signer. [Aggregator::Tree] additionally replaces every
//! pair of sibling ranges with their aggregate, so a full roster collapses into a single entry
//! covering `0..=n-1` and rumors shrink as the run progresses.

use crate::{
    response::{Key, ResponseMap},
    Error,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Aggregator {
    #[default]
    Flat,
    Tree,
}

impl Aggregator {
    /// Merge `incoming` into `local`.
    ///
    /// Both maps must only hold responses that were already verified.
    pub fn merge(
        &self,
        local: &mut ResponseMap,
        incoming: ResponseMap,
        participants: u32,
    ) -> Result<(), Error> {
        for (key, response) in incoming {
            local.insert(key, response);
        }
        if let Self::Tree = self {
            promote(local, participants)?;
        }
        Ok(())
    }
}

/// Replace sibling ranges with their parent, bottom up.
fn promote(map: &mut ResponseMap, participants: u32) -> Result<(), Error> {
    let mut half = 1u32;
    while half < participants {
        let size = half * 2;
        let mut start = 0u32;
        while start + half < participants {
            let end = (start + size - 1).min(participants - 1);
            if let Some(parent) = Key::new(start, end) {
                combine_children(map, parent)?;
            }
            start += size;
        }
        half = size;
    }
    Ok(())
}

/// Replace both halves of `parent` with their aggregate if both are present.
fn combine_children(map: &mut ResponseMap, parent: Key) -> Result<(), Error> {
    let Some((left, right)) = parent.children() else {
        return Ok(());
    };
    let (Some(l), Some(r)) = (map.get(&left), map.get(&right)) else {
        return Ok(());
    };
    let combined = l.combine(r)?;
    map.remove(&left);
    map.remove(&right);
    map.insert(parent, combined);
    Ok(())
}
