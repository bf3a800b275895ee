//! Byzantine thresholds and the policies final signatures are checked against.

use crate::{mask::Mask, response::ResponseMap, Error};
use commonware_utils::quorum;

/// Number of signers required by default: tolerates fewer than a third of `participants` being
/// faulty.
pub fn default_threshold(participants: u32) -> u32 {
    if participants == 0 {
        return 0;
    }
    quorum(participants)
}

/// Checks that `threshold` is usable with `participants`.
pub fn validate(threshold: u32, participants: u32) -> Result<(), Error> {
    if threshold < 1 {
        return Err(Error::ThresholdTooSmall(threshold));
    }
    if threshold > participants {
        return Err(Error::ThresholdTooLarge {
            threshold,
            participants,
        });
    }
    Ok(())
}

/// Returns whether `responses` covers at least `threshold` distinct signers.
pub fn is_enough(responses: &ResponseMap, threshold: u32) -> bool {
    responses.signers() >= threshold
}

/// Decides whether a set of signers is acceptable for an aggregate signature.
pub trait Policy {
    fn check(&self, mask: &Mask) -> bool;
}

/// Accepts any mask with at least `threshold` signers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Threshold(pub u32);

impl Threshold {
    /// The [default_threshold] for `participants`.
    pub fn default_for(participants: u32) -> Self {
        Self(default_threshold(participants))
    }
}

impl Policy for Threshold {
    fn check(&self, mask: &Mask) -> bool {
        mask.count() >= self.0
    }
}
