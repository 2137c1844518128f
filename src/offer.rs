//! Reversible, version-stamped proposals.

use std::collections::HashMap;

use crate::mask::NodeMask;
use crate::request::Request;

/// A snapshot of what an allocation would do, without publishing it.
///
/// An offer is valid only while the allocator's version matches the one it
/// was stamped with; any successful allocation, release, commit, realloc,
/// or reset bumps the version and invalidates every outstanding offer.
#[derive(Debug, Clone)]
pub struct Offer {
    pub(crate) version: u64,
    /// The proposed request, fully built, not yet admitted. `None` for
    /// offers produced by operations on an already-admitted request (a
    /// hypothetical `realloc`, say), where every entry in `updates` refers
    /// to an existing request.
    pub(crate) new_request: Option<Request>,
    /// Request id -> proposed new zone, for every request the pipeline
    /// touched (including the new request, if any).
    pub(crate) updates: HashMap<String, NodeMask>,
    /// The zone the subject request (new or existing) would end up in.
    pub(crate) final_zone: NodeMask,
}

impl Offer {
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The zone the offer's subject request would end up in.
    pub fn final_zone(&self) -> NodeMask {
        self.final_zone
    }

    /// Updates proposed for every touched request, including the subject
    /// request.
    pub fn updates(&self) -> &HashMap<String, NodeMask> {
        &self.updates
    }

    /// True while `allocator.version() == self.version()`. Any successful
    /// mutation after the offer was issued makes this false.
    pub fn is_valid(&self, allocator_version: u64) -> bool {
        self.version == allocator_version
    }
}
