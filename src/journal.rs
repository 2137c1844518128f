//! The reversible transaction layer.
//!
//! A [`Journal`] is created at the start of every mutating operation. It
//! records, per touched request id, the *prior* zone (`reverts`, first
//! observation wins) and the *intended* new zone (`updates`, always
//! overwritten). On commit it publishes `updates`; on revert it reinstalls
//! `reverts`, undoing every journaled move.

use std::collections::HashMap;

use crate::mask::NodeMask;

#[derive(Debug, Default)]
pub(crate) struct Journal {
    pub(crate) reverts: HashMap<String, NodeMask>,
    pub(crate) updates: HashMap<String, NodeMask>,
}

impl Journal {
    pub(crate) fn new() -> Self {
        Journal::default()
    }

    /// Records a move of `id` from `prior` to `new`. `prior` is
    /// `NodeMask::EMPTY` if the request did not previously exist. The first
    /// observed `prior` for a given id is the restoration target for the
    /// whole transaction; `updates` always reflects the latest intent.
    pub(crate) fn record(&mut self, id: &str, prior: NodeMask, new: NodeMask) {
        self.reverts.entry(id.to_string()).or_insert(prior);
        self.updates.insert(id.to_string(), new);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}
